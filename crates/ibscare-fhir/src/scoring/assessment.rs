//! IBS assessment returned by the analysis backend.
//!
//! Every section defaults when absent and unknown fields are ignored, so a
//! partially filled report still deserializes.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IbsAssessment {
    pub overall_narrative_summary: String,
    pub clinical_assessment: ClinicalAssessment,
    pub missing_information: MissingInformation,
    pub clinical_recommendations: ClinicalRecommendations,
    pub reliability_assessment: ReliabilityAssessment,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClinicalAssessment {
    #[serde(rename = "romeIVCriteriaMet")]
    pub rome_iv_criteria_met: bool,
    pub narrative_summary: String,
    #[serde(rename = "ibsSSS")]
    pub ibs_sss: SeverityScoringSystem,
    pub bristol_stool_scale: BristolStoolScale,
    pub ibs_subtype: SubtypeAssessment,
}

/// IBS Symptom Severity Score components.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SeverityScoringSystem {
    pub narrative_summary: String,
    pub abdominal_pain_severity: ScoreComponent,
    pub abdominal_pain_frequency: ScoreComponent,
    pub bloating_severity: ScoreComponent,
    pub bowel_habit_dissatisfaction: ScoreComponent,
    pub life_interference: ScoreComponent,
    pub total_score: TotalScore,
}

impl SeverityScoringSystem {
    /// Components that carry a value, in questionnaire order.
    pub fn scored_components(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        [
            ("abdominalPainSeverity", &self.abdominal_pain_severity),
            ("abdominalPainFrequency", &self.abdominal_pain_frequency),
            ("bloatingSeverity", &self.bloating_severity),
            ("bowelHabitDissatisfaction", &self.bowel_habit_dissatisfaction),
            ("lifeInterference", &self.life_interference),
        ]
        .into_iter()
        .filter_map(|(name, component)| component.value.map(|v| (name, v)))
    }
}

/// A single scored component; `value` is null when the data was insufficient.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScoreComponent {
    pub value: Option<f64>,
    pub source_data: String,
    pub clinical_gap: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TotalScore {
    pub value: Option<f64>,
    pub interpretation: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BristolStoolScale {
    pub value: Option<f64>,
    pub source_data: String,
    pub interpretation: String,
    pub narrative_summary: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubtypeAssessment {
    pub classification: IbsSubtype,
    pub reasoning: String,
    pub confidence_level: String,
    pub narrative_summary: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum IbsSubtype {
    #[serde(rename = "IBS-C")]
    Constipation,
    #[serde(rename = "IBS-D")]
    Diarrhea,
    #[serde(rename = "IBS-M")]
    Mixed,
    #[serde(rename = "IBS-U")]
    Unclassified,
    #[default]
    #[serde(other)]
    Undetermined,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MissingInformation {
    pub narrative_summary: String,
    pub critical_gaps: Vec<String>,
    pub recommended_assessments: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClinicalRecommendations {
    pub narrative_summary: String,
    pub immediate_actions: Vec<String>,
    pub suggested_lab_tests: Vec<String>,
    pub data_collection_needed: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReliabilityAssessment {
    pub narrative_summary: String,
    pub limiting_factors: Vec<String>,
    pub confidence_level: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_backend_report() {
        let assessment: IbsAssessment = serde_json::from_value(json!({
            "overallNarrativeSummary": "Likely IBS-D.",
            "clinicalAssessment": {
                "romeIVCriteriaMet": true,
                "narrativeSummary": "Meets criteria.",
                "ibsSSS": {
                    "narrativeSummary": "Moderate.",
                    "abdominalPainSeverity": {"value": 60, "sourceData": "Obs/1", "clinicalGap": ""},
                    "abdominalPainFrequency": {"value": null, "sourceData": "", "clinicalGap": "No diary"},
                    "bloatingSeverity": {"value": 40.5},
                    "totalScore": {"value": 220, "interpretation": "Moderate"}
                },
                "bristolStoolScale": {"value": 6, "interpretation": "Loose"},
                "ibsSubtype": {"classification": "IBS-D", "confidenceLevel": "high"}
            },
            "missingInformation": {"criticalGaps": ["Stool diary"]},
            "clinicalRecommendations": {"suggestedLabTests": ["CRP", "Calprotectin"]},
            "reliabilityAssessment": {"confidenceLevel": "medium"},
            "modelVersion": "ignored"
        }))
        .unwrap();

        let clinical = &assessment.clinical_assessment;
        assert!(clinical.rome_iv_criteria_met);
        assert_eq!(clinical.ibs_subtype.classification, IbsSubtype::Diarrhea);
        assert_eq!(clinical.ibs_sss.abdominal_pain_frequency.value, None);
        assert_eq!(clinical.ibs_sss.total_score.value, Some(220.0));
        assert_eq!(clinical.bristol_stool_scale.value, Some(6.0));
        assert_eq!(
            clinical.ibs_sss.scored_components().collect::<Vec<_>>(),
            [("abdominalPainSeverity", 60.0), ("bloatingSeverity", 40.5)]
        );
        assert_eq!(
            assessment.clinical_recommendations.suggested_lab_tests,
            ["CRP", "Calprotectin"]
        );
    }

    #[test]
    fn unknown_subtype_is_undetermined() {
        let subtype: SubtypeAssessment =
            serde_json::from_value(json!({"classification": "IBS-X"})).unwrap();
        assert_eq!(subtype.classification, IbsSubtype::Undetermined);
    }

    #[test]
    fn serializes_with_contract_names() {
        let json = serde_json::to_value(IbsAssessment::default()).unwrap();
        assert_eq!(json["clinicalAssessment"]["romeIVCriteriaMet"], false);
        assert!(json["clinicalAssessment"]["ibsSSS"]["totalScore"]["value"].is_null());
        assert_eq!(
            json["clinicalAssessment"]["ibsSubtype"]["classification"],
            "Undetermined"
        );
    }
}
