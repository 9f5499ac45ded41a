//! Static questionnaire definitions.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

use crate::error::QuestionnaireError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QuestionnaireKind {
    RomeIv,
    QualityOfLife,
}

impl QuestionnaireKind {
    pub const ALL: [Self; 2] = [Self::RomeIv, Self::QualityOfLife];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RomeIv => "rome-iv",
            Self::QualityOfLife => "quality-of-life",
        }
    }

    #[must_use]
    pub fn definition(&self) -> &'static QuestionnaireDefinition {
        match self {
            Self::RomeIv => &ROME_IV,
            Self::QualityOfLife => &QUALITY_OF_LIFE,
        }
    }
}

impl fmt::Display for QuestionnaireKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuestionnaireKind {
    type Err = QuestionnaireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| QuestionnaireError::UnknownQuestionnaire(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionOption {
    /// Stored answer value.
    pub value: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub text: String,
    pub options: Vec<QuestionOption>,
}

impl Question {
    #[must_use]
    pub fn option(&self, value: &str) -> Option<&QuestionOption> {
        self.options.iter().find(|o| o.value == value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub title: String,
    pub questions: Vec<Question>,
}

impl Section {
    /// Stable identifier derived from the title (`"Bowel Habits"` -> `"bowel-habits"`).
    #[must_use]
    pub fn link_id(&self) -> String {
        self.title
            .split_whitespace()
            .map(str::to_lowercase)
            .collect::<Vec<_>>()
            .join("-")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionnaireDefinition {
    pub kind: QuestionnaireKind,
    pub title: String,
    pub sections: Vec<Section>,
}

impl QuestionnaireDefinition {
    #[must_use]
    pub fn total_questions(&self) -> usize {
        self.sections.iter().map(|s| s.questions.len()).sum()
    }

    #[must_use]
    pub fn question_at(&self, section: usize, question: usize) -> Option<&Question> {
        self.sections.get(section)?.questions.get(question)
    }

    /// Locates a question by id as `(section, position, question)`.
    #[must_use]
    pub fn find(&self, question_id: &str) -> Option<(usize, usize, &Question)> {
        self.sections.iter().enumerate().find_map(|(s, section)| {
            section
                .questions
                .iter()
                .position(|q| q.id == question_id)
                .map(|q| (s, q, &section.questions[q]))
        })
    }

    /// 1-based ordinal of the question at `(section, question)` across all sections.
    #[must_use]
    pub fn ordinal(&self, section: usize, question: usize) -> usize {
        self.sections
            .iter()
            .take(section)
            .map(|s| s.questions.len())
            .sum::<usize>()
            + question
            + 1
    }

    /// Every question in definition order.
    pub fn questions(&self) -> impl Iterator<Item = &Question> {
        self.sections.iter().flat_map(|s| s.questions.iter())
    }
}

fn choices(values: &[&str]) -> Vec<QuestionOption> {
    values
        .iter()
        .map(|v| QuestionOption {
            value: (*v).to_string(),
            label: (*v).to_string(),
            description: None,
            image: None,
        })
        .collect()
}

fn question(id: &str, text: &str, options: Vec<QuestionOption>) -> Question {
    Question {
        id: id.to_string(),
        text: text.to_string(),
        options,
    }
}

fn section(title: &str, questions: Vec<Question>) -> Section {
    Section {
        title: title.to_string(),
        questions,
    }
}

const BRISTOL_IMAGE_BASE: &str = "https://cdn.prod.website-files.com/621e95f9ac30687a56e4297e";

const BRISTOL_SCALE: [(&str, &str, &str); 7] = [
    (
        "Type 1 (Separate hard lumps)",
        "Hard nuts, difficult to pass",
        "63efa671c11ddb1f5160c578_stool-bristol-scale-type-1.png",
    ),
    (
        "Type 2 (Lumpy, sausage-like)",
        "Lumpy and sausage-shaped",
        "63efae28ea77d36c7988a79b_stool-bristol-scale-type-2.png",
    ),
    (
        "Type 3 (Sausage shape with cracks)",
        "Sausage-shaped with surface cracks",
        "63efa672d1220e120c016147_stool-bristol-scale-type-7.png",
    ),
    (
        "Type 4 (Smooth, soft sausage or snake)",
        "Smooth and soft, snake-like",
        "63efa6733dcbda67f2ff9c44_stool-bristol-scale-type-8.png",
    ),
    (
        "Type 5 (Soft blobs with clear-cut edges)",
        "Soft blobs with clear-cut edges",
        "63efa673fe9098f33d06faa7_stool-bristol-scale-type-9.png",
    ),
    (
        "Type 6 (Mushy consistency, ragged edges)",
        "Mushy stool with ragged edges",
        "63efa6741d56c73c5679a28c_stool-bristol-scale-type-10.png",
    ),
    (
        "Type 7 (Watery, no solid pieces)",
        "Entirely liquid, no solid pieces",
        "63efa6750d9348329c595801_stool-bristol-scale-type-11.png",
    ),
];

fn bristol_options() -> Vec<QuestionOption> {
    BRISTOL_SCALE
        .iter()
        .map(|(value, description, image)| QuestionOption {
            value: (*value).to_string(),
            label: (*value).to_string(),
            description: Some((*description).to_string()),
            image: Some(format!("{BRISTOL_IMAGE_BASE}/{image}")),
        })
        .collect()
}

const NEVER_OCCASIONALLY_OFTEN: [&str; 3] = ["Never", "Occasionally", "Often"];
const NEVER_OCCASIONALLY_REGULARLY: [&str; 3] = ["Never", "Occasionally", "Regularly"];

static ROME_IV: LazyLock<QuestionnaireDefinition> = LazyLock::new(|| QuestionnaireDefinition {
    kind: QuestionnaireKind::RomeIv,
    title: "Rome IV Diagnostic Questionnaire".to_string(),
    sections: vec![
        section(
            "Abdominal Symptoms",
            vec![
                question(
                    "pain_frequency",
                    "How often have you experienced abdominal pain in the last 3 months?",
                    choices(&[
                        "Less than one day per week",
                        "1-2 days per week",
                        "3-4 days per week",
                        "Most days",
                        "Every day",
                    ]),
                ),
                question(
                    "pain_severity",
                    "How would you rate the severity of your abdominal pain?",
                    choices(&["Mild", "Moderate", "Severe", "Very severe"]),
                ),
                question(
                    "pain_defecation_relation",
                    "Does your abdominal pain improve or worsen with defecation?",
                    choices(&[
                        "It improves with defecation",
                        "It worsens with defecation",
                        "No noticeable change",
                    ]),
                ),
                question(
                    "pain_onset_duration",
                    "How long have you been experiencing these abdominal symptoms?",
                    choices(&["Less than 3 months", "3-6 months", "More than 6 months"]),
                ),
            ],
        ),
        section(
            "Bowel Habits",
            vec![
                question(
                    "stool_frequency",
                    "On average, how often do you have a bowel movement?",
                    choices(&[
                        "Less than 3 times per week",
                        "3 times per week to once per day",
                        "1-2 times per day",
                        "3-5 times per day",
                        "More than 5 times per day",
                    ]),
                ),
                question(
                    "stool_form",
                    "Which Bristol Stool Form Scale category best describes your most common stool type?",
                    bristol_options(),
                ),
                question(
                    "stool_change_in_frequency",
                    "Have you noticed a change in how frequently you have bowel movements since your symptoms began?",
                    choices(&[
                        "Yes, I go less often now",
                        "Yes, I go more often now",
                        "No significant change",
                    ]),
                ),
                question(
                    "stool_change_in_form",
                    "Have you noticed a change in stool form or appearance since your symptoms began?",
                    choices(&[
                        "Yes, more on the harder side",
                        "Yes, more on the looser/watery side",
                        "No significant change",
                    ]),
                ),
            ],
        ),
        section(
            "Additional GI Symptoms",
            vec![
                question(
                    "bloating",
                    "How often do you experience bloating or abdominal distension?",
                    choices(&["Rarely", "Sometimes", "Most days", "Every day"]),
                ),
                question(
                    "mucus_in_stool",
                    "Do you notice mucus in your stool?",
                    choices(&NEVER_OCCASIONALLY_OFTEN),
                ),
                question(
                    "urgency",
                    "Do you feel an urgent need to have a bowel movement?",
                    choices(&NEVER_OCCASIONALLY_OFTEN),
                ),
            ],
        ),
        section(
            "Red Flag Symptoms",
            vec![
                question(
                    "blood_in_stool",
                    "Have you noticed any blood in your stool?",
                    choices(&NEVER_OCCASIONALLY_REGULARLY),
                ),
                question(
                    "nocturnal_diarrhea",
                    "Do you experience diarrhea that wakes you up at night?",
                    choices(&NEVER_OCCASIONALLY_REGULARLY),
                ),
                question(
                    "significant_weight_loss",
                    "Have you experienced any significant or unexplained weight loss recently?",
                    choices(&["No", "Yes"]),
                ),
                question(
                    "family_history_gi",
                    "Do you have a family history of serious gastrointestinal conditions (e.g., inflammatory bowel disease, colorectal cancer)?",
                    choices(&["No", "Yes", "Not sure"]),
                ),
            ],
        ),
    ],
});

/// Five-point rating shared by every quality-of-life question.
fn rating_scale() -> Vec<QuestionOption> {
    ["Not at all", "Slightly", "Moderately", "Quite a bit", "Extremely"]
        .iter()
        .enumerate()
        .map(|(i, label)| QuestionOption {
            value: (i + 1).to_string(),
            label: (*label).to_string(),
            description: None,
            image: None,
        })
        .collect()
}

fn rated(id: &str, text: &str) -> Question {
    question(id, text, rating_scale())
}

static QUALITY_OF_LIFE: LazyLock<QuestionnaireDefinition> =
    LazyLock::new(|| QuestionnaireDefinition {
        kind: QuestionnaireKind::QualityOfLife,
        title: "IBS Quality of Life Questionnaire".to_string(),
        sections: vec![
            section(
                "Physical Functioning & Symptom Burden",
                vec![
                    rated(
                        "abdominal_pain_impact",
                        "How often do you experience abdominal pain or discomfort that affects your daily activities?",
                    ),
                    rated(
                        "bloating_interference",
                        "How much do bloating and gas interfere with your ability to work or socialize?",
                    ),
                    rated(
                        "energy_levels",
                        "How often do you feel exhausted or low in energy due to IBS?",
                    ),
                    rated(
                        "plan_changes",
                        "How frequently do you need to change your daily plans because of IBS symptoms?",
                    ),
                ],
            ),
            section(
                "Emotional & Psychological Impact",
                vec![
                    rated(
                        "anxiety_stress",
                        "How much does IBS make you feel anxious or stressed?",
                    ),
                    rated(
                        "frustration",
                        "How often do you feel frustrated or helpless about managing IBS?",
                    ),
                    rated(
                        "confidence_impact",
                        "Do you feel that IBS affects your confidence or self-esteem in social settings?",
                    ),
                ],
            ),
            section(
                "Dietary & Lifestyle Adjustments",
                vec![
                    rated(
                        "food_avoidance",
                        "How often do you avoid certain foods because they trigger IBS symptoms?",
                    ),
                    rated(
                        "eating_out_worry",
                        "How much do you worry about eating out or social gatherings because of IBS?",
                    ),
                    rated(
                        "stress_symptom_link",
                        "Have you noticed that stress or anxiety worsens your symptoms?",
                    ),
                ],
            ),
            section(
                "Social & Work-Life Impact",
                vec![
                    rated(
                        "concentration_impact",
                        "How much does IBS interfere with your ability to concentrate at work or school?",
                    ),
                    rated(
                        "relationship_impact",
                        "Do you feel that IBS affects your relationships with family and friends?",
                    ),
                    rated(
                        "missed_work",
                        "How often do you have to miss work or cancel plans due to IBS symptoms?",
                    ),
                ],
            ),
            section(
                "Sleep & Mental Health",
                vec![
                    rated(
                        "sleep_trouble",
                        "How often do you have trouble falling or staying asleep due to IBS discomfort?",
                    ),
                    rated(
                        "irritability",
                        "How much do IBS symptoms make you feel irritable or moody?",
                    ),
                    rated(
                        "life_enjoyment",
                        "Do you feel that IBS limits your ability to enjoy life?",
                    ),
                ],
            ),
        ],
    });

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn rome_iv_shape() {
        let rome = QuestionnaireKind::RomeIv.definition();
        assert_eq!(rome.sections.len(), 4);
        assert_eq!(rome.total_questions(), 15);
        let stool_form = rome.find("stool_form").unwrap().2;
        assert_eq!(stool_form.options.len(), 7);
        assert!(stool_form.options.iter().all(|o| o.description.is_some()));
        assert!(
            stool_form.options[0]
                .image
                .as_deref()
                .unwrap()
                .ends_with("stool-bristol-scale-type-1.png")
        );
    }

    #[test]
    fn quality_of_life_shape() {
        let qol = QuestionnaireKind::QualityOfLife.definition();
        assert_eq!(qol.sections.len(), 5);
        assert_eq!(qol.total_questions(), 16);
        for q in qol.questions() {
            let values: Vec<&str> = q.options.iter().map(|o| o.value.as_str()).collect();
            assert_eq!(values, ["1", "2", "3", "4", "5"]);
        }
        assert_eq!(
            qol.find("missed_work").unwrap().2.option("4").unwrap().label,
            "Quite a bit"
        );
    }

    #[test]
    fn question_ids_are_unique() {
        for kind in QuestionnaireKind::ALL {
            let definition = kind.definition();
            let ids: HashSet<&str> = definition.questions().map(|q| q.id.as_str()).collect();
            assert_eq!(ids.len(), definition.total_questions(), "{kind}");
        }
    }

    #[test]
    fn find_and_ordinal() {
        let rome = QuestionnaireKind::RomeIv.definition();
        let (section, position, _) = rome.find("urgency").unwrap();
        assert_eq!((section, position), (2, 2));
        assert_eq!(rome.ordinal(section, position), 11);
        assert_eq!(rome.ordinal(0, 0), 1);
        assert!(rome.find("nope").is_none());
    }

    #[test]
    fn section_link_ids() {
        let rome = QuestionnaireKind::RomeIv.definition();
        let ids: Vec<String> = rome.sections.iter().map(Section::link_id).collect();
        assert_eq!(
            ids,
            [
                "abdominal-symptoms",
                "bowel-habits",
                "additional-gi-symptoms",
                "red-flag-symptoms"
            ]
        );
    }

    #[test]
    fn kind_parsing() {
        assert_eq!(
            "quality-of-life".parse::<QuestionnaireKind>().unwrap(),
            QuestionnaireKind::QualityOfLife
        );
        assert_eq!(
            "rome".parse::<QuestionnaireKind>().unwrap_err(),
            QuestionnaireError::UnknownQuestionnaire("rome".into())
        );
        assert_eq!(
            serde_json::to_string(&QuestionnaireKind::RomeIv).unwrap(),
            "\"rome-iv\""
        );
    }
}
