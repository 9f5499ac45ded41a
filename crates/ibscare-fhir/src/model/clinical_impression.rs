use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{resource_id, text, text_or};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClinicalImpressionSummary {
    pub id: String,
    pub status: String,
    pub description: String,
    pub date: String,
    pub effective_date_time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encounter_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assessor_ref: Option<String>,
    pub findings: Vec<String>,
}

pub fn parse_clinical_impression(resource: &Value) -> ClinicalImpressionSummary {
    let findings = resource
        .get("finding")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .map(finding_text)
        .collect();

    ClinicalImpressionSummary {
        id: resource_id(resource),
        status: text_or(resource, "/status", "unknown"),
        description: text_or(resource, "/description", "No description provided"),
        date: text_or(resource, "/date", "N/A"),
        effective_date_time: text_or(resource, "/effectiveDateTime", "N/A"),
        encounter_ref: text(resource, "/encounter/reference").map(str::to_string),
        assessor_ref: text(resource, "/assessor/reference").map(str::to_string),
        findings,
    }
}

fn finding_text(finding: &Value) -> String {
    text(finding, "/itemCodeableConcept/coding/0/display")
        .or_else(|| text(finding, "/itemCodeableConcept/text"))
        .or_else(|| text(finding, "/itemReference/reference"))
        .or_else(|| text(finding, "/basis"))
        .unwrap_or("Unknown finding")
        .to_string()
}
