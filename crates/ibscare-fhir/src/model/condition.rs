use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{resource_id, text, text_or};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionSummary {
    pub id: String,
    /// Display text of the first coding.
    pub display: String,
    /// Code of the first coding, when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub recorded_date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub onset: Option<String>,
    pub clinical_status: String,
    pub verification_status: String,
}

pub fn parse_condition(resource: &Value) -> ConditionSummary {
    ConditionSummary {
        id: resource_id(resource),
        display: text_or(resource, "/code/coding/0/display", "Unknown Condition"),
        code: text(resource, "/code/coding/0/code").map(str::to_string),
        recorded_date: text_or(resource, "/recordedDate", "Unknown Date"),
        onset: text(resource, "/onsetDateTime")
            .or_else(|| text(resource, "/onsetPeriod/start"))
            .or_else(|| text(resource, "/onsetString"))
            .map(str::to_string),
        clinical_status: text_or(resource, "/clinicalStatus/coding/0/code", "Unknown Status"),
        verification_status: text_or(
            resource,
            "/verificationStatus/coding/0/code",
            "Not Verified",
        ),
    }
}
