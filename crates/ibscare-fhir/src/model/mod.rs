//! View-models built from raw FHIR JSON.
//!
//! Parsers are pure functions over [`serde_json::Value`]. Missing or blank
//! fields fall back to the display defaults the dashboard shows.

mod clinical_impression;
mod condition;
mod diagnostic_report;
mod observation;
mod patient;
mod questionnaire_response;

pub use clinical_impression::{ClinicalImpressionSummary, parse_clinical_impression};
pub use condition::{ConditionSummary, parse_condition};
pub use diagnostic_report::{DiagnosticReportSummary, parse_diagnostic_report};
pub use observation::{ObservationSummary, parse_observation};
pub use patient::{PatientSummary, parse_patient};
pub use questionnaire_response::{
    ParsedQuestion, QuestionnaireResponseSummary, find_question_text, missing_question_text,
    parse_question_items, parse_questionnaire_response,
};

use serde_json::Value;

/// Resources of `resource_type` in a search `Bundle`, in entry order.
///
/// Entries of other types (for example an `OperationOutcome` with
/// `search.mode = outcome`) are skipped.
pub fn bundle_resources<'a>(
    bundle: &'a Value,
    resource_type: &'a str,
) -> impl Iterator<Item = &'a Value> + 'a {
    bundle
        .get("entry")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|entry| entry.get("resource"))
        .filter(move |resource| {
            resource.get("resourceType").and_then(Value::as_str) == Some(resource_type)
        })
}

/// Non-blank string at a JSON pointer.
pub(crate) fn text<'a>(value: &'a Value, pointer: &str) -> Option<&'a str> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

pub(crate) fn text_or(value: &Value, pointer: &str, default: &str) -> String {
    text(value, pointer).unwrap_or(default).to_string()
}

pub(crate) fn resource_id(resource: &Value) -> String {
    text_or(resource, "/id", "unknown")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bundle_resources_filters_by_type() {
        let bundle = json!({
            "resourceType": "Bundle",
            "entry": [
                {"resource": {"resourceType": "Condition", "id": "c1"}},
                {"resource": {"resourceType": "OperationOutcome"}, "search": {"mode": "outcome"}},
                {"fullUrl": "urn:uuid:x"},
                {"resource": {"resourceType": "Condition", "id": "c2"}}
            ]
        });
        let ids: Vec<&str> = bundle_resources(&bundle, "Condition")
            .filter_map(|r| r["id"].as_str())
            .collect();
        assert_eq!(ids, ["c1", "c2"]);
    }

    #[test]
    fn bundle_without_entries_is_empty() {
        let bundle = json!({"resourceType": "Bundle", "total": 0});
        assert_eq!(bundle_resources(&bundle, "Observation").count(), 0);
    }

    #[test]
    fn text_ignores_blank_strings() {
        let value = json!({"a": "  ", "b": "x", "c": 3});
        assert_eq!(text(&value, "/a"), None);
        assert_eq!(text(&value, "/b"), Some("x"));
        assert_eq!(text(&value, "/c"), None);
    }
}
