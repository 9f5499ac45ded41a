use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{resource_id, text, text_or};

/// Patient card contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientSummary {
    pub id: String,
    pub full_name: String,
    pub gender: String,
    pub birth_date: String,
    pub address: String,
    pub contact: String,
}

pub fn parse_patient(resource: &Value) -> PatientSummary {
    PatientSummary {
        id: resource_id(resource),
        full_name: full_name(resource),
        gender: text_or(resource, "/gender", "N/A"),
        birth_date: text_or(resource, "/birthDate", "N/A"),
        address: address(resource),
        contact: contact(resource),
    }
}

fn full_name(resource: &Value) -> String {
    let Some(name) = resource.pointer("/name/0") else {
        return "Unknown".to_string();
    };
    let given = joined_strings(name.get("given"), " ");
    let family = text(name, "/family").unwrap_or_default();
    let full = format!("{given} {family}");
    let full = full.trim();
    if full.is_empty() {
        "Unknown".to_string()
    } else {
        full.to_string()
    }
}

fn address(resource: &Value) -> String {
    let Some(address) = resource.pointer("/address/0") else {
        return "N/A".to_string();
    };
    let lines = joined_strings(address.get("line"), ", ");
    let parts: Vec<&str> = std::iter::once(lines.as_str())
        .chain(
            ["/city", "/state", "/postalCode", "/country"]
                .into_iter()
                .map(|p| text(address, p).unwrap_or_default()),
        )
        .filter(|part| !part.is_empty())
        .collect();
    if parts.is_empty() {
        "N/A".to_string()
    } else {
        parts.join(", ")
    }
}

fn contact(resource: &Value) -> String {
    resource
        .get("telecom")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .find(|t| matches!(t.get("system").and_then(Value::as_str), Some("phone" | "email")))
        .and_then(|t| text(t, "/value"))
        .unwrap_or("N/A")
        .to_string()
}

fn joined_strings(values: Option<&Value>, separator: &str) -> String {
    values
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .collect::<Vec<_>>()
        .join(separator)
}
