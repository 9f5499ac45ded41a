use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{resource_id, text, text_or};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservationSummary {
    pub id: String,
    /// Human-readable observation name.
    pub code: String,
    pub value: String,
    pub effective_date_time: String,
}

pub fn parse_observation(resource: &Value) -> ObservationSummary {
    ObservationSummary {
        id: resource_id(resource),
        code: text(resource, "/code/coding/0/display")
            .or_else(|| text(resource, "/code/text"))
            .unwrap_or("Unknown Observation")
            .to_string(),
        value: observation_value(resource),
        effective_date_time: text_or(resource, "/effectiveDateTime", "Unknown DateTime"),
    }
}

fn observation_value(resource: &Value) -> String {
    if let Some(quantity) = resource.get("valueQuantity").filter(|q| q.is_object()) {
        let value = match quantity.get("value") {
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::String(s)) => s.clone(),
            _ => String::new(),
        };
        let unit = text(quantity, "/unit").unwrap_or_default();
        return format!("{value} {unit}").trim().to_string();
    }
    text(resource, "/valueString").unwrap_or("No value").to_string()
}
