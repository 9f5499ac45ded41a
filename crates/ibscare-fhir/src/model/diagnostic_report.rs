use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{resource_id, text, text_or};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticReportSummary {
    pub id: String,
    pub report_name: String,
    pub status: String,
    pub effective_date_time: String,
    pub issued: String,
    pub conclusion: String,
}

pub fn parse_diagnostic_report(resource: &Value) -> DiagnosticReportSummary {
    DiagnosticReportSummary {
        id: resource_id(resource),
        report_name: text(resource, "/code/coding/0/display")
            .or_else(|| text(resource, "/code/coding/0/code"))
            .unwrap_or("Unknown Diagnostic Report")
            .to_string(),
        status: text_or(resource, "/status", "unknown"),
        effective_date_time: text_or(resource, "/effectiveDateTime", "N/A"),
        issued: text_or(resource, "/issued", "N/A"),
        conclusion: text_or(resource, "/conclusion", "N/A"),
    }
}
