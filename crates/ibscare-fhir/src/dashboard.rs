//! Concurrent loading of the clinician dashboard.
//!
//! Each panel is fetched independently; a failing panel is reported in its
//! own [`ResourceState`] and never cancels the others.

use std::collections::HashMap;

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

use crate::client::FhirClient;
use crate::error::{FhirClientError, FhirResult};
use crate::model::{
    ClinicalImpressionSummary, ConditionSummary, DiagnosticReportSummary, ObservationSummary,
    PatientSummary, QuestionnaireResponseSummary, bundle_resources, missing_question_text,
    parse_clinical_impression, parse_condition, parse_diagnostic_report, parse_observation,
    parse_patient, parse_questionnaire_response,
};
use crate::scoring::ProcessedFhirData;

/// Outcome of loading one dashboard panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "data", rename_all = "snake_case")]
pub enum ResourceState<T> {
    Loaded(T),
    Failed { message: String },
}

impl<T> ResourceState<T> {
    pub fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded(_))
    }

    pub fn loaded(&self) -> Option<&T> {
        match self {
            Self::Loaded(value) => Some(value),
            Self::Failed { .. } => None,
        }
    }

    fn from_result(panel: &'static str, result: FhirResult<T>) -> Self {
        match result {
            Ok(value) => Self::Loaded(value),
            Err(err) => {
                tracing::warn!(panel, error = %err, "Failed to load dashboard panel");
                Self::Failed {
                    message: format!("Failed to load {panel}: {}", err.user_message()),
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub patient_id: String,
    pub patient: ResourceState<PatientSummary>,
    pub conditions: ResourceState<Vec<ConditionSummary>>,
    pub observations: ResourceState<Vec<ObservationSummary>>,
    pub clinical_impressions: ResourceState<Vec<ClinicalImpressionSummary>>,
    pub diagnostic_reports: ResourceState<Vec<DiagnosticReportSummary>>,
    pub questionnaire_responses: ResourceState<Vec<QuestionnaireResponseSummary>>,
}

/// Loads every dashboard panel for `patient_id` concurrently.
pub async fn load_dashboard(
    client: &FhirClient,
    access_token: &str,
    patient_id: &str,
) -> Dashboard {
    let (patient, conditions, observations, impressions, reports, responses) = tokio::join!(
        fetch_patient(client, access_token, patient_id),
        fetch_conditions(client, access_token, patient_id),
        fetch_observations(client, access_token, patient_id),
        fetch_clinical_impressions(client, access_token, patient_id),
        fetch_diagnostic_reports(client, access_token, patient_id),
        fetch_questionnaire_responses(client, access_token, patient_id),
    );

    Dashboard {
        patient_id: patient_id.to_string(),
        patient: ResourceState::from_result("patient", patient),
        conditions: ResourceState::from_result("conditions", conditions),
        observations: ResourceState::from_result("observations", observations),
        clinical_impressions: ResourceState::from_result("clinical impressions", impressions),
        diagnostic_reports: ResourceState::from_result("diagnostic reports", reports),
        questionnaire_responses: ResourceState::from_result("questionnaire responses", responses),
    }
}

/// Loads the patient, conditions and observations and builds the scoring
/// digest. Fails if any of the three fails.
pub async fn load_processed_data(
    client: &FhirClient,
    access_token: &str,
    patient_id: &str,
) -> FhirResult<ProcessedFhirData> {
    let (patient, conditions, observations) = tokio::try_join!(
        fetch_patient(client, access_token, patient_id),
        fetch_conditions(client, access_token, patient_id),
        fetch_observations(client, access_token, patient_id),
    )?;
    Ok(ProcessedFhirData::from_summaries(
        &patient,
        &conditions,
        &observations,
        OffsetDateTime::now_utc().date(),
    ))
}

pub async fn fetch_patient(
    client: &FhirClient,
    access_token: &str,
    patient_id: &str,
) -> FhirResult<PatientSummary> {
    let resource = client.read(access_token, "Patient", patient_id).await?;
    Ok(parse_patient(&resource))
}

pub async fn fetch_conditions(
    client: &FhirClient,
    access_token: &str,
    patient_id: &str,
) -> FhirResult<Vec<ConditionSummary>> {
    search_parsed(
        client,
        access_token,
        "Condition",
        &[("patient", patient_id), ("_count", "100")],
        parse_condition,
    )
    .await
}

pub async fn fetch_observations(
    client: &FhirClient,
    access_token: &str,
    patient_id: &str,
) -> FhirResult<Vec<ObservationSummary>> {
    search_parsed(
        client,
        access_token,
        "Observation",
        &[("patient", patient_id)],
        parse_observation,
    )
    .await
}

pub async fn fetch_clinical_impressions(
    client: &FhirClient,
    access_token: &str,
    patient_id: &str,
) -> FhirResult<Vec<ClinicalImpressionSummary>> {
    search_parsed(
        client,
        access_token,
        "ClinicalImpression",
        &[("patient", patient_id), ("_count", "500")],
        parse_clinical_impression,
    )
    .await
}

pub async fn fetch_diagnostic_reports(
    client: &FhirClient,
    access_token: &str,
    patient_id: &str,
) -> FhirResult<Vec<DiagnosticReportSummary>> {
    search_parsed(
        client,
        access_token,
        "DiagnosticReport",
        &[("patient", patient_id), ("_count", "500")],
        parse_diagnostic_report,
    )
    .await
}

/// Questionnaire responses, with question text filled in from the referenced
/// Questionnaire when items carry none. A Questionnaire that cannot be read is
/// skipped.
pub async fn fetch_questionnaire_responses(
    client: &FhirClient,
    access_token: &str,
    patient_id: &str,
) -> FhirResult<Vec<QuestionnaireResponseSummary>> {
    let bundle = client
        .search(access_token, "QuestionnaireResponse", &[("patient", patient_id)])
        .await?;
    let responses: Vec<&Value> = bundle_resources(&bundle, "QuestionnaireResponse").collect();

    let mut references: Vec<&str> = responses
        .iter()
        .filter(|qr| missing_question_text(qr))
        .filter_map(|qr| qr.get("questionnaire").and_then(Value::as_str))
        .collect();
    references.sort_unstable();
    references.dedup();

    let fetched = join_all(
        references
            .iter()
            .map(|reference| resolve_questionnaire(client, access_token, reference)),
    )
    .await;
    let questionnaires: HashMap<&str, Value> = references
        .into_iter()
        .zip(fetched)
        .filter_map(|(reference, questionnaire)| questionnaire.map(|q| (reference, q)))
        .collect();

    Ok(responses
        .into_iter()
        .map(|qr| {
            let questionnaire = qr
                .get("questionnaire")
                .and_then(Value::as_str)
                .and_then(|reference| questionnaires.get(reference));
            parse_questionnaire_response(qr, questionnaire)
        })
        .collect())
}

/// Reads a Questionnaire by literal reference, or by canonical URL search.
async fn resolve_questionnaire(
    client: &FhirClient,
    access_token: &str,
    reference: &str,
) -> Option<Value> {
    let canonical = reference.split('|').next().unwrap_or(reference);
    let result = match client.resolve(canonical) {
        Ok(_) => client.fetch_resource(access_token, canonical).await,
        Err(_) => client
            .search(access_token, "Questionnaire", &[("url", canonical)])
            .await
            .and_then(|bundle| {
                bundle_resources(&bundle, "Questionnaire")
                    .next()
                    .cloned()
                    .ok_or_else(|| FhirClientError::http(404, "Questionnaire not found"))
            }),
    };
    match result {
        Ok(questionnaire) => Some(questionnaire),
        Err(err) => {
            tracing::warn!(error = %err, "Questionnaire unavailable, question text not resolved");
            None
        }
    }
}

async fn search_parsed<T>(
    client: &FhirClient,
    access_token: &str,
    resource_type: &str,
    params: &[(&str, &str)],
    parse: fn(&Value) -> T,
) -> FhirResult<Vec<T>> {
    let bundle = client.search(access_token, resource_type, params).await?;
    Ok(bundle_resources(&bundle, resource_type).map(parse).collect())
}
