//! Client for the IBS analysis and quality-of-life prediction backend.

mod assessment;
mod processed;

pub use assessment::{
    BristolStoolScale, ClinicalAssessment, ClinicalRecommendations, IbsAssessment, IbsSubtype,
    MissingInformation, ReliabilityAssessment, ScoreComponent, SeverityScoringSystem,
    SubtypeAssessment, TotalScore,
};
pub use processed::{
    ProcessedFhirData, ProcessedPatient, RelevantCondition, RelevantObservation, compute_age,
};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use crate::config::ScoringSettings;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScoringError {
    #[error("Scoring endpoint '{endpoint}' is not configured")]
    NotConfigured { endpoint: &'static str },

    #[error("Invalid scoring URL: {0}")]
    InvalidUrl(String),

    #[error("Scoring backend returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Scoring request failed: {0}")]
    Transport(String),

    #[error("Failed to decode scoring response: {0}")]
    Decode(String),
}

impl ScoringError {
    /// Message suitable for showing to the clinician.
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::NotConfigured { .. } | Self::InvalidUrl(_) => {
                "The assessment service is not configured."
            }
            Self::Http { .. } | Self::Transport(_) => {
                "The assessment service is unavailable. Please try again."
            }
            Self::Decode(_) => "The assessment service returned an unreadable result.",
        }
    }

    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http { status, .. } => *status == 429 || *status >= 500,
            Self::Transport(_) => true,
            _ => false,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PredictionRequest<'a, A: Serialize> {
    fhir_data: &'a ProcessedFhirData,
    qol_responses: &'a A,
}

#[derive(Debug, Clone)]
pub struct ScoringClient {
    http: reqwest::Client,
    analysis_url: Option<Url>,
    prediction_url: Option<Url>,
}

impl ScoringClient {
    pub fn new(settings: &ScoringSettings) -> Result<Self, ScoringError> {
        let http = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| ScoringError::Transport(e.to_string()))?;
        Self::with_client(
            http,
            settings.analysis_url.as_deref(),
            settings.prediction_url.as_deref(),
        )
    }

    pub fn with_client(
        http: reqwest::Client,
        analysis_url: Option<&str>,
        prediction_url: Option<&str>,
    ) -> Result<Self, ScoringError> {
        Ok(Self {
            http,
            analysis_url: analysis_url.map(parse_url).transpose()?,
            prediction_url: prediction_url.map(parse_url).transpose()?,
        })
    }

    /// Posts the patient digest to the analysis endpoint.
    pub async fn assess(&self, data: &ProcessedFhirData) -> Result<IbsAssessment, ScoringError> {
        let url = self
            .analysis_url
            .as_ref()
            .ok_or(ScoringError::NotConfigured {
                endpoint: "analysis",
            })?;
        self.post(url, data).await
    }

    /// Posts `{fhirData, qolResponses}` to the prediction endpoint.
    pub async fn predict_quality_of_life<A: Serialize>(
        &self,
        data: &ProcessedFhirData,
        answers: &A,
    ) -> Result<Value, ScoringError> {
        let url = self
            .prediction_url
            .as_ref()
            .ok_or(ScoringError::NotConfigured {
                endpoint: "prediction",
            })?;
        let request = PredictionRequest {
            fhir_data: data,
            qol_responses: answers,
        };
        self.post(url, &request).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        url: &Url,
        body: &B,
    ) -> Result<T, ScoringError> {
        tracing::debug!(path = %url.path(), "Scoring request");
        let response = self
            .http
            .post(url.clone())
            .json(body)
            .send()
            .await
            .map_err(|e| ScoringError::Transport(e.without_url().to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ScoringError::Transport(e.without_url().to_string()))?;
        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "Scoring backend returned an error");
            return Err(ScoringError::Http {
                status: status.as_u16(),
                body: text,
            });
        }
        serde_json::from_str(&text).map_err(|e| ScoringError::Decode(e.to_string()))
    }
}

fn parse_url(raw: &str) -> Result<Url, ScoringError> {
    Url::parse(raw).map_err(|e| ScoringError::InvalidUrl(format!("{raw}: {e}")))
}
