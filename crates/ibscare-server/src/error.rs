//! HTTP error responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use ibscare_auth::session::SessionError;
use ibscare_auth::{AuthFlowError, ErrorKind};
use ibscare_fhir::{FhirClientError, ScoringError};
use ibscare_questionnaire::QuestionnaireError;
use serde_json::json;

/// Errors returned by route handlers, rendered as `{error, message}` JSON.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The tab has no established session, or no patient in context.
    #[error("Authentication required")]
    Unauthenticated,

    #[error(transparent)]
    Auth(#[from] AuthFlowError),

    #[error(transparent)]
    Fhir(#[from] FhirClientError),

    #[error(transparent)]
    Scoring(#[from] ScoringError),

    #[error(transparent)]
    Questionnaire(#[from] QuestionnaireError),

    #[error(transparent)]
    Session(#[from] SessionError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Auth(err) => match err.kind() {
                ErrorKind::MissingLaunchContext => StatusCode::BAD_REQUEST,
                ErrorKind::MissingAuthorizationCode
                | ErrorKind::SecurityValidationFailed
                | ErrorKind::ProviderError => StatusCode::UNAUTHORIZED,
                ErrorKind::NoPatientContext => StatusCode::CONFLICT,
                ErrorKind::NetworkError => StatusCode::BAD_GATEWAY,
                ErrorKind::Configuration | ErrorKind::SessionStorage => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            Self::Fhir(err) => match err.status() {
                // An expired or revoked token: the tab must sign in again.
                Some(401) => StatusCode::UNAUTHORIZED,
                Some(403) => StatusCode::FORBIDDEN,
                Some(404) => StatusCode::NOT_FOUND,
                _ => StatusCode::BAD_GATEWAY,
            },
            Self::Scoring(ScoringError::NotConfigured { .. }) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Scoring(_) => StatusCode::BAD_GATEWAY,
            Self::Questionnaire(QuestionnaireError::UnknownQuestionnaire(_)) => {
                StatusCode::NOT_FOUND
            }
            Self::Questionnaire(err) if err.is_invalid_input() => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Questionnaire(QuestionnaireError::Payload(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Questionnaire(_) => StatusCode::CONFLICT,
            Self::Session(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code for the `error` field.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::Auth(err) => err.kind().as_str(),
            Self::Fhir(_) => "fhir_error",
            Self::Scoring(ScoringError::NotConfigured { .. }) => "scoring_not_configured",
            Self::Scoring(_) => "scoring_error",
            Self::Questionnaire(QuestionnaireError::UnknownQuestionnaire(_)) => {
                "unknown_questionnaire"
            }
            Self::Questionnaire(err) if err.is_invalid_input() => "invalid_answer",
            Self::Questionnaire(_) => "questionnaire_state",
            Self::Session(_) => "session_storage_error",
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::Unauthenticated => {
                "No active session. Please launch the app from your EHR.".to_string()
            }
            Self::Auth(err) => err.user_message().to_string(),
            Self::Fhir(err) => err.user_message(),
            Self::Scoring(err) => err.user_message().to_string(),
            Self::Questionnaire(err) => err.user_message().to_string(),
            Self::Session(_) => "Your session could not be read. Please try again.".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, code = self.code(), "request failed");
        } else {
            tracing::debug!(error = %self, code = self.code(), "request rejected");
        }
        let body = json!({
            "error": self.code(),
            "message": self.message(),
        });
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
