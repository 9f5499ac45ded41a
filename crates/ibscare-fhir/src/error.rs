//! Errors returned by [`FhirClient`](crate::FhirClient).

use serde_json::Value;

/// A failed FHIR request. Requests are never retried by the client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FhirClientError {
    /// The server answered with a non-success status.
    #[error("FHIR server returned HTTP {status}")]
    Http { status: u16, body: String },

    /// The request never produced a response (connect, TLS, timeout).
    #[error("FHIR request failed: {0}")]
    Transport(String),

    /// The response body was not valid JSON.
    #[error("Failed to decode FHIR response: {0}")]
    Decode(String),

    /// The URL could not be built, or points outside the FHIR base.
    #[error("Invalid FHIR URL: {0}")]
    InvalidUrl(String),
}

impl FhirClientError {
    pub fn http(status: u16, body: impl Into<String>) -> Self {
        Self::Http {
            status,
            body: body.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }

    pub fn invalid_url(message: impl Into<String>) -> Self {
        Self::InvalidUrl(message.into())
    }

    /// HTTP status, when the server answered.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether a caller-initiated retry could succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http { status, .. } => *status == 429 || *status >= 500,
            Self::Transport(_) => true,
            Self::Decode(_) | Self::InvalidUrl(_) => false,
        }
    }

    /// `OperationOutcome.issue[0].diagnostics` from an error body.
    #[must_use]
    pub fn operation_outcome_diagnostics(&self) -> Option<String> {
        let Self::Http { body, .. } = self else {
            return None;
        };
        let json: Value = serde_json::from_str(body).ok()?;
        if json.get("resourceType").and_then(Value::as_str) != Some("OperationOutcome") {
            return None;
        }
        json.get("issue")?
            .get(0)?
            .get("diagnostics")?
            .as_str()
            .map(str::to_string)
    }

    /// Message suitable for showing to the clinician.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Http { .. } => self
                .operation_outcome_diagnostics()
                .unwrap_or_else(|| self.to_string()),
            Self::Transport(_) => "The FHIR server could not be reached".to_string(),
            Self::Decode(_) => "The FHIR server returned an unreadable response".to_string(),
            Self::InvalidUrl(_) => "The FHIR request could not be built".to_string(),
        }
    }
}

pub type FhirResult<T> = Result<T, FhirClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(FhirClientError::http(503, "").is_retryable());
        assert!(FhirClientError::http(429, "").is_retryable());
        assert!(!FhirClientError::http(404, "").is_retryable());
        assert!(FhirClientError::transport("reset").is_retryable());
        assert!(!FhirClientError::decode("eof").is_retryable());
    }

    #[test]
    fn diagnostics_from_first_issue() {
        let body = r#"{"resourceType":"OperationOutcome","issue":[
            {"severity":"error","diagnostics":"Patient/1 not found"},
            {"severity":"error"},
            {"severity":"error","diagnostics":"second"}]}"#;
        let err = FhirClientError::http(404, body);
        assert_eq!(
            err.operation_outcome_diagnostics().as_deref(),
            Some("Patient/1 not found")
        );
        assert_eq!(err.user_message(), "Patient/1 not found");

        // Only the first issue counts, even when a later one has diagnostics.
        let body = r#"{"resourceType":"OperationOutcome","issue":[
            {"severity":"error"},
            {"severity":"error","diagnostics":"second"}]}"#;
        let err = FhirClientError::http(422, body);
        assert!(err.operation_outcome_diagnostics().is_none());
        assert_eq!(err.user_message(), "FHIR server returned HTTP 422");
    }

    #[test]
    fn transport_details_stay_out_of_user_message() {
        let err =
            FhirClientError::transport("error sending request for url (http://10.0.0.7/fhir)");
        assert!(!err.user_message().contains("10.0.0.7"));
    }

    #[test]
    fn diagnostics_absent_for_other_bodies() {
        assert!(
            FhirClientError::http(500, "oops")
                .operation_outcome_diagnostics()
                .is_none()
        );
        assert!(
            FhirClientError::http(400, r#"{"resourceType":"Bundle"}"#)
                .operation_outcome_diagnostics()
                .is_none()
        );
        assert_eq!(
            FhirClientError::http(500, "oops").user_message(),
            "FHIR server returned HTTP 500"
        );
    }
}
