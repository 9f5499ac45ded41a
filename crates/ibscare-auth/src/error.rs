//! Error types for the launch, authorization and callback flow.

use serde::Serialize;

use crate::discovery::DiscoveryError;
use crate::jwks::JwksError;

/// Coarse classification of an authentication failure.
///
/// This is the value surfaced to the HTTP layer, which decides how the
/// failure is presented (redirect back to launch, inline message, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    /// No issuer was captured before login was attempted.
    MissingLaunchContext,
    /// The callback carried no authorization code.
    MissingAuthorizationCode,
    /// State, nonce, signature or claim validation failed.
    SecurityValidationFailed,
    /// The token response carried no usable `patient` claim.
    NoPatientContext,
    /// The identity provider could not be reached.
    NetworkError,
    /// The identity provider answered with an OAuth error.
    ProviderError,
    /// Local misconfiguration (bad URLs, missing endpoints).
    Configuration,
    /// The tab session store could not be read or written.
    SessionStorage,
}

impl ErrorKind {
    /// Stable identifier used in JSON error bodies.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingLaunchContext => "missing_launch_context",
            Self::MissingAuthorizationCode => "missing_authorization_code",
            Self::SecurityValidationFailed => "security_validation_failed",
            Self::NoPatientContext => "no_patient_context",
            Self::NetworkError => "network_error",
            Self::ProviderError => "provider_error",
            Self::Configuration => "configuration_error",
            Self::SessionStorage => "session_storage_error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced by the SMART launch and OIDC callback flow.
#[derive(Debug, thiserror::Error)]
pub enum AuthFlowError {
    /// Login was attempted without a captured launch context.
    #[error("Missing launch context: {message}")]
    MissingLaunchContext { message: String },

    /// The callback URL carried no `code` parameter.
    #[error("Authorization code missing from callback")]
    MissingAuthorizationCode,

    /// State, nonce or token validation failed.
    #[error("Security validation failed: {message}")]
    SecurityValidationFailed { message: String },

    /// The token response carried no string `patient` claim.
    #[error("Token response carried no patient context")]
    NoPatientContext,

    /// A transport-level failure talking to the identity provider.
    #[error("Network error: {message}")]
    NetworkError { message: String },

    /// The identity provider returned an OAuth error.
    #[error("Provider returned error '{error}'{}", description.as_ref().map(|d| format!(": {d}")).unwrap_or_default())]
    ProviderError {
        error: String,
        description: Option<String>,
    },

    /// The token endpoint answered with a non-success status.
    #[error("Token exchange failed: {message}")]
    TokenExchangeFailed { message: String },

    /// Discovery metadata could not be obtained.
    #[error("Discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),

    /// Signing keys could not be obtained.
    #[error("JWKS failure: {0}")]
    Jwks(#[from] JwksError),

    /// Local configuration problem.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Session store failure.
    #[error("Session storage error: {message}")]
    SessionStorage { message: String },
}

impl AuthFlowError {
    // =========================================================================
    // Constructors
    // =========================================================================

    pub fn missing_launch_context(message: impl Into<String>) -> Self {
        Self::MissingLaunchContext {
            message: message.into(),
        }
    }

    pub fn security(message: impl Into<String>) -> Self {
        Self::SecurityValidationFailed {
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError {
            message: message.into(),
        }
    }

    pub fn provider(error: impl Into<String>, description: Option<String>) -> Self {
        Self::ProviderError {
            error: error.into(),
            description,
        }
    }

    pub fn token_exchange(message: impl Into<String>) -> Self {
        Self::TokenExchangeFailed {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn session_storage(message: impl Into<String>) -> Self {
        Self::SessionStorage {
            message: message.into(),
        }
    }

    // =========================================================================
    // Classification
    // =========================================================================

    /// Maps the error onto its [`ErrorKind`].
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingLaunchContext { .. } => ErrorKind::MissingLaunchContext,
            Self::MissingAuthorizationCode => ErrorKind::MissingAuthorizationCode,
            Self::SecurityValidationFailed { .. } => ErrorKind::SecurityValidationFailed,
            Self::NoPatientContext => ErrorKind::NoPatientContext,
            Self::NetworkError { .. } => ErrorKind::NetworkError,
            Self::ProviderError { .. } | Self::TokenExchangeFailed { .. } => {
                ErrorKind::ProviderError
            }
            Self::Discovery(err) if err.is_transport() => ErrorKind::NetworkError,
            Self::Jwks(err) if err.is_transport() => ErrorKind::NetworkError,
            // Keys or metadata that are present but unusable mean the token
            // cannot be trusted.
            Self::Jwks(_) => ErrorKind::SecurityValidationFailed,
            Self::Discovery(_) | Self::Configuration { .. } => ErrorKind::Configuration,
            Self::SessionStorage { .. } => ErrorKind::SessionStorage,
        }
    }

    /// Returns `true` if retrying the same callback can never succeed.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::MissingAuthorizationCode
                | ErrorKind::SecurityValidationFailed
                | ErrorKind::ProviderError
        )
    }

    /// Returns `true` if the user may retry the operation as-is.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::NetworkError)
    }

    /// Message suitable for showing to the clinician.
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self.kind() {
            ErrorKind::MissingLaunchContext => {
                "This app must be launched from your EHR. Please relaunch it from the patient chart."
            }
            ErrorKind::MissingAuthorizationCode => {
                "Sign-in did not complete: no authorization code was returned."
            }
            ErrorKind::SecurityValidationFailed => {
                "Sign-in could not be verified. Please relaunch the app from your EHR."
            }
            ErrorKind::NoPatientContext => "No patient was selected for this session.",
            ErrorKind::NetworkError => {
                "The sign-in service could not be reached. Please try again."
            }
            ErrorKind::ProviderError => "The sign-in service rejected the request.",
            ErrorKind::Configuration => "The application is not configured correctly.",
            ErrorKind::SessionStorage => "Your session could not be saved. Please try again.",
        }
    }
}

/// Result type for the auth flow.
pub type AuthFlowResult<T> = Result<T, AuthFlowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            AuthFlowError::MissingAuthorizationCode.kind(),
            ErrorKind::MissingAuthorizationCode
        );
        assert_eq!(
            AuthFlowError::security("state mismatch").kind(),
            ErrorKind::SecurityValidationFailed
        );
        assert_eq!(
            AuthFlowError::token_exchange("HTTP 500").kind(),
            ErrorKind::ProviderError
        );
        assert_eq!(
            AuthFlowError::Discovery(DiscoveryError::NetworkError("refused".into())).kind(),
            ErrorKind::NetworkError
        );
        assert_eq!(
            AuthFlowError::Jwks(JwksError::KeyNotFound("k1".into())).kind(),
            ErrorKind::SecurityValidationFailed
        );
    }

    #[test]
    fn test_predicates() {
        assert!(AuthFlowError::MissingAuthorizationCode.is_terminal());
        assert!(AuthFlowError::security("nonce").is_terminal());
        assert!(!AuthFlowError::network("timeout").is_terminal());
        assert!(AuthFlowError::network("timeout").is_retryable());
        assert!(!AuthFlowError::missing_launch_context("no iss").is_retryable());
    }

    #[test]
    fn test_display() {
        let err = AuthFlowError::provider("access_denied", Some("user cancelled".into()));
        assert_eq!(
            err.to_string(),
            "Provider returned error 'access_denied': user cancelled"
        );

        let err = AuthFlowError::provider("server_error", None);
        assert_eq!(err.to_string(), "Provider returned error 'server_error'");
    }

    #[test]
    fn test_kind_as_str() {
        assert_eq!(
            ErrorKind::MissingLaunchContext.to_string(),
            "missing_launch_context"
        );
        assert_eq!(
            ErrorKind::SecurityValidationFailed.as_str(),
            "security_validation_failed"
        );
    }
}
