//! FHIR server and scoring backend settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Where the FHIR server lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FhirSettings {
    pub base_url: String,
    /// Appended to `base_url` as a path segment when non-empty.
    pub tenant_id: String,
    /// OIDC user-info endpoint queried with the FHIR access token.
    pub user_info_endpoint: Option<String>,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for FhirSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            tenant_id: String::new(),
            user_info_endpoint: None,
            request_timeout: Duration::from_secs(30),
        }
    }
}

fn default_base_url() -> String {
    "https://app.meldrx.com/api/fhir".to_string()
}

impl FhirSettings {
    /// `{base_url}/{tenant_id}` without a trailing slash.
    #[must_use]
    pub fn service_base_url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        let tenant = self.tenant_id.trim_matches('/');
        if tenant.is_empty() {
            base.to_string()
        } else {
            format!("{base}/{tenant}")
        }
    }
}

/// IBS analysis and quality-of-life prediction endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringSettings {
    pub analysis_url: Option<String>,
    pub prediction_url: Option<String>,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for ScoringSettings {
    fn default() -> Self {
        Self {
            analysis_url: None,
            prediction_url: None,
            request_timeout: Duration::from_secs(60),
        }
    }
}
