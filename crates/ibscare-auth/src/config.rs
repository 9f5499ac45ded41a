//! OIDC client configuration.
//!
//! # Example (TOML)
//!
//! ```toml
//! [oidc]
//! authority = "https://app.meldrx.com"
//! client_id = "ibscare"
//! redirect_uri_local = "http://localhost:4434/callback"
//! redirect_uri_prod = "https://ibscare.example.org/callback"
//! environment = "production"
//! clock_skew = "60s"
//! pending_ttl = "10m"
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::AuthFlowError;

/// Which redirect URI is registered for this deployment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentEnvironment {
    #[default]
    Local,
    Production,
}

/// Explicit endpoint overrides; any value set here wins over discovery.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct EndpointOverrides {
    pub authorization_endpoint: Option<String>,
    pub token_endpoint: Option<String>,
    pub jwks_uri: Option<String>,
    pub userinfo_endpoint: Option<String>,
    pub end_session_endpoint: Option<String>,
}

/// Settings for the relying-party side of the SMART / OIDC handshake.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OidcSettings {
    /// Identity provider authority (issuer) URL.
    pub authority: String,

    /// OAuth client identifier registered with the provider.
    pub client_id: String,

    /// Only the authorization code flow is supported.
    pub response_type: String,

    /// Redirect URI used outside production.
    pub redirect_uri_local: String,

    /// Redirect URI used in production.
    pub redirect_uri_prod: Option<String>,

    /// Selects between the two redirect URIs.
    pub environment: DeploymentEnvironment,

    /// Additional space-delimited scopes requested on top of the
    /// mandatory SMART launch scopes.
    pub scope: String,

    /// Permit login without an EHR-supplied issuer.
    pub allow_standalone_launch: bool,

    /// Permit plain HTTP provider URLs. Test setups only.
    pub allow_http: bool,

    /// Leeway applied to `exp`/`iat`/`nbf` checks.
    #[serde(with = "humantime_serde")]
    pub clock_skew: Duration,

    /// Timeout for discovery, JWKS, token and user-info requests.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    /// How long a parked authorization request stays valid.
    #[serde(with = "humantime_serde")]
    pub pending_ttl: Duration,

    /// Path the provider redirects back to.
    pub callback_path: String,

    /// Where the provider should send the browser after logout.
    pub post_logout_redirect_uri: Option<String>,

    pub endpoints: EndpointOverrides,
}

impl Default for OidcSettings {
    fn default() -> Self {
        Self {
            authority: "https://app.meldrx.com".to_string(),
            client_id: String::new(),
            response_type: "code".to_string(),
            redirect_uri_local: "http://localhost:4434/callback".to_string(),
            redirect_uri_prod: None,
            environment: DeploymentEnvironment::Local,
            scope: "openid profile launch patient/*.read".to_string(),
            allow_standalone_launch: false,
            allow_http: false,
            clock_skew: Duration::from_secs(60),
            request_timeout: Duration::from_secs(30),
            pending_ttl: Duration::from_secs(600),
            callback_path: "/callback".to_string(),
            post_logout_redirect_uri: None,
            endpoints: EndpointOverrides::default(),
        }
    }
}

impl OidcSettings {
    /// Creates settings for the given authority and client.
    #[must_use]
    pub fn new(authority: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            authority: authority.into(),
            client_id: client_id.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.redirect_uri_local = uri.into();
        self.environment = DeploymentEnvironment::Local;
        self
    }

    #[must_use]
    pub fn with_allow_http(mut self, allow: bool) -> Self {
        self.allow_http = allow;
        self
    }

    #[must_use]
    pub fn with_standalone_launch(mut self, allow: bool) -> Self {
        self.allow_standalone_launch = allow;
        self
    }

    #[must_use]
    pub fn with_pending_ttl(mut self, ttl: Duration) -> Self {
        self.pending_ttl = ttl;
        self
    }

    /// The redirect URI for the configured environment.
    ///
    /// Production falls back to the local URI when no production URI is set.
    #[must_use]
    pub fn redirect_uri(&self) -> &str {
        match (self.environment, self.redirect_uri_prod.as_deref()) {
            (DeploymentEnvironment::Production, Some(uri)) => uri,
            _ => &self.redirect_uri_local,
        }
    }

    /// Parsed authority URL.
    pub fn authority_url(&self) -> Result<Url, AuthFlowError> {
        Url::parse(&self.authority).map_err(|e| {
            AuthFlowError::configuration(format!("invalid authority '{}': {e}", self.authority))
        })
    }

    /// Extra scopes from configuration, split on whitespace.
    pub fn configured_scopes(&self) -> impl Iterator<Item = &str> {
        self.scope.split_whitespace()
    }

    /// Checks the settings for values the flow cannot work with.
    pub fn validate(&self) -> Result<(), String> {
        if self.client_id.trim().is_empty() {
            return Err("oidc.client_id must not be empty".into());
        }
        if self.response_type != "code" {
            return Err(format!(
                "oidc.response_type '{}' is not supported; only 'code' is",
                self.response_type
            ));
        }
        let authority = Url::parse(&self.authority)
            .map_err(|e| format!("oidc.authority is not a valid URL: {e}"))?;
        if authority.scheme() != "https" && !self.allow_http {
            return Err("oidc.authority must use https (set oidc.allow_http for tests)".into());
        }
        Url::parse(self.redirect_uri())
            .map_err(|e| format!("oidc redirect URI is not a valid URL: {e}"))?;
        if !self.callback_path.starts_with('/') {
            return Err("oidc.callback_path must start with '/'".into());
        }
        if self.pending_ttl.is_zero() {
            return Err("oidc.pending_ttl must be greater than zero".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = OidcSettings::default();
        assert_eq!(settings.response_type, "code");
        assert_eq!(settings.redirect_uri(), "http://localhost:4434/callback");
        assert_eq!(settings.clock_skew, Duration::from_secs(60));
        assert!(!settings.allow_standalone_launch);
    }

    #[test]
    fn test_redirect_uri_selection() {
        let mut settings = OidcSettings::new("https://idp.example.org", "app");
        settings.redirect_uri_prod = Some("https://app.example.org/callback".into());
        assert_eq!(settings.redirect_uri(), "http://localhost:4434/callback");

        settings.environment = DeploymentEnvironment::Production;
        assert_eq!(settings.redirect_uri(), "https://app.example.org/callback");

        settings.redirect_uri_prod = None;
        assert_eq!(settings.redirect_uri(), "http://localhost:4434/callback");
    }

    #[test]
    fn test_validate() {
        assert!(OidcSettings::new("https://idp.example.org", "app").validate().is_ok());
        assert!(OidcSettings::default().validate().is_err());
        assert!(OidcSettings::new("http://idp.example.org", "app").validate().is_err());
        assert!(
            OidcSettings::new("http://idp.example.org", "app")
                .with_allow_http(true)
                .validate()
                .is_ok()
        );

        let mut settings = OidcSettings::new("https://idp.example.org", "app");
        settings.response_type = "token".into();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_humantime_durations() {
        let settings: OidcSettings = serde_json::from_value(serde_json::json!({
            "client_id": "app",
            "clock_skew": "2m",
            "pending_ttl": "15m",
        }))
        .unwrap();
        assert_eq!(settings.clock_skew, Duration::from_secs(120));
        assert_eq!(settings.pending_ttl, Duration::from_secs(900));
        assert_eq!(settings.request_timeout, Duration::from_secs(30));
    }
}
