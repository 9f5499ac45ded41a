//! OpenID Connect discovery for the configured identity provider.
//!
//! Metadata is fetched from `{authority}/.well-known/openid-configuration`
//! and cached for a configurable TTL. The `issuer` in the document must match
//! the authority it was fetched from (trailing slash ignored).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use url::Url;

/// Provider metadata fields the relying party uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub jwks_uri: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub userinfo_endpoint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_session_endpoint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes_supported: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_challenge_methods_supported: Option<Vec<String>>,
}

impl ProviderMetadata {
    /// `true` unless the provider advertises a method list without S256.
    #[must_use]
    pub fn supports_s256(&self) -> bool {
        self.code_challenge_methods_supported
            .as_ref()
            .is_none_or(|methods| methods.iter().any(|m| m == "S256"))
    }
}

/// Configuration for the discovery cache.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Time-to-live for cached documents (default: 1 hour).
    pub ttl: Duration,
    /// HTTP request timeout (default: 10 seconds).
    pub request_timeout: Duration,
    /// Maximum response size in bytes (default: 1 MB).
    pub max_response_size: usize,
    /// Allow plain HTTP authorities. Tests only.
    pub allow_http: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3600),
            request_timeout: Duration::from_secs(10),
            max_response_size: 1024 * 1024,
            allow_http: false,
        }
    }
}

impl DiscoveryConfig {
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_allow_http(mut self, allow: bool) -> Self {
        self.allow_http = allow;
        self
    }

    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

/// Errors that can occur during discovery.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("HTTP error: status {0}")]
    HttpError(u16),

    #[error("Failed to parse discovery document: {0}")]
    ParseError(String),

    #[error("Invalid issuer URL: {0}")]
    InvalidIssuer(String),

    #[error("Issuer mismatch: expected {expected}, got {actual}")]
    IssuerMismatch { expected: String, actual: String },

    #[error("Invalid URL scheme: {0} (only HTTPS is allowed)")]
    InvalidScheme(String),

    #[error("Response exceeds maximum size of {max_size} bytes")]
    ResponseTooLarge { max_size: usize },
}

impl DiscoveryError {
    /// Returns `true` for failures to reach the provider at all.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::NetworkError(_) | Self::HttpError(500..=599))
    }
}

struct CachedMetadata {
    metadata: ProviderMetadata,
    fetched_at: Instant,
}

/// Fetches and caches provider metadata.
pub struct DiscoveryCache {
    http_client: reqwest::Client,
    cache: Arc<RwLock<HashMap<String, CachedMetadata>>>,
    config: DiscoveryConfig,
}

impl DiscoveryCache {
    /// Creates a cache with its own HTTP client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: DiscoveryConfig) -> Result<Self, DiscoveryError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| DiscoveryError::NetworkError(e.to_string()))?;
        Ok(Self::with_client(http_client, config))
    }

    /// Creates a cache sharing an existing HTTP client.
    #[must_use]
    pub fn with_client(http_client: reqwest::Client, config: DiscoveryConfig) -> Self {
        Self {
            http_client,
            cache: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }

    /// Returns metadata for `issuer`, fetching it when not cached or expired.
    pub async fn get(&self, issuer: &Url) -> Result<ProviderMetadata, DiscoveryError> {
        let key = normalize_issuer(issuer);

        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.get(&key)
                && cached.fetched_at.elapsed() < self.config.ttl
            {
                tracing::trace!(issuer = %issuer, "discovery cache hit");
                return Ok(cached.metadata.clone());
            }
        }

        let metadata = self.discover(issuer).await?;

        self.cache.write().await.insert(
            key,
            CachedMetadata {
                metadata: metadata.clone(),
                fetched_at: Instant::now(),
            },
        );

        Ok(metadata)
    }

    /// Drops the cached entry for `issuer`.
    pub async fn invalidate(&self, issuer: &Url) {
        self.cache.write().await.remove(&normalize_issuer(issuer));
        tracing::debug!(issuer = %issuer, "invalidated discovery cache entry");
    }

    async fn discover(&self, issuer: &Url) -> Result<ProviderMetadata, DiscoveryError> {
        let scheme = issuer.scheme();
        if scheme != "https" && !(scheme == "http" && self.config.allow_http) {
            return Err(DiscoveryError::InvalidScheme(scheme.to_string()));
        }

        let mut discovery_url = issuer.clone();
        let path = issuer.path().trim_end_matches('/');
        discovery_url.set_path(&format!("{path}/.well-known/openid-configuration"));

        tracing::debug!(url = %discovery_url, "fetching OIDC discovery document");

        let response = self
            .http_client
            .get(discovery_url.as_str())
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(issuer = %issuer, error = %e, "failed to fetch OIDC discovery");
                DiscoveryError::NetworkError(e.to_string())
            })?;

        if !response.status().is_success() {
            return Err(DiscoveryError::HttpError(response.status().as_u16()));
        }

        if let Some(len) = response.content_length()
            && len as usize > self.config.max_response_size
        {
            return Err(DiscoveryError::ResponseTooLarge {
                max_size: self.config.max_response_size,
            });
        }

        let metadata: ProviderMetadata = response
            .json()
            .await
            .map_err(|e| DiscoveryError::ParseError(e.to_string()))?;

        let document_issuer = Url::parse(&metadata.issuer)
            .map_err(|e| DiscoveryError::InvalidIssuer(format!("{}: {e}", metadata.issuer)))?;
        let expected = normalize_issuer(issuer);
        let actual = normalize_issuer(&document_issuer);
        if expected != actual {
            return Err(DiscoveryError::IssuerMismatch { expected, actual });
        }

        Ok(metadata)
    }
}

fn normalize_issuer(issuer: &Url) -> String {
    issuer.as_str().trim_end_matches('/').to_string()
}
