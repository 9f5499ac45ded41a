//! Provider JWKS fetching and caching.
//!
//! Keys are cached per JWKS URI. The TTL follows the provider's
//! `Cache-Control: max-age` clamped to configured bounds. Looking up an
//! unknown `kid` forces one refresh, which picks up key rotation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use jsonwebtoken::jwk::{Jwk, JwkSet, KeyAlgorithm, PublicKeyUse};
use jsonwebtoken::{Algorithm, DecodingKey};
use tokio::sync::RwLock;
use url::Url;

/// Configuration for the JWKS cache.
#[derive(Debug, Clone)]
pub struct JwksCacheConfig {
    /// TTL when the response has no `Cache-Control` (default: 1 hour).
    pub default_ttl: Duration,
    /// Upper bound on the TTL (default: 24 hours).
    pub max_ttl: Duration,
    /// Lower bound on the TTL (default: 1 minute).
    pub min_ttl: Duration,
    /// HTTP request timeout (default: 10 seconds).
    pub request_timeout: Duration,
    /// Maximum response size in bytes (default: 1 MB).
    pub max_response_size: usize,
    /// Allow plain HTTP JWKS URIs. Tests only.
    pub allow_http: bool,
}

impl Default for JwksCacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(3600),
            max_ttl: Duration::from_secs(86400),
            min_ttl: Duration::from_secs(60),
            request_timeout: Duration::from_secs(10),
            max_response_size: 1024 * 1024,
            allow_http: false,
        }
    }
}

impl JwksCacheConfig {
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
}

/// Errors that can occur during JWKS operations.
#[derive(Debug, thiserror::Error)]
pub enum JwksError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("HTTP error: status {0}")]
    HttpError(u16),

    #[error("Failed to parse JWKS: {0}")]
    ParseError(String),

    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Invalid URL scheme: only HTTPS is allowed")]
    InvalidScheme,

    #[error("Response exceeds maximum size of {max_size} bytes")]
    ResponseTooLarge { max_size: usize },
}

impl JwksError {
    /// Returns `true` for failures to reach the provider at all.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::NetworkError(_) | Self::HttpError(500..=599))
    }
}

struct CachedJwks {
    jwks: JwkSet,
    expires_at: Instant,
}

/// Fetches and caches the identity provider's signing keys.
pub struct JwksCache {
    http_client: reqwest::Client,
    cache: Arc<RwLock<HashMap<String, CachedJwks>>>,
    config: JwksCacheConfig,
}

impl JwksCache {
    /// Creates a cache with its own HTTP client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: JwksCacheConfig) -> Result<Self, JwksError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| JwksError::NetworkError(e.to_string()))?;
        Ok(Self::with_client(http_client, config))
    }

    /// Creates a cache sharing an existing HTTP client.
    #[must_use]
    pub fn with_client(http_client: reqwest::Client, config: JwksCacheConfig) -> Self {
        Self {
            http_client,
            cache: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }

    /// Returns the decoding key for `kid`, together with the algorithm the
    /// JWK declares (if any).
    pub async fn get_key(
        &self,
        jwks_uri: &Url,
        kid: &str,
    ) -> Result<(DecodingKey, Option<Algorithm>), JwksError> {
        if let Some(found) = self.cached_key(jwks_uri, kid).await {
            tracing::trace!(kid, "JWKS cache hit");
            return found;
        }

        tracing::debug!(kid, jwks_uri = %jwks_uri, "JWKS cache miss");
        self.refresh(jwks_uri).await?;

        self.cached_key(jwks_uri, kid)
            .await
            .unwrap_or_else(|| Err(JwksError::KeyNotFound(kid.to_string())))
    }

    async fn cached_key(
        &self,
        jwks_uri: &Url,
        kid: &str,
    ) -> Option<Result<(DecodingKey, Option<Algorithm>), JwksError>> {
        let cache = self.cache.read().await;
        let cached = cache.get(&normalize_uri(jwks_uri))?;
        if Instant::now() >= cached.expires_at {
            return None;
        }

        let jwk = cached.jwks.keys.iter().find(|k| {
            k.common.key_id.as_deref() == Some(kid)
                && !matches!(k.common.public_key_use, Some(PublicKeyUse::Encryption))
        })?;

        Some(
            DecodingKey::from_jwk(jwk)
                .map(|key| (key, jwk_algorithm(jwk)))
                .map_err(|e| JwksError::InvalidKey(e.to_string())),
        )
    }

    /// Fetches the key set and replaces the cached entry.
    pub async fn refresh(&self, jwks_uri: &Url) -> Result<(), JwksError> {
        let scheme = jwks_uri.scheme();
        if scheme != "https" && !(scheme == "http" && self.config.allow_http) {
            return Err(JwksError::InvalidScheme);
        }

        let response = self
            .http_client
            .get(jwks_uri.as_str())
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(jwks_uri = %jwks_uri, error = %e, "failed to fetch JWKS");
                JwksError::NetworkError(e.to_string())
            })?;

        if !response.status().is_success() {
            return Err(JwksError::HttpError(response.status().as_u16()));
        }

        if let Some(len) = response.content_length()
            && len as usize > self.config.max_response_size
        {
            return Err(JwksError::ResponseTooLarge {
                max_size: self.config.max_response_size,
            });
        }

        let ttl = self.ttl_from_headers(response.headers());
        let jwks: JwkSet = response
            .json()
            .await
            .map_err(|e| JwksError::ParseError(e.to_string()))?;

        tracing::debug!(jwks_uri = %jwks_uri, keys = jwks.keys.len(), ?ttl, "cached JWKS");

        self.cache.write().await.insert(
            normalize_uri(jwks_uri),
            CachedJwks {
                jwks,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    /// Drops the cached key set for `jwks_uri`.
    pub async fn invalidate(&self, jwks_uri: &Url) {
        self.cache.write().await.remove(&normalize_uri(jwks_uri));
    }

    fn ttl_from_headers(&self, headers: &reqwest::header::HeaderMap) -> Duration {
        let ttl = headers
            .get(reqwest::header::CACHE_CONTROL)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| {
                v.split(',')
                    .find_map(|directive| directive.trim().strip_prefix("max-age="))
                    .and_then(|secs| secs.parse::<u64>().ok())
            })
            .map(Duration::from_secs)
            .unwrap_or(self.config.default_ttl);

        ttl.min(self.config.max_ttl).max(self.config.min_ttl)
    }
}

fn normalize_uri(uri: &Url) -> String {
    uri.as_str().trim_end_matches('/').to_string()
}

fn jwk_algorithm(jwk: &Jwk) -> Option<Algorithm> {
    jwk.common.key_algorithm.as_ref().and_then(|alg| match alg {
        KeyAlgorithm::RS256 => Some(Algorithm::RS256),
        KeyAlgorithm::RS384 => Some(Algorithm::RS384),
        KeyAlgorithm::RS512 => Some(Algorithm::RS512),
        KeyAlgorithm::ES256 => Some(Algorithm::ES256),
        KeyAlgorithm::ES384 => Some(Algorithm::ES384),
        KeyAlgorithm::PS256 => Some(Algorithm::PS256),
        KeyAlgorithm::PS384 => Some(Algorithm::PS384),
        KeyAlgorithm::PS512 => Some(Algorithm::PS512),
        KeyAlgorithm::EdDSA => Some(Algorithm::EdDSA),
        _ => None,
    })
}
