//! Authorization request construction.
//!
//! Login is a two-phase hand-off: the parameters that must be checked on
//! return (state, nonce, PKCE verifier) are parked in the tab's session as a
//! [`PendingAuthorization`] and the browser is redirected to the provider. The
//! callback resumes from the parked value.

use std::collections::BTreeSet;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use url::Url;

use crate::error::AuthFlowError;
use crate::launch::{ISSUER_PARAM, LaunchContext};
use crate::pkce::{CHALLENGE_METHOD_S256, PkceError, PkceVerifier};
use crate::random_token;
use crate::session::{SessionError, SessionKey, SessionStore, get_json, put_json};

/// Scopes every SMART launch requests.
pub const REQUIRED_SCOPES: [&str; 4] = ["openid", "profile", "launch", "patient/*.read"];

/// The inbound `iss` parameter is forwarded to the provider under this name.
pub const AUDIENCE_PARAM: &str = "aud";

/// Parameters owned by the protocol; inbound values never override them.
const PROTOCOL_PARAMS: [&str; 8] = [
    "response_type",
    "client_id",
    "redirect_uri",
    "scope",
    "state",
    "nonce",
    "code_challenge",
    "code_challenge_method",
];

/// How the app was launched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LaunchMode {
    /// Launched from an EHR with an issuer (and usually a launch token).
    Ehr,
    /// Launched directly without EHR context.
    Standalone,
}

/// Decides the launch mode, failing closed when no issuer was captured and
/// standalone launches are not enabled.
pub fn determine_launch_mode(
    context: &LaunchContext,
    allow_standalone: bool,
) -> Result<LaunchMode, AuthFlowError> {
    match (context.has_issuer(), allow_standalone) {
        (true, _) => Ok(LaunchMode::Ehr),
        (false, true) => Ok(LaunchMode::Standalone),
        (false, false) => Err(AuthFlowError::missing_launch_context(
            "no 'iss' parameter was captured and standalone launch is disabled",
        )),
    }
}

/// Scope and extra query parameters for one authorization attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationRequestParameters {
    pub scope: BTreeSet<String>,
    pub extra_query_parameters: IndexMap<String, String>,
}

impl AuthorizationRequestParameters {
    /// Builds parameters from the inbound launch URL and configured scopes.
    pub fn from_inbound<'a>(
        inbound: &Url,
        configured_scopes: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        Self {
            scope: build_scope(configured_scopes),
            extra_query_parameters: forward_query_parameters(inbound),
        }
    }

    /// Space-delimited scope string.
    #[must_use]
    pub fn scope_string(&self) -> String {
        self.scope.iter().map(String::as_str).collect::<Vec<_>>().join(" ")
    }
}

/// Union of [`REQUIRED_SCOPES`] and `configured`.
pub fn build_scope<'a>(configured: impl IntoIterator<Item = &'a str>) -> BTreeSet<String> {
    REQUIRED_SCOPES
        .into_iter()
        .chain(configured)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Copies every inbound query parameter, renaming `iss` to `aud`.
///
/// Repeated keys keep their first position and the last value.
#[must_use]
pub fn forward_query_parameters(inbound: &Url) -> IndexMap<String, String> {
    inbound
        .query_pairs()
        .map(|(key, value)| {
            let key = if key == ISSUER_PARAM {
                AUDIENCE_PARAM.to_string()
            } else {
                key.into_owned()
            };
            (key, value.into_owned())
        })
        .collect()
}

/// Authorization attempt parked across the provider redirect.
#[derive(Clone, Serialize, Deserialize)]
pub struct PendingAuthorization {
    pub state: String,
    pub nonce: String,
    pub code_verifier: String,
    pub redirect_uri: String,
    pub launch_mode: LaunchMode,
    /// Unix timestamp (seconds).
    pub created_at: i64,
    /// Lifetime in seconds.
    pub expires_in: u64,
}

impl PendingAuthorization {
    /// Creates a fresh attempt with random state, nonce and PKCE verifier.
    #[must_use]
    pub fn new(redirect_uri: impl Into<String>, launch_mode: LaunchMode, ttl_secs: u64) -> Self {
        Self {
            state: random_token(),
            nonce: random_token(),
            code_verifier: PkceVerifier::generate().as_str().to_string(),
            redirect_uri: redirect_uri.into(),
            launch_mode,
            created_at: OffsetDateTime::now_utc().unix_timestamp(),
            expires_in: ttl_secs,
        }
    }

    #[must_use]
    pub fn is_expired_at(&self, now: i64) -> bool {
        now >= self.created_at.saturating_add(self.expires_in as i64)
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(OffsetDateTime::now_utc().unix_timestamp())
    }

    /// Compares the returned `state` in constant time.
    #[must_use]
    pub fn matches_state(&self, state: &str) -> bool {
        constant_time_eq(self.state.as_bytes(), state.as_bytes())
    }

    /// Restores the PKCE verifier.
    pub fn verifier(&self) -> Result<PkceVerifier, PkceError> {
        PkceVerifier::new(self.code_verifier.clone())
    }
}

impl std::fmt::Debug for PendingAuthorization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingAuthorization")
            .field("redirect_uri", &self.redirect_uri)
            .field("launch_mode", &self.launch_mode)
            .field("created_at", &self.created_at)
            .field("expires_in", &self.expires_in)
            .finish_non_exhaustive()
    }
}

/// The redirect produced by a successful login initiation.
#[derive(Debug, Clone)]
pub struct AuthorizationRedirect {
    pub url: Url,
    pub mode: LaunchMode,
    pub parameters: AuthorizationRequestParameters,
}

/// Assembles the provider authorization URL.
#[must_use]
pub fn build_authorization_url(
    authorization_endpoint: &Url,
    client_id: &str,
    response_type: &str,
    parameters: &AuthorizationRequestParameters,
    pending: &PendingAuthorization,
    code_challenge: &str,
) -> Url {
    let mut url = authorization_endpoint.clone();
    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("response_type", response_type)
            .append_pair("client_id", client_id)
            .append_pair("redirect_uri", &pending.redirect_uri)
            .append_pair("scope", &parameters.scope_string())
            .append_pair("state", &pending.state)
            .append_pair("nonce", &pending.nonce)
            .append_pair("code_challenge", code_challenge)
            .append_pair("code_challenge_method", CHALLENGE_METHOD_S256);

        for (key, value) in &parameters.extra_query_parameters {
            if PROTOCOL_PARAMS.contains(&key.as_str()) {
                tracing::debug!(
                    param = %key,
                    "ignoring inbound parameter that collides with protocol"
                );
                continue;
            }
            query.append_pair(key, value);
        }
    }
    url
}

/// Parks `pending` in the tab session.
pub async fn park_pending_authorization(
    store: &dyn SessionStore,
    pending: &PendingAuthorization,
) -> Result<(), SessionError> {
    put_json(store, SessionKey::PendingAuthorization, pending).await
}

/// Reads the parked authorization attempt without consuming it.
pub async fn load_pending_authorization(
    store: &dyn SessionStore,
) -> Result<Option<PendingAuthorization>, SessionError> {
    get_json(store, SessionKey::PendingAuthorization).await
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
