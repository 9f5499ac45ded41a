//! EHR launch context extraction.
//!
//! An EHR launches the app with `GET /launch?iss=<fhir base>&launch=<token>`.
//! The issuer and launch token must be parked in the tab's
//! [`SessionStore`] before the browser is sent to the identity provider,
//! because nothing in memory survives that redirect.
//!
//! Some EHRs (MeldRx among them) end the issuer URL with a workspace UUID.
//! That id is extracted on a best-effort basis and stored alongside.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::session::{SessionKey, SessionStore};

/// SMART reserved launch parameter carrying the EHR FHIR base URL.
pub const ISSUER_PARAM: &str = "iss";

/// SMART reserved launch parameter carrying the opaque launch token.
pub const LAUNCH_PARAM: &str = "launch";

static WORKSPACE_ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$")
        .expect("workspace id pattern is valid")
});

/// Launch parameters captured from the EHR.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchContext {
    /// FHIR issuer URL supplied by the EHR.
    pub issuer: Option<String>,
    /// Opaque launch token; absent for standalone launches.
    pub launch_token: Option<String>,
    /// Workspace UUID taken from the issuer's final path segment.
    pub workspace_id: Option<String>,
}

impl LaunchContext {
    /// Returns `true` when an issuer was captured.
    #[must_use]
    pub fn has_issuer(&self) -> bool {
        self.issuer.is_some()
    }

    fn to_entries(&self) -> Vec<(SessionKey, String)> {
        [
            (SessionKey::LaunchIssuer, &self.issuer),
            (SessionKey::LaunchToken, &self.launch_token),
            (SessionKey::WorkspaceId, &self.workspace_id),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.clone().map(|v| (key, v)))
        .collect()
    }
}

/// Parses the launch URL and persists the launch context.
///
/// Never fails: a missing issuer is reported to the caller through
/// [`LaunchContext::issuer`] and validated by the authorization step. The
/// previous launch group is replaced as a unit, so extracting twice with the
/// same URL yields the same stored state and a differing earlier launch
/// leaves nothing behind.
pub async fn extract_launch_context(url: &Url, store: &dyn SessionStore) -> LaunchContext {
    let context = parse_launch_context(url);

    if let Err(e) = store
        .replace(&SessionKey::LAUNCH_KEYS, context.to_entries())
        .await
    {
        tracing::warn!(error = %e, "failed to persist launch context");
    }

    tracing::info!(
        has_issuer = context.issuer.is_some(),
        has_launch_token = context.launch_token.is_some(),
        workspace_id = context.workspace_id.as_deref().unwrap_or(""),
        "launch context captured"
    );

    context
}

/// Parses launch parameters without touching storage.
#[must_use]
pub fn parse_launch_context(url: &Url) -> LaunchContext {
    let mut issuer = None;
    let mut launch_token = None;

    for (key, value) in url.query_pairs() {
        if value.is_empty() {
            continue;
        }
        match key.as_ref() {
            ISSUER_PARAM => issuer = Some(value.into_owned()),
            LAUNCH_PARAM => launch_token = Some(value.into_owned()),
            _ => {}
        }
    }

    let workspace_id = issuer.as_deref().and_then(derive_workspace_id);

    LaunchContext {
        issuer,
        launch_token,
        workspace_id,
    }
}

/// Extracts a UUID-shaped workspace id from the final path segment of `issuer`.
///
/// A trailing slash leaves an empty final segment, so no id is derived.
#[must_use]
pub fn derive_workspace_id(issuer: &str) -> Option<String> {
    let Ok(url) = Url::parse(issuer) else {
        tracing::warn!("issuer is not a valid URL; no workspace id derived");
        return None;
    };

    let last = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or_default();

    if WORKSPACE_ID_PATTERN.is_match(last) {
        Some(last.to_string())
    } else {
        tracing::warn!(segment = last, "issuer does not end with a workspace id");
        None
    }
}

/// Reads the launch context previously parked in `store`.
pub async fn load_launch_context(store: &dyn SessionStore) -> LaunchContext {
    let read = |key| async move { store.get(key).await.ok().flatten() };
    LaunchContext {
        issuer: read(SessionKey::LaunchIssuer).await,
        launch_token: read(SessionKey::LaunchToken).await,
        workspace_id: read(SessionKey::WorkspaceId).await,
    }
}
