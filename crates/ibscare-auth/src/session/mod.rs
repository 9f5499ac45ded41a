//! Tab-scoped session storage.
//!
//! A [`SessionStore`] is the only hand-off mechanism between the launch
//! route, the callback route and the rest of the application. State that must
//! survive a redirect to the identity provider is parked here and resumed
//! when the browser comes back.
//!
//! Every write that touches several keys goes through [`SessionStore::replace`]
//! so readers never observe a half-written launch context or a session whose
//! access token and patient id disagree.

mod memory;
mod registry;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};

pub use memory::InMemorySessionStore;
pub use registry::{SessionRegistry, generate_session_id};

/// Errors raised by session store backends.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session backend error: {0}")]
    Backend(String),

    #[error("Failed to encode session value for {key}: {message}")]
    Encode { key: SessionKey, message: String },

    #[error("Failed to decode session value for {key}: {message}")]
    Decode { key: SessionKey, message: String },
}

/// Keys written by the launch and authentication flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SessionKey {
    LaunchIssuer,
    LaunchToken,
    WorkspaceId,
    PendingAuthorization,
    AccessToken,
    IdToken,
    RefreshToken,
    TokenType,
    GrantedScope,
    SessionExpiry,
    PatientId,
    Profile,
}

impl SessionKey {
    /// Keys describing the EHR launch.
    pub const LAUNCH_KEYS: [SessionKey; 3] = [
        SessionKey::LaunchIssuer,
        SessionKey::LaunchToken,
        SessionKey::WorkspaceId,
    ];

    /// Keys describing an authorization attempt or an established session.
    pub const AUTH_KEYS: [SessionKey; 9] = [
        SessionKey::PendingAuthorization,
        SessionKey::AccessToken,
        SessionKey::IdToken,
        SessionKey::RefreshToken,
        SessionKey::TokenType,
        SessionKey::GrantedScope,
        SessionKey::SessionExpiry,
        SessionKey::PatientId,
        SessionKey::Profile,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LaunchIssuer => "launch.iss",
            Self::LaunchToken => "launch.token",
            Self::WorkspaceId => "launch.ws-slug",
            Self::PendingAuthorization => "auth.pending",
            Self::AccessToken => "auth.access_token",
            Self::IdToken => "auth.id_token",
            Self::RefreshToken => "auth.refresh_token",
            Self::TokenType => "auth.token_type",
            Self::GrantedScope => "auth.scope",
            Self::SessionExpiry => "auth.expires_at",
            Self::PatientId => "auth.patient_id",
            Self::Profile => "auth.profile",
        }
    }

    /// Returns `true` for keys that hold bearer credentials.
    #[must_use]
    pub fn is_secret(&self) -> bool {
        matches!(
            self,
            Self::AccessToken | Self::IdToken | Self::RefreshToken | Self::PendingAuthorization
        )
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key/value store scoped to one browser tab.
///
/// Implementations must apply [`replace`](SessionStore::replace) atomically:
/// concurrent readers see either the state before or the state after, never
/// a mix.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Reads a value.
    async fn get(&self, key: SessionKey) -> Result<Option<String>, SessionError>;

    /// Writes a single value.
    async fn put(&self, key: SessionKey, value: String) -> Result<(), SessionError>;

    /// Removes a value, returning what was stored.
    async fn remove(&self, key: SessionKey) -> Result<Option<String>, SessionError>;

    /// Removes `remove` and writes `entries` as one operation.
    async fn replace(
        &self,
        remove: &[SessionKey],
        entries: Vec<(SessionKey, String)>,
    ) -> Result<(), SessionError>;

    /// Copy of every stored entry.
    async fn snapshot(&self) -> Result<HashMap<SessionKey, String>, SessionError>;

    /// Writes several values at once.
    async fn put_all(&self, entries: Vec<(SessionKey, String)>) -> Result<(), SessionError> {
        self.replace(&[], entries).await
    }

    /// Removes every key written by the launch and authentication flow.
    async fn clear_auth(&self) -> Result<(), SessionError> {
        let keys: Vec<SessionKey> = SessionKey::LAUNCH_KEYS
            .iter()
            .chain(SessionKey::AUTH_KEYS.iter())
            .copied()
            .collect();
        self.replace(&keys, Vec::new()).await
    }
}

/// Serializes `value` as JSON under `key`.
pub async fn put_json<T: Serialize + Sync>(
    store: &dyn SessionStore,
    key: SessionKey,
    value: &T,
) -> Result<(), SessionError> {
    let encoded = encode_json(key, value)?;
    store.put(key, encoded).await
}

/// Reads and deserializes a JSON value stored under `key`.
pub async fn get_json<T: DeserializeOwned>(
    store: &dyn SessionStore,
    key: SessionKey,
) -> Result<Option<T>, SessionError> {
    match store.get(key).await? {
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| SessionError::Decode {
                key,
                message: e.to_string(),
            }),
        None => Ok(None),
    }
}

/// Encodes a value for inclusion in a [`SessionStore::replace`] batch.
pub fn encode_json<T: Serialize + ?Sized>(
    key: SessionKey,
    value: &T,
) -> Result<String, SessionError> {
    serde_json::to_string(value).map_err(|e| SessionError::Encode {
        key,
        message: e.to_string(),
    })
}
