//! Callback processing types and session promotion.
//!
//! The provider's token response for a SMART launch is a superset of the
//! standard OAuth response: it may carry a `patient` claim naming the patient
//! in context. [`ExtendedTokenResponse`] declares that field explicitly so it
//! is validated before use.

use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use url::Url;

use crate::error::{AuthFlowError, ErrorKind};
use crate::session::{SessionError, SessionKey, SessionStore, encode_json, get_json};

/// Fallback greeting when the identity token carries no usable name.
pub const DEFAULT_DISPLAY_NAME: &str = "Doctor";

// =============================================================================
// Callback Parameters
// =============================================================================

/// Query parameters the provider sends back to the redirect URI.
///
/// Unknown parameters are tolerated and ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl CallbackParams {
    #[must_use]
    pub fn from_url(url: &Url) -> Self {
        let mut params = Self::default();
        for (key, value) in url.query_pairs() {
            if value.is_empty() {
                continue;
            }
            let slot = match key.as_ref() {
                "code" => &mut params.code,
                "state" => &mut params.state,
                "error" => &mut params.error,
                "error_description" => &mut params.error_description,
                _ => continue,
            };
            *slot = Some(value.into_owned());
        }
        params
    }
}

// =============================================================================
// Token Response
// =============================================================================

/// Token endpoint response including SMART launch context.
#[derive(Clone, Deserialize)]
pub struct ExtendedTokenResponse {
    pub access_token: String,

    #[serde(default = "default_token_type")]
    pub token_type: String,

    #[serde(default)]
    pub expires_in: Option<u64>,

    #[serde(default)]
    pub refresh_token: Option<String>,

    #[serde(default)]
    pub id_token: Option<String>,

    #[serde(default)]
    pub scope: Option<String>,

    /// Non-standard patient context claim. Only a JSON string is accepted.
    #[serde(default)]
    pub patient: Option<Value>,

    /// Other launch context (`encounter`, `need_patient_banner`, ...).
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl ExtendedTokenResponse {
    /// The patient id, if the claim is a non-empty string.
    #[must_use]
    pub fn patient_id(&self) -> Option<&str> {
        self.patient
            .as_ref()
            .and_then(Value::as_str)
            .filter(|id| !id.trim().is_empty())
    }
}

/// OAuth error body returned by the token endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct OAuthErrorResponse {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}

// =============================================================================
// ID Token Claims
// =============================================================================

/// Claims read from a validated ID token.
#[derive(Debug, Clone, Deserialize)]
pub struct IdTokenClaims {
    pub iss: String,
    pub sub: String,
    #[serde(deserialize_with = "deserialize_audience")]
    pub aud: Vec<String>,
    pub exp: i64,
    #[serde(default)]
    pub iat: Option<i64>,
    #[serde(default)]
    pub nonce: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub family_name: Option<String>,
    #[serde(default)]
    pub preferred_username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, rename = "fhirUser")]
    pub fhir_user: Option<String>,
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

fn deserialize_audience<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(aud) => vec![aud],
        OneOrMany::Many(aud) => aud,
    })
}

// =============================================================================
// Session
// =============================================================================

/// Identity claims kept for greeting the user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub given_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fhir_user: Option<String>,
}

impl From<&IdTokenClaims> for UserProfile {
    fn from(claims: &IdTokenClaims) -> Self {
        Self {
            sub: claims.sub.clone(),
            name: claims.name.clone(),
            given_name: claims.given_name.clone(),
            family_name: claims.family_name.clone(),
            preferred_username: claims.preferred_username.clone(),
            email: claims.email.clone(),
            fhir_user: claims.fhir_user.clone(),
        }
    }
}

impl UserProfile {
    /// Name to greet the user with.
    ///
    /// `name`, then given and family name, then `preferred_username`, then
    /// [`DEFAULT_DISPLAY_NAME`].
    #[must_use]
    pub fn display_name(&self) -> String {
        let non_empty = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        if let Some(name) = non_empty(&self.name) {
            return name;
        }

        let full = [non_empty(&self.given_name), non_empty(&self.family_name)]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");
        if !full.is_empty() {
            return full;
        }

        non_empty(&self.preferred_username).unwrap_or_else(|| DEFAULT_DISPLAY_NAME.to_string())
    }
}

/// An authenticated tab session.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthSession {
    pub access_token: String,
    pub id_token: Option<String>,
    pub refresh_token: Option<String>,
    pub token_type: String,
    pub scope: Option<String>,
    /// Unix timestamp (seconds) at which the access token expires.
    pub expires_at: Option<i64>,
    pub patient_id: Option<String>,
    pub profile: UserProfile,
}

impl AuthSession {
    /// Normalizes a token response and the validated ID token claims.
    #[must_use]
    pub fn from_token_response(response: &ExtendedTokenResponse, claims: &IdTokenClaims) -> Self {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        Self {
            access_token: response.access_token.clone(),
            id_token: response.id_token.clone(),
            refresh_token: response.refresh_token.clone(),
            token_type: response.token_type.clone(),
            scope: response.scope.clone(),
            expires_at: response
                .expires_in
                .map(|secs| now.saturating_add(secs as i64)),
            patient_id: response.patient_id().map(str::to_string),
            profile: UserProfile::from(claims),
        }
    }

    #[must_use]
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|exp| now >= exp)
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(OffsetDateTime::now_utc().unix_timestamp())
    }

    fn to_entries(&self) -> Result<Vec<(SessionKey, String)>, SessionError> {
        let mut entries = vec![
            (SessionKey::AccessToken, self.access_token.clone()),
            (SessionKey::TokenType, self.token_type.clone()),
            (SessionKey::Profile, encode_json(SessionKey::Profile, &self.profile)?),
        ];
        let optional = [
            (SessionKey::IdToken, self.id_token.clone()),
            (SessionKey::RefreshToken, self.refresh_token.clone()),
            (SessionKey::GrantedScope, self.scope.clone()),
            (SessionKey::SessionExpiry, self.expires_at.map(|t| t.to_string())),
            (SessionKey::PatientId, self.patient_id.clone()),
        ];
        entries.extend(
            optional
                .into_iter()
                .filter_map(|(key, value)| value.map(|v| (key, v))),
        );
        Ok(entries)
    }
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("access_token", &"[redacted]")
            .field("id_token", &self.id_token.as_ref().map(|_| "[redacted]"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[redacted]"))
            .field("token_type", &self.token_type)
            .field("scope", &self.scope)
            .field("expires_at", &self.expires_at)
            .field("patient_id", &self.patient_id)
            .field("profile", &self.profile)
            .finish()
    }
}

/// Writes `session` as the tab's only session.
///
/// Any previous session and the parked authorization attempt are removed in
/// the same operation. The launch context is left in place.
pub async fn persist_session(
    store: &dyn SessionStore,
    session: &AuthSession,
) -> Result<(), SessionError> {
    let entries = session.to_entries()?;
    store.replace(&SessionKey::AUTH_KEYS, entries).await
}

/// Reads the tab's session, if one is established.
pub async fn load_session(store: &dyn SessionStore) -> Result<Option<AuthSession>, SessionError> {
    let Some(access_token) = store.get(SessionKey::AccessToken).await? else {
        return Ok(None);
    };

    let expires_at = store
        .get(SessionKey::SessionExpiry)
        .await?
        .and_then(|raw| raw.parse::<i64>().ok());

    Ok(Some(AuthSession {
        access_token,
        id_token: store.get(SessionKey::IdToken).await?,
        refresh_token: store.get(SessionKey::RefreshToken).await?,
        token_type: store
            .get(SessionKey::TokenType)
            .await?
            .unwrap_or_else(default_token_type),
        scope: store.get(SessionKey::GrantedScope).await?,
        expires_at,
        patient_id: store.get(SessionKey::PatientId).await?,
        profile: get_json(store, SessionKey::Profile).await?.unwrap_or_default(),
    }))
}

// =============================================================================
// Callback Result
// =============================================================================

/// Outcome of processing one callback URL. Never stored.
#[derive(Debug, Default)]
pub struct CallbackResult {
    pub session: Option<AuthSession>,
    pub failure: Option<AuthFlowError>,
    /// Non-fatal conditions, such as a missing patient context.
    pub warnings: Vec<ErrorKind>,
}

impl CallbackResult {
    /// Result for a URL that is not the callback route.
    #[must_use]
    pub fn noop() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn failed(error: AuthFlowError) -> Self {
        Self {
            failure: Some(error),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn succeeded(session: AuthSession, warnings: Vec<ErrorKind>) -> Self {
        Self {
            session: Some(session),
            failure: None,
            warnings,
        }
    }

    #[must_use]
    pub fn failure_reason(&self) -> Option<ErrorKind> {
        self.failure.as_ref().map(AuthFlowError::kind)
    }

    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.session.is_none() && self.failure.is_none()
    }
}
