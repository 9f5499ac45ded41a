//! Tab sessions carried in the `ibscare_session` cookie.
//!
//! The cookie holds only an opaque id; everything else stays in the tab's
//! [`SessionStore`] inside the process-wide registry.

use std::sync::Arc;

use axum::{extract::FromRequestParts, http::request::Parts};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use ibscare_auth::callback::load_session;
use ibscare_auth::{AuthSession, SessionStore};

use crate::error::ApiError;
use crate::server::AppState;

/// Name of the tab session cookie.
pub const SESSION_COOKIE: &str = "ibscare_session";

/// A tab's id and store.
#[derive(Clone)]
pub struct TabSession {
    pub id: String,
    pub store: Arc<dyn SessionStore>,
}

/// Builds the session cookie. No `Max-Age`: it dies with the browser session.
pub fn session_cookie(id: String, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, id))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/")
        .build()
}

/// Cookie that removes the session cookie from the browser.
pub fn removal_cookie() -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE).path("/").build()
}

impl AppState {
    /// The tab named by the request's cookie, if the registry knows it.
    pub fn existing_session(&self, jar: &CookieJar) -> Option<TabSession> {
        let id = jar.get(SESSION_COOKIE)?.value().to_string();
        let store = self.sessions.get(&id)?;
        Some(TabSession { id, store })
    }

    /// The request's tab, or a new one with its cookie added to `jar`.
    ///
    /// The flag is `true` when the tab was created by this call.
    pub fn session_or_create(&self, jar: CookieJar) -> (CookieJar, TabSession, bool) {
        let current = jar.get(SESSION_COOKIE).map(|c| c.value().to_string());
        let (id, store, created) = self.sessions.get_or_create(current.as_deref());
        let jar = if created {
            tracing::debug!("issuing new tab session cookie");
            jar.add(session_cookie(id.clone(), self.secure_cookies()))
        } else {
            jar
        };
        (jar, TabSession { id, store }, created)
    }

    fn secure_cookies(&self) -> bool {
        self.config.oidc.redirect_uri().starts_with("https://")
    }
}

/// A tab with an access token and a patient in context.
///
/// Rejects with `401` JSON otherwise; used by the `/api` routes.
pub struct AuthenticatedTab {
    pub tab: TabSession,
    pub session: AuthSession,
    pub patient_id: String,
}

impl AuthenticatedTab {
    /// Loads the session from `tab`, if it is usable for patient-scoped calls.
    pub async fn load(tab: TabSession) -> Result<Option<Self>, ApiError> {
        let Some(session) = load_session(tab.store.as_ref()).await? else {
            return Ok(None);
        };
        if session.is_expired() {
            tracing::debug!("access token expired");
            return Ok(None);
        }
        let Some(patient_id) = session.patient_id.clone() else {
            return Ok(None);
        };
        Ok(Some(Self {
            tab,
            session,
            patient_id,
        }))
    }

    pub fn access_token(&self) -> &str {
        &self.session.access_token
    }
}

impl FromRequestParts<AppState> for AuthenticatedTab {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let tab = state
            .existing_session(&jar)
            .ok_or(ApiError::Unauthenticated)?;
        Self::load(tab).await?.ok_or(ApiError::Unauthenticated)
    }
}
