//! SMART launch, OIDC callback and logout routes.
//!
//! - `GET /launch` - parks the EHR launch context and redirects to the
//!   identity provider
//! - `GET /callback` - completes the authorization and promotes the tab
//!   session
//! - `POST /logout` - clears the tab and ends the provider session

use axum::{
    extract::{OriginalUri, State},
    http::{StatusCode, Uri},
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use ibscare_auth::AuthFlowError;
use ibscare_auth::authorize::{determine_launch_mode, load_pending_authorization};
use ibscare_auth::callback::{load_session, persist_session};
use ibscare_auth::launch::{extract_launch_context, parse_launch_context};
use url::Url;

use crate::error::ApiError;
use crate::server::AppState;
use crate::session::removal_cookie;

const LAUNCH_PATH: &str = "/launch";

impl AppState {
    /// Absolute form of an inbound request URI, rooted at the app's origin.
    fn request_url(&self, uri: &Uri) -> Result<Url, AuthFlowError> {
        let origin = Url::parse(self.config.oidc.redirect_uri()).map_err(|e| {
            AuthFlowError::configuration(format!("invalid redirect URI: {e}"))
        })?;
        let path_and_query = uri.path_and_query().map_or("/", |pq| pq.as_str());
        origin
            .join(path_and_query)
            .map_err(|e| AuthFlowError::configuration(format!("invalid request URI: {e}")))
    }
}

// =============================================================================
// Launch
// =============================================================================

/// `GET /launch?iss=..&launch=..`
///
/// A launch that cannot reach the provider is rejected before any tab
/// session is created.
pub async fn launch(
    State(state): State<AppState>,
    jar: CookieJar,
    OriginalUri(uri): OriginalUri,
) -> Response {
    let inbound = match state.request_url(&uri) {
        Ok(url) => url,
        Err(e) => return ApiError::from(e).into_response(),
    };

    if let Err(e) = determine_launch_mode(
        &parse_launch_context(&inbound),
        state.config.oidc.allow_standalone_launch,
    ) {
        tracing::warn!(kind = %e.kind(), error = %e, "launch rejected");
        return ApiError::from(e).into_response();
    }

    let (jar, tab, created) = state.session_or_create(jar);
    let context = extract_launch_context(&inbound, tab.store.as_ref()).await;
    match state
        .auth
        .initiate_login(&context, &inbound, tab.store.as_ref())
        .await
    {
        Ok(redirect) => (jar, Redirect::to(redirect.url.as_str())).into_response(),
        Err(e) => {
            tracing::warn!(kind = %e.kind(), error = %e, "launch failed");
            if created {
                state.sessions.remove(&tab.id);
                return ApiError::from(e).into_response();
            }
            (jar, ApiError::from(e)).into_response()
        }
    }
}

// =============================================================================
// Callback
// =============================================================================

/// `GET /callback?code=..&state=..`
///
/// Success promotes the tab session and redirects to `/`. Failures answer
/// `401` in place, so a broken sign-in never loops back through the
/// provider.
pub async fn callback(
    State(state): State<AppState>,
    jar: CookieJar,
    OriginalUri(uri): OriginalUri,
) -> Response {
    let url = match state.request_url(&uri) {
        Ok(url) => url,
        Err(e) => return ApiError::from(e).into_response(),
    };

    let tab = state.existing_session(&jar);
    let pending = match &tab {
        Some(tab) => match load_pending_authorization(tab.store.as_ref()).await {
            Ok(pending) => pending,
            Err(e) => {
                tracing::warn!(error = %e, "parked authorization unreadable");
                None
            }
        },
        None => {
            tracing::debug!("callback without a known tab session");
            None
        }
    };

    let result = state.auth.process_callback(&url, pending.as_ref()).await;
    if result.is_noop() {
        return Redirect::to("/").into_response();
    }

    if let Some(failure) = result.failure {
        let mut response = ApiError::from(failure).into_response();
        *response.status_mut() = StatusCode::UNAUTHORIZED;
        return response;
    }

    let (Some(session), Some(tab)) = (result.session, tab) else {
        return ApiError::Unauthenticated.into_response();
    };

    for warning in &result.warnings {
        tracing::warn!(warning = %warning, "session established with warnings");
    }

    if let Err(e) = persist_session(tab.store.as_ref(), &session).await {
        return ApiError::from(e).into_response();
    }
    tracing::info!(has_patient = session.patient_id.is_some(), "tab session established");
    Redirect::to("/").into_response()
}

// =============================================================================
// Logout
// =============================================================================

/// `POST /logout`
pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> Response {
    let tab = state.existing_session(&jar);
    let jar = jar.remove(removal_cookie());
    let Some(tab) = tab else {
        return (jar, Redirect::to(LAUNCH_PATH)).into_response();
    };

    let id_token = match load_session(tab.store.as_ref()).await {
        Ok(session) => session.and_then(|s| s.id_token),
        Err(e) => {
            tracing::warn!(error = %e, "session unreadable during logout");
            None
        }
    };

    if let Err(e) = tab.store.clear_auth().await {
        return (jar, ApiError::from(e)).into_response();
    }
    state.sessions.remove(&tab.id);
    state.questionnaires.remove_tab(&tab.id);
    tracing::info!("tab session cleared");

    let target = match state.auth.end_session_url(id_token.as_deref()).await {
        Ok(Some(url)) => url.to_string(),
        Ok(None) => LAUNCH_PATH.to_string(),
        Err(e) => {
            tracing::warn!(error = %e, "end-session endpoint unavailable");
            LAUNCH_PATH.to_string()
        }
    };
    (jar, Redirect::to(&target)).into_response()
}
