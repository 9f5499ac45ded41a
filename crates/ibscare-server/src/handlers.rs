use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use ibscare_auth::UserProfile;
use ibscare_fhir::{Dashboard, IbsAssessment, load_dashboard, load_processed_data};
use serde::Serialize;
use serde_json::Value;
use url::Url;

use crate::error::{ApiError, ApiResult};
use crate::server::AppState;
use crate::session::AuthenticatedTab;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "ok" }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardView {
    pub display_name: String,
    #[serde(flatten)]
    pub dashboard: Dashboard,
}

/// `GET /`: the patient dashboard.
///
/// Without an access token and patient id the tab is sent to `/launch`
/// before any FHIR request is made.
pub async fn dashboard(State(state): State<AppState>, jar: CookieJar) -> ApiResult<Response> {
    let authenticated = match state.existing_session(&jar) {
        Some(tab) => AuthenticatedTab::load(tab).await?,
        None => None,
    };
    let Some(auth) = authenticated else {
        tracing::debug!("no session or patient in context; redirecting to launch");
        return Ok(Redirect::to("/launch").into_response());
    };

    let dashboard = load_dashboard(&state.fhir, auth.access_token(), &auth.patient_id).await;
    Ok(Json(DashboardView {
        display_name: auth.session.profile.display_name(),
        dashboard,
    })
    .into_response())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeView {
    pub display_name: String,
    pub profile: UserProfile,
    pub patient_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_info: Option<Value>,
}

/// `GET /api/me`: who is signed in, and for which patient.
pub async fn me(State(state): State<AppState>, auth: AuthenticatedTab) -> ApiResult<Json<MeView>> {
    let user_info = match user_info_endpoint(&state).await {
        Some(endpoint) => match state
            .auth
            .fetch_user_info(&endpoint, auth.access_token())
            .await
        {
            Ok(info) => Some(info),
            Err(e) => {
                tracing::warn!(kind = %e.kind(), error = %e, "user info unavailable");
                None
            }
        },
        None => None,
    };

    let display_name = user_info
        .as_ref()
        .and_then(|info| info.get("name"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| auth.session.profile.display_name());

    Ok(Json(MeView {
        display_name,
        profile: auth.session.profile.clone(),
        patient_id: auth.patient_id.clone(),
        user_info,
    }))
}

/// The configured user-info endpoint, else the provider's advertised one.
async fn user_info_endpoint(state: &AppState) -> Option<Url> {
    if let Some(configured) = &state.config.fhir.user_info_endpoint {
        return Url::parse(configured).ok();
    }
    match state.auth.endpoints().await {
        Ok(endpoints) => endpoints.userinfo,
        Err(e) => {
            tracing::debug!(error = %e, "provider metadata unavailable for user info");
            None
        }
    }
}

/// `GET /api/assessment`: the scoring backend's IBS assessment for the
/// patient in context.
pub async fn assessment(
    State(state): State<AppState>,
    auth: AuthenticatedTab,
) -> ApiResult<Json<IbsAssessment>> {
    let data = load_processed_data(&state.fhir, auth.access_token(), &auth.patient_id).await?;
    tracing::debug!(
        conditions = data.relevant_conditions.len(),
        observations = data.relevant_observations.len(),
        "requesting IBS assessment"
    );
    let assessment = state.scoring.assess(&data).await.map_err(ApiError::from)?;
    Ok(Json(assessment))
}
