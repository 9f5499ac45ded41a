//! Questionnaire routes.
//!
//! Each tab keeps one [`QuestionnaireSession`] per questionnaire kind,
//! created on first access and dropped at logout.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use dashmap::DashMap;
use ibscare_fhir::load_processed_data;
use ibscare_questionnaire::{
    Question, QuestionnaireAction, QuestionnaireDefinition, QuestionnaireError, QuestionnaireKind,
    QuestionnaireSession, quality_of_life_answers, rome_iv_response,
};
use serde::Serialize;
use serde_json::Value;
use time::OffsetDateTime;

use crate::error::{ApiError, ApiResult};
use crate::server::AppState;
use crate::session::AuthenticatedTab;

/// Questionnaire progress keyed by tab id and kind.
#[derive(Default)]
pub struct QuestionnaireSessions {
    sessions: DashMap<(String, QuestionnaireKind), QuestionnaireSession>,
}

impl QuestionnaireSessions {
    /// Runs `f` on the tab's session for `kind`, creating it if needed.
    ///
    /// The entry stays locked while `f` runs; `f` must not block.
    pub fn update<T>(
        &self,
        tab_id: &str,
        kind: QuestionnaireKind,
        f: impl FnOnce(&mut QuestionnaireSession) -> T,
    ) -> T {
        let mut entry = self
            .sessions
            .entry((tab_id.to_string(), kind))
            .or_insert_with(|| QuestionnaireSession::new(kind));
        f(entry.value_mut())
    }

    /// Runs `f` on the tab's session for `kind` only if it still exists.
    pub fn update_existing<T>(
        &self,
        tab_id: &str,
        kind: QuestionnaireKind,
        f: impl FnOnce(&mut QuestionnaireSession) -> T,
    ) -> Option<T> {
        self.sessions
            .get_mut(&(tab_id.to_string(), kind))
            .map(|mut entry| f(entry.value_mut()))
    }

    /// Copy of the tab's session for `kind`.
    pub fn snapshot(&self, tab_id: &str, kind: QuestionnaireKind) -> QuestionnaireSession {
        self.update(tab_id, kind, |session| session.clone())
    }

    /// Drops every questionnaire belonging to `tab_id`.
    pub fn remove_tab(&self, tab_id: &str) {
        self.sessions.retain(|(id, _), _| id != tab_id);
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionnaireView {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub definition: Option<&'static QuestionnaireDefinition>,
    pub state: QuestionnaireSession,
    pub current_question: Option<&'static Question>,
    pub progress: f64,
    pub unanswered: Vec<&'static str>,
}

impl QuestionnaireView {
    fn of(session: QuestionnaireSession) -> Self {
        Self {
            definition: None,
            current_question: session.current_question(),
            progress: session.progress(),
            unanswered: session.unanswered(),
            state: session,
        }
    }

    fn with_definition(mut self) -> Self {
        self.definition = Some(self.state.definition());
        self
    }
}

fn parse_kind(raw: &str) -> Result<QuestionnaireKind, ApiError> {
    raw.parse::<QuestionnaireKind>().map_err(ApiError::from)
}

/// `GET /api/questionnaires/{kind}`
pub async fn show(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    auth: AuthenticatedTab,
) -> ApiResult<Json<QuestionnaireView>> {
    let kind = parse_kind(&kind)?;
    let session = state.questionnaires.snapshot(&auth.tab.id, kind);
    Ok(Json(QuestionnaireView::of(session).with_definition()))
}

/// `POST /api/questionnaires/{kind}/actions`
pub async fn apply_action(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    auth: AuthenticatedTab,
    Json(action): Json<QuestionnaireAction>,
) -> ApiResult<Json<QuestionnaireView>> {
    let kind = parse_kind(&kind)?;
    let session = state.questionnaires.update(&auth.tab.id, kind, |session| {
        session.apply(action)?;
        Ok::<_, QuestionnaireError>(session.clone())
    })?;
    Ok(Json(QuestionnaireView::of(session)))
}

/// `POST /api/questionnaires/{kind}/submit`
///
/// Rome IV answers are written to the FHIR server as a
/// `QuestionnaireResponse`; quality-of-life answers go to the prediction
/// backend together with the patient digest. A failed submission keeps the
/// confirmation open and answers with the failure's status.
///
/// The send runs in its own task, which records the outcome even when the
/// client goes away mid-request.
pub async fn submit(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    auth: AuthenticatedTab,
) -> ApiResult<(StatusCode, Json<QuestionnaireView>)> {
    let kind = parse_kind(&kind)?;
    let session = state.questionnaires.update(&auth.tab.id, kind, |session| {
        session.begin_submit()?;
        Ok::<_, QuestionnaireError>(session.clone())
    })?;

    let tab_id = auth.tab.id.clone();
    let task_state = state.clone();
    let task = tokio::spawn(async move {
        let sent = send_submission(&task_state, &auth, &session).await;
        record_outcome(&task_state, &auth.tab.id, kind, sent)
    });

    match task.await {
        Ok(recorded) => {
            let (status, session) = recorded?;
            Ok((status, Json(QuestionnaireView::of(session))))
        }
        Err(e) => {
            tracing::error!(questionnaire = %kind, error = %e, "submission task aborted");
            let session = state
                .questionnaires
                .update(&tab_id, kind, |session| {
                    session.complete_submit(Err("The submission was interrupted.".into()))?;
                    Ok::<_, QuestionnaireError>(session.clone())
                })?;
            Ok((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(QuestionnaireView::of(session)),
            ))
        }
    }
}

/// Closes the in-flight submission with `sent`. A tab that logged out in the
/// meantime has nothing left to record.
fn record_outcome(
    state: &AppState,
    tab_id: &str,
    kind: QuestionnaireKind,
    sent: Result<Value, ApiError>,
) -> ApiResult<(StatusCode, QuestionnaireSession)> {
    let (status, outcome) = match sent {
        Ok(result) => (StatusCode::OK, Ok(result)),
        Err(e) => {
            tracing::warn!(
                questionnaire = %kind,
                code = e.code(),
                error = %e,
                "submission failed"
            );
            (e.status(), Err(e.message()))
        }
    };

    let session = state
        .questionnaires
        .update_existing(tab_id, kind, |session| {
            session.complete_submit(outcome)?;
            Ok::<_, QuestionnaireError>(session.clone())
        })
        .ok_or(ApiError::Unauthenticated)??;
    Ok((status, session))
}

async fn send_submission(
    state: &AppState,
    auth: &AuthenticatedTab,
    session: &QuestionnaireSession,
) -> Result<Value, ApiError> {
    match session.kind() {
        QuestionnaireKind::RomeIv => {
            let payload = rome_iv_response(
                session,
                &state.config.questionnaires.rome_iv_url,
                &auth.patient_id,
                OffsetDateTime::now_utc(),
            )?;
            let created = state
                .fhir
                .create(auth.access_token(), "QuestionnaireResponse", &payload)
                .await?;
            tracing::info!(
                id = created.get("id").and_then(serde_json::Value::as_str).unwrap_or("unknown"),
                "Rome IV response stored"
            );
            Ok(created)
        }
        QuestionnaireKind::QualityOfLife => {
            let answers = quality_of_life_answers(session)?;
            let data =
                load_processed_data(&state.fhir, auth.access_token(), &auth.patient_id).await?;
            Ok(state.scoring.predict_quality_of_life(&data, &answers).await?)
        }
    }
}
