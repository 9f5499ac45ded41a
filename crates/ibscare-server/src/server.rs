use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    BoxError, Router,
    error_handling::HandleErrorLayer,
    http::StatusCode,
    routing::{get, post},
};
use ibscare_auth::{SessionRegistry, SmartAuthService};
use ibscare_fhir::{FhirClient, ScoringClient};
use tower::{ServiceBuilder, timeout::TimeoutLayer};
use tower_http::{compression::CompressionLayer, trace::TraceLayer};

use crate::questionnaires::QuestionnaireSessions;
use crate::{config::AppConfig, handlers, oauth, questionnaires};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub auth: Arc<SmartAuthService>,
    pub sessions: Arc<SessionRegistry>,
    pub fhir: FhirClient,
    pub scoring: ScoringClient,
    pub questionnaires: Arc<QuestionnaireSessions>,
}

impl AppState {
    pub fn from_config(cfg: &AppConfig) -> anyhow::Result<Self> {
        let auth = SmartAuthService::shared(cfg.oidc.clone())?;
        let fhir = FhirClient::new(&cfg.fhir)?;
        let scoring = ScoringClient::new(&cfg.backend)?;
        Ok(Self {
            config: Arc::new(cfg.clone()),
            auth,
            sessions: Arc::new(SessionRegistry::new()),
            fhir,
            scoring,
            questionnaires: Arc::new(QuestionnaireSessions::default()),
        })
    }
}

impl AppState {
    /// Drops tab sessions idle past the configured timeout, together with
    /// their questionnaires. Returns how many tabs were removed.
    pub fn sweep_idle_sessions(&self) -> usize {
        let expired = self.sessions.sweep_idle(self.config.session_idle_timeout());
        for id in &expired {
            self.questionnaires.remove_tab(id);
        }
        expired.len()
    }
}

/// Periodically sweeps idle tab sessions until the runtime shuts down.
pub fn spawn_session_sweeper(state: AppState) -> tokio::task::JoinHandle<()> {
    let period = (state.config.session_idle_timeout() / 4).max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let removed = state.sweep_idle_sessions();
            if removed > 0 {
                tracing::info!(removed, "expired idle tab sessions");
            }
        }
    })
}

pub struct IbscareServer {
    addr: SocketAddr,
    state: AppState,
    app: Router,
}

pub fn build_app(state: AppState) -> Router {
    let body_limit = state.config.server.body_limit_bytes;
    let read_timeout = state.config.read_timeout();
    Router::new()
        // Health
        .route("/health", get(handlers::health))
        // SMART launch, OIDC callback and logout
        .route("/launch", get(oauth::launch))
        .route(&state.config.oidc.callback_path, get(oauth::callback))
        .route("/logout", post(oauth::logout))
        // Patient views
        .route("/", get(handlers::dashboard))
        .route("/api/me", get(handlers::me))
        .route("/api/assessment", get(handlers::assessment))
        // Questionnaires
        .route("/api/questionnaires/{kind}", get(questionnaires::show))
        .route(
            "/api/questionnaires/{kind}/actions",
            post(questionnaires::apply_action),
        )
        .route(
            "/api/questionnaires/{kind}/submit",
            post(questionnaires::submit),
        )
        .layer(CompressionLayer::new())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    use tracing::field::Empty;
                    // Path only: launch and callback query strings carry codes and state.
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri().path(),
                        http.status_code = Empty,
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>, latency: Duration, span: &tracing::Span| {
                        span.record(
                            "http.status_code",
                            tracing::field::display(res.status().as_u16()),
                        );
                        tracing::info!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        )
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_timeout))
                .layer(TimeoutLayer::new(read_timeout)),
        )
        .layer(axum::extract::DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

async fn handle_timeout(err: BoxError) -> (StatusCode, String) {
    if err.is::<tower::timeout::error::Elapsed>() {
        (StatusCode::REQUEST_TIMEOUT, "request timed out".to_string())
    } else {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("unhandled internal error: {err}"),
        )
    }
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
        }
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    pub fn build(self) -> anyhow::Result<IbscareServer> {
        let state = AppState::from_config(&self.config)?;
        Ok(IbscareServer {
            addr: self.addr,
            app: build_app(state.clone()),
            state,
        })
    }
}

impl IbscareServer {
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        let sweeper = spawn_session_sweeper(self.state);
        let served = axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await;
        sweeper.abort();
        served?;
        Ok(())
    }
}

async fn shutdown_signal() {
    // Wait for Ctrl+C
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
