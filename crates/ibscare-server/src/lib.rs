//! IBS Care backend-for-frontend.
//!
//! Serves the SMART launch and OIDC callback routes, keeps each browser
//! tab's session server-side, and exposes the patient dashboard,
//! assessment and questionnaires as JSON.

pub mod config;
pub mod error;
pub mod handlers;
pub mod oauth;
pub mod observability;
pub mod questionnaires;
pub mod server;
pub mod session;

pub use config::AppConfig;
pub use error::{ApiError, ApiResult};
pub use observability::{init_tracing, shutdown_tracing};
pub use server::{AppState, IbscareServer, ServerBuilder, build_app};
pub use session::SESSION_COOKIE;
