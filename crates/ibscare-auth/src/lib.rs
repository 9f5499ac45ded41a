//! SMART-on-FHIR launch and OIDC authorization for IBS Care.
//!
//! The flow spans three browser navigations:
//!
//! 1. `GET /launch?iss=..&launch=..`: [`launch::extract_launch_context`]
//!    parks the EHR launch parameters, then
//!    [`SmartAuthService::initiate_login`] parks a [`PendingAuthorization`]
//!    and returns the provider redirect.
//! 2. The identity provider authenticates the clinician.
//! 3. `GET /callback?code=..&state=..`:
//!    [`SmartAuthService::process_callback`] validates state, exchanges the
//!    code, validates the ID token and yields an [`AuthSession`], which the
//!    caller promotes with [`callback::persist_session`].
//!
//! All cross-navigation state lives in a tab-scoped [`SessionStore`].

pub mod authorize;
pub mod callback;
pub mod config;
pub mod discovery;
pub mod error;
pub mod jwks;
pub mod launch;
pub mod pkce;
pub mod service;
pub mod session;
#[cfg(feature = "test-support")]
pub mod testing;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};

pub use authorize::{
    AuthorizationRedirect, AuthorizationRequestParameters, LaunchMode, PendingAuthorization,
};
pub use callback::{AuthSession, CallbackResult, ExtendedTokenResponse, UserProfile};
pub use config::{DeploymentEnvironment, EndpointOverrides, OidcSettings};
pub use error::{AuthFlowError, AuthFlowResult, ErrorKind};
pub use launch::LaunchContext;
pub use service::{ProviderEndpoints, SmartAuthService};
pub use session::{InMemorySessionStore, SessionKey, SessionRegistry, SessionStore};

/// 32 random bytes encoded as base64url (43 characters).
pub(crate) fn random_token() -> String {
    let mut bytes = [0u8; 32];
    rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
