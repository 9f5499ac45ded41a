//! SMART launch orchestration against the configured identity provider.
//!
//! [`SmartAuthService`] owns the HTTP client and the discovery and JWKS
//! caches. It starts a login from a captured [`LaunchContext`] and turns the
//! provider's redirect back into a [`CallbackResult`]. Persisting the result
//! is left to the caller.

use std::sync::Arc;

use jsonwebtoken::{Validation, decode_header};
use serde_json::Value;
use url::Url;

use crate::authorize::{
    AuthorizationRedirect, AuthorizationRequestParameters, PendingAuthorization,
    build_authorization_url, determine_launch_mode, park_pending_authorization,
};
use crate::callback::{
    AuthSession, CallbackParams, CallbackResult, ExtendedTokenResponse, IdTokenClaims,
    OAuthErrorResponse,
};
use crate::config::OidcSettings;
use crate::discovery::{DiscoveryCache, DiscoveryConfig};
use crate::error::{AuthFlowError, ErrorKind};
use crate::jwks::{JwksCache, JwksCacheConfig};
use crate::launch::LaunchContext;
use crate::pkce::PkceVerifier;
use crate::session::SessionStore;

/// Provider endpoints after applying configuration overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEndpoints {
    pub issuer: String,
    pub authorization: Url,
    pub token: Url,
    pub jwks: Url,
    pub userinfo: Option<Url>,
    pub end_session: Option<Url>,
}

/// Relying-party side of the SMART / OIDC handshake.
pub struct SmartAuthService {
    settings: OidcSettings,
    http_client: reqwest::Client,
    discovery: DiscoveryCache,
    jwks: JwksCache,
}

impl SmartAuthService {
    /// Creates the service and its HTTP client.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the HTTP client cannot be built.
    pub fn new(settings: OidcSettings) -> Result<Self, AuthFlowError> {
        let http_client = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| AuthFlowError::configuration(format!("HTTP client: {e}")))?;

        let discovery = DiscoveryCache::with_client(
            http_client.clone(),
            DiscoveryConfig::default()
                .with_request_timeout(settings.request_timeout)
                .with_allow_http(settings.allow_http),
        );
        let jwks = JwksCache::with_client(
            http_client.clone(),
            JwksCacheConfig::default()
                .with_request_timeout(settings.request_timeout)
                .with_allow_http(settings.allow_http),
        );

        Ok(Self {
            settings,
            http_client,
            discovery,
            jwks,
        })
    }

    /// Convenience for sharing the service between handlers.
    pub fn shared(settings: OidcSettings) -> Result<Arc<Self>, AuthFlowError> {
        Self::new(settings).map(Arc::new)
    }

    #[must_use]
    pub fn settings(&self) -> &OidcSettings {
        &self.settings
    }

    /// Resolves provider endpoints.
    ///
    /// Discovery is skipped when the authorization, token and JWKS endpoints
    /// are all configured explicitly.
    pub async fn endpoints(&self) -> Result<ProviderEndpoints, AuthFlowError> {
        let overrides = &self.settings.endpoints;
        let parse = |name: &str, value: &str| {
            Url::parse(value)
                .map_err(|e| AuthFlowError::configuration(format!("invalid {name} '{value}': {e}")))
        };
        let parse_opt = |name: &str, value: Option<&String>| {
            value.map(|v| parse(name, v.as_str())).transpose()
        };

        if let (Some(authorization), Some(token), Some(jwks)) = (
            overrides.authorization_endpoint.as_deref(),
            overrides.token_endpoint.as_deref(),
            overrides.jwks_uri.as_deref(),
        ) {
            return Ok(ProviderEndpoints {
                issuer: self.settings.authority.clone(),
                authorization: parse("authorization_endpoint", authorization)?,
                token: parse("token_endpoint", token)?,
                jwks: parse("jwks_uri", jwks)?,
                userinfo: parse_opt("userinfo_endpoint", overrides.userinfo_endpoint.as_ref())?,
                end_session: parse_opt(
                    "end_session_endpoint",
                    overrides.end_session_endpoint.as_ref(),
                )?,
            });
        }

        let metadata = self.discovery.get(&self.settings.authority_url()?).await?;
        if !metadata.supports_s256() {
            return Err(AuthFlowError::configuration(
                "identity provider does not support S256 PKCE",
            ));
        }

        let pick = |override_value: &Option<String>, discovered: &str| {
            override_value.clone().unwrap_or_else(|| discovered.to_string())
        };

        Ok(ProviderEndpoints {
            authorization: parse(
                "authorization_endpoint",
                &pick(&overrides.authorization_endpoint, &metadata.authorization_endpoint),
            )?,
            token: parse(
                "token_endpoint",
                &pick(&overrides.token_endpoint, &metadata.token_endpoint),
            )?,
            jwks: parse("jwks_uri", &pick(&overrides.jwks_uri, &metadata.jwks_uri))?,
            userinfo: parse_opt(
                "userinfo_endpoint",
                overrides
                    .userinfo_endpoint
                    .as_ref()
                    .or(metadata.userinfo_endpoint.as_ref()),
            )?,
            end_session: parse_opt(
                "end_session_endpoint",
                overrides
                    .end_session_endpoint
                    .as_ref()
                    .or(metadata.end_session_endpoint.as_ref()),
            )?,
            issuer: metadata.issuer,
        })
    }

    // =========================================================================
    // Login
    // =========================================================================

    /// Starts a login for a captured launch context.
    ///
    /// Only the launch route calls this, passing the context it just
    /// extracted and the inbound launch URL. The parked
    /// [`PendingAuthorization`] is written before the redirect is returned.
    ///
    /// # Errors
    ///
    /// `MissingLaunchContext` when no issuer was captured and standalone
    /// launch is disabled; nothing is parked and no redirect is produced.
    pub async fn initiate_login(
        &self,
        launch: &LaunchContext,
        inbound: &Url,
        store: &dyn SessionStore,
    ) -> Result<AuthorizationRedirect, AuthFlowError> {
        let mode = determine_launch_mode(launch, self.settings.allow_standalone_launch)?;
        let endpoints = self.endpoints().await?;

        let parameters = AuthorizationRequestParameters::from_inbound(
            inbound,
            self.settings.configured_scopes(),
        );
        let pending = PendingAuthorization::new(
            self.settings.redirect_uri(),
            mode,
            self.settings.pending_ttl.as_secs(),
        );
        let challenge = pending
            .verifier()
            .map_err(|e| AuthFlowError::configuration(format!("generated verifier invalid: {e}")))?
            .challenge();

        let url = build_authorization_url(
            &endpoints.authorization,
            &self.settings.client_id,
            &self.settings.response_type,
            &parameters,
            &pending,
            &challenge,
        );

        park_pending_authorization(store, &pending)
            .await
            .map_err(|e| AuthFlowError::session_storage(e.to_string()))?;

        tracing::info!(
            mode = ?mode,
            authorization_endpoint = %endpoints.authorization,
            scope = %parameters.scope_string(),
            "redirecting to identity provider"
        );

        Ok(AuthorizationRedirect {
            url,
            mode,
            parameters,
        })
    }

    // =========================================================================
    // Callback
    // =========================================================================

    /// Processes the provider's redirect back to the app.
    ///
    /// Returns a no-op result when `url` is not the configured callback path.
    /// Failures are reported in the result, never as an `Err`; a result with
    /// a failure never carries a session.
    pub async fn process_callback(
        &self,
        url: &Url,
        pending: Option<&PendingAuthorization>,
    ) -> CallbackResult {
        if url.path() != self.settings.callback_path {
            tracing::debug!(path = url.path(), "not the callback route; ignoring");
            return CallbackResult::noop();
        }

        match self.complete_authorization(url, pending).await {
            Ok((session, warnings)) => {
                tracing::info!(
                    has_patient = session.patient_id.is_some(),
                    "authorization completed"
                );
                CallbackResult::succeeded(session, warnings)
            }
            Err(error) => {
                tracing::warn!(
                    kind = %error.kind(),
                    error = %error,
                    "authorization callback failed"
                );
                CallbackResult::failed(error)
            }
        }
    }

    async fn complete_authorization(
        &self,
        url: &Url,
        pending: Option<&PendingAuthorization>,
    ) -> Result<(AuthSession, Vec<ErrorKind>), AuthFlowError> {
        let params = CallbackParams::from_url(url);

        if let Some(error) = params.error {
            return Err(AuthFlowError::provider(error, params.error_description));
        }

        let code = params.code.ok_or(AuthFlowError::MissingAuthorizationCode)?;

        let pending = pending.ok_or_else(|| {
            AuthFlowError::security("no authorization request is pending for this session")
        })?;
        let state = params
            .state
            .ok_or_else(|| AuthFlowError::security("state parameter missing"))?;
        if !pending.matches_state(&state) {
            return Err(AuthFlowError::security("state mismatch"));
        }
        if pending.is_expired() {
            return Err(AuthFlowError::security("authorization request expired"));
        }
        let verifier = pending
            .verifier()
            .map_err(|e| AuthFlowError::security(format!("parked PKCE verifier invalid: {e}")))?;

        let endpoints = self.endpoints().await?;
        let response = self
            .exchange_code(&endpoints, &code, &pending.redirect_uri, &verifier)
            .await?;

        let id_token = response
            .id_token
            .as_deref()
            .ok_or_else(|| AuthFlowError::security("token response carried no id_token"))?;
        let claims = self
            .validate_id_token(&endpoints, id_token, &pending.nonce)
            .await?;

        let mut warnings = Vec::new();
        if response.patient_id().is_none() {
            tracing::warn!(
                claim_present = response.patient.is_some(),
                "token response has no patient context"
            );
            warnings.push(ErrorKind::NoPatientContext);
        }

        Ok((AuthSession::from_token_response(&response, &claims), warnings))
    }

    async fn exchange_code(
        &self,
        endpoints: &ProviderEndpoints,
        code: &str,
        redirect_uri: &str,
        verifier: &PkceVerifier,
    ) -> Result<ExtendedTokenResponse, AuthFlowError> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("client_id", self.settings.client_id.as_str()),
            ("code_verifier", verifier.as_str()),
        ];

        tracing::debug!(token_endpoint = %endpoints.token, "exchanging authorization code");

        let response = self
            .http_client
            .post(endpoints.token.as_str())
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&params)
            .send()
            .await
            .map_err(|e| AuthFlowError::network(format!("token endpoint unreachable: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();

            if let Ok(oauth_error) = serde_json::from_str::<OAuthErrorResponse>(&body) {
                return Err(AuthFlowError::provider(
                    oauth_error.error,
                    oauth_error.error_description,
                ));
            }

            return Err(AuthFlowError::token_exchange(format!("HTTP {status} - {body}")));
        }

        response
            .json()
            .await
            .map_err(|e| AuthFlowError::token_exchange(format!("unreadable token response: {e}")))
    }

    async fn validate_id_token(
        &self,
        endpoints: &ProviderEndpoints,
        id_token: &str,
        expected_nonce: &str,
    ) -> Result<IdTokenClaims, AuthFlowError> {
        let header = decode_header(id_token)
            .map_err(|e| AuthFlowError::security(format!("malformed id_token: {e}")))?;
        let kid = header
            .kid
            .ok_or_else(|| AuthFlowError::security("id_token header has no kid"))?;

        let (decoding_key, key_alg) = self.jwks.get_key(&endpoints.jwks, &kid).await?;
        if let Some(key_alg) = key_alg
            && key_alg != header.alg
        {
            return Err(AuthFlowError::security(format!(
                "id_token algorithm {:?} does not match key algorithm {key_alg:?}",
                header.alg
            )));
        }

        let issuer = endpoints.issuer.trim_end_matches('/');
        let mut validation = Validation::new(header.alg);
        validation.set_audience(&[self.settings.client_id.as_str()]);
        validation.set_issuer(&[issuer.to_string(), format!("{issuer}/")]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
        validation.leeway = self.settings.clock_skew.as_secs();

        let claims = jsonwebtoken::decode::<IdTokenClaims>(id_token, &decoding_key, &validation)
            .map_err(|e| AuthFlowError::security(format!("id_token rejected: {e}")))?
            .claims;

        match claims.nonce.as_deref() {
            Some(nonce) if nonce == expected_nonce => {}
            _ => return Err(AuthFlowError::security("nonce mismatch")),
        }

        tracing::debug!(sub = %claims.sub, "validated id_token");
        Ok(claims)
    }

    // =========================================================================
    // User info and logout
    // =========================================================================

    /// Fetches user-info claims with the session's bearer token.
    pub async fn fetch_user_info(
        &self,
        endpoint: &Url,
        access_token: &str,
    ) -> Result<Value, AuthFlowError> {
        let response = self
            .http_client
            .get(endpoint.as_str())
            .bearer_auth(access_token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| AuthFlowError::network(format!("user info unreachable: {e}")))?;

        if !response.status().is_success() {
            return Err(AuthFlowError::provider(
                format!("userinfo_http_{}", response.status().as_u16()),
                None,
            ));
        }

        response
            .json()
            .await
            .map_err(|e| AuthFlowError::provider("invalid_userinfo", Some(e.to_string())))
    }

    /// Builds the RP-initiated logout URL, if the provider has one.
    pub async fn end_session_url(
        &self,
        id_token_hint: Option<&str>,
    ) -> Result<Option<Url>, AuthFlowError> {
        let Some(mut url) = self.endpoints().await?.end_session else {
            return Ok(None);
        };

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("client_id", &self.settings.client_id);
            if let Some(hint) = id_token_hint {
                query.append_pair("id_token_hint", hint);
            }
            if let Some(redirect) = &self.settings.post_logout_redirect_uri {
                query.append_pair("post_logout_redirect_uri", redirect);
            }
        }
        Ok(Some(url))
    }
}
