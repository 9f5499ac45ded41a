//! A mock OIDC identity provider for integration tests.
//!
//! Serves discovery and an ES384 JWKS from a `wiremock` server and signs ID
//! tokens with the matching private key. Token endpoint responses are mounted
//! per test.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use p384::ecdsa::SigningKey;
use p384::pkcs8::{EncodePrivateKey, LineEnding};
use rand::rngs::OsRng;
use serde_json::{Value, json};
use time::OffsetDateTime;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::config::OidcSettings;

/// Key id the mock provider signs with.
pub const MOCK_KID: &str = "mock-key-1";

/// Wiremock-backed identity provider.
pub struct MockIdentityProvider {
    server: MockServer,
    encoding_key: EncodingKey,
    client_id: String,
}

impl MockIdentityProvider {
    /// Starts the provider and mounts discovery and JWKS.
    ///
    /// # Panics
    ///
    /// Panics if key generation fails.
    pub async fn start(client_id: &str) -> Self {
        let server = MockServer::start().await;

        let secret = p384::SecretKey::random(&mut OsRng);
        let point = SigningKey::from(&secret).verifying_key().to_encoded_point(false);
        let x = URL_SAFE_NO_PAD.encode(point.x().expect("x coordinate"));
        let y = URL_SAFE_NO_PAD.encode(point.y().expect("y coordinate"));
        let pem = secret
            .to_pkcs8_pem(LineEnding::LF)
            .expect("encode private key");
        let encoding_key = EncodingKey::from_ec_pem(pem.as_bytes()).expect("load private key");

        let issuer = server.uri();
        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "issuer": issuer,
                "authorization_endpoint": format!("{issuer}/authorize"),
                "token_endpoint": format!("{issuer}/token"),
                "jwks_uri": format!("{issuer}/jwks"),
                "userinfo_endpoint": format!("{issuer}/userinfo"),
                "end_session_endpoint": format!("{issuer}/logout"),
                "response_types_supported": ["code"],
                "code_challenge_methods_supported": ["S256"],
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "keys": [{
                    "kty": "EC",
                    "crv": "P-384",
                    "x": x,
                    "y": y,
                    "kid": MOCK_KID,
                    "alg": "ES384",
                    "use": "sig",
                }]
            })))
            .mount(&server)
            .await;

        Self {
            server,
            encoding_key,
            client_id: client_id.to_string(),
        }
    }

    /// The provider's issuer (and authority) URL.
    #[must_use]
    pub fn issuer(&self) -> String {
        self.server.uri()
    }

    #[must_use]
    pub fn server(&self) -> &MockServer {
        &self.server
    }

    /// Client settings pointing at this provider.
    #[must_use]
    pub fn settings(&self) -> OidcSettings {
        OidcSettings::new(self.issuer(), self.client_id.clone()).with_allow_http(true)
    }

    /// Signs arbitrary claims with the provider key.
    ///
    /// # Panics
    ///
    /// Panics if signing fails.
    #[must_use]
    pub fn sign(&self, claims: &Value) -> String {
        let mut header = Header::new(Algorithm::ES384);
        header.kid = Some(MOCK_KID.to_string());
        jsonwebtoken::encode(&header, claims, &self.encoding_key).expect("sign id token")
    }

    /// Standard ID token claims for `nonce`.
    #[must_use]
    pub fn id_token_claims(&self, nonce: &str) -> Value {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        json!({
            "iss": self.issuer(),
            "sub": "practitioner-1",
            "aud": self.client_id,
            "iat": now,
            "exp": now + 300,
            "nonce": nonce,
            "given_name": "Ada",
            "family_name": "Lovelace",
            "preferred_username": "ada",
            "fhirUser": "Practitioner/1",
        })
    }

    /// A valid signed ID token for `nonce`.
    #[must_use]
    pub fn id_token(&self, nonce: &str) -> String {
        self.sign(&self.id_token_claims(nonce))
    }

    /// Mounts a successful token endpoint response.
    pub async fn mount_token_response(&self, body: Value) {
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// Mounts a failing token endpoint response.
    pub async fn mount_token_error(&self, status: u16, body: Value) {
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// Mounts a user-info endpoint response.
    pub async fn mount_user_info(&self, body: Value) {
        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }
}
