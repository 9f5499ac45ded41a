//! Shared harness: the app bound to an ephemeral port, wired to a mock
//! identity provider and a mock FHIR server.
#![allow(dead_code)]

use ibscare_auth::testing::MockIdentityProvider;
use ibscare_server::{AppConfig, AppState, SESSION_COOKIE, build_app};
use reqwest::header::{COOKIE, LOCATION, SET_COOKIE};
use reqwest::{Response, StatusCode};
use serde_json::{Value, json};
use tokio::sync::oneshot;
use url::Url;
use wiremock::MockServer;

pub const CLIENT_ID: &str = "ibscare-test";
pub const TENANT: &str = "ws-1";
pub const WORKSPACE: &str = "3fa85f64-5717-4562-b3fc-2c963f66afa6";
pub const ACCESS_TOKEN: &str = "tok1";
pub const PATIENT_ID: &str = "pt-42";

pub fn ehr_issuer() -> String {
    format!("https://ehr.example.org/tenants/{WORKSPACE}")
}

pub struct TestApp {
    pub base: String,
    pub client: reqwest::Client,
    pub state: AppState,
    shutdown: Option<oneshot::Sender<()>>,
}

impl Drop for TestApp {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

pub async fn start_app(
    idp: &MockIdentityProvider,
    fhir: &MockServer,
    backend: Option<&MockServer>,
) -> TestApp {
    start_app_with(idp, fhir, backend, |_| {}).await
}

/// Like [`start_app`], with a hook to adjust the configuration.
pub async fn start_app_with(
    idp: &MockIdentityProvider,
    fhir: &MockServer,
    backend: Option<&MockServer>,
    configure: impl FnOnce(&mut AppConfig),
) -> TestApp {
    // Bind first: the redirect URI needs the port
    let listener = tokio::net::TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0))
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();
    let base = format!("http://{addr}");

    let mut cfg = AppConfig::default();
    cfg.oidc = idp
        .settings()
        .with_redirect_uri(format!("{base}/callback"));
    cfg.fhir.base_url = fhir.uri();
    cfg.fhir.tenant_id = TENANT.into();
    if let Some(backend) = backend {
        cfg.backend.analysis_url = Some(format!("{}/analyze", backend.uri()));
        cfg.backend.prediction_url = Some(format!("{}/predict", backend.uri()));
    }
    configure(&mut cfg);
    cfg.validate().expect("valid test config");

    let state = AppState::from_config(&cfg).expect("app state");
    let app = build_app(state.clone());

    let (tx, rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = rx.await;
            })
            .await;
    });

    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap();

    TestApp {
        base,
        client,
        state,
        shutdown: Some(tx),
    }
}

impl TestApp {
    pub async fn get(&self, path: &str, cookie: Option<&str>) -> Response {
        let mut request = self.client.get(format!("{}{path}", self.base));
        if let Some(cookie) = cookie {
            request = request.header(COOKIE, cookie);
        }
        request.send().await.unwrap()
    }

    pub async fn post(&self, path: &str, cookie: Option<&str>, body: Option<Value>) -> Response {
        let mut request = self.client.post(format!("{}{path}", self.base));
        if let Some(cookie) = cookie {
            request = request.header(COOKIE, cookie);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }
        request.send().await.unwrap()
    }

    /// `GET /launch` from the EHR; returns the session cookie and the
    /// provider redirect.
    pub async fn launch(&self) -> (String, Url) {
        let response = self
            .get(
                &format!("/launch?iss={}&launch=abc123", ehr_issuer()),
                None,
            )
            .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let cookie = session_cookie(&response).expect("session cookie");
        (cookie, location(&response))
    }

    /// Runs launch and callback; returns the session cookie of the
    /// established tab.
    pub async fn sign_in(&self, idp: &MockIdentityProvider, patient: Option<&str>) -> String {
        let (cookie, redirect) = self.launch().await;
        let nonce = query_value(&redirect, "nonce").expect("nonce");
        let state = query_value(&redirect, "state").expect("state");

        let mut token_response = json!({
            "access_token": ACCESS_TOKEN,
            "token_type": "Bearer",
            "expires_in": 3600,
            "scope": "openid profile launch patient/*.read",
            "id_token": idp.id_token(&nonce),
        });
        if let Some(patient) = patient {
            token_response["patient"] = json!(patient);
        }
        idp.mount_token_response(token_response).await;

        let response = self
            .get(&format!("/callback?code=code-1&state={state}"), Some(&cookie))
            .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location_header(&response), "/");
        cookie
    }
}

/// `name=value` of the session cookie set by `response`, if any.
pub fn session_cookie(response: &Response) -> Option<String> {
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter(|v| v.starts_with(&format!("{SESSION_COOKIE}=")))
        .map(|v| v.split(';').next().unwrap_or_default().to_string())
        .next()
}

/// The raw `Set-Cookie` header for the session cookie.
pub fn raw_session_cookie(response: &Response) -> Option<String> {
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with(&format!("{SESSION_COOKIE}=")))
        .map(str::to_string)
}

pub fn session_id(cookie: &str) -> &str {
    cookie
        .split_once('=')
        .map(|(_, id)| id)
        .unwrap_or_default()
}

pub fn location_header(response: &Response) -> String {
    response
        .headers()
        .get(LOCATION)
        .expect("location header")
        .to_str()
        .unwrap()
        .to_string()
}

pub fn location(response: &Response) -> Url {
    Url::parse(&location_header(response)).expect("absolute location")
}

pub fn query_value(url: &Url, key: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

pub fn searchset(resources: Vec<Value>) -> Value {
    json!({
        "resourceType": "Bundle",
        "type": "searchset",
        "entry": resources.into_iter().map(|r| json!({"resource": r})).collect::<Vec<_>>()
    })
}
