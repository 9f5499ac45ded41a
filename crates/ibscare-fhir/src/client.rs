//! Bearer-authenticated FHIR REST client.
//!
//! Every request carries `Authorization: Bearer <token>` and
//! `Accept: application/fhir+json`. Absolute URLs are only followed when they
//! fall under the configured base, so the access token never leaves the FHIR
//! server.

use reqwest::Method;
use serde_json::Value;
use url::Url;

use crate::config::FhirSettings;
use crate::error::{FhirClientError, FhirResult};

const FHIR_JSON: &str = "application/fhir+json";

#[derive(Debug, Clone)]
pub struct FhirClient {
    http: reqwest::Client,
    base_url: Url,
}

impl FhirClient {
    pub fn new(settings: &FhirSettings) -> FhirResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| FhirClientError::transport(e.to_string()))?;
        Self::with_client(http, &settings.service_base_url())
    }

    pub fn with_client(http: reqwest::Client, base_url: &str) -> FhirResult<Self> {
        let mut base = Url::parse(base_url)
            .map_err(|e| FhirClientError::invalid_url(format!("{base_url}: {e}")))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self {
            http,
            base_url: base,
        })
    }

    /// Service base, always ending in `/`.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolves a relative reference (`Patient/1`, `Condition?patient=1`) or an
    /// absolute URL under the base.
    pub fn resolve(&self, reference: &str) -> FhirResult<Url> {
        let url = match Url::parse(reference) {
            Ok(url) => url,
            Err(url::ParseError::RelativeUrlWithoutBase) => self
                .base_url
                .join(reference.trim_start_matches('/'))
                .map_err(|e| FhirClientError::invalid_url(format!("{reference}: {e}")))?,
            Err(e) => return Err(FhirClientError::invalid_url(format!("{reference}: {e}"))),
        };
        if !url.as_str().starts_with(self.base_url.as_str()) {
            return Err(FhirClientError::invalid_url(format!(
                "{} is outside the FHIR base",
                url.origin().ascii_serialization()
            )));
        }
        Ok(url)
    }

    /// GETs `url` (relative to the base, or absolute under it) and returns the
    /// decoded JSON.
    pub async fn fetch_resource(&self, access_token: &str, url: &str) -> FhirResult<Value> {
        let url = self.resolve(url)?;
        self.send(self.request(Method::GET, url, access_token)).await
    }

    pub async fn read(
        &self,
        access_token: &str,
        resource_type: &str,
        id: &str,
    ) -> FhirResult<Value> {
        self.fetch_resource(access_token, &format!("{resource_type}/{id}"))
            .await
    }

    /// Runs a type-level search and returns the `Bundle`.
    pub async fn search(
        &self,
        access_token: &str,
        resource_type: &str,
        params: &[(&str, &str)],
    ) -> FhirResult<Value> {
        let url = self.resolve(resource_type)?;
        let builder = self.request(Method::GET, url, access_token).query(params);
        self.send(builder).await
    }

    pub async fn create(
        &self,
        access_token: &str,
        resource_type: &str,
        body: &Value,
    ) -> FhirResult<Value> {
        let url = self.resolve(resource_type)?;
        let builder = self
            .request(Method::POST, url, access_token)
            .header(reqwest::header::CONTENT_TYPE, FHIR_JSON)
            .body(body.to_string());
        self.send(builder).await
    }

    fn request(&self, method: Method, url: Url, access_token: &str) -> reqwest::RequestBuilder {
        tracing::debug!(method = %method, path = %url.path(), "FHIR request");
        self.http
            .request(method, url)
            .bearer_auth(access_token)
            .header(reqwest::header::ACCEPT, FHIR_JSON)
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> FhirResult<Value> {
        let response = builder
            .send()
            .await
            .map_err(|e| FhirClientError::transport(e.without_url().to_string()))?;
        handle_response(response).await
    }
}

async fn handle_response(response: reqwest::Response) -> FhirResult<Value> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| FhirClientError::transport(e.without_url().to_string()))?;

    if !status.is_success() {
        tracing::warn!(status = status.as_u16(), "FHIR server returned an error");
        return Err(FhirClientError::http(status.as_u16(), body));
    }

    if body.trim().is_empty() {
        return Ok(Value::Null);
    }

    serde_json::from_str(&body).map_err(|e| FhirClientError::decode(e.to_string()))
}
