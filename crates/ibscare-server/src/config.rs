use std::{net::SocketAddr, time::Duration};

use ibscare_auth::OidcSettings;
use ibscare_fhir::{FhirSettings, ScoringSettings};
use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    /// Identity provider and SMART launch settings
    #[serde(default)]
    pub oidc: OidcSettings,
    #[serde(default)]
    pub fhir: FhirSettings,
    /// Analysis and quality-of-life prediction backend
    #[serde(default)]
    pub backend: ScoringSettings,
    #[serde(default)]
    pub questionnaires: QuestionnaireConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        // Server validations
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        if self.server.read_timeout_ms == 0 {
            return Err("server.read_timeout_ms must be > 0".into());
        }
        if self.server.session_idle_timeout_secs == 0 {
            return Err("server.session_idle_timeout_secs must be > 0".into());
        }
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }

        self.oidc.validate()?;

        Url::parse(&self.fhir.service_base_url())
            .map_err(|e| format!("fhir.base_url is not a valid URL: {e}"))?;
        if let Some(endpoint) = &self.fhir.user_info_endpoint {
            Url::parse(endpoint)
                .map_err(|e| format!("fhir.user_info_endpoint is not a valid URL: {e}"))?;
        }
        for (name, value) in [
            ("backend.analysis_url", &self.backend.analysis_url),
            ("backend.prediction_url", &self.backend.prediction_url),
        ] {
            if let Some(url) = value {
                Url::parse(url).map_err(|e| format!("{name} is not a valid URL: {e}"))?;
            }
        }
        if self.questionnaires.rome_iv_url.trim().is_empty() {
            return Err("questionnaires.rome_iv_url must not be empty".into());
        }
        Ok(())
    }

    pub fn addr(&self) -> SocketAddr {
        use std::net::{IpAddr, Ipv4Addr};
        let host: IpAddr = self
            .server
            .host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));
        SocketAddr::from((host, self.server.port))
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.server.read_timeout_ms))
    }

    pub fn session_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.server.session_idle_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u32,
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
    /// Tab sessions unused for this long are dropped.
    #[serde(default = "default_session_idle_timeout_secs")]
    pub session_idle_timeout_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    4434
}
fn default_read_timeout_ms() -> u32 {
    60_000
}
fn default_body_limit() -> usize {
    256 * 1024
}
fn default_session_idle_timeout_secs() -> u64 {
    8 * 60 * 60
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            read_timeout_ms: default_read_timeout_ms(),
            body_limit_bytes: default_body_limit(),
            session_idle_timeout_secs: default_session_idle_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionnaireConfig {
    /// Canonical URL written into submitted Rome IV responses.
    #[serde(default = "default_rome_iv_url")]
    pub rome_iv_url: String,
}

fn default_rome_iv_url() -> String {
    "https://app.meldrx.com/api/fhir/3eb16078-78c9-4b9f-9974-ea89dbb34c71/Questionnaire/fe7cb8b0-b68d-4b86-b624-6cb83cd0d429".into()
}

impl Default for QuestionnaireConfig {
    fn default() -> Self {
        Self {
            rome_iv_url: default_rome_iv_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    /// Default configuration file, looked up in the working directory.
    pub const DEFAULT_CONFIG_PATH: &str = "ibscare.toml";

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_PATH));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        }
        // Environment variable overrides, e.g., IBSCARE__OIDC__CLIENT_ID=ibscare
        builder = builder.add_source(
            Environment::with_prefix("IBSCARE")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }
}
