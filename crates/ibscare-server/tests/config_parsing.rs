use std::{env, fs, time::Duration};

use ibscare_auth::DeploymentEnvironment;
use ibscare_server::config::loader::load_config;

#[test]
fn config_parsing_and_env_overrides_and_validation() {
    // Create a temporary TOML configuration file
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("ibscare.toml");

    let toml_content = r#"
[server]
host = "127.0.0.1"
port = 8081
read_timeout_ms = 1000
body_limit_bytes = 1024

[oidc]
authority = "https://idp.example.org"
client_id = "ibscare"
redirect_uri_local = "http://localhost:8081/callback"
redirect_uri_prod = "https://ibscare.example.org/callback"
environment = "production"
scope = "openid profile launch patient/*.read user/Practitioner.read"
clock_skew = "2m"
pending_ttl = "5m"

[oidc.endpoints]
end_session_endpoint = "https://idp.example.org/logout"

[fhir]
base_url = "https://fhir.example.org/api/fhir"
tenant_id = "ws-1"
request_timeout = "10s"

[backend]
analysis_url = "https://scoring.example.org/analyze"

[logging]
level = "debug"
"#;
    fs::write(&path, toml_content).expect("write toml");

    // 1) Valid config parses
    let cfg = load_config(path.to_str()).expect("should parse config");
    assert_eq!(cfg.server.port, 8081);
    assert_eq!(cfg.oidc.client_id, "ibscare");
    assert_eq!(cfg.oidc.environment, DeploymentEnvironment::Production);
    assert_eq!(cfg.oidc.redirect_uri(), "https://ibscare.example.org/callback");
    assert_eq!(cfg.oidc.clock_skew, Duration::from_secs(120));
    assert_eq!(cfg.oidc.pending_ttl, Duration::from_secs(300));
    assert_eq!(
        cfg.oidc.endpoints.end_session_endpoint.as_deref(),
        Some("https://idp.example.org/logout")
    );
    assert_eq!(
        cfg.fhir.service_base_url(),
        "https://fhir.example.org/api/fhir/ws-1"
    );
    assert_eq!(cfg.fhir.request_timeout, Duration::from_secs(10));
    assert!(cfg.backend.prediction_url.is_none());
    assert_eq!(cfg.logging.level.to_ascii_lowercase(), "debug");
    assert!(cfg.questionnaires.rome_iv_url.contains("/Questionnaire/"));

    // 2) Env override should win over file
    unsafe {
        env::set_var("IBSCARE__OIDC__CLIENT_ID", "from-env");
        env::set_var("IBSCARE__SERVER__PORT", "9090");
    }
    let cfg_env = load_config(path.to_str()).expect("should parse config with env overrides");
    assert_eq!(cfg_env.oidc.client_id, "from-env");
    assert_eq!(cfg_env.server.port, 9090);
    // cleanup env vars
    unsafe {
        env::remove_var("IBSCARE__OIDC__CLIENT_ID");
        env::remove_var("IBSCARE__SERVER__PORT");
    }

    // 3) Unsupported response type should error
    let invalid_path = dir.path().join("invalid.toml");
    let invalid_toml = r#"
[oidc]
client_id = "ibscare"
response_type = "token"
"#;
    fs::write(&invalid_path, invalid_toml).expect("write invalid toml");
    let err = load_config(invalid_path.to_str()).expect_err("response_type must be code");
    assert!(err.contains("response_type"));

    // 4) Missing client id should error
    let empty_path = dir.path().join("empty.toml");
    fs::write(&empty_path, "[logging]\nlevel = \"info\"\n").expect("write empty toml");
    let err = load_config(empty_path.to_str()).expect_err("client id is required");
    assert!(err.contains("client_id"));

    // 5) Bad humantime value should error at deserialization
    let bad_duration_path = dir.path().join("bad_duration.toml");
    fs::write(
        &bad_duration_path,
        "[oidc]\nclient_id = \"ibscare\"\npending_ttl = \"soon\"\n",
    )
    .expect("write toml");
    let err = load_config(bad_duration_path.to_str()).expect_err("invalid duration");
    assert!(err.contains("deserialize"));
}
