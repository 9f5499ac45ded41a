//! Authenticated JSON routes against mock FHIR and scoring servers.

mod common;

use common::*;
use ibscare_auth::testing::MockIdentityProvider;
use reqwest::StatusCode;
use serde_json::{Value, json};
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_get(server: &MockServer, resource_path: &str, body: Value) {
    Mock::given(method("GET"))
        .and(path(resource_path))
        .and(header("authorization", format!("Bearer {ACCESS_TOKEN}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

async fn mount_patient_record(fhir: &MockServer) {
    mount_get(
        fhir,
        &format!("/{TENANT}/Patient/{PATIENT_ID}"),
        json!({
            "resourceType": "Patient",
            "id": PATIENT_ID,
            "name": [{"given": ["Jane"], "family": "Doe"}],
            "gender": "female",
            "birthDate": "1985-03-02"
        }),
    )
    .await;
    mount_get(
        fhir,
        &format!("/{TENANT}/Condition"),
        searchset(vec![json!({
            "resourceType": "Condition",
            "id": "c1",
            "code": {"coding": [{"code": "10743008", "display": "Irritable bowel syndrome"}]},
            "clinicalStatus": {"coding": [{"code": "active"}]},
            "recordedDate": "2023-01-10"
        })]),
    )
    .await;
    mount_get(
        fhir,
        &format!("/{TENANT}/Observation"),
        searchset(vec![json!({
            "resourceType": "Observation",
            "id": "o1",
            "code": {"text": "Abdominal pain score"},
            "valueQuantity": {"value": 6, "unit": "/10"},
            "effectiveDateTime": "2024-05-01"
        })]),
    )
    .await;
}

async fn act(app: &TestApp, cookie: &str, kind: &str, action: Value) -> Value {
    let response = app
        .post(
            &format!("/api/questionnaires/{kind}/actions"),
            Some(cookie),
            Some(action),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    response.json().await.unwrap()
}

#[tokio::test]
async fn health_is_public() {
    let idp = MockIdentityProvider::start(CLIENT_ID).await;
    let fhir = MockServer::start().await;
    let app = start_app(&idp, &fhir, None).await;

    let response = app.get("/health", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn api_routes_answer_401_without_session() {
    let idp = MockIdentityProvider::start(CLIENT_ID).await;
    let fhir = MockServer::start().await;
    let app = start_app(&idp, &fhir, None).await;

    for path in ["/api/me", "/api/assessment", "/api/questionnaires/rome-iv"] {
        let response = app.get(path, None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{path}");
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error"], "unauthenticated");
    }
}

#[tokio::test]
async fn dashboard_loads_panels_independently() {
    let idp = MockIdentityProvider::start(CLIENT_ID).await;
    let fhir = MockServer::start().await;
    mount_patient_record(&fhir).await;
    Mock::given(method("GET"))
        .and(path(format!("/{TENANT}/DiagnosticReport")))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "resourceType": "OperationOutcome",
            "issue": [{"severity": "error", "diagnostics": "index unavailable"}]
        })))
        .mount(&fhir)
        .await;
    let app = start_app(&idp, &fhir, None).await;
    let cookie = app.sign_in(&idp, Some(PATIENT_ID)).await;

    let response = app.get("/", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();

    assert_eq!(body["displayName"], "Ada Lovelace");
    assert_eq!(body["patientId"], PATIENT_ID);
    assert_eq!(body["patient"]["state"], "loaded");
    assert_eq!(body["patient"]["data"]["fullName"], "Jane Doe");
    assert_eq!(body["conditions"]["state"], "loaded");
    assert_eq!(
        body["conditions"]["data"][0]["display"],
        "Irritable bowel syndrome"
    );
    assert_eq!(body["observations"]["data"][0]["value"], "6 /10");
    assert_eq!(body["diagnosticReports"]["state"], "failed");
    assert_eq!(
        body["diagnosticReports"]["data"]["message"],
        "Failed to load diagnostic reports: index unavailable"
    );
}

#[tokio::test]
async fn me_prefers_user_info_name() {
    let idp = MockIdentityProvider::start(CLIENT_ID).await;
    idp.mount_user_info(json!({"sub": "practitioner-1", "name": "Dr. Ada Lovelace"}))
        .await;
    let fhir = MockServer::start().await;
    let app = start_app(&idp, &fhir, None).await;
    let cookie = app.sign_in(&idp, Some(PATIENT_ID)).await;

    let response = app.get("/api/me", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["displayName"], "Dr. Ada Lovelace");
    assert_eq!(body["patientId"], PATIENT_ID);
    assert_eq!(body["profile"]["fhirUser"], "Practitioner/1");
    assert_eq!(body["userInfo"]["sub"], "practitioner-1");
}

#[tokio::test]
async fn me_falls_back_to_profile_when_user_info_fails() {
    let idp = MockIdentityProvider::start(CLIENT_ID).await;
    let fhir = MockServer::start().await;
    let app = start_app(&idp, &fhir, None).await;
    let cookie = app.sign_in(&idp, Some(PATIENT_ID)).await;

    let response = app.get("/api/me", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["displayName"], "Ada Lovelace");
    assert!(body.get("userInfo").is_none());
}

#[tokio::test]
async fn assessment_posts_processed_data_to_backend() {
    let idp = MockIdentityProvider::start(CLIENT_ID).await;
    let fhir = MockServer::start().await;
    mount_patient_record(&fhir).await;
    let backend = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/analyze"))
        .and(body_partial_json(json!({
            "patient": {"id": PATIENT_ID, "gender": "female"},
            "relevantConditions": [{"code": "10743008"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "overallNarrativeSummary": "Findings consistent with IBS-D.",
            "clinicalAssessment": {
                "romeIVCriteriaMet": true,
                "ibsSubtype": {"classification": "IBS-D"}
            },
            "unexpectedField": 1
        })))
        .mount(&backend)
        .await;
    let app = start_app(&idp, &fhir, Some(&backend)).await;
    let cookie = app.sign_in(&idp, Some(PATIENT_ID)).await;

    let response = app.get("/api/assessment", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["overallNarrativeSummary"], "Findings consistent with IBS-D.");
    assert_eq!(body["clinicalAssessment"]["romeIVCriteriaMet"], true);
}

#[tokio::test]
async fn assessment_without_backend_is_unavailable() {
    let idp = MockIdentityProvider::start(CLIENT_ID).await;
    let fhir = MockServer::start().await;
    mount_patient_record(&fhir).await;
    let app = start_app(&idp, &fhir, None).await;
    let cookie = app.sign_in(&idp, Some(PATIENT_ID)).await;

    let response = app.get("/api/assessment", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "scoring_not_configured");
}

#[tokio::test]
async fn rome_iv_walkthrough_and_submission() {
    let idp = MockIdentityProvider::start(CLIENT_ID).await;
    let fhir = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/{TENANT}/QuestionnaireResponse")))
        .and(header("content-type", "application/fhir+json"))
        .and(body_partial_json(json!({
            "resourceType": "QuestionnaireResponse",
            "status": "completed",
            "subject": {"reference": format!("Patient/{PATIENT_ID}")},
            "identifier": {"system": "http://limogi.ai"}
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "resourceType": "QuestionnaireResponse",
            "id": "qr-1"
        })))
        .expect(1)
        .mount(&fhir)
        .await;
    let app = start_app(&idp, &fhir, None).await;
    let cookie = app.sign_in(&idp, Some(PATIENT_ID)).await;

    let response = app.get("/api/questionnaires/rome-iv", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let view: Value = response.json().await.unwrap();
    let sections = view["definition"]["sections"].as_array().unwrap().clone();
    assert_eq!(sections.len(), 4);
    assert_eq!(view["state"]["reviewing"], false);

    let mut last = Value::Null;
    for section in &sections {
        for question in section["questions"].as_array().unwrap() {
            last = act(
                &app,
                &cookie,
                "rome-iv",
                json!({
                    "action": "answer",
                    "questionId": question["id"],
                    "value": question["options"][0]["value"],
                }),
            )
            .await;
        }
    }
    assert_eq!(last["state"]["reviewing"], true);
    assert_eq!(last["progress"], 100.0);
    assert!(last["unanswered"].as_array().unwrap().is_empty());

    // Not yet confirmed.
    let response = app
        .post("/api/questionnaires/rome-iv/submit", Some(&cookie), None)
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let confirmed = act(&app, &cookie, "rome-iv", json!({"action": "request_submit"})).await;
    assert_eq!(confirmed["state"]["confirming"], true);

    let response = app
        .post("/api/questionnaires/rome-iv/submit", Some(&cookie), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["state"]["submission"]["status"], "succeeded");
    assert_eq!(body["state"]["submission"]["result"]["id"], "qr-1");
    assert_eq!(body["state"]["confirming"], false);
}

#[tokio::test]
async fn failed_submission_keeps_confirmation_open() {
    let idp = MockIdentityProvider::start(CLIENT_ID).await;
    let fhir = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/{TENANT}/QuestionnaireResponse")))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({
            "resourceType": "OperationOutcome",
            "issue": [{"severity": "error", "diagnostics": "item is required"}]
        })))
        .mount(&fhir)
        .await;
    let app = start_app(&idp, &fhir, None).await;
    let cookie = app.sign_in(&idp, Some(PATIENT_ID)).await;

    act(
        &app,
        &cookie,
        "rome-iv",
        json!({"action": "answer", "questionId": "bloating", "value": "Every day"}),
    )
    .await;
    act(&app, &cookie, "rome-iv", json!({"action": "review"})).await;
    act(&app, &cookie, "rome-iv", json!({"action": "request_submit"})).await;

    let response = app
        .post("/api/questionnaires/rome-iv/submit", Some(&cookie), None)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["state"]["submission"]["status"], "failed");
    assert_eq!(body["state"]["submission"]["message"], "item is required");
    assert_eq!(body["state"]["confirming"], true);
}

#[tokio::test]
async fn abandoned_submission_still_completes() {
    let idp = MockIdentityProvider::start(CLIENT_ID).await;
    let fhir = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/{TENANT}/QuestionnaireResponse")))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(json!({"resourceType": "QuestionnaireResponse", "id": "qr-late"}))
                .set_delay(Duration::from_millis(1000)),
        )
        .expect(1)
        .mount(&fhir)
        .await;
    let app = start_app(&idp, &fhir, None).await;
    let cookie = app.sign_in(&idp, Some(PATIENT_ID)).await;

    act(
        &app,
        &cookie,
        "rome-iv",
        json!({"action": "answer", "questionId": "bloating", "value": "Every day"}),
    )
    .await;
    act(&app, &cookie, "rome-iv", json!({"action": "review"})).await;
    act(&app, &cookie, "rome-iv", json!({"action": "request_submit"})).await;

    // The browser gives up long before the FHIR server answers.
    let abandoned = app
        .client
        .post(format!("{}/api/questionnaires/rome-iv/submit", app.base))
        .header(reqwest::header::COOKIE, &cookie)
        .timeout(Duration::from_millis(200))
        .send()
        .await;
    assert!(abandoned.unwrap_err().is_timeout());

    tokio::time::sleep(Duration::from_millis(1500)).await;

    let response = app.get("/api/questionnaires/rome-iv", Some(&cookie)).await;
    let view: Value = response.json().await.unwrap();
    assert_eq!(view["state"]["submission"]["status"], "succeeded");
    assert_eq!(view["state"]["submission"]["result"]["id"], "qr-late");
    assert_eq!(view["state"]["confirming"], false);

    // Not stuck: the questionnaire accepts further edits.
    act(
        &app,
        &cookie,
        "rome-iv",
        json!({"action": "answer", "questionId": "bloating", "value": "Rarely"}),
    )
    .await;
}

#[tokio::test]
async fn quality_of_life_submission_goes_to_prediction_backend() {
    let idp = MockIdentityProvider::start(CLIENT_ID).await;
    let fhir = MockServer::start().await;
    mount_patient_record(&fhir).await;
    let backend = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/predict"))
        .and(body_partial_json(json!({
            "fhirData": {"patient": {"id": PATIENT_ID}},
            "qolResponses": {"abdominal_pain_impact": "3"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"qolScore": 62.5})))
        .expect(1)
        .mount(&backend)
        .await;
    let app = start_app(&idp, &fhir, Some(&backend)).await;
    let cookie = app.sign_in(&idp, Some(PATIENT_ID)).await;

    act(
        &app,
        &cookie,
        "quality-of-life",
        json!({"action": "answer", "questionId": "abdominal_pain_impact", "value": "3"}),
    )
    .await;
    act(&app, &cookie, "quality-of-life", json!({"action": "review"})).await;
    act(
        &app,
        &cookie,
        "quality-of-life",
        json!({"action": "request_submit"}),
    )
    .await;

    let response = app
        .post("/api/questionnaires/quality-of-life/submit", Some(&cookie), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["state"]["submission"]["result"]["qolScore"], 62.5);
}

#[tokio::test]
async fn questionnaire_input_errors() {
    let idp = MockIdentityProvider::start(CLIENT_ID).await;
    let fhir = MockServer::start().await;
    let app = start_app(&idp, &fhir, None).await;
    let cookie = app.sign_in(&idp, Some(PATIENT_ID)).await;

    let response = app.get("/api/questionnaires/phq-9", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "unknown_questionnaire");

    let response = app
        .post(
            "/api/questionnaires/quality-of-life/actions",
            Some(&cookie),
            Some(json!({"action": "answer", "questionId": "abdominal_pain_impact", "value": "9"})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "invalid_answer");
}

#[tokio::test]
async fn logout_drops_questionnaire_progress() {
    let idp = MockIdentityProvider::start(CLIENT_ID).await;
    let fhir = MockServer::start().await;
    let app = start_app(&idp, &fhir, None).await;
    let cookie = app.sign_in(&idp, Some(PATIENT_ID)).await;

    act(
        &app,
        &cookie,
        "quality-of-life",
        json!({"action": "answer", "questionId": "abdominal_pain_impact", "value": "2"}),
    )
    .await;
    assert_eq!(app.state.questionnaires.len(), 1);

    let response = app.post("/logout", Some(&cookie), None).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(app.state.questionnaires.is_empty());
}
