mod common;

use axum::http::StatusCode;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use common::{body_json, issue, json_request, request, test_app};
use radius_auth::{
    models::AuditEventKind,
    services::totp::{generate_code, validate_code_at, TotpSecret},
};
use serde_json::json;
use tower::util::ServiceExt;

/// Base32 of the RFC 6238 SHA-1 seed "12345678901234567890".
const RFC_SECRET: &str = "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ";

#[test]
fn test_reference_vector_at_59_seconds() {
    let t = Utc.timestamp_opt(59, 0).unwrap();

    assert_eq!(generate_code(RFC_SECRET, t).unwrap(), "287082");
    assert!(validate_code_at(RFC_SECRET, "287082", t, 1).unwrap());
}

#[test]
fn test_one_step_of_drift_is_accepted_three_are_not() {
    let now = Utc.timestamp_opt(1_700_000_015, 0).unwrap();

    for offset in [-30, 30] {
        let code = generate_code(RFC_SECRET, now + ChronoDuration::seconds(offset)).unwrap();
        assert!(validate_code_at(RFC_SECRET, &code, now, 1).unwrap());
    }
    for offset in [-90, 90] {
        let code = generate_code(RFC_SECRET, now + ChronoDuration::seconds(offset)).unwrap();
        assert!(!validate_code_at(RFC_SECRET, &code, now, 1).unwrap());
    }
}

#[test]
fn test_malformed_codes_never_validate() {
    let now = Utc::now();
    for code in ["", "12345", "1234567", "12a456", " 28708", "２８７０８２"] {
        assert!(!validate_code_at(RFC_SECRET, code, now, 1).unwrap());
    }
}

#[tokio::test]
async fn test_enroll_requires_authentication() {
    let app = test_app();

    let response = app
        .router
        .clone()
        .oneshot(request("POST", "/auth/totp/enroll", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_enroll_then_verify() {
    let app = test_app();
    let record = issue(&app.jwt, "user-1", &["User"], &[]);

    let response = app
        .router
        .clone()
        .oneshot(request("POST", "/auth/totp/enroll", Some(&record.token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["digits"], 6);
    assert_eq!(body["period"], 30);
    let secret = body["secret"].as_str().unwrap().to_string();
    assert_eq!(TotpSecret::from_base32(&secret).unwrap().as_bytes().len(), 32);
    let uri = body["uri"].as_str().unwrap();
    assert!(uri.starts_with("otpauth://totp/"));
    assert!(uri.contains(&format!("secret={}", secret)));
    assert!(uri.contains("user-1-name"));

    let code = generate_code(&secret, Utc::now()).unwrap();
    let response = app
        .router
        .clone()
        .oneshot(json_request(
            "POST",
            "/auth/totp/verify",
            None,
            json!({ "secret": secret, "code": code }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({ "valid": true }));
}

#[tokio::test]
async fn test_rejected_code_is_audited() {
    let app = test_app();
    let stale = generate_code(RFC_SECRET, Utc.timestamp_opt(59, 0).unwrap()).unwrap();

    let response = app
        .router
        .clone()
        .oneshot(json_request(
            "POST",
            "/auth/totp/verify",
            None,
            json!({ "secret": RFC_SECRET, "code": stale }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({ "valid": false }));

    let failures: Vec<_> = app
        .sink
        .events()
        .into_iter()
        .filter(|e| e.event_kind == AuditEventKind::SecurityEvent)
        .collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(
        failures[0].detail.as_ref().unwrap()["securityEventType"],
        "totp_verification_failed"
    );
}

#[tokio::test]
async fn test_invalid_secret_is_a_bad_request() {
    let app = test_app();

    let response = app
        .router
        .clone()
        .oneshot(json_request(
            "POST",
            "/auth/totp/verify",
            None,
            json!({ "secret": "not-base32!", "code": "123456" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
