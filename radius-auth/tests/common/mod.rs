//! Shared setup for radius-auth integration tests.

#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, Response},
    Router,
};
use radius_auth::{
    build_router,
    config::{JwtConfig, JwtSigning},
    models::TokenRecord,
    services::{
        AuditTrail, JwtService, MemoryAuditSink, MockBlacklist, RolePermissionTable, TokenSubject,
        TotpEngine,
    },
    AppState,
};
use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;

pub const TEST_SECRET: &str = "integration-test-secret-0123456789abcdef";
pub const BLACKLIST_TIMEOUT: Duration = Duration::from_millis(100);

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub jwt: Arc<JwtService>,
    pub blacklist: Arc<MockBlacklist>,
    pub sink: Arc<MemoryAuditSink>,
}

pub fn jwt_config() -> JwtConfig {
    JwtConfig {
        signing: JwtSigning::Secret(SecretString::new(TEST_SECRET.to_string())),
        issuer: Some("radius-admin".to_string()),
        audience: Some("radius-admin-api".to_string()),
        access_token_expiry_minutes: 15,
        leeway_seconds: 0,
    }
}

pub fn test_app() -> TestApp {
    let jwt = Arc::new(JwtService::new(&jwt_config()).expect("Failed to create JWT service"));
    let blacklist = Arc::new(MockBlacklist::new());
    let sink = Arc::new(MemoryAuditSink::new());

    let state = AppState::new(
        jwt.clone(),
        blacklist.clone(),
        AuditTrail::with_sink(sink.clone()),
        Arc::new(RolePermissionTable::baseline()),
        TotpEngine::default(),
        BLACKLIST_TIMEOUT,
    );
    let router = build_router(state.clone()).expect("Failed to build router");

    TestApp {
        router,
        state,
        jwt,
        blacklist,
        sink,
    }
}

pub fn issue(jwt: &JwtService, user_id: &str, roles: &[&str], permissions: &[&str]) -> TokenRecord {
    jwt.issue_access_token(&TokenSubject {
        user_id: user_id.to_string(),
        username: format!("{}-name", user_id),
        roles: roles.iter().map(|r| r.to_string()).collect(),
        permissions: permissions.iter().map(|p| p.to_string()).collect(),
    })
    .expect("Failed to issue token")
}

pub fn request(method: &str, uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

pub fn json_request(
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: serde_json::Value,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
