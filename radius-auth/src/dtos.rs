use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// The caller's identity as seen by the authorization layer.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrincipalResponse {
    pub user_id: String,
    pub username: String,
    pub roles: BTreeSet<String>,
    /// Permission claims carried by the token itself.
    pub permissions: BTreeSet<String>,
    /// Claims plus everything the caller's roles grant.
    pub effective_permissions: BTreeSet<String>,
    pub token_id: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

#[derive(Debug, Deserialize)]
pub struct RevokeTokenRequest {
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TotpEnrollResponse {
    pub secret: String,
    pub uri: String,
    pub digits: usize,
    pub period: u64,
}

#[derive(Debug, Deserialize)]
pub struct TotpVerifyRequest {
    pub secret: String,
    pub code: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TotpVerifyResponse {
    pub valid: bool,
}

#[derive(Debug, Deserialize)]
pub struct EvaluateRequest {
    pub permissions: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PermissionDecision {
    pub permission: String,
    pub allowed: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateResponse {
    pub all_allowed: bool,
    pub decisions: Vec<PermissionDecision>,
}
