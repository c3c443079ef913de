//! Token lifecycle handlers.
//!
//! Users and credentials live elsewhere; these endpoints only act on the
//! presented bearer token.

use axum::{
    extract::{Json, State},
    http::StatusCode,
};
use anyhow::anyhow;
use serde_json::json;
use service_core::error::AppError;

use crate::dtos::{PrincipalResponse, RevokeTokenRequest, TokenResponse};
use crate::middleware::AuthUser;
use crate::services::ServiceError;
use crate::AppState;

pub async fn me(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
) -> Json<PrincipalResponse> {
    let effective_permissions = state.evaluator.table().effective_permissions(&principal);

    Json(PrincipalResponse {
        user_id: principal.user_id().to_string(),
        username: principal.username().to_string(),
        roles: principal.roles().clone(),
        permissions: principal.permissions().clone(),
        effective_permissions,
        token_id: principal.token_id().to_string(),
        expires_at: principal.expires_at(),
    })
}

/// Revoke the presented token.
pub async fn logout(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
) -> Result<StatusCode, AppError> {
    state
        .authenticator
        .revoke_principal(&principal)
        .await
        .map_err(crate::services::ServiceError::from)?;

    state
        .audit
        .user_action("logout", Some(json!({ "tokenId": principal.token_id() })))
        .await;

    Ok(StatusCode::NO_CONTENT)
}

/// Revoke the presented token and hand back a replacement.
pub async fn refresh(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
) -> Result<Json<TokenResponse>, AppError> {
    let record = state.authenticator.refresh(&principal).await?;

    state
        .audit
        .user_action(
            "token_refresh",
            Some(json!({
                "previousTokenId": principal.token_id(),
                "tokenId": record.token_id,
            })),
        )
        .await;

    Ok(Json(TokenResponse {
        access_token: record.token,
        token_type: "Bearer".to_string(),
        expires_in: state.jwt.access_token_expiry_seconds(),
    }))
}

/// Revoke somebody else's token, e.g. a session flagged as compromised.
pub async fn revoke_token(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Json(payload): Json<RevokeTokenRequest>,
) -> Result<StatusCode, AppError> {
    let token_id = state.jwt.peek_token_id(&payload.token).ok();

    state
        .audit
        .in_operation(
            "revoke_token",
            crate::models::ScopeProperties::new().with("revokedBy", principal.user_id()),
            async {
                // A bad target token is the caller's input, not their credentials.
                state
                    .authenticator
                    .revoke_token(&payload.token)
                    .await
                    .map_err(|e| match e {
                        ServiceError::Token(_) => AppError::BadRequest(anyhow!("Invalid token")),
                        other => other.into(),
                    })?;
                state
                    .audit
                    .business_event(
                        "token_revoked_by_operator",
                        Some(json!({ "tokenId": token_id })),
                    )
                    .await;
                Ok::<_, AppError>(())
            },
        )
        .await?;

    Ok(StatusCode::NO_CONTENT)
}
