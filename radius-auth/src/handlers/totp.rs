use axum::extract::{Json, State};
use serde_json::json;
use service_core::error::AppError;

use crate::dtos::{TotpEnrollResponse, TotpVerifyRequest, TotpVerifyResponse};
use crate::middleware::AuthUser;
use crate::models::SecurityEventType;
use crate::services::totp::{CODE_DIGITS, STEP_SECONDS};
use crate::services::ServiceError;
use crate::AppState;

/// Start second-factor enrollment for the caller. The client stores the
/// returned secret with the user record.
pub async fn enroll(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
) -> Json<TotpEnrollResponse> {
    let enrollment = state.totp.enroll(principal.username());

    state.audit.user_action("totp_enroll", None).await;

    Json(TotpEnrollResponse {
        secret: enrollment.secret.base32().to_string(),
        uri: enrollment.uri,
        digits: CODE_DIGITS,
        period: STEP_SECONDS,
    })
}

pub async fn verify(
    State(state): State<AppState>,
    Json(payload): Json<TotpVerifyRequest>,
) -> Result<Json<TotpVerifyResponse>, AppError> {
    let valid = state
        .totp
        .verify(&payload.secret, &payload.code)
        .map_err(ServiceError::from)?;

    if !valid {
        state
            .audit
            .security_event(
                SecurityEventType::TotpVerificationFailed,
                "TOTP code rejected",
                Some(json!({ "window": state.totp.window() })),
            )
            .await;
    }

    Ok(Json(TotpVerifyResponse { valid }))
}
