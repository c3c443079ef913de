//! Batch permission checks, so clients can hide actions the caller cannot take.

use axum::extract::{Json, State};
use service_core::error::AppError;

use crate::dtos::{EvaluateRequest, EvaluateResponse, PermissionDecision};
use crate::middleware::MaybeAuthUser;
use crate::models::AuthRequirement;
use crate::services::ServiceError;
use crate::AppState;

pub async fn evaluate(
    State(state): State<AppState>,
    MaybeAuthUser(principal): MaybeAuthUser,
    Json(payload): Json<EvaluateRequest>,
) -> Result<Json<EvaluateResponse>, AppError> {
    let mut decisions = Vec::with_capacity(payload.permissions.len());
    for permission in payload.permissions {
        let requirement =
            AuthRequirement::permission(permission.as_str()).map_err(ServiceError::from)?;
        let allowed = state
            .evaluator
            .evaluate(principal.as_ref(), &requirement)
            .is_allowed();
        decisions.push(PermissionDecision {
            permission,
            allowed,
        });
    }

    Ok(Json(EvaluateResponse {
        all_allowed: !decisions.is_empty() && decisions.iter().all(|d| d.allowed),
        decisions,
    }))
}
