use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use service_core::error::AppError;
use std::convert::Infallible;

use crate::models::{AuthRequirement, Principal};
use crate::services::audit::context;
use crate::services::ServiceError;
use crate::AppState;

/// Attach the bearer token's [`Principal`] to the request, if there is a valid one.
///
/// Missing, invalid, expired and revoked tokens leave the request anonymous.
/// When the revocation store cannot answer the request is refused with 503.
pub async fn authentication_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let (mut parts, body) = req.into_parts();

    let principal = state
        .authenticator
        .authenticate(&parts.headers, &parts.uri)
        .await
        .map_err(ServiceError::from)?;

    if let Some(principal) = principal {
        context::attach_principal(&principal);
        parts.extensions.insert(principal);
    }

    Ok(next.run(Request::from_parts(parts, body)).await)
}

/// Route guard: evaluate `requirement` against the request's principal.
///
/// ```ignore
/// .layer(from_fn_with_state(state.clone(), move |state, req, next| {
///     require(state, requirement.clone(), req, next)
/// }))
/// ```
pub async fn require(
    State(state): State<AppState>,
    requirement: AuthRequirement,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let principal = req.extensions().get::<Principal>().cloned();
    state
        .evaluator
        .authorize(principal.as_ref(), &requirement)
        .await?;

    Ok(next.run(req).await)
}

/// Extractor for handlers that need an authenticated principal.
pub struct AuthUser(pub Principal);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .map(AuthUser)
            .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Authentication required")))
    }
}

/// Extractor for handlers that also serve anonymous callers.
pub struct MaybeAuthUser(pub Option<Principal>);

#[axum::async_trait]
impl<S> FromRequestParts<S> for MaybeAuthUser
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeAuthUser(parts.extensions.get::<Principal>().cloned()))
    }
}
