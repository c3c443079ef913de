pub mod config;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;

use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use service_core::middleware::request_id_middleware;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;

use crate::models::{permission, AuthRequirement};
use crate::services::{
    AuditTrail, JwtService, PermissionEvaluator, RolePermissionTable, TokenAuthenticator,
    TokenBlacklist, TotpEngine,
};
use service_core::error::AppError;

#[derive(Clone)]
pub struct AppState {
    pub jwt: Arc<JwtService>,
    pub authenticator: TokenAuthenticator,
    pub evaluator: PermissionEvaluator,
    pub audit: AuditTrail,
    pub totp: TotpEngine,
}

impl AppState {
    pub fn new(
        jwt: Arc<JwtService>,
        blacklist: Arc<dyn TokenBlacklist>,
        audit: AuditTrail,
        role_table: Arc<RolePermissionTable>,
        totp: TotpEngine,
        blacklist_timeout: Duration,
    ) -> Self {
        let authenticator =
            TokenAuthenticator::new(jwt.clone(), blacklist, audit.clone(), blacklist_timeout);
        let evaluator = PermissionEvaluator::new(role_table, audit.clone());
        Self {
            jwt,
            authenticator,
            evaluator,
            audit,
            totp,
        }
    }
}

pub fn build_router(state: AppState) -> Result<Router, AppError> {
    let revoke_requirement = AuthRequirement::permission(permission::SESSIONS_MANAGE)
        .map_err(services::ServiceError::from)?;

    let operator_routes = Router::new()
        .route("/auth/tokens/revoke", post(handlers::revoke_token))
        .layer(from_fn_with_state(state.clone(), move |state, req, next| {
            middleware::require(state, revoke_requirement.clone(), req, next)
        }));

    let app = Router::new()
        .route("/auth/me", get(handlers::me))
        .route("/auth/logout", post(handlers::logout))
        .route("/auth/refresh", post(handlers::refresh))
        .route("/auth/totp/enroll", post(handlers::enroll))
        .route("/auth/totp/verify", post(handlers::verify))
        .route("/authz/evaluate", post(handlers::evaluate))
        .merge(operator_routes)
        .with_state(state.clone())
        // Innermost: resolve the principal
        .layer(from_fn_with_state(
            state.clone(),
            middleware::authentication_middleware,
        ))
        // One ApiRequest audit event per request, with the final status
        .layer(from_fn_with_state(
            state.clone(),
            middleware::api_request_middleware,
        ))
        // Ambient audit context for everything below
        .layer(from_fn(middleware::request_context_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri().path(),
                    version = ?request.version(),
                )
            },
        ))
        .layer(from_fn(request_id_middleware));

    Ok(app)
}
