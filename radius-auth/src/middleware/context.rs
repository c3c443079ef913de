use axum::{
    extract::{ConnectInfo, Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use service_core::middleware::{RequestId, REQUEST_ID_HEADER};
use std::net::SocketAddr;
use tokio::time::Instant;

use crate::models::RequestContext;
use crate::services::audit::context;
use crate::AppState;

/// Snapshot the request metadata audit events are correlated with.
pub fn capture_request_context(req: &Request) -> RequestContext {
    let headers = req.headers();
    let header_str = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };

    let request_id = req
        .extensions()
        .get::<RequestId>()
        .map(|id| id.as_str().to_string())
        .or_else(|| header_str(REQUEST_ID_HEADER))
        .unwrap_or_else(|| "-".to_string());

    let ip_address = header_str("x-forwarded-for")
        .and_then(|v| v.split(',').next().map(|ip| ip.trim().to_string()))
        .filter(|ip| !ip.is_empty())
        .or_else(|| {
            req.extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        })
        .unwrap_or_else(|| "unknown".to_string());

    RequestContext {
        request_id,
        method: req.method().to_string(),
        path: req.uri().path().to_string(),
        query_string: req.uri().query().unwrap_or_default().to_string(),
        user_agent: header_str(header::USER_AGENT.as_str()).unwrap_or_default(),
        ip_address,
        user_id: None,
        username: None,
        roles: None,
        timestamp: Utc::now(),
    }
}

/// Run the rest of the pipeline with this request as the ambient audit context.
pub async fn request_context_middleware(req: Request, next: Next) -> Response {
    let request_context = capture_request_context(&req);
    context::scope(request_context, next.run(req)).await
}

/// Record one ApiRequest audit event per request.
pub async fn api_request_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let started = Instant::now();
    let method = req.method().to_string();
    let path = req.uri().path().to_string();

    let response = next.run(req).await;

    state
        .audit
        .api_request(&method, &path, response.status().as_u16(), started.elapsed())
        .await;
    response
}
