use radius_auth::{
    build_router,
    config::{AuditSinkKind, AuthConfig, BlacklistBackend, Environment},
    services::{
        AuditSink, AuditTrail, InMemoryBlacklist, JwtService, RedisAuditSink, RedisBlacklist,
        RolePermissionTable, TokenBlacklist, TotpEngine, TracingAuditSink,
    },
    AppState,
};
use service_core::observability::init_tracing;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;

const AUDIT_REDIS_KEY: &str = "audit:events";

#[tokio::main]
async fn main() -> Result<(), service_core::error::AppError> {
    // Load configuration - fail fast if invalid
    let config = AuthConfig::from_env()?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    );

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting RADIUS admin auth service"
    );

    if config.environment == Environment::Prod
        && config.blacklist.backend == BlacklistBackend::Memory
    {
        tracing::warn!(
            backend = "memory",
            "In-memory token blacklist in production: revocations are not shared \
             between instances and are lost on restart"
        );
    }

    let jwt = Arc::new(JwtService::new(&config.jwt)?);

    let redis = match &config.redis {
        Some(redis_config) => Some(RedisBlacklist::new(redis_config).await?),
        None => None,
    };

    let blacklist: Arc<dyn TokenBlacklist> = match (config.blacklist.backend, &redis) {
        (BlacklistBackend::Redis, Some(redis)) => Arc::new(redis.clone()),
        _ => {
            let store = Arc::new(InMemoryBlacklist::new());
            store.spawn_sweeper(config.blacklist.sweep_interval);
            tracing::info!(
                sweep_interval = ?config.blacklist.sweep_interval,
                "Using in-memory token blacklist"
            );
            store
        }
    };

    let sink: Arc<dyn AuditSink> = match (config.audit.sink, &redis) {
        (AuditSinkKind::Redis, Some(redis)) => Arc::new(RedisAuditSink::new(
            redis.connection(),
            AUDIT_REDIS_KEY,
            config.audit.redis_max_events,
        )),
        _ => Arc::new(TracingAuditSink),
    };
    let audit = AuditTrail::new(sink, &config.audit);

    let role_table = match &config.role_permissions_path {
        Some(path) => RolePermissionTable::from_file(path)?,
        None => RolePermissionTable::baseline(),
    };

    let state = AppState::new(
        jwt,
        blacklist,
        audit.clone(),
        Arc::new(role_table),
        TotpEngine::from_config(&config.totp),
        config.blacklist.check_timeout,
    );

    let app = build_router(state)?;

    audit
        .business_event(
            "service_started",
            Some(service_core::serde_json::json!({
                "service": config.service_name,
                "version": config.service_version,
            })),
        )
        .await;

    let addr = config.common.socket_addr();
    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Service shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
