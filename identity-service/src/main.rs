use std::net::SocketAddr;
use std::sync::Arc;

use identity_service::{
    build_router,
    config::IdentityConfig,
    db,
    services::{
        AuditDispatcher, AuthService, JwtService, PgStore, ProjectService, RefreshTokenIssuer,
        Stores,
    },
    utils::PasswordHasher,
    AppState,
};
use service_core::error::AppError;
use service_core::observability::init_tracing;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Load configuration - fail fast if invalid
    let config = IdentityConfig::from_env()?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.common.json_logs,
    );

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting identity service"
    );

    let pool = db::create_pool(&config.database)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;
    db::run_migrations(&pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migrations failed: {}", e)))?;

    let stores = Stores::from_backend(Arc::new(PgStore::new(pool)));

    let audit = if config.audit_enabled {
        AuditDispatcher::spawn(stores.audit.clone())
    } else {
        tracing::warn!("Audit trail disabled by configuration");
        AuditDispatcher::disabled()
    };

    let hasher = PasswordHasher::new(config.password.hash_cost())
        .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Invalid Argon2 parameters: {}", e)))?;

    let jwt = JwtService::new(&config.jwt);
    tracing::info!("JWT service initialized with HS256");

    let auth_service = AuthService::new(
        &stores,
        Arc::new(hasher),
        config.password.policy(),
        jwt,
        RefreshTokenIssuer::new(config.jwt.refresh_token_expiry_days),
        audit.clone(),
    );
    let project_service = ProjectService::new(&stores, audit);

    let state = AppState {
        stores,
        auth_service,
        project_service,
        admin_role_level: config.admin_role_level,
        service_name: Arc::from(config.service_name.as_str()),
    };

    let app = build_router(state);

    let addr: SocketAddr = config
        .common
        .bind_address()
        .parse()
        .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Invalid bind address: {}", e)))?;

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
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
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
