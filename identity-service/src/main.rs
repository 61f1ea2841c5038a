use identity_service::{
    build_router,
    config::IdentityConfig,
    db,
    services::{JwtService, LoginAttemptTracker, PgStore, Store},
    AppState,
};
use service_core::error::AppError;
use service_core::observability::logging::init_tracing;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Load configuration - fail fast if invalid
    let config = IdentityConfig::from_env()?;
    service_core::error::set_expose_error_details(config.expose_error_details());

    init_tracing(&config.service_name, &config.log_level);

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting identity service"
    );

    let pool = db::create_pool(&config.database)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::Error::new(e)))?;
    db::run_migrations(&pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::Error::new(e)))?;

    let store: Arc<dyn Store> = Arc::new(PgStore::new(pool));

    // One-time, logged repair of legacy rows with empty roles, run outside
    // the request path.
    let repaired = store
        .repair_empty_roles(config.security.default_repair_role)
        .await?;
    if repaired > 0 {
        tracing::warn!(
            rows = repaired,
            role = %config.security.default_repair_role,
            "Repaired accounts with empty roles"
        );
    }

    let jwt = JwtService::new(&config.jwt);
    let login_tracker = Arc::new(LoginAttemptTracker::new(
        config.lockout.max_attempts,
        config.lockout.window_minutes,
    ));

    // Periodic sweep bounds tracker memory for abandoned keys.
    let sweeper = login_tracker.clone();
    let sweep_interval = std::time::Duration::from_secs(config.lockout.sweep_interval_seconds);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep_interval);
        loop {
            interval.tick().await;
            sweeper.sweep();
        }
    });

    let state = AppState {
        config: config.clone(),
        store,
        jwt,
        login_tracker,
    };

    let app = build_router(state).await?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
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
