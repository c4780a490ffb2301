use gateway_auth::{
    build_router,
    config::GatewayConfig,
    observability::logging::init_tracing,
    services::{AuthService, PostgresStore, RedisStore, SmtpEmailService, TokenCodec, TokenValidator},
    AppState,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), gateway_auth::error::AppError> {
    dotenvy::dotenv().ok();

    // Fail fast on bad configuration.
    let config = Arc::new(GatewayConfig::from_env()?);

    init_tracing(&config.log_level);

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting auth gateway"
    );

    let credentials = Arc::new(PostgresStore::connect(&config.database).await?);
    tracing::info!("Database connection established");

    let store = Arc::new(RedisStore::new(&config.redis).await?);
    tracing::info!("Redis connection established");

    let email = Arc::new(SmtpEmailService::new(&config.smtp)?);

    let codec = TokenCodec::new(&config.jwt.user_secret, config.jwt.token_expiry_seconds)?;

    let validator = Arc::new(TokenValidator::new(
        codec.clone(),
        store.clone(),
        credentials.clone(),
        config.jwt.profile_cache_ttl_seconds,
    ));
    let auth = Arc::new(AuthService::new(
        credentials.clone(),
        store.clone(),
        codec,
        email.clone(),
    ));

    let state = AppState {
        config: config.clone(),
        credentials,
        store,
        email,
        auth,
        validator,
    };

    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Service shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => tracing::error!(error = %e, "Failed to install signal handler"),
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
