use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use marquee_api::{
    app,
    state::{AppState, AuthConfig, Stores},
    worker::start_expiry_worker,
};
use marquee_domain::SystemClock;
use marquee_store::{app_config::Config, DbClient, RedisClient};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "marquee_api=debug,marquee_engine=debug,marquee_store=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Marquee API on port {}", config.server.port);

    let stores = match config.database.url.as_deref() {
        Some(url) => {
            let db = DbClient::new(url).await.context("Failed to connect to Postgres")?;
            db.migrate().await.context("Failed to run migrations")?;
            tracing::info!("Using Postgres seat store");
            Stores::postgres(&db)
        }
        None => {
            tracing::warn!("No database configured, seats and bookings live in memory only");
            Stores::in_memory()
        }
    };

    let auth = AuthConfig {
        secret: config.auth.jwt_secret.clone(),
        expiration: config.auth.jwt_expiration_seconds,
    };
    let mut state = AppState::new(stores, auth, &config.reservation, Arc::new(SystemClock));

    if config.reservation.reset_holds_on_startup {
        let released = state.engine.reset_holds().await.context("Failed to reset holds")?;
        tracing::info!(released, "Released holds left over from a previous run");
    }

    if let Some(url) = config.redis.url.as_deref() {
        let redis = RedisClient::new(url).context("Failed to create Redis client")?;
        state = state.with_rate_limit(Arc::new(redis), config.rate_limit.clone());
        tracing::info!("Rate limiting enabled");
    }

    let _expiry = start_expiry_worker(state.engine.clone(), config.reservation.sweep_interval_seconds);

    let app = app(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}
