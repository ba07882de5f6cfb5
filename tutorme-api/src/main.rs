use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tutorme_api::{app, AppState, AuthConfig};
use tutorme_core::SystemClock;
use tutorme_store::{Config, MemoryStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tutorme_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting TutorMe API on port {}", config.server.port);

    let clock = Arc::new(SystemClock);
    let store = MemoryStore::from_config(&config.store, clock.clone());
    let state = AppState::new(
        store,
        clock,
        AuthConfig {
            secret: config.auth.jwt_secret.clone(),
        },
        config.business_rules.clone(),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app(state)).await.context("Server error")?;
    Ok(())
}
