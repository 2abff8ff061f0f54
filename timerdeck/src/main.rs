use anyhow::Context;
use tracing_subscriber::EnvFilter;

use timerdeck::{app_state::AppState, config, coordinator::Coordinator, router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::from_filename(".env.local").ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let settings = config::read_config().context("failed to read configuration")?;

    let coordinator = Coordinator::from_settings(&settings);
    coordinator.spawn_pollers();

    let app = router::create(AppState::new(coordinator));

    // Loopback only; the control API carries no authentication.
    let address = format!("127.0.0.1:{}", settings.application.port);
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;
    tracing::info!("control api listening on http://{address}");

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
