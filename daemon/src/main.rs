use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use sous_daemon::config::Config;
use sous_daemon::state::HubState;
use sous_daemon::{reaper, serve};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    let state = Arc::new(HubState::new(config.session_ttl));

    let listener = TcpListener::bind(("0.0.0.0", config.port)).await?;
    info!("Listening on {}", listener.local_addr()?);
    info!(
        "Session TTL {}s, reaper interval {}s",
        config.session_ttl.as_secs(),
        config.reaper_interval.as_secs()
    );

    tokio::spawn(reaper::run(state.clone(), config.reaper_interval));

    serve(listener, state).await?;
    Ok(())
}
