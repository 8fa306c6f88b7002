//! `LiveText` server binary.
//!
//! # Startup Sequence
//!
//! 1. Load configuration (`livetext.toml` / `livetext.yaml` + `LIVETEXT__*` env)
//! 2. Initialize structured logging (tracing)
//! 3. Load the persisted text and build the broadcast registry
//! 4. Serve HTTP until `Ctrl-C` / `SIGTERM`, then close every viewer

use std::sync::Arc;

use anyhow::Context;
use livetext_server::config::LoggingConfig;
use livetext_server::{AppState, LiveTextConfig, TextStore, start_server};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = LiveTextConfig::load().context("loading configuration")?;

    init_tracing(&config.logging);
    info!("livetext-server starting");
    info!(
        host = config.server.host,
        port = config.server.port,
        expiry_secs = config.broadcast.expiry_secs,
        write_timeout_ms = config.broadcast.write_timeout_ms,
        text_path = %config.storage.text_path.display(),
        "Configuration loaded"
    );

    let store = TextStore::new(
        config.storage.text_path.clone(),
        config.storage.default_text.clone(),
    );
    let state = Arc::new(AppState::load(config.broadcast.clone(), store).await);

    start_server(&config.server, state)
        .await
        .context("running HTTP server")?;

    info!("livetext-server exited cleanly");
    Ok(())
}

/// Install the global tracing subscriber. `RUST_LOG` overrides the
/// default `info` filter.
fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}
