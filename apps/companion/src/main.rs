use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use resonance_session_sync::{
    HttpSyncApi, JsonFileStore, KeyValueStore, SyncEngine, UserStateMirror,
};
use resonance_shared_config::ClientConfig;

mod app;
mod commands;
mod connection;
mod engine;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = ClientConfig::from_env().context("Failed to load configuration")?;

    // Initialize tracing; logs go to stderr so command output stays readable
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!(
        environment = %config.environment,
        api_url = %config.server.api_url,
        "Starting Resonance companion"
    );

    let store: Arc<dyn KeyValueStore> = Arc::new(
        JsonFileStore::open(&config.state_path).with_context(|| {
            format!("Failed to open state file {}", config.state_path.display())
        })?,
    );
    let api = HttpSyncApi::new(&config.server).context("Failed to build sync client")?;
    let sync = Arc::new(SyncEngine::new(api, UserStateMirror::new(), store.clone()));

    app::App::new(config, sync, store).run().await
}
