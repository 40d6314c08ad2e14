//! `nimbus serve` -- run the API gateway.

use std::sync::Arc;

use tracing::{info, warn};

use nimbus_engine::Engine;

pub async fn run(
    config_path: Option<&str>,
    host: Option<String>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let mut config = super::load_config(config_path)?;
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    let host = config.server.host.clone();
    let port = config.server.port;
    let engine = Arc::new(Engine::new(config)?);

    // A missing Ollama daemon should not stop the server; cloud models
    // still work without it.
    match engine.ensure_models().await {
        Ok(()) => info!("ollama models ready"),
        Err(e) => warn!(error = %e, "could not prepare ollama models, continuing"),
    }

    nimbus_gateway::serve(engine, &host, port).await?;
    Ok(())
}
