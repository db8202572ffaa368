use anyhow::{Context, Result};
use promptdeck_core::Config;
use promptdeck_relay::{router, AppState, LlmBridge, LlmClient};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::load().await?;
    let relay = &config.relay;

    let client = LlmClient::from_config(&config);
    let (provider, model) = match &client {
        Some(client) => {
            let (provider, model) = client.primary();
            (provider.to_string(), model.to_string())
        }
        None => {
            warn!("No provider API key configured; /api/chat will return errors until CLAUDE_API_KEY is set");
            ("none".to_string(), relay.model.clone())
        }
    };
    let bridge = client.map(|c| Arc::new(c) as Arc<dyn LlmBridge>);

    tokio::fs::create_dir_all(&relay.upload_dir)
        .await
        .with_context(|| format!("Failed to create {}", relay.upload_dir.display()))?;

    let state = AppState {
        bridge,
        provider: provider.clone(),
        model: model.clone(),
        upload_dir: relay.upload_dir.clone(),
        max_upload_bytes: relay.max_upload_bytes,
    };
    let app = router(state, &relay.static_dir);

    let addr = format!("{}:{}", relay.host, relay.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(
        "Relay listening on http://{} (provider {}, model {}, static {})",
        addr,
        provider,
        model,
        relay.static_dir.display()
    );

    axum::serve(listener, app).await?;
    Ok(())
}
