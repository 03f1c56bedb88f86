//! `civic-ask serve` command.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use civic_ask::api::server::{start_server, AppState};
use civic_ask::config::Config;
use civic_ask::gateway::ChatGateway;

/// Start the HTTP API and WebSocket relay.
pub(crate) async fn cmd_serve(
    mut config: Config,
    port: Option<u16>,
    bind: Option<String>,
) -> Result<()> {
    apply_overrides(&mut config, port, bind);

    let gateway = ChatGateway::from_config(&config).context("failed to build chat gateway")?;
    if !gateway.is_configured() {
        warn!("AI_API_KEY is not set; /api/ask will answer 500 until it is configured");
    }
    info!(
        model = %config.provider.model,
        api_url = %config.provider.api_url,
        cache_ttl_secs = config.cache.ttl_secs,
        max_retries = config.retry.max_retries,
        "Chat gateway ready"
    );

    let state = AppState::new(Arc::new(gateway), &config.realtime);
    start_server(&config.server, state)
        .await
        .map_err(|e| anyhow::anyhow!("server error: {e}"))
}

fn apply_overrides(config: &mut Config, port: Option<u16>, bind: Option<String>) {
    if let Some(port) = port {
        config.server.port = port;
    }
    if let Some(bind) = bind {
        config.server.bind = bind;
    }
}
