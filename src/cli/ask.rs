//! `civic-ask ask` command: one question through the gateway, no server.

use anyhow::{Context, Result};

use civic_ask::config::Config;
use civic_ask::gateway::ChatGateway;
use civic_ask::GatewayError;

pub(crate) async fn cmd_ask(config: Config, message: &str) -> Result<()> {
    let gateway = ChatGateway::from_config(&config).context("failed to build chat gateway")?;
    match gateway.handle_chat_request(message).await {
        Ok(reply) => {
            println!("{}", reply.reply);
            Ok(())
        }
        Err(e) => Err(anyhow::anyhow!(render_error(&e))),
    }
}

fn render_error(e: &GatewayError) -> String {
    match e.public_detail() {
        Some(detail) => format!("{} ({}): {detail}", e.public_message(), e.status_code()),
        None => format!("{} ({})", e.public_message(), e.status_code()),
    }
}
