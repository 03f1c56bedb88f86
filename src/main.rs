//! civic-ask binary.

mod cli;

use anyhow::Result;
use clap::Parser;

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    cli::init_tracing(cli.log_json);

    let config = civic_ask::Config::load(cli.config.as_deref())?;

    match cli.command.unwrap_or_default() {
        Command::Serve { port, bind } => cli::serve::cmd_serve(config, port, bind).await,
        Command::Ask { message } => cli::ask::cmd_ask(config, &message.join(" ")).await,
    }
}
