//! Command-line interface.

pub(crate) mod ask;
pub(crate) mod serve;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "civic-ask", version, about = "Chat assistant gateway for civic reports")]
pub(crate) struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub(crate) enum Command {
    /// Run the HTTP and WebSocket server (default)
    Serve {
        /// Override the listen port
        #[arg(long)]
        port: Option<u16>,
        /// Override the bind address
        #[arg(long)]
        bind: Option<String>,
    },
    /// Send one question through the gateway and print the reply
    Ask {
        /// Question text
        #[arg(required = true, num_args = 1..)]
        message: Vec<String>,
    },
}

impl Default for Command {
    fn default() -> Self {
        Command::Serve {
            port: None,
            bind: None,
        }
    }
}

/// Install the global subscriber. `RUST_LOG` wins over the `info` default.
pub(crate) fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if let Err(e) = result {
        eprintln!("tracing already initialized: {e}");
    }
}
