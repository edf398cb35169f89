//! freightdesk-chat: open, inspect and post to quote conversations from the
//! command line.
//!
//! Each invocation signs in with the given access token, performs one
//! operation through a [`ChatSession`](freightdesk_chat::ChatSession) and
//! prints the outcome as JSON on stdout.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use freightdesk_common::FreightdeskError;
use freightdesk_config::FreightdeskConfig;

#[derive(Parser)]
#[command(name = "freightdesk-chat", about = "Quote-scoped messaging for the freight desk")]
pub(crate) struct Cli {
    /// Config file (defaults to the platform config directory).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Access token of the signed-in user.
    #[arg(long, env = "FREIGHTDESK_ACCESS_TOKEN", hide_env_values = true)]
    token: String,

    /// Id of the signed-in user.
    #[arg(long, env = "FREIGHTDESK_USER_ID")]
    user_id: String,

    /// Organisation the user acts for.
    #[arg(long, env = "FREIGHTDESK_ORG_ID")]
    org_id: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Open (or create) the conversation for a quote.
    Open {
        #[arg(long)]
        quote: String,
        #[arg(long)]
        shipment: Option<String>,
        /// Shipper branch organisation.
        #[arg(long)]
        shipper: Option<String>,
        /// Gallery branch organisation.
        #[arg(long)]
        gallery: Option<String>,
    },
    /// Open a shipper-to-shipper conversation.
    Peer {
        /// Peer shipper organisation.
        #[arg(long)]
        peer: String,
        #[arg(long)]
        quote: Option<String>,
        #[arg(long)]
        shipment: Option<String>,
        /// Initiating branch; defaults to --org-id.
        #[arg(long)]
        initiator: Option<String>,
    },
    /// Send a message on a thread.
    Send {
        thread: String,
        message: String,
    },
    /// Open one thread per shipper of a quote and post the same message.
    Broadcast {
        #[arg(long)]
        quote: String,
        /// Recipient shipper branch, repeatable.
        #[arg(long = "shipper", required = true)]
        shippers: Vec<String>,
        #[arg(long)]
        shipment: Option<String>,
        message: String,
    },
    /// List the threads visible to the user.
    Threads,
}

fn load_config(path: Option<&PathBuf>) -> Result<FreightdeskConfig, FreightdeskError> {
    let config = match path {
        Some(path) => freightdesk_config::load_config_from(path)?,
        None => freightdesk_config::load_config()?,
    };
    Ok(config)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_ref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("freightdesk-chat: {e}");
            std::process::exit(1);
        }
    };

    let fallback = config.logging.filter_directive();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| fallback.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match commands::run(cli, &config).await {
        Ok(output) => println!("{output}"),
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            eprintln!("freightdesk-chat: {e}");
            std::process::exit(1);
        }
    }
}
