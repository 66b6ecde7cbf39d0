//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// HTTP gateway for a signal-cli relay daemon
#[derive(Parser, Debug)]
#[command(name = "relay-gateway")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "RELAY_GATEWAY_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "RELAY_GATEWAY_PORT")]
    pub port: Option<u16>,

    /// Host to bind to
    #[arg(long, env = "RELAY_GATEWAY_HOST")]
    pub host: Option<String>,

    /// Config directory where signal-cli config is stored
    #[arg(long, global = true)]
    pub signal_cli_config: Option<PathBuf>,

    /// Attachment tmp directory
    #[arg(long)]
    pub attachment_tmp_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        default_value = "info",
        env = "RELAY_GATEWAY_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "RELAY_GATEWAY_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand (optional - defaults to server mode)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the gateway server (default)
    Serve,

    /// Manage registered webhooks without a running gateway
    #[command(subcommand)]
    Webhook(WebhookCommand),
}

/// Webhook subcommands
#[derive(Subcommand, Debug)]
pub enum WebhookCommand {
    /// List registered webhook URLs
    List,

    /// Register a webhook URL
    Add {
        /// Callback URL receiving every inbound event
        #[arg(required = true)]
        url: String,
    },

    /// Remove a webhook URL
    Remove {
        /// Previously registered callback URL
        #[arg(required = true)]
        url: String,
    },
}
