//! Relay Gateway - HTTP gateway for a signal-cli daemon

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use relay_gateway::{
    cli::{Cli, Command, WebhookCommand},
    config::Config,
    gateway::Gateway,
    setup_tracing,
    webhook::WebhookRegistry,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    let config = match Config::load(cli.config.as_deref()) {
        Ok(mut config) => {
            // Apply CLI overrides
            if let Some(port) = cli.port {
                config.server.port = port;
            }
            if let Some(ref host) = cli.host {
                config.server.host = host.clone();
            }
            if let Some(ref dir) = cli.signal_cli_config {
                config.relay.config_dir = dir.clone();
            }
            if let Some(ref dir) = cli.attachment_tmp_dir {
                config.relay.attachment_tmp_dir = dir.clone();
            }
            config
        }
        Err(e) => {
            error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Some(Command::Webhook(cmd)) => run_webhook_command(cmd, &config),
        Some(Command::Serve) | None => run_server(config).await,
    }
}

/// Manage the webhook registry directly on disk
fn run_webhook_command(cmd: WebhookCommand, config: &Config) -> ExitCode {
    let registry = WebhookRegistry::new(config.relay.webhook_dir());

    let result = match cmd {
        WebhookCommand::List => registry.reload().map(|_| {
            let urls = registry.list();
            if urls.is_empty() {
                println!("No webhooks registered in {}", registry.dir().display());
            }
            for url in urls.iter() {
                println!("{url}");
            }
        }),
        WebhookCommand::Add { url } => registry.register(&url).map(|()| println!("Added {url}")),
        WebhookCommand::Remove { url } => {
            registry.unregister(&url).map(|()| println!("Removed {url}"))
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("❌ {e}");
            ExitCode::FAILURE
        }
    }
}

/// Run the gateway server
async fn run_server(config: Config) -> ExitCode {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.server.port,
        relay = %config.relay.binary,
        "Starting Relay Gateway"
    );

    let gateway = match Gateway::new(config) {
        Ok(g) => g,
        Err(e) => {
            error!("Failed to create gateway: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = gateway.run().await {
        error!("Gateway error: {e}");
        return ExitCode::FAILURE;
    }

    info!("Gateway shutdown complete");
    ExitCode::SUCCESS
}
