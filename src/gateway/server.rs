//! Gateway server

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};

use super::router::{AppState, create_router};
use crate::config::Config;
use crate::relay::{RelaySupervisor, SignalCliRunner};
use crate::send::MessageSender;
use crate::webhook::{WebhookDispatcher, WebhookRegistry};
use crate::{Error, Result};

/// Relay gateway server
pub struct Gateway {
    config: Config,
    registry: Arc<WebhookRegistry>,
    supervisor: Arc<RelaySupervisor>,
    sender: Arc<MessageSender>,
}

impl Gateway {
    /// Wire up registry, dispatcher, supervisor and sender
    pub fn new(config: Config) -> Result<Self> {
        let registry = Arc::new(WebhookRegistry::new(config.relay.webhook_dir()));
        let dispatcher = Arc::new(WebhookDispatcher::new(
            Arc::clone(&registry),
            &config.webhooks,
        )?);
        let supervisor = Arc::new(RelaySupervisor::new(
            config.relay.binary.clone(),
            config.relay.config_dir.clone(),
            dispatcher,
        ));
        let sender = Arc::new(MessageSender::new(
            Arc::new(SignalCliRunner::new(config.relay.binary.clone())),
            config.relay.attachment_tmp_dir.clone(),
        ));

        Ok(Self {
            config,
            registry,
            supervisor,
            sender,
        })
    }

    /// Run until shutdown is requested or the relay exits.
    ///
    /// Relay termination is always an error: the gateway is useless without it.
    pub async fn run(self) -> Result<()> {
        let addr = SocketAddr::new(
            self.config
                .server
                .host
                .parse()
                .map_err(|e| Error::Config(format!("Invalid host: {e}")))?,
            self.config.server.port,
        );

        match self.registry.reload() {
            Ok(count) => info!(webhooks = count, dir = %self.registry.dir().display(), "Loaded webhooks"),
            Err(e) => warn!(error = %e, "Webhook registry loaded partially"),
        }

        let relay = self.supervisor.start()?;
        let mut relay_task = tokio::spawn(relay.run());

        let state = Arc::new(AppState {
            registry: Arc::clone(&self.registry),
            sender: Arc::clone(&self.sender),
            max_body_size: self.config.server.max_body_size,
        });
        let app = create_router(state);

        let listener = TcpListener::bind(addr).await?;

        info!("============================================================");
        info!("RELAY GATEWAY v{}", env!("CARGO_PKG_VERSION"));
        info!("============================================================");
        info!(host = %self.config.server.host, port = %self.config.server.port, "Listening");
        info!(binary = %self.config.relay.binary, config_dir = %self.config.relay.config_dir.display(), "Relay");
        info!(webhooks = self.registry.list().len(), "Webhooks registered");
        info!("============================================================");

        let server = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .into_future();

        tokio::select! {
            served = server => {
                self.supervisor.stop();
                served.map_err(|e| Error::Internal(e.to_string()))?;
                match relay_task.await {
                    Ok(Ok(status)) => info!(%status, "Relay stopped"),
                    Ok(Err(e)) => warn!(error = %e, "Relay stopped with error"),
                    Err(e) => warn!(error = %e, "Relay task failed"),
                }
                Ok(())
            }
            relay = &mut relay_task => {
                let reason = match relay {
                    Ok(Ok(status)) => status.to_string(),
                    Ok(Err(e)) => e.to_string(),
                    Err(e) => e.to_string(),
                };
                error!(reason = %reason, "Relay daemon is down");
                Err(Error::RelayTerminated(reason))
            }
        }
    }
}

/// Shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}
