//! Webhook fanout
//!
//! Every inbound event is posted to every registered URL in its own spawned
//! task. Deliveries are single-attempt and unacknowledged: the caller never
//! learns the outcome, failures are only logged.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use super::registry::WebhookRegistry;
use crate::config::WebhookConfig;
use crate::relay::EventSink;
use crate::{Error, Result};

/// Posts relay events to registered webhooks
pub struct WebhookDispatcher {
    client: reqwest::Client,
    registry: Arc<WebhookRegistry>,
    timeout: Duration,
    /// Present only when in-flight deliveries are capped
    limiter: Option<Arc<Semaphore>>,
}

impl WebhookDispatcher {
    /// Create a dispatcher reading URLs from `registry`
    pub fn new(registry: Arc<WebhookRegistry>, config: &WebhookConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("relay-gateway/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(Error::Http)?;

        let limiter = (config.max_concurrent_deliveries > 0)
            .then(|| Arc::new(Semaphore::new(config.max_concurrent_deliveries)));

        Ok(Self {
            client,
            registry,
            timeout: config.delivery_timeout,
            limiter,
        })
    }

    /// Schedule one delivery of `event` per registered URL and return how many
    /// were scheduled. Must be called from within a Tokio runtime.
    pub fn fan_out(&self, event: Bytes) -> usize {
        let urls = self.registry.list();

        for url in urls.iter() {
            let client = self.client.clone();
            let limiter = self.limiter.clone();
            let url = url.clone();
            // Bytes clones share the buffer but each request owns its body
            let body = event.clone();
            let timeout = self.timeout;

            tokio::spawn(async move {
                let _permit = match limiter {
                    Some(sem) => match sem.acquire_owned().await {
                        Ok(permit) => Some(permit),
                        Err(_) => return,
                    },
                    None => None,
                };
                deliver(&client, &url, body, timeout).await;
            });
        }

        debug!(endpoints = urls.len(), bytes = event.len(), "Dispatched event");
        urls.len()
    }
}

impl EventSink for WebhookDispatcher {
    fn dispatch(&self, event: Bytes) {
        self.fan_out(event);
    }
}

async fn deliver(client: &reqwest::Client, url: &str, body: Bytes, timeout: Duration) {
    let result = client
        .post(url)
        .header(CONTENT_TYPE, "application/json")
        .timeout(timeout)
        .body(body)
        .send()
        .await;

    match result {
        Ok(response) if response.status().is_success() => {
            debug!(url = %url, status = %response.status(), "Webhook delivered");
        }
        Ok(response) => {
            warn!(url = %url, status = %response.status(), "Webhook rejected event");
        }
        Err(e) => {
            warn!(url = %url, error = %e, "Webhook delivery failed");
        }
    }
}
