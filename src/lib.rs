//! Relay Gateway Library
//!
//! HTTP gateway in front of a long-running `signal-cli` daemon.
//!
//! # Features
//!
//! - **Relay supervision**: spawns the daemon and streams its JSON output
//! - **Webhook fanout**: every inbound event is posted to every registered URL
//! - **Persisted registry**: webhook URLs stored as digest-named files
//! - **Sends**: one-shot relay invocations with base64 attachments materialized
//!   as temporary files that never outlive the request

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod config;
pub mod error;
pub mod gateway;
pub mod relay;
pub mod send;
pub mod webhook;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => subscriber
            .with(fmt::layer().json())
            .try_init()
            .map_err(|e| Error::Internal(e.to_string())),
        _ => subscriber
            .with(fmt::layer())
            .try_init()
            .map_err(|e| Error::Internal(e.to_string())),
    }
}
