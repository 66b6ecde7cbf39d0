//! Configuration management

use std::{env, path::Path, path::PathBuf, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,
    /// Relay binary and its directories
    pub relay: RelayConfig,
    /// Webhook fanout configuration
    pub webhooks: WebhookConfig,
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist or cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        // RELAY_GATEWAY_RELAY__BINARY=/usr/bin/signal-cli etc.
        figment = figment.merge(Env::prefixed("RELAY_GATEWAY_").split("__"));

        let mut config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        config.expand_env_vars()?;

        Ok(config)
    }

    /// Expand `${VAR}` and `${VAR:-default}` in relay paths
    fn expand_env_vars(&mut self) -> Result<()> {
        let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}")
            .map_err(|e| Error::Internal(e.to_string()))?;

        self.relay.binary = expand_string(&re, &self.relay.binary);
        self.relay.config_dir = expand_path(&re, &self.relay.config_dir);
        self.relay.attachment_tmp_dir = expand_path(&re, &self.relay.attachment_tmp_dir);

        Ok(())
    }
}

fn expand_string(re: &Regex, value: &str) -> String {
    re.replace_all(value, |caps: &regex::Captures| {
        let var_name = &caps[1];
        let default = caps.get(2).map_or("", |m| m.as_str());
        env::var(var_name).unwrap_or_else(|_| default.to_string())
    })
    .into_owned()
}

fn expand_path(re: &Regex, path: &Path) -> PathBuf {
    PathBuf::from(expand_string(re, &path.to_string_lossy()))
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Maximum request body size (bytes); attachments travel inline as base64
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            max_body_size: 100 * 1024 * 1024, // 100MB
        }
    }
}

/// Relay process configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Relay executable, resolved through `PATH` when not absolute
    pub binary: String,
    /// Relay config root; also hosts the webhook registry
    pub config_dir: PathBuf,
    /// Directory for materialized send attachments
    pub attachment_tmp_dir: PathBuf,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            binary: "signal-cli".to_string(),
            config_dir: PathBuf::from("/home/.local/share/signal-cli/"),
            attachment_tmp_dir: PathBuf::from("/tmp/"),
        }
    }
}

impl RelayConfig {
    /// Directory holding one file per registered webhook
    #[must_use]
    pub fn webhook_dir(&self) -> PathBuf {
        self.config_dir.join("webhook")
    }
}

/// Webhook fanout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// Timeout for a single delivery attempt
    #[serde(with = "humantime_serde")]
    pub delivery_timeout: Duration,
    /// Cap on in-flight deliveries across all events (0 = unbounded)
    pub max_concurrent_deliveries: usize,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            delivery_timeout: Duration::from_secs(30),
            max_concurrent_deliveries: 0,
        }
    }
}

/// Custom humantime serde module for Duration
pub mod humantime_serde {
    use std::time::Duration;

    use serde::{self, Deserialize, Deserializer, Serializer};

    /// Serialize Duration to human-readable string (e.g., "30s")
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the serializer fails.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}s", duration.as_secs()))
    }

    /// Deserialize human-readable duration string (e.g., "30s", "5m", "100ms")
    ///
    /// # Errors
    ///
    /// Returns a deserialization error if the string cannot be parsed as a duration.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;

        // "ms" must be checked before "s" and "m"
        if let Some(ms) = s.strip_suffix("ms") {
            ms.parse::<u64>()
                .map(Duration::from_millis)
                .map_err(serde::de::Error::custom)
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(serde::de::Error::custom)
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.parse::<u64>()
                .map(|m| Duration::from_secs(m * 60))
                .map_err(serde::de::Error::custom)
        } else {
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(serde::de::Error::custom)
        }
    }
}
