//! One-shot relay command execution
//!
//! A started invocation runs to completion even if the caller stops waiting
//! for it, e.g. when an HTTP client disconnects mid-send.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::{Error, Result};

/// Arguments and standard input for one relay invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Arguments after the binary name
    pub args: Vec<String>,
    /// Written to the process's stdin, then closed
    pub stdin: String,
}

/// Executes relay invocations
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion and return the combined output.
    /// A non-zero exit is an [`Error::Subprocess`] carrying that output.
    async fn run(&self, invocation: &Invocation) -> Result<String>;
}

/// Runs invocations against the real relay binary
pub struct SignalCliRunner {
    binary: String,
}

impl SignalCliRunner {
    /// Create a runner for `binary`
    #[must_use]
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl CommandRunner for SignalCliRunner {
    async fn run(&self, invocation: &Invocation) -> Result<String> {
        debug!(binary = %self.binary, args = ?invocation.args, "Running relay command");

        let mut child = Command::new(&self.binary)
            .args(&invocation.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::Subprocess(format!("Failed to spawn {}: {e}", self.binary)))?;

        if let Some(mut stdin) = child.stdin.take() {
            // The binary may exit before reading stdin; its exit status tells the story.
            if let Err(e) = stdin.write_all(invocation.stdin.as_bytes()).await {
                warn!(error = %e, "Failed to write relay stdin");
            }
        }

        let output = child.wait_with_output().await?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        if output.status.success() {
            Ok(combined)
        } else {
            let message = combined.trim();
            if message.is_empty() {
                Err(Error::Subprocess(format!("{} exited with {}", self.binary, output.status)))
            } else {
                Err(Error::Subprocess(message.to_string()))
            }
        }
    }
}
