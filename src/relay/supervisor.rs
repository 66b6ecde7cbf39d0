//! Relay daemon supervision
//!
//! Spawns `<binary> --config <dir> --output=json daemon --system`, reads its
//! stdout line by line and forwards every line that parses as JSON to an
//! [`EventSink`]. Other lines are diagnostics from the relay and are dropped.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::EventSink;
use crate::{Error, Result};

/// Whether a relay output line is a well-formed JSON record
#[must_use]
pub fn is_event(line: &[u8]) -> bool {
    serde_json::from_slice::<serde::de::IgnoredAny>(line).is_ok()
}

/// Owns the relay daemon's lifecycle
pub struct RelaySupervisor {
    binary: String,
    config_dir: PathBuf,
    sink: Arc<dyn EventSink>,
    /// Kill switch of the currently running process, if any
    running: Mutex<Option<CancellationToken>>,
}

impl RelaySupervisor {
    /// Create a supervisor; nothing is spawned until [`start`](Self::start)
    pub fn new(binary: impl Into<String>, config_dir: impl Into<PathBuf>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            binary: binary.into(),
            config_dir: config_dir.into(),
            sink,
            running: Mutex::new(None),
        }
    }

    /// Arguments passed to the relay binary
    #[must_use]
    pub fn daemon_args(&self) -> Vec<String> {
        vec![
            "--config".to_string(),
            self.config_dir.to_string_lossy().into_owned(),
            "--output=json".to_string(),
            "daemon".to_string(),
            "--system".to_string(),
        ]
    }

    /// Spawn the relay daemon
    pub fn start(&self) -> Result<RelayProcess> {
        let mut child = Command::new(&self.binary)
            .args(self.daemon_args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Startup(format!("{}: {e}", self.binary)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Startup("Failed to capture relay stdout".to_string()))?;

        let token = CancellationToken::new();
        if let Some(previous) = self.running.lock().replace(token.clone()) {
            previous.cancel();
        }

        info!(binary = %self.binary, pid = ?child.id(), "Relay daemon started");

        Ok(RelayProcess {
            child,
            stdout,
            sink: Arc::clone(&self.sink),
            stop: token,
        })
    }

    /// Kill the running daemon. Safe to call repeatedly or before `start`.
    pub fn stop(&self) {
        if let Some(token) = self.running.lock().take() {
            info!("Stopping relay daemon");
            token.cancel();
        }
    }
}

/// A spawned relay daemon and its output stream
pub struct RelayProcess {
    child: Child,
    stdout: ChildStdout,
    sink: Arc<dyn EventSink>,
    stop: CancellationToken,
}

impl RelayProcess {
    /// Forward events until the daemon exits or is stopped, then reap it.
    pub async fn run(self) -> Result<ExitStatus> {
        let Self {
            mut child,
            stdout,
            sink,
            stop,
        } = self;

        info!("Scanning relay stdout");
        let reader = BufReader::new(stdout);

        tokio::select! {
            result = forward_events(reader, sink.as_ref()) => match result {
                Ok(forwarded) => debug!(forwarded, "Relay stdout closed"),
                Err(e) => error!(error = %e, "Relay stdout read failed"),
            },
            () = stop.cancelled() => {}
        }

        // stdout may close before the process exits; a stop still has to reach it
        let exited = tokio::select! {
            status = child.wait() => Some(status),
            () = stop.cancelled() => None,
        };
        let status = match exited {
            Some(status) => status?,
            None => {
                if let Err(e) = child.start_kill() {
                    warn!(error = %e, "Failed to kill relay daemon");
                }
                child.wait().await?
            }
        };

        if status.success() {
            info!(%status, "Relay daemon exited");
        } else {
            error!(%status, "Relay daemon exited");
        }
        Ok(status)
    }
}

/// Read newline-delimited records and hand JSON ones to `sink`.
/// Returns the number of records forwarded.
pub async fn forward_events<R>(reader: R, sink: &dyn EventSink) -> std::io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.split(b'\n');
    let mut forwarded = 0;

    while let Some(mut line) = lines.next_segment().await? {
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        trace!(len = line.len(), wire = %String::from_utf8_lossy(&line), "Relay line");

        if is_event(&line) {
            sink.dispatch(Bytes::from(line));
            forwarded += 1;
        } else {
            debug!(len = line.len(), "Discarding non-JSON relay line");
        }
    }

    Ok(forwarded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<Bytes>>);

    impl EventSink for Recorder {
        fn dispatch(&self, event: Bytes) {
            self.0.lock().push(event);
        }
    }

    #[test]
    fn recognizes_json_records() {
        assert!(is_event(br#"{"envelope":{"source":"+100"}}"#));
        assert!(is_event(b"[1,2,3]"));
        assert!(!is_event(b"INFO  DaemonCommand - Listening on system bus"));
        assert!(!is_event(b"{\"truncated\":"));
        assert!(!is_event(b""));
    }

    #[tokio::test]
    async fn forwards_only_well_formed_lines() {
        let input: &[u8] = b"starting daemon\n{\"a\":1}\r\nnot json\n\n{\"b\":2}";
        let sink = Recorder::default();

        let forwarded = forward_events(input, &sink).await.unwrap();

        assert_eq!(forwarded, 2);
        let seen = sink.0.lock();
        assert_eq!(seen[0].as_ref(), br#"{"a":1}"#);
        assert_eq!(seen[1].as_ref(), br#"{"b":2}"#);
    }

    #[tokio::test]
    async fn malformed_stream_forwards_nothing() {
        let input: &[u8] = b"garbage\n{broken\n";
        let sink = Recorder::default();
        assert_eq!(forward_events(input, &sink).await.unwrap(), 0);
        assert!(sink.0.lock().is_empty());
    }

    #[test]
    fn daemon_args_are_fixed() {
        let supervisor = RelaySupervisor::new("signal-cli", "/data/signal", Arc::new(Recorder::default()));
        assert_eq!(
            supervisor.daemon_args(),
            ["--config", "/data/signal", "--output=json", "daemon", "--system"]
        );
    }

    #[test]
    fn stop_without_process_is_noop() {
        let supervisor = RelaySupervisor::new("signal-cli", "/data/signal", Arc::new(Recorder::default()));
        supervisor.stop();
        supervisor.stop();
    }
}
