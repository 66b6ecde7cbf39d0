//! External relay process: the long-running daemon and one-shot invocations

mod invocation;
mod supervisor;

pub use self::invocation::{CommandRunner, Invocation, SignalCliRunner};
pub use self::supervisor::{RelayProcess, RelaySupervisor, forward_events, is_event};

use bytes::Bytes;

/// Receiver of well-formed relay events.
///
/// Implementations must return promptly; the relay read loop calls this inline.
pub trait EventSink: Send + Sync {
    /// Hand off one event line
    fn dispatch(&self, event: Bytes);
}
