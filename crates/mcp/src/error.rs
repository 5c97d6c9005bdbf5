//! Session error types.

use std::time::Duration;

use crate::protocol::RequestId;
use crate::session::SessionState;
use thiserror::Error;

/// Errors raised by a tool provider session.
///
/// Tool-side failures are never reported here; they come back as a failed
/// [`CallOutcome`](crate::CallOutcome). Everything in this enum is
/// either a launch/handshake failure or a transport problem.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The provider process could not be started.
    #[error("launch failed: {0}")]
    Launch(String),

    /// The handshake did not finish in time. The process has been killed.
    #[error("handshake did not complete within {0:?}")]
    ConnectTimeout(Duration),

    /// The provider violated the wire protocol (malformed frame, unknown id,
    /// unexpected payload).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The byte stream to the provider broke.
    #[error("transport error: {0}")]
    Transport(String),

    /// A tool call did not get a response in time.
    #[error("request {id} timed out after {timeout:?}")]
    InvokeTimeout { id: RequestId, timeout: Duration },

    /// A request was attempted before the handshake finished.
    #[error("session not ready (state: {state:?})")]
    NotReady { state: SessionState },

    /// The session has been closed and accepts no further requests.
    #[error("session closed")]
    Closed,

    #[error("failed to serialize request: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("frame too large: {size} bytes (max {max})")]
    OutputTooLarge { size: usize, max: usize },
}

impl Error {
    /// Whether this error leaves the session `Closed`.
    ///
    /// The orchestrator uses this to decide between folding the failure into
    /// the conversation and aborting the remaining invocations of a batch.
    pub fn is_session_fatal(&self) -> bool {
        !matches!(self, Error::NotReady { .. } | Error::Serialize(_))
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Transport(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_and_protocol_errors_are_fatal() {
        let timeout = Error::InvokeTimeout {
            id: RequestId::Number(3),
            timeout: Duration::from_secs(1),
        };
        assert!(timeout.is_session_fatal());
        assert!(Error::Protocol("bad frame".into()).is_session_fatal());
        assert!(Error::Closed.is_session_fatal());
    }

    #[test]
    fn not_ready_is_not_fatal() {
        let err = Error::NotReady {
            state: SessionState::Handshaking,
        };
        assert!(!err.is_session_fatal());
        assert_eq!(err.to_string(), "session not ready (state: Handshaking)");
    }
}
