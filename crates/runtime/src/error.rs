use crate::model::ModelError;
use thiserror::Error;

/// Linkage violations in the conversation log.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    /// A tool result refers to no unanswered invocation.
    #[error("no unanswered invocation with id {0}")]
    DanglingReference(String),

    /// An assistant turn reuses an id that is still outstanding.
    #[error("invocation id {0} is already outstanding")]
    DuplicateInvocation(String),

    /// A user turn was appended while invocations were still unanswered.
    #[error("{0} invocation(s) still unanswered")]
    UnansweredInvocations(usize),
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("model gateway: {0}")]
    Model(#[from] ModelError),

    #[error("tool provider: {0}")]
    Session(#[from] mcp::Error),

    #[error("conversation log: {0}")]
    Context(#[from] ContextError),
}

impl Error {
    /// A plain sentence to show the user instead of the raw error.
    pub fn user_message(&self) -> &'static str {
        match self {
            Error::Model(ModelError::Timeout(_)) => {
                "The assistant took too long to answer. Please try again."
            }
            Error::Model(e) if e.is_rate_limited() => {
                "The assistant is busy right now. Please wait a moment and try again."
            }
            Error::Model(e) if e.is_auth() => {
                "The assistant could not be reached with the configured credentials."
            }
            Error::Model(_) => "The assistant is unavailable right now. Please try again.",
            Error::Session(_) => {
                "The tool service stopped responding, so I couldn't finish that request."
            }
            Error::Context(_) => "Something went wrong with this conversation. Please try again.",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn user_messages_hide_raw_errors() {
        let timeout = Error::from(ModelError::Timeout(Duration::from_secs(60)));
        assert!(timeout.user_message().contains("too long"));

        let limited = Error::from(ModelError::Api {
            status: 429,
            message: "{\"error\":\"rate_limit\"}".into(),
        });
        assert!(!limited.user_message().contains("rate_limit"));
        assert!(limited.user_message().contains("busy"));

        let transport = Error::from(mcp::Error::Transport("broken pipe".into()));
        assert!(!transport.user_message().contains("pipe"));
    }
}
