use std::time::Duration;

use thiserror::Error;

/// Errors from Model Gateway calls. None of them are retried by the
/// conversation loop.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ModelError {
    /// The request never got an HTTP response.
    #[error("network: {0}")]
    Network(String),

    /// The gateway answered with a non-success status.
    #[error("gateway returned {status}: {message}")]
    Api { status: u16, message: String },

    /// The response body could not be understood.
    #[error("invalid gateway response: {0}")]
    InvalidResponse(String),

    /// The call did not finish within its budget.
    #[error("no response within {0:?}")]
    Timeout(Duration),
}

impl ModelError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ModelError::Api { status: 429, .. })
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, ModelError::Api { status: 401 | 403, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_status() {
        let limited = ModelError::Api {
            status: 429,
            message: "slow down".into(),
        };
        assert!(limited.is_rate_limited());
        assert!(!limited.is_auth());

        let denied = ModelError::Api {
            status: 401,
            message: "bad key".into(),
        };
        assert!(denied.is_auth());
        assert_eq!(denied.to_string(), "gateway returned 401: bad key");
    }
}
