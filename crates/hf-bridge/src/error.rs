use std::time::Duration;
use thiserror::Error;

/// Failures crossing the command-bridge boundary.
///
/// A call that never came back (`Timeout`) is reported separately from
/// one the backend actively rejected (`Rejected`).
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The deadline elapsed before the backend acknowledged the call.
    #[error("{command} timed out after {elapsed:?}")]
    Timeout {
        command: &'static str,
        elapsed: Duration,
    },

    /// The backend processed the call and reported failure.
    #[error("{command} rejected: {message}")]
    Rejected {
        command: &'static str,
        message: String,
    },

    /// The transport to the backend is gone.
    #[error("bridge channel closed")]
    ChannelClosed,
}

impl BridgeError {
    pub fn rejected(command: &'static str, message: impl Into<String>) -> Self {
        Self::Rejected {
            command,
            message: message.into(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
