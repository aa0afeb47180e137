//! Error types for live sessions.

use thiserror::Error;

use crate::protocol::SessionState;

/// Result type for live session operations.
pub type Result<T> = std::result::Result<T, LiveError>;

#[derive(Error, Debug)]
pub enum LiveError {
    /// The peer broke the session protocol. Fatal for the connection.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The connection ended before the server acknowledged `setup`.
    #[error("connection closed before setup completed")]
    ClosedBeforeSetup,

    /// A send was attempted outside the `Active` state.
    #[error("session is not active (state: {0:?})")]
    NotActive(SessionState),

    #[error(transparent)]
    Core(#[from] genai::Error),
}

impl LiveError {
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::ProtocolViolation(message.into())
    }

    /// Whether the session can no longer be used.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ProtocolViolation(_) | Self::Connection(_) | Self::ClosedBeforeSetup)
    }
}
