//! Error types for message bus

use thiserror::Error;

/// Message bus error
#[derive(Debug, Error)]
pub enum Error {
    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Publish error
    #[error("Publish error on {channel}: {reason}")]
    Publish {
        /// Channel the message was addressed to
        channel: String,
        /// Underlying failure
        reason: String,
    },

    /// Subscribe error
    #[error("Subscribe error on {channel}: {reason}")]
    Subscribe {
        /// Channel the subscription was requested for
        channel: String,
        /// Underlying failure
        reason: String,
    },

    /// Unsubscribe error
    #[error("Unsubscribe error on {channel}: {reason}")]
    Unsubscribe {
        /// Channel the subscription belonged to
        channel: String,
        /// Underlying failure
        reason: String,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Payload could not be decoded into the requested type
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Channel name the bus implementation cannot carry unambiguously
    #[error("Invalid channel name: {0}")]
    InvalidChannel(String),

    /// No correlated message arrived in time
    #[error("Timed out after {timeout_ms}ms waiting on {channel}")]
    Timeout {
        /// Channel that was being awaited
        channel: String,
        /// Configured wait window
        timeout_ms: u64,
    },

    /// The correlation waiter was released without a message
    #[error("Correlation channel closed: {0}")]
    ChannelClosed(String),
}

impl Error {
    /// True when the error is a correlation timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }
}

/// Result type
pub type Result<T> = std::result::Result<T, Error>;
