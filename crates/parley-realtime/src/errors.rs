use thiserror::Error;

/// Errors raised by the realtime wire layer.
#[derive(Debug, Error)]
pub enum RealtimeError {
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("connection closed by remote endpoint")]
    ConnectionClosed,
    #[error("protocol violation: {0}")]
    Protocol(String),
    #[error("serialization failed: {0}")]
    Serialization(String),
    #[error("timed out after {waited_ms} ms waiting for {waiting_for}")]
    TimedOut {
        waiting_for: &'static str,
        waited_ms: u128,
    },
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl RealtimeError {
    /// True when the error means the connection can no longer be used.
    pub fn is_connection_level(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::ConnectionClosed | Self::TimedOut { .. }
        )
    }
}

impl From<serde_json::Error> for RealtimeError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}
