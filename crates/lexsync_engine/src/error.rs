//! Error types for the sync engine.

use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
///
/// These never cross the caller-facing API; the engine converts them
/// into an `Error`/`Offline` state and a recorded message.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or transport failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The server rejected the request (non-2xx with an error body).
    #[error("server error: {0}")]
    Server(String),

    /// The durable state store failed to read or write.
    #[error("storage error: {0}")]
    Storage(String),

    /// Persisted state or a wire message failed to (de)serialize.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

impl SyncError {
    /// Creates a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Creates a server-rejection error.
    pub fn server(message: impl Into<String>) -> Self {
        Self::Server(message.into())
    }

    /// Creates a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        assert_eq!(
            SyncError::transport("connection reset").to_string(),
            "transport error: connection reset"
        );
        assert_eq!(
            SyncError::server("quota exceeded").to_string(),
            "server error: quota exceeded"
        );
        assert_eq!(
            SyncError::storage("disk full").to_string(),
            "storage error: disk full"
        );
    }
}
