//! Error types for the sync engine, persisted client state, the WebSocket
//! protocol and the playback outlets

use thiserror::Error;

/// Persisted client state errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// Reading or writing the backing file failed
    #[error("state store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The backing file does not hold a JSON object of strings
    #[error("state store is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    /// A stored value could not be interpreted
    #[error("invalid value for key '{key}': {value}")]
    InvalidValue { key: String, value: String },
}

/// Result type for persisted state operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Sync engine errors
#[derive(Error, Debug)]
pub enum SyncError {
    /// HTTP request failed (connect, timeout, body read)
    #[error("sync request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a non-success status
    #[error("sync endpoint returned HTTP {status}")]
    HttpStatus { status: u16 },

    /// Credentials were rejected
    #[error("sync request was not authorized")]
    Unauthorized,

    /// The requested event range is no longer retained by the server log
    #[error("events after seq {since} have been pruned from the server log")]
    LogPruned { since: i64 },

    /// Events could not be replayed contiguously from the cursor
    #[error("sequence gap: expected seq {expected}, got {actual}")]
    SequenceGap { expected: i64, actual: i64 },

    /// Response body could not be decoded
    #[error("failed to decode sync response: {0}")]
    Decode(#[from] serde_json::Error),

    /// Cursor persistence failed
    #[error("failed to persist sync cursor: {0}")]
    Store(#[from] StoreError),
}

impl SyncError {
    /// Check if this error is a transient failure worth retrying later
    ///
    /// Pruned logs and gaps are recovered internally by a full sync, so they
    /// never reach a caller's retry policy.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Http(e) => {
                if e.is_timeout() || e.is_connect() {
                    return true;
                }
                matches!(e.status(), Some(status) if status.is_server_error())
            }
            SyncError::HttpStatus { status } => *status >= 500 || *status == 429,
            SyncError::Store(_) => true,
            _ => false,
        }
    }
}

/// Result type for sync operations
pub type SyncResult<T> = Result<T, SyncError>;

/// WebSocket protocol errors
///
/// None of these are fatal to the connection; callers log and move on.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Frame is not a `{type, payload}` envelope
    #[error("malformed message: {0}")]
    Malformed(serde_json::Error),

    /// Envelope type is not one this client understands
    #[error("unknown message type: {0}")]
    UnknownType(String),

    /// Known type whose payload failed to decode
    #[error("invalid payload for {msg_type}: {source}")]
    InvalidPayload {
        msg_type: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Playback outlet errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OutletError {
    /// Operation only makes sense on the device rendering audio
    #[error("{0} is not available while controlling a remote device")]
    RemoteMode(&'static str),
}
