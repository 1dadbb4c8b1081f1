// Common error taxonomy for the streaming client

use crate::crypto::CryptoError;
use thiserror::Error;

/// Result type for streaming operations
pub type StreamResult<T> = Result<T, StreamError>;

/// Errors that can occur while establishing, running, or tearing down an
/// acquisition session.
#[derive(Debug, Error)]
pub enum StreamError {
    /// Device unreachable after the configured number of attempts. Fatal to
    /// the session; the device is left unattached.
    #[error("device unreachable after {attempts} attempts: {last}")]
    Connection { attempts: u32, last: String },

    #[error("device already connected")]
    AlreadyConnected,

    #[error("device not connected")]
    NotConnected,

    /// Device fault while streaming (read/start/stop failure).
    #[error("device fault: {0}")]
    Device(String),

    /// Key exchange failed; no session is possible and no key is committed.
    #[error("handshake failed at {stage} stage: {detail}")]
    Handshake {
        stage: &'static str,
        detail: String,
    },

    /// Metadata rejected before any network I/O (fail-closed).
    #[error("invalid metadata: {0}")]
    Validation(String),

    /// Single-cycle upload rejection. Recoverable: the loop continues with
    /// fresh data on the next cycle. `status` is 0 for transport-level
    /// failures that never produced a response.
    #[error("upload rejected (status {status}): {body}")]
    Upload { status: u16, body: String },

    /// Too many consecutive upload failures; the loop gave up.
    #[error("aborted after {failures} consecutive upload failures")]
    UploadAborted { failures: u32 },

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Server reply did not match the expected shape.
    #[error("unexpected response: {0}")]
    Response(String),
}
