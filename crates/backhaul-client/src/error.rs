use std::path::PathBuf;
use std::time::Duration;

use backhaul_frame::FrameError;
use backhaul_transport::TransportError;

/// Errors establishing filesystem trust with the daemon.
///
/// All variants are fatal for the current request; there is no retry at this
/// layer.
#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    /// The calling OS user cannot be resolved to a passwd entry.
    #[error("cannot resolve calling user identity: {0}")]
    Identity(String),

    /// A stale credential file exists but cannot be removed.
    #[error("failed to remove stale credential file {path}: {source}")]
    Remove {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The fresh credential file cannot be created or written.
    #[error("failed to write credential file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Errors in the application envelope carried inside frame payloads.
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    /// A reply payload shorter than the 4-byte status prefix.
    #[error("reply too short ({len} bytes, need 4-byte status)")]
    TruncatedReply { len: usize },

    /// The request envelope is not valid base64.
    #[error("envelope is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    /// The decoded envelope is not valid UTF-8.
    #[error("envelope is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// The envelope is missing a `user|token|body` field.
    #[error("envelope missing {0} field")]
    MissingField(&'static str),

    /// The request body is not valid JSON.
    #[error("invalid request JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// The unified externally-visible error of the [`crate::Client`].
///
/// Lower layers raise narrow errors; this is the single place that records
/// the retry decision (reconnect-once vs. immediate failure).
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Socket-level failure (missing path, permissions, connect syscall).
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Framing failure outside of the send path.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// Credential handshake failure.
    #[error("handshake error: {0}")]
    Handshake(#[from] HandshakeError),

    /// Envelope encode/decode failure.
    #[error("envelope error: {0}")]
    Envelope(#[from] EnvelopeError),

    /// The daemon answered with a non-zero application status.
    #[error("daemon returned status {status}: {message}")]
    Daemon { status: u32, message: String },

    /// The connection failed mid-request and was replaced (at most once).
    ///
    /// The request was NOT resent: the daemon may or may not have observed
    /// it, and resending automatically could duplicate a side-effecting
    /// backup operation. If `reconnected` is true a fresh connection is
    /// ready and the caller may call `send` again.
    #[error("connection lost mid-request (reconnected: {reconnected}); resend to retry")]
    ConnectionReset {
        reconnected: bool,
        #[source]
        source: FrameError,
    },

    /// No complete response frame arrived within the configured deadline.
    #[error("no response from daemon within {0:?}")]
    Timeout(Duration),
}

pub type Result<T> = std::result::Result<T, ClientError>;
