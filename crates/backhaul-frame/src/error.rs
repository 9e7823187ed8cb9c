/// Errors that can occur while framing or unframing the byte stream.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The frame header declares a zero or oversized payload length.
    ///
    /// The stream buffer has already been advanced by one byte so a fresh
    /// delimiter scan can resume, but callers should treat this as
    /// connection-fatal.
    #[error("invalid frame length {length} (max {max})")]
    InvalidLength { length: usize, max: usize },

    /// The integrity trailer does not repeat the header length.
    ///
    /// Same one-byte-advance contract as [`FrameError::InvalidLength`].
    #[error("frame length mismatch (header {expected}, trailer {found})")]
    LengthMismatch { expected: usize, found: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream reached EOF before a complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

impl FrameError {
    /// True for malformed-frame errors (as opposed to plain I/O failures).
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            FrameError::InvalidLength { .. } | FrameError::LengthMismatch { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
