use std::path::PathBuf;

/// Errors that can occur while managing the daemon socket.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The socket path does not exist (the daemon is not running).
    #[error("socket path {path} does not exist: {source}")]
    SocketMissing {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The path exists but is not a Unix domain socket.
    #[error("path {path} exists but is not a unix socket")]
    NotASocket { path: PathBuf },

    /// Failed to bind to the specified path.
    #[error("failed to bind to {path}: {source}")]
    Bind {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to connect to the specified path.
    #[error("failed to connect to {path}: {source}")]
    Connect {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to accept an incoming connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// An I/O error occurred on the stream itself.
    #[error("socket I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The socket path is too long for the platform.
    #[error("socket path too long ({len} bytes, max {max}): {path}")]
    PathTooLong {
        path: PathBuf,
        len: usize,
        max: usize,
    },
}

pub type Result<T> = std::result::Result<T, TransportError>;
