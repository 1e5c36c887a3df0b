use std::path::PathBuf;
use std::time::Duration;

/// Errors that can occur in channel transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The channel name cannot be mapped to an endpoint.
    #[error("invalid channel name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },

    /// Failed to create a listening instance for the endpoint.
    #[error("failed to bind to {path}: {source}")]
    Bind {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to connect to the endpoint for a reason other than absence.
    #[error("failed to connect to {path}: {source}")]
    Connect {
        path: PathBuf,
        source: std::io::Error,
    },

    /// No listener accepted the connection within the attempt window.
    #[error("timed out connecting to {path} after {timeout:?}")]
    ConnectTimeout { path: PathBuf, timeout: Duration },

    /// Failed to accept an incoming connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The socket path is too long for the platform.
    #[error("socket path too long ({len} bytes, max {max}): {path}")]
    PathTooLong {
        path: PathBuf,
        len: usize,
        max: usize,
    },
}

impl TransportError {
    /// True for failures that only concern the timing of a connect attempt.
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::ConnectTimeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
