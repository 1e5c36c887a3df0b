/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// Fewer bytes than a frame header were supplied.
    #[error("frame too short ({len} bytes, header needs {min})")]
    FrameTooShort { len: usize, min: usize },

    /// The length field holds a negative value.
    #[error("invalid frame length field: {0}")]
    InvalidLength(i32),

    /// The buffer ends before the payload does.
    #[error("frame truncated (payload needs {expected} bytes, {available} available)")]
    Truncated { expected: usize, available: usize },

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed before a complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
