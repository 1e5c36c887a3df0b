/// Errors that can occur in peer operations.
///
/// Connect timeouts, lost connections and operation timeouts inside a
/// transaction or receive loop are reported as status events instead; the
/// variants here reach the caller only for precondition violations and
/// cooperative cancellation.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] pipelane_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] pipelane_frame::FrameError),

    /// `send` was called while no client is connected.
    #[error("no active connection to send on")]
    NoActiveConnection,

    /// Operation timed out.
    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The receive loop was cancelled.
    #[error("cancelled")]
    Cancelled,

    /// A background task panicked or was aborted.
    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl PeerError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PeerError::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, PeerError>;
