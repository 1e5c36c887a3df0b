//! Request/response messaging over user-scoped local channels.
//!
//! A server listens on a named channel and accepts clients one after another;
//! clients run one-shot transactions with bounded, retried connects. Channels
//! are Unix domain sockets in a per-user runtime directory, or named pipes on
//! Windows.
//!
//! # Crate Structure
//!
//! - [`transport`]: channel names, endpoints, listeners and connect
//! - [`frame`]: type-tagged, length-prefixed frames and the legacy text codec
//! - [`peer`]: transactions, the receive loop and status events (behind `peer` feature)

/// Re-export transport types.
pub mod transport {
    pub use pipelane_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use pipelane_frame::*;
}

/// Re-export peer types (requires `peer` feature).
#[cfg(feature = "peer")]
pub mod peer {
    pub use pipelane_peer::*;
}
