//! User-scoped local channel transport.
//!
//! Provides a unified interface over the local transport mechanisms:
//! - Unix domain sockets (Linux/macOS), one socket file per channel in a
//!   per-user runtime directory
//! - Named pipes (Windows)
//!
//! This is the lowest layer of pipelane. Everything else builds on top of
//! the [`Connection`] type provided here.

pub mod connect;
pub mod connection;
pub mod discovery;
pub mod error;
pub mod name;

#[cfg(unix)]
pub mod uds;

#[cfg(windows)]
pub mod pipe;

pub use connect::{connect, CONNECT_POLL_INTERVAL};
pub use connection::Connection;
pub use discovery::{find_channel, list_channels};
pub use error::{Result, TransportError};
pub use name::{default_runtime_dir, ChannelName, Endpoint, RUNTIME_DIR_ENV};

/// A listening instance for the current platform.
#[cfg(unix)]
pub use uds::UnixDomainSocket as ChannelListener;

/// A listening instance for the current platform.
#[cfg(windows)]
pub use pipe::NamedPipeInstance as ChannelListener;
