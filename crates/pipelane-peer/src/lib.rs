//! Request/response peers for pipelane channels.
//!
//! A [`PipeServer`] listens on a channel and hands every client to its own
//! handler task; replies go to the most recent client. The client side runs
//! one-shot transactions with bounded, retried connects via [`transact`].
//! Both report progress as [`StatusEvent`]s.

pub mod client;
pub mod config;
pub mod error;
mod handler;
pub mod server;
pub mod state;
pub mod status;

pub use client::{send_and_receive, spawn_transaction, transact, TransactionOutcome};
pub use config::{
    ClientConfig, ServerConfig, DEFAULT_ACCEPT_YIELD, DEFAULT_CONNECT_RETRIES,
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_DRAIN_TIMEOUT, DEFAULT_INSTANCE_CAPACITY,
    DEFAULT_OPERATION_TIMEOUT, DEFAULT_SEND_TIMEOUT,
};
pub use error::{PeerError, Result};
pub use server::PipeServer;
pub use state::RunState;
pub use status::{message_channel, status_channel, EventStream, MessageSink, StatusEvent, StatusSink};
