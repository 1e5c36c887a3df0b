use std::path::PathBuf;
use std::time::Duration;

/// Per-attempt connect window.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);
/// Retries after the first connect attempt times out.
pub const DEFAULT_CONNECT_RETRIES: u32 = 10;
/// Bound on send + receive once connected.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(5);
/// Listening instances allowed per channel.
pub const DEFAULT_INSTANCE_CAPACITY: u32 = 10;
/// Pause between listener iterations.
pub const DEFAULT_ACCEPT_YIELD: Duration = Duration::from_millis(1);
/// Bound on a server reply.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);
/// How long shutdown waits for in-flight handlers.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for client transactions.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Window for each connect attempt.
    pub connect_timeout: Duration,
    /// Additional attempts after the first one times out.
    pub connect_retries: u32,
    /// Bound on writing the request and reading the response.
    pub operation_timeout: Duration,
    /// Directory holding channel sockets. `None` uses the default.
    pub runtime_dir: Option<PathBuf>,
}

impl ClientConfig {
    /// Total connect attempts, including the first.
    pub fn max_attempts(&self) -> u32 {
        self.connect_retries.saturating_add(1)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            connect_retries: DEFAULT_CONNECT_RETRIES,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
            runtime_dir: None,
        }
    }
}

/// Configuration for the server listener and its handlers.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listening instances that may be mid-setup for one channel.
    pub instance_capacity: u32,
    /// Pause before re-listening after each accepted connection.
    pub accept_yield: Duration,
    /// Bound on a single `send`.
    pub send_timeout: Duration,
    /// How long the receive loop waits for handlers to finish on exit.
    pub drain_timeout: Duration,
    /// Directory holding channel sockets. `None` uses the default.
    pub runtime_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            instance_capacity: DEFAULT_INSTANCE_CAPACITY,
            accept_yield: DEFAULT_ACCEPT_YIELD,
            send_timeout: DEFAULT_SEND_TIMEOUT,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            runtime_dir: None,
        }
    }
}
