use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;

/// Lifecycle of a server's receive loop.
///
/// Starts at `Listening`; `ShuttingDown` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunState {
    /// Waiting for a client.
    Listening,
    /// A handler owns a connection that `send` can reply on.
    Connected,
    /// The loop has stopped or is stopping.
    ShuttingDown,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Listening => "listening",
            RunState::Connected => "connected",
            RunState::ShuttingDown => "shutting-down",
        };
        f.write_str(name)
    }
}

/// Owner-side handle to the run state. Observers only get receivers.
#[derive(Debug, Clone)]
pub(crate) struct RunStateCell {
    tx: Arc<watch::Sender<RunState>>,
}

impl RunStateCell {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(RunState::Listening);
        Self { tx: Arc::new(tx) }
    }

    pub(crate) fn get(&self) -> RunState {
        *self.tx.borrow()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<RunState> {
        self.tx.subscribe()
    }

    /// Move to `next` unless already shutting down.
    pub(crate) fn set(&self, next: RunState) -> bool {
        self.tx.send_if_modified(|current| {
            if *current == RunState::ShuttingDown || *current == next {
                return false;
            }
            *current = next;
            true
        })
    }

    /// Move from `from` to `to`; no-op from any other state.
    pub(crate) fn transition(&self, from: RunState, to: RunState) -> bool {
        self.tx.send_if_modified(|current| {
            if *current != from || from == to {
                return false;
            }
            *current = to;
            true
        })
    }
}
