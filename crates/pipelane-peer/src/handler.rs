use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use pipelane_frame::Framing;
use pipelane_transport::Connection;
use tokio::io::{ReadHalf, WriteHalf};
use tokio::sync::Mutex;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{PeerError, Result};
use crate::state::{RunState, RunStateCell};
use crate::status::{MessageSink, StatusEvent, StatusSink};

type Reader<F> = FramedRead<ReadHalf<Connection>, <F as Framing>::Codec>;
type Writer<F> = FramedWrite<WriteHalf<Connection>, <F as Framing>::Codec>;

struct ActiveWriter<F: Framing> {
    session: u64,
    sink: Arc<Mutex<Writer<F>>>,
}

/// The write half of the connection `send` currently targets.
///
/// Handlers install their writer on accept and remove it on exit, but only
/// while it is still theirs: a newer connection may have replaced it.
/// The slot lock is only held to swap writers; a write holds the lock of
/// its own session's writer, so a slow reply never blocks a new install.
pub(crate) struct ActiveConnection<F: Framing> {
    slot: Mutex<Option<ActiveWriter<F>>>,
}

impl<F: Framing> ActiveConnection<F> {
    pub(crate) fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    /// Make `sink` the reply target. Returns the session it displaced.
    async fn install(&self, session: u64, sink: Writer<F>) -> Option<u64> {
        let previous = self.slot.lock().await.replace(ActiveWriter {
            session,
            sink: Arc::new(Mutex::new(sink)),
        });
        previous.map(|active| active.session)
    }

    /// Drop the writer if it still belongs to `session`.
    async fn release(&self, session: u64) -> bool {
        let mut slot = self.slot.lock().await;
        if slot.as_ref().is_some_and(|active| active.session == session) {
            *slot = None;
            return true;
        }
        false
    }

    pub(crate) async fn send(&self, message: F::Message, timeout: Duration) -> Result<()> {
        let sink = self
            .slot
            .lock()
            .await
            .as_ref()
            .map(|active| Arc::clone(&active.sink))
            .ok_or(PeerError::NoActiveConnection)?;

        let write = async move { sink.lock().await.send(message).await };
        match tokio::time::timeout(timeout, write).await {
            Ok(result) => result.map_err(PeerError::from),
            Err(_) => Err(PeerError::Timeout(timeout)),
        }
    }

    #[cfg(test)]
    pub(crate) async fn session(&self) -> Option<u64> {
        self.slot.lock().await.as_ref().map(|active| active.session)
    }

    #[cfg(test)]
    async fn writer(&self) -> Option<Arc<Mutex<Writer<F>>>> {
        self.slot
            .lock()
            .await
            .as_ref()
            .map(|active| Arc::clone(&active.sink))
    }
}

/// Owns one accepted connection for its whole life.
pub(crate) struct ConnectionHandler<F: Framing> {
    session: u64,
    reader: Reader<F>,
    messages: MessageSink<F::Message>,
    status: StatusSink,
    shutdown: CancellationToken,
    state: RunStateCell,
}

impl<F: Framing> ConnectionHandler<F> {
    /// Split `conn`, publish its write half as the reply target and build
    /// the handler that reads from it.
    pub(crate) async fn attach(
        session: u64,
        conn: Connection,
        active: &ActiveConnection<F>,
        messages: MessageSink<F::Message>,
        status: StatusSink,
        shutdown: CancellationToken,
        state: RunStateCell,
    ) -> Self {
        let (read, write) = tokio::io::split(conn);
        let reader = FramedRead::with_capacity(read, F::Codec::default(), F::READ_BUFFER_SIZE);
        let writer = FramedWrite::new(write, F::Codec::default());

        if let Some(previous) = active.install(session, writer).await {
            debug!(session, previous, "newer connection replaced reply target");
        }
        state.set(RunState::Connected);

        Self {
            session,
            reader,
            messages,
            status,
            shutdown,
            state,
        }
    }

    /// Read and deliver messages until the connection ends or the server
    /// shuts down, then release the connection.
    pub(crate) async fn run(mut self, active: &ActiveConnection<F>) {
        let session = self.session;

        let reason = loop {
            let next = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break "server shutting down".to_string(),
                next = self.reader.next() => next,
            };

            match next {
                Some(Ok(message)) => {
                    self.status.report(StatusEvent::MessageReceived {
                        session,
                        bytes: F::wire_len(&message),
                    });
                    if !self.messages.deliver(message) {
                        debug!(session, "message receiver dropped; discarding");
                    }
                }
                Some(Err(err)) => break err.to_string(),
                None => break "connection closed by peer".to_string(),
            }
        };

        self.status
            .report(StatusEvent::ConnectionEnded { session, reason });

        if active.release(session).await {
            self.state
                .transition(RunState::Connected, RunState::Listening);
        }
        debug!(session, "handler finished");
    }
}
