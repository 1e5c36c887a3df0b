//! Long-running listener that hands each client to its own handler task.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use pipelane_frame::{Binary, Framing};
use pipelane_transport::{ChannelListener, Connection, Endpoint, TransportError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

use crate::config::ServerConfig;
use crate::error::{PeerError, Result};
use crate::handler::{ActiveConnection, ConnectionHandler};
use crate::state::{RunState, RunStateCell};
use crate::status::{MessageSink, StatusEvent, StatusSink};

/// Serves one channel: accepts clients one after another on a single
/// listener, delivers what they send, and replies on the most recent
/// connection via [`send`].
///
/// Dropping the server cancels its receive loop.
///
/// [`send`]: PipeServer::send
pub struct PipeServer<F: Framing = Binary> {
    config: ServerConfig,
    state: RunStateCell,
    lifetime: CancellationToken,
    active: Arc<ActiveConnection<F>>,
    handlers: TaskTracker,
    next_session: Arc<AtomicU64>,
}

impl<F: Framing> PipeServer<F> {
    pub fn new() -> Self {
        Self::with_config(ServerConfig::default())
    }

    pub fn with_config(config: ServerConfig) -> Self {
        Self {
            config,
            state: RunStateCell::new(),
            lifetime: CancellationToken::new(),
            active: Arc::new(ActiveConnection::new()),
            handlers: TaskTracker::new(),
            next_session: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Start the receive loop for `channel` as a background task.
    ///
    /// Messages from every client go to `messages`. The task ends with
    /// `Ok(())` when listening fails and with [`PeerError::Cancelled`] when
    /// `cancel` fires or the server is shut down. An invalid channel name
    /// ends it immediately with the transport error.
    pub fn receive(
        &self,
        channel: &str,
        messages: MessageSink<F::Message>,
        status: StatusSink,
        cancel: Option<CancellationToken>,
    ) -> JoinHandle<Result<()>> {
        let endpoint = match Endpoint::for_name(channel, self.config.runtime_dir.as_deref()) {
            Ok(endpoint) => endpoint,
            Err(err) => return tokio::spawn(async move { Err(err.into()) }),
        };

        self.handlers.reopen();
        let receive_loop = ReceiveLoop {
            endpoint,
            config: self.config.clone(),
            state: self.state.clone(),
            lifetime: self.lifetime.clone(),
            cancel: cancel.unwrap_or_default(),
            sessions: self.lifetime.child_token(),
            active: Arc::clone(&self.active),
            handlers: self.handlers.clone(),
            next_session: Arc::clone(&self.next_session),
            messages,
            status,
        };
        tokio::spawn(receive_loop.run())
    }

    /// Reply on the most recent connection, bounded by the send timeout.
    pub async fn send(&self, message: F::Message) -> Result<()> {
        self.active.send(message, self.config.send_timeout).await
    }

    pub fn state(&self) -> RunState {
        self.state.get()
    }

    /// Watch run-state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<RunState> {
        self.state.subscribe()
    }

    /// False once the receive loop has stopped or is stopping.
    pub fn is_running(&self) -> bool {
        self.state.get() != RunState::ShuttingDown
    }

    /// Handler tasks that have not finished yet.
    pub fn active_handlers(&self) -> usize {
        self.handlers.len()
    }

    /// Cancel the receive loop and every handler.
    pub fn shutdown(&self) {
        self.lifetime.cancel();
    }
}

impl<F: Framing> Default for PipeServer<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: Framing> Drop for PipeServer<F> {
    fn drop(&mut self) {
        self.lifetime.cancel();
    }
}

impl<F: Framing> std::fmt::Debug for PipeServer<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeServer")
            .field("variant", &F::NAME)
            .field("state", &self.state.get())
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

struct ReceiveLoop<F: Framing> {
    endpoint: Endpoint,
    config: ServerConfig,
    state: RunStateCell,
    lifetime: CancellationToken,
    cancel: CancellationToken,
    sessions: CancellationToken,
    active: Arc<ActiveConnection<F>>,
    handlers: TaskTracker,
    next_session: Arc<AtomicU64>,
    messages: MessageSink<F::Message>,
    status: StatusSink,
}

impl<F: Framing> ReceiveLoop<F> {
    async fn run(self) -> Result<()> {
        let result = self.accept_loop().await;

        self.sessions.cancel();
        self.handlers.close();
        if tokio::time::timeout(self.config.drain_timeout, self.handlers.wait())
            .await
            .is_err()
        {
            self.status.report(StatusEvent::DrainTimedOut {
                remaining: self.handlers.len(),
            });
        }
        debug!(channel = %self.endpoint.name(), "receive loop finished");
        result
    }

    async fn accept_loop(&self) -> Result<()> {
        let channel = self.endpoint.name().to_string();
        let mut listener =
            match ChannelListener::bind(&self.endpoint, self.config.instance_capacity) {
                Ok(listener) => listener,
                Err(err) => {
                    self.fail(err);
                    return Ok(());
                }
            };

        while self.state.get() != RunState::ShuttingDown {
            self.status.report(StatusEvent::AwaitingConnection {
                channel: channel.clone(),
            });

            let accepted = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                _ = self.lifetime.cancelled() => None,
                accepted = listener.accept() => Some(accepted),
            };

            match accepted {
                None => {
                    self.status.report(StatusEvent::ListenerCancelled);
                    self.state.set(RunState::ShuttingDown);
                    return Err(PeerError::Cancelled);
                }
                Some(Err(err)) => {
                    self.fail(err);
                    return Ok(());
                }
                Some(Ok(conn)) => self.dispatch(conn).await,
            }

            self.status.report(StatusEvent::ListenerClosed);

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {}
                _ = self.lifetime.cancelled() => {}
                _ = tokio::time::sleep(self.config.accept_yield) => {}
            }
        }

        Ok(())
    }

    async fn dispatch(&self, conn: Connection) {
        let session = self.next_session.fetch_add(1, Ordering::Relaxed);
        info!(channel = %self.endpoint.name(), session, "client connected");
        self.status
            .report(StatusEvent::ClientConnected { session });

        let handler = ConnectionHandler::<F>::attach(
            session,
            conn,
            &self.active,
            self.messages.clone(),
            self.status.clone(),
            self.sessions.clone(),
            self.state.clone(),
        )
        .await;

        let active = Arc::clone(&self.active);
        self.handlers
            .spawn(async move { handler.run(&active).await });
    }

    fn fail(&self, err: TransportError) {
        self.status.report(StatusEvent::ListenerFailed {
            reason: err.to_string(),
        });
        self.state.set(RunState::ShuttingDown);
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;

    use pipelane_frame::{Frame, FrameCodec};

    use super::*;
    use crate::status::{message_channel, status_channel};

    fn temp_runtime_dir(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "pl-server-{tag}-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ))
    }

    fn server_in(dir: &std::path::Path) -> PipeServer<Binary> {
        PipeServer::with_config(ServerConfig {
            drain_timeout: Duration::from_secs(1),
            runtime_dir: Some(dir.to_path_buf()),
            ..ServerConfig::default()
        })
    }

    async fn wait_for_state(rx: &mut watch::Receiver<RunState>, wanted: RunState) {
        tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|state| *state == wanted))
            .await
            .expect("state should change in time")
            .expect("state sender alive");
    }

    #[tokio::test]
    async fn cancellation_ends_loop_with_cancelled() {
        let dir = temp_runtime_dir("cancel");
        let server = server_in(&dir);
        let (status, mut events) = status_channel();
        let cancel = CancellationToken::new();

        let task = server.receive("svc", message_channel().0, status, Some(cancel.clone()));
        // Wait until the instance is listening before cancelling.
        loop {
            match events.recv().await {
                Some(StatusEvent::AwaitingConnection { .. }) => break,
                Some(_) => continue,
                None => panic!("status stream closed early"),
            }
        }
        cancel.cancel();

        let err = task.await.unwrap().unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(server.state(), RunState::ShuttingDown);
        assert!(!server.is_running());
        assert!(events.drain().contains(&StatusEvent::ListenerCancelled));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn shutdown_stops_loop() {
        let dir = temp_runtime_dir("shutdown");
        let server = server_in(&dir);
        let mut state = server.subscribe_state();

        let task = server.receive("svc", message_channel().0, StatusSink::log_only(), None);
        tokio::time::sleep(Duration::from_millis(20)).await;
        server.shutdown();

        wait_for_state(&mut state, RunState::ShuttingDown).await;
        assert!(task.await.unwrap().unwrap_err().is_cancelled());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn invalid_channel_fails_task() {
        let server = PipeServer::<Binary>::new();
        let err = server
            .receive("", message_channel().0, StatusSink::log_only(), None)
            .await
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, PeerError::Transport(_)));
    }

    #[tokio::test]
    async fn receives_and_replies() {
        let dir = temp_runtime_dir("reply");
        let server = server_in(&dir);
        let (messages, mut inbox) = message_channel();
        let mut state = server.subscribe_state();
        let task = server.receive("svc", messages, StatusSink::log_only(), None);

        let endpoint = Endpoint::for_name("svc", Some(&dir)).unwrap();
        let conn = pipelane_transport::connect(&endpoint, Duration::from_secs(1))
            .await
            .unwrap();
        let mut client = tokio_util::codec::Framed::new(conn, FrameCodec::new());
        futures_util::SinkExt::send(&mut client, Frame::new(1, &b"hi"[..]))
            .await
            .unwrap();

        assert_eq!(inbox.recv().await, Some(Frame::new(1, &b"hi"[..])));
        wait_for_state(&mut state, RunState::Connected).await;
        assert_eq!(server.active_handlers(), 1);

        server.send(Frame::new(2, &b"there"[..])).await.unwrap();
        let reply = futures_util::StreamExt::next(&mut client)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply, Frame::new(2, &b"there"[..]));

        drop(client);
        wait_for_state(&mut state, RunState::Listening).await;
        assert!(matches!(
            server.send(Frame::new(3, &b"late"[..])).await,
            Err(PeerError::NoActiveConnection)
        ));

        server.shutdown();
        assert!(task.await.unwrap().is_err());
        assert_eq!(server.active_handlers(), 0);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
