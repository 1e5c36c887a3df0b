//! One-shot request/response transactions against a listening channel.

use futures_util::{SinkExt, StreamExt};
use pipelane_frame::{Binary, Frame, Framing};
use pipelane_transport::{Connection, Endpoint};
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::Result;
use crate::status::{MessageSink, StatusEvent, StatusSink};

/// How a transaction ended.
///
/// Everything that can go wrong after the channel name was accepted is an
/// outcome, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionOutcome {
    /// A response was read and delivered.
    Responded,
    /// The server closed the connection without sending anything.
    NoResponse,
    /// Every connect attempt timed out.
    ConnectTimedOut { attempts: u32 },
    /// Connecting failed for a reason retrying would not fix.
    ConnectFailed,
    /// Writing the request or reading the response took too long.
    OperationTimedOut,
    /// The connection broke mid-exchange.
    ConnectionLost,
    /// The caller cancelled the transaction.
    Cancelled,
}

impl TransactionOutcome {
    pub fn is_responded(&self) -> bool {
        matches!(self, TransactionOutcome::Responded)
    }
}

impl std::fmt::Display for TransactionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionOutcome::Responded => f.write_str("server responded"),
            TransactionOutcome::NoResponse => f.write_str("server not responded"),
            TransactionOutcome::ConnectTimedOut { attempts } => {
                write!(f, "connect timed out after {attempts} attempts")
            }
            TransactionOutcome::ConnectFailed => f.write_str("connect failed"),
            TransactionOutcome::OperationTimedOut => f.write_str("operation timed out"),
            TransactionOutcome::ConnectionLost => f.write_str("connection lost"),
            TransactionOutcome::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Connect to `channel`, send `request`, and wait for one response.
///
/// The response, if any, goes to `responses`. Progress is reported through
/// `status`. Returns `Err` only when `channel` is not a valid channel name.
pub async fn transact<F: Framing>(
    channel: &str,
    request: F::Message,
    status: &StatusSink,
    responses: Option<&MessageSink<F::Message>>,
    cancel: Option<&CancellationToken>,
    config: &ClientConfig,
) -> Result<TransactionOutcome> {
    let endpoint = Endpoint::for_name(channel, config.runtime_dir.as_deref())?;
    let cancel = cancel.cloned().unwrap_or_default();

    let conn = match connect_with_retry(&endpoint, status, &cancel, config).await {
        Ok(conn) => conn,
        Err(outcome) => return Ok(outcome),
    };

    debug!(channel, variant = F::NAME, "connected; sending request");
    Ok(exchange::<F>(conn, request, status, responses, &cancel, config).await)
}

/// Binary transaction with default settings.
pub async fn send_and_receive(
    channel: &str,
    request: Frame,
    status: &StatusSink,
    responses: &MessageSink<Frame>,
) -> Result<TransactionOutcome> {
    transact::<Binary>(
        channel,
        request,
        status,
        Some(responses),
        None,
        &ClientConfig::default(),
    )
    .await
}

/// Run [`transact`] as a background task.
pub fn spawn_transaction<F: Framing>(
    channel: impl Into<String>,
    request: F::Message,
    status: StatusSink,
    responses: Option<MessageSink<F::Message>>,
    cancel: Option<CancellationToken>,
    config: ClientConfig,
) -> JoinHandle<Result<TransactionOutcome>> {
    let channel = channel.into();
    tokio::spawn(async move {
        transact::<F>(
            &channel,
            request,
            &status,
            responses.as_ref(),
            cancel.as_ref(),
            &config,
        )
        .await
    })
}

async fn connect_with_retry(
    endpoint: &Endpoint,
    status: &StatusSink,
    cancel: &CancellationToken,
    config: &ClientConfig,
) -> std::result::Result<Connection, TransactionOutcome> {
    let max_attempts = config.max_attempts();

    for attempt in 1..=max_attempts {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                status.report(StatusEvent::TransactionCancelled);
                return Err(TransactionOutcome::Cancelled);
            }
            result = pipelane_transport::connect(endpoint, config.connect_timeout) => result,
        };

        match result {
            Ok(conn) => {
                debug!(endpoint = ?endpoint.address(), attempt, "connected");
                return Ok(conn);
            }
            Err(err) if err.is_timeout() => {
                if attempt < max_attempts {
                    status.report(StatusEvent::ConnectRetry {
                        attempt,
                        max_attempts,
                    });
                }
            }
            Err(err) => {
                status.report(StatusEvent::ConnectFailed {
                    reason: err.to_string(),
                });
                return Err(TransactionOutcome::ConnectFailed);
            }
        }
    }

    status.report(StatusEvent::ConnectTimedOut {
        attempts: max_attempts,
    });
    Err(TransactionOutcome::ConnectTimedOut {
        attempts: max_attempts,
    })
}

async fn exchange<F: Framing>(
    conn: Connection,
    request: F::Message,
    status: &StatusSink,
    responses: Option<&MessageSink<F::Message>>,
    cancel: &CancellationToken,
    config: &ClientConfig,
) -> TransactionOutcome {
    let mut framed = Framed::with_capacity(conn, F::Codec::default(), F::READ_BUFFER_SIZE);
    let timeout = config.operation_timeout;

    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            status.report(StatusEvent::TransactionCancelled);
            return TransactionOutcome::Cancelled;
        }
        result = tokio::time::timeout(timeout, round_trip::<F>(&mut framed, request)) => result,
    };

    match result {
        Err(_) => {
            status.report(StatusEvent::OperationTimedOut { after: timeout });
            TransactionOutcome::OperationTimedOut
        }
        Ok(Err(err)) => {
            status.report(StatusEvent::TransactionFailed {
                reason: err.to_string(),
            });
            TransactionOutcome::ConnectionLost
        }
        Ok(Ok(None)) => {
            status.report(StatusEvent::ServerNotResponded);
            TransactionOutcome::NoResponse
        }
        Ok(Ok(Some(response))) => {
            status.report(StatusEvent::ServerResponded);
            if let Some(sink) = responses {
                if !sink.deliver(response) {
                    debug!("response receiver dropped; discarding");
                }
            }
            TransactionOutcome::Responded
        }
    }
}

async fn round_trip<F: Framing>(
    framed: &mut Framed<Connection, F::Codec>,
    request: F::Message,
) -> pipelane_frame::Result<Option<F::Message>> {
    framed.send(request).await?;
    framed.next().await.transpose()
}

#[cfg(all(test, unix))]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;

    use pipelane_frame::FrameCodec;
    use pipelane_transport::ChannelListener;

    use super::*;
    use crate::status::{message_channel, status_channel};

    fn temp_runtime_dir(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "pl-client-{tag}-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ))
    }

    fn quick_config(dir: &std::path::Path) -> ClientConfig {
        ClientConfig {
            connect_timeout: Duration::from_millis(20),
            connect_retries: 10,
            operation_timeout: Duration::from_millis(200),
            runtime_dir: Some(dir.to_path_buf()),
        }
    }

    fn bind(dir: &std::path::Path, name: &str) -> ChannelListener {
        let endpoint = Endpoint::for_name(name, Some(dir)).unwrap();
        ChannelListener::bind(&endpoint, 10).unwrap()
    }

    #[tokio::test]
    async fn gives_up_after_eleven_attempts() {
        let dir = temp_runtime_dir("retry");
        let (status, mut events) = status_channel();

        let outcome = transact::<Binary>(
            "absent",
            Frame::new(1, &b"ping"[..]),
            &status,
            None,
            None,
            &quick_config(&dir),
        )
        .await
        .unwrap();

        assert_eq!(outcome, TransactionOutcome::ConnectTimedOut { attempts: 11 });
        let events = events.drain();
        let retries = events
            .iter()
            .filter(|event| matches!(event, StatusEvent::ConnectRetry { .. }))
            .count();
        assert_eq!(retries, 10);
        assert_eq!(
            events.last(),
            Some(&StatusEvent::ConnectTimedOut { attempts: 11 })
        );
    }

    #[tokio::test]
    async fn delivers_response() {
        let dir = temp_runtime_dir("respond");
        let mut listener = bind(&dir, "echo");

        let server = tokio::spawn(async move {
            let conn = listener.accept().await.unwrap();
            let mut framed = Framed::new(conn, FrameCodec::new());
            let request = framed.next().await.unwrap().unwrap();
            framed
                .send(Frame::new(request.msg_type + 1, request.payload))
                .await
                .unwrap();
        });

        let (status, mut events) = status_channel();
        let (responses, mut inbox) = message_channel();
        let outcome = transact::<Binary>(
            "echo",
            Frame::new(1, &b"ping"[..]),
            &status,
            Some(&responses),
            None,
            &quick_config(&dir),
        )
        .await
        .unwrap();

        server.await.unwrap();
        assert_eq!(outcome, TransactionOutcome::Responded);
        assert_eq!(inbox.try_recv(), Some(Frame::new(2, &b"ping"[..])));
        assert!(events.drain().contains(&StatusEvent::ServerResponded));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn reports_no_response_when_server_closes() {
        let dir = temp_runtime_dir("silent");
        let mut listener = bind(&dir, "silent");

        let server = tokio::spawn(async move {
            let conn = listener.accept().await.unwrap();
            let mut framed = Framed::new(conn, FrameCodec::new());
            framed.next().await.unwrap().unwrap();
        });

        let (status, mut events) = status_channel();
        let outcome = transact::<Binary>(
            "silent",
            Frame::new(1, &b"ping"[..]),
            &status,
            None,
            None,
            &quick_config(&dir),
        )
        .await
        .unwrap();

        server.await.unwrap();
        assert_eq!(outcome, TransactionOutcome::NoResponse);
        assert!(events.drain().contains(&StatusEvent::ServerNotResponded));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn bounds_exchange_with_operation_timeout() {
        let dir = temp_runtime_dir("stall");
        let mut listener = bind(&dir, "stall");

        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            let _conn = listener.accept().await.unwrap();
            let _ = release_rx.await;
        });

        let (status, mut events) = status_channel();
        let outcome = transact::<Binary>(
            "stall",
            Frame::new(1, &b"ping"[..]),
            &status,
            None,
            None,
            &quick_config(&dir),
        )
        .await
        .unwrap();

        let _ = release_tx.send(());
        server.await.unwrap();
        assert_eq!(outcome, TransactionOutcome::OperationTimedOut);
        assert!(events
            .drain()
            .iter()
            .any(|event| matches!(event, StatusEvent::OperationTimedOut { .. })));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn cancelled_before_connect() {
        let dir = temp_runtime_dir("cancel");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let (status, mut events) = status_channel();
        let outcome = transact::<Binary>(
            "absent",
            Frame::new(1, &b"ping"[..]),
            &status,
            None,
            Some(&cancel),
            &quick_config(&dir),
        )
        .await
        .unwrap();

        assert_eq!(outcome, TransactionOutcome::Cancelled);
        assert_eq!(events.drain(), vec![StatusEvent::TransactionCancelled]);
    }

    #[tokio::test]
    async fn rejects_invalid_channel_name() {
        let err = transact::<Binary>(
            "bad/name",
            Frame::new(1, &b""[..]),
            &StatusSink::log_only(),
            None,
            None,
            &ClientConfig::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, crate::PeerError::Transport(_)));
    }

    #[tokio::test]
    async fn spawned_transaction_reports_outcome() {
        let dir = temp_runtime_dir("spawn");
        let handle = spawn_transaction::<pipelane_frame::Text>(
            "absent",
            "hello".to_string(),
            StatusSink::log_only(),
            None,
            None,
            ClientConfig {
                connect_retries: 0,
                ..quick_config(&dir)
            },
        );
        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(outcome, TransactionOutcome::ConnectTimedOut { attempts: 1 });
    }
}
