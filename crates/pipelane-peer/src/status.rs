//! Status reporting and message delivery.
//!
//! Every component reports what it is doing as a [`StatusEvent`] through a
//! [`StatusSink`]. Decoded messages travel through a [`MessageSink`]. Both
//! are backed by unbounded channels so a slow consumer never stalls the
//! connection, and both are consumed as an [`EventStream`].

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

/// Something a listener, handler or transaction did.
///
/// `Display` renders the human-readable status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusEvent {
    /// The listener is waiting for a client.
    AwaitingConnection { channel: String },
    /// A client connected and was handed to a handler.
    ClientConnected { session: u64 },
    /// A handler received and delivered one message.
    MessageReceived { session: u64, bytes: usize },
    /// A handler's connection ended.
    ConnectionEnded { session: u64, reason: String },
    /// The listener could not create or wait on a listening instance.
    ListenerFailed { reason: String },
    /// The listener observed cancellation.
    ListenerCancelled,
    /// The listening instance for one iteration was released.
    ListenerClosed,
    /// Handlers were still running when the drain window ran out.
    DrainTimedOut { remaining: usize },
    /// A connect attempt timed out and will be retried.
    ConnectRetry { attempt: u32, max_attempts: u32 },
    /// Every connect attempt timed out.
    ConnectTimedOut { attempts: u32 },
    /// Connecting failed for a reason other than a timeout.
    ConnectFailed { reason: String },
    /// The server sent a response.
    ServerResponded,
    /// The server closed the connection without responding.
    ServerNotResponded,
    /// Sending the request or reading the response took too long.
    OperationTimedOut { after: Duration },
    /// The exchange failed after connecting.
    TransactionFailed { reason: String },
    /// The transaction was cancelled by the caller.
    TransactionCancelled,
}

impl StatusEvent {
    /// True for events that describe a failure.
    pub fn is_fault(&self) -> bool {
        matches!(
            self,
            StatusEvent::ListenerFailed { .. }
                | StatusEvent::DrainTimedOut { .. }
                | StatusEvent::ConnectTimedOut { .. }
                | StatusEvent::ConnectFailed { .. }
                | StatusEvent::OperationTimedOut { .. }
                | StatusEvent::TransactionFailed { .. }
        )
    }
}

impl fmt::Display for StatusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusEvent::AwaitingConnection { channel } => {
                write!(f, "awaiting connection on {channel}")
            }
            StatusEvent::ClientConnected { session } => {
                write!(f, "client connected (session {session})")
            }
            StatusEvent::MessageReceived { session, bytes } => {
                write!(f, "received {bytes} bytes (session {session})")
            }
            StatusEvent::ConnectionEnded { session, reason } => {
                write!(f, "client disconnected (session {session}): {reason}")
            }
            StatusEvent::ListenerFailed { reason } => {
                write!(f, "listener stopped: {reason}")
            }
            StatusEvent::ListenerCancelled => f.write_str("listener cancelled"),
            StatusEvent::ListenerClosed => f.write_str("listening instance closed"),
            StatusEvent::DrainTimedOut { remaining } => {
                write!(f, "{remaining} handler(s) still running after drain timeout")
            }
            StatusEvent::ConnectRetry {
                attempt,
                max_attempts,
            } => write!(
                f,
                "connect attempt {attempt}/{max_attempts} timed out; retrying"
            ),
            StatusEvent::ConnectTimedOut { attempts } => {
                write!(f, "connect timed out after {attempts} attempts")
            }
            StatusEvent::ConnectFailed { reason } => write!(f, "connect failed: {reason}"),
            StatusEvent::ServerResponded => f.write_str("server responded"),
            StatusEvent::ServerNotResponded => f.write_str("server not responded"),
            StatusEvent::OperationTimedOut { after } => {
                write!(f, "operation timed out after {after:?}")
            }
            StatusEvent::TransactionFailed { reason } => {
                write!(f, "transaction failed: {reason}")
            }
            StatusEvent::TransactionCancelled => f.write_str("transaction cancelled"),
        }
    }
}

/// Where status events go. Every event is also logged.
///
/// The default sink only logs.
#[derive(Debug, Clone, Default)]
pub struct StatusSink {
    tx: Option<mpsc::UnboundedSender<StatusEvent>>,
}

impl StatusSink {
    /// A sink that only logs.
    pub fn log_only() -> Self {
        Self::default()
    }

    pub fn report(&self, event: StatusEvent) {
        if event.is_fault() {
            warn!(status = %event, "status");
        } else {
            debug!(status = %event, "status");
        }

        if let Some(tx) = &self.tx {
            if tx.send(event).is_err() {
                trace!("status receiver dropped");
            }
        }
    }
}

/// Create a status sink and the stream of events reported to it.
pub fn status_channel() -> (StatusSink, EventStream<StatusEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (StatusSink { tx: Some(tx) }, EventStream { rx })
}

/// Where decoded messages go.
pub struct MessageSink<M> {
    tx: mpsc::UnboundedSender<M>,
}

impl<M> MessageSink<M> {
    /// Deliver a message. Returns `false` if the receiving side is gone.
    pub fn deliver(&self, message: M) -> bool {
        self.tx.send(message).is_ok()
    }

    /// True once the receiving stream has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl<M> Clone for MessageSink<M> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<M> fmt::Debug for MessageSink<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageSink")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

/// Create a message sink and the stream of messages delivered to it.
pub fn message_channel<M>() -> (MessageSink<M>, EventStream<M>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (MessageSink { tx }, EventStream { rx })
}

/// Consumer side of a status or message channel.
///
/// Ends once every sink feeding it has been dropped.
#[derive(Debug)]
pub struct EventStream<T> {
    rx: mpsc::UnboundedReceiver<T>,
}

impl<T> EventStream<T> {
    /// Wait for the next item.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Take the next item if one is already queued.
    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Take everything queued right now.
    pub fn drain(&mut self) -> Vec<T> {
        let mut items = Vec::new();
        while let Ok(item) = self.rx.try_recv() {
            items.push(item);
        }
        items
    }
}

impl<T> futures_core::Stream for EventStream<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;

    use super::*;

    #[tokio::test]
    async fn status_events_reach_stream_in_order() {
        let (sink, mut events) = status_channel();
        sink.report(StatusEvent::ServerResponded);
        sink.report(StatusEvent::ConnectTimedOut { attempts: 11 });
        drop(sink);

        assert_eq!(events.next().await, Some(StatusEvent::ServerResponded));
        assert_eq!(
            events.next().await,
            Some(StatusEvent::ConnectTimedOut { attempts: 11 })
        );
        assert_eq!(events.next().await, None);
    }

    #[test]
    fn log_only_sink_accepts_events() {
        StatusSink::log_only().report(StatusEvent::ListenerCancelled);
    }

    #[test]
    fn reporting_after_receiver_drop_is_harmless() {
        let (sink, events) = status_channel();
        drop(events);
        sink.report(StatusEvent::ListenerClosed);
    }

    #[test]
    fn message_sink_reports_closed_receiver() {
        let (sink, mut stream) = message_channel::<u32>();
        assert!(sink.deliver(1));
        assert_eq!(stream.drain(), vec![1]);
        drop(stream);
        assert!(sink.is_closed());
        assert!(!sink.deliver(2));
    }

    #[test]
    fn display_is_human_readable() {
        assert_eq!(
            StatusEvent::ConnectRetry {
                attempt: 3,
                max_attempts: 11
            }
            .to_string(),
            "connect attempt 3/11 timed out; retrying"
        );
        assert_eq!(
            StatusEvent::ServerNotResponded.to_string(),
            "server not responded"
        );
        assert!(StatusEvent::ConnectTimedOut { attempts: 11 }.is_fault());
        assert!(!StatusEvent::ServerResponded.is_fault());
    }
}
