use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// A connected channel session. Implements `AsyncRead + AsyncWrite`.
///
/// This is the fundamental I/O type returned by transport operations.
/// On Unix, this wraps a Unix domain socket stream.
/// On Windows, this wraps either end of a named pipe instance.
///
/// Dropping the connection closes it.
pub struct Connection {
    inner: ConnectionInner,
}

enum ConnectionInner {
    #[cfg(unix)]
    Unix(tokio::net::UnixStream),
    #[cfg(windows)]
    PipeServer(tokio::net::windows::named_pipe::NamedPipeServer),
    #[cfg(windows)]
    PipeClient(tokio::net::windows::named_pipe::NamedPipeClient),
}

impl Connection {
    #[cfg(unix)]
    pub(crate) fn from_unix(stream: tokio::net::UnixStream) -> Self {
        Self {
            inner: ConnectionInner::Unix(stream),
        }
    }

    #[cfg(windows)]
    pub(crate) fn from_pipe_server(pipe: tokio::net::windows::named_pipe::NamedPipeServer) -> Self {
        Self {
            inner: ConnectionInner::PipeServer(pipe),
        }
    }

    #[cfg(windows)]
    pub(crate) fn from_pipe_client(pipe: tokio::net::windows::named_pipe::NamedPipeClient) -> Self {
        Self {
            inner: ConnectionInner::PipeClient(pipe),
        }
    }

    /// Get the credentials of the connected peer.
    ///
    /// Returns `(uid, pid)` where the platform exposes them.
    #[cfg(unix)]
    pub fn peer_credentials(&self) -> Option<(u32, Option<i32>)> {
        match &self.inner {
            ConnectionInner::Unix(stream) => stream
                .peer_cred()
                .ok()
                .map(|cred| (cred.uid(), cred.pid())),
        }
    }

    /// Get the credentials of the connected peer.
    ///
    /// Returns `None` on platforms that do not expose peer credentials.
    #[cfg(not(unix))]
    pub fn peer_credentials(&self) -> Option<(u32, Option<i32>)> {
        None
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        match &self.inner {
            #[cfg(unix)]
            ConnectionInner::Unix(_) => "unix-domain-socket",
            #[cfg(windows)]
            ConnectionInner::PipeServer(_) | ConnectionInner::PipeClient(_) => "named-pipe",
        }
    }
}

#[cfg(unix)]
impl From<tokio::net::UnixStream> for Connection {
    fn from(stream: tokio::net::UnixStream) -> Self {
        Self::from_unix(stream)
    }
}

impl AsyncRead for Connection {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match &mut self.get_mut().inner {
            #[cfg(unix)]
            ConnectionInner::Unix(stream) => Pin::new(stream).poll_read(cx, buf),
            #[cfg(windows)]
            ConnectionInner::PipeServer(pipe) => Pin::new(pipe).poll_read(cx, buf),
            #[cfg(windows)]
            ConnectionInner::PipeClient(pipe) => Pin::new(pipe).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Connection {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match &mut self.get_mut().inner {
            #[cfg(unix)]
            ConnectionInner::Unix(stream) => Pin::new(stream).poll_write(cx, buf),
            #[cfg(windows)]
            ConnectionInner::PipeServer(pipe) => Pin::new(pipe).poll_write(cx, buf),
            #[cfg(windows)]
            ConnectionInner::PipeClient(pipe) => Pin::new(pipe).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut self.get_mut().inner {
            #[cfg(unix)]
            ConnectionInner::Unix(stream) => Pin::new(stream).poll_flush(cx),
            #[cfg(windows)]
            ConnectionInner::PipeServer(pipe) => Pin::new(pipe).poll_flush(cx),
            #[cfg(windows)]
            ConnectionInner::PipeClient(pipe) => Pin::new(pipe).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut self.get_mut().inner {
            #[cfg(unix)]
            ConnectionInner::Unix(stream) => Pin::new(stream).poll_shutdown(cx),
            #[cfg(windows)]
            ConnectionInner::PipeServer(pipe) => Pin::new(pipe).poll_shutdown(cx),
            #[cfg(windows)]
            ConnectionInner::PipeClient(pipe) => Pin::new(pipe).poll_shutdown(cx),
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("type", &self.transport_name())
            .finish()
    }
}
