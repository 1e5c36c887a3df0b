use std::io;
use std::time::Duration;

use tracing::trace;

use crate::connection::Connection;
use crate::error::{Result, TransportError};
use crate::name::Endpoint;

/// Delay between tries while waiting for a listener to appear.
pub const CONNECT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Make one connect attempt, bounded by `timeout`.
///
/// An absent or busy endpoint is polled until the window closes, mirroring
/// a blocking named-pipe connect with a timeout. Any other failure is
/// returned immediately as [`TransportError::Connect`].
/// On Unix the runtime directory, once it exists, must be private to the
/// current user; otherwise the connect fails without polling.
pub async fn connect(endpoint: &Endpoint, timeout: Duration) -> Result<Connection> {
    let path = endpoint.address();

    #[cfg(unix)]
    if let Some(dir) = endpoint.runtime_dir() {
        crate::name::check_private_dir(dir).map_err(|source| TransportError::Connect {
            path: path.to_path_buf(),
            source,
        })?;
    }

    let attempt = async {
        loop {
            match connect_once(path).await {
                Ok(conn) => return Ok(conn),
                Err(err) if is_endpoint_unavailable(&err) => {
                    trace!(?path, error = %err, "endpoint unavailable; polling");
                    tokio::time::sleep(CONNECT_POLL_INTERVAL).await;
                }
                Err(source) => {
                    return Err(TransportError::Connect {
                        path: path.to_path_buf(),
                        source,
                    })
                }
            }
        }
    };

    match tokio::time::timeout(timeout, attempt).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::ConnectTimeout {
            path: path.to_path_buf(),
            timeout,
        }),
    }
}

#[cfg(unix)]
async fn connect_once(path: &std::path::Path) -> io::Result<Connection> {
    crate::uds::connect_once(path).await
}

#[cfg(windows)]
async fn connect_once(path: &std::path::Path) -> io::Result<Connection> {
    crate::pipe::connect_once(path).await
}

/// The endpoint does not exist yet, every instance is taken, or the
/// listener went away while the attempt was queued.
fn is_endpoint_unavailable(err: &io::Error) -> bool {
    if matches!(
        err.kind(),
        io::ErrorKind::NotFound
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
    ) {
        return true;
    }

    #[cfg(windows)]
    {
        use windows_sys::Win32::Foundation::ERROR_PIPE_BUSY;
        if err.raw_os_error() == Some(ERROR_PIPE_BUSY as i32) {
            return true;
        }
    }

    false
}
