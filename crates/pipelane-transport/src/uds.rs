use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};

use tokio::net::{UnixListener, UnixSocket, UnixStream};
use tracing::{debug, info};

use crate::connection::Connection;
use crate::error::{Result, TransportError};
use crate::name::Endpoint;

/// A channel listening over a Unix domain socket.
///
/// Each [`accept`](Self::accept) hands off one connection, the way a named
/// pipe hands off one instance. Clients that arrive while a connection is
/// being handed off wait in the backlog. The socket file is removed on `Drop`.
pub struct UnixDomainSocket {
    listener: UnixListener,
    path: PathBuf,
    created_inode: Option<(u64, u64)>,
}

impl UnixDomainSocket {
    /// Default permission mode for created socket paths.
    pub const DEFAULT_SOCKET_MODE: u32 = 0o600;
    /// Maximum socket path length.
    /// Unix `sockaddr_un.sun_path` is typically 108 bytes on Linux, 104 on macOS.
    #[cfg(target_os = "linux")]
    const MAX_PATH_LEN: usize = 108;
    #[cfg(target_os = "macos")]
    const MAX_PATH_LEN: usize = 104;
    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    const MAX_PATH_LEN: usize = 104;

    /// Bind a listener for `endpoint` with the given backlog.
    ///
    /// If a stale socket file exists at the endpoint it is removed first;
    /// anything that is not a socket is left alone and reported as an error.
    /// Must be called from within a Tokio runtime.
    pub fn bind(endpoint: &Endpoint, capacity: u32) -> Result<Self> {
        let path = endpoint.address().to_path_buf();

        let path_bytes = path.as_os_str().len();
        if path_bytes >= Self::MAX_PATH_LEN {
            return Err(TransportError::PathTooLong {
                path,
                len: path_bytes,
                max: Self::MAX_PATH_LEN,
            });
        }

        endpoint.ensure_parent()?;
        remove_stale_socket(&path)?;

        let bind_err = |source| TransportError::Bind {
            path: path.clone(),
            source,
        };

        let socket = UnixSocket::new_stream().map_err(bind_err)?;
        socket.bind(&path).map_err(bind_err)?;
        let listener = socket.listen(capacity).map_err(bind_err)?;

        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(Self::DEFAULT_SOCKET_MODE))
            .map_err(bind_err)?;
        let created_metadata = std::fs::symlink_metadata(&path).map_err(bind_err)?;
        let created_inode = Some((created_metadata.dev(), created_metadata.ino()));

        info!(?path, capacity, "listening on unix domain socket");

        Ok(Self {
            listener,
            path,
            created_inode,
        })
    }

    /// Wait for the next peer.
    pub async fn accept(&mut self) -> Result<Connection> {
        let (stream, _addr) = self.listener.accept().await.map_err(TransportError::Accept)?;
        debug!(path = ?self.path, "accepted connection");
        Ok(Connection::from_unix(stream))
    }

}

impl Drop for UnixDomainSocket {
    fn drop(&mut self) {
        if let Some((expected_dev, expected_ino)) = self.created_inode {
            if let Ok(metadata) = std::fs::symlink_metadata(&self.path) {
                if metadata.file_type().is_socket()
                    && metadata.dev() == expected_dev
                    && metadata.ino() == expected_ino
                {
                    debug!(path = ?self.path, "cleaning up socket file");
                    let _ = std::fs::remove_file(&self.path);
                } else {
                    debug!(
                        path = ?self.path,
                        "socket path identity changed; skipping cleanup"
                    );
                }
            }
        }
    }
}

fn remove_stale_socket(path: &Path) -> Result<()> {
    let metadata = match std::fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(source) => {
            return Err(TransportError::Bind {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    if !metadata.file_type().is_socket() {
        return Err(TransportError::Bind {
            path: path.to_path_buf(),
            source: std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                "existing path is not a unix socket",
            ),
        });
    }

    debug!(?path, "removing stale socket");
    std::fs::remove_file(path).map_err(|source| TransportError::Bind {
        path: path.to_path_buf(),
        source,
    })
}

/// Single, immediate connect try.
pub(crate) async fn connect_once(path: &Path) -> std::io::Result<Connection> {
    let stream = UnixStream::connect(path).await?;
    debug!(?path, "connected to unix domain socket");
    Ok(Connection::from_unix(stream))
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;

    fn temp_runtime_dir(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "pl-uds-{tag}-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ))
    }

    #[tokio::test]
    async fn bind_accept_connect() {
        let dir = temp_runtime_dir("accept");
        let endpoint = Endpoint::for_name("test", Some(&dir)).unwrap();

        let mut listener = UnixDomainSocket::bind(&endpoint, 10).unwrap();
        assert!(endpoint.address().exists());

        let path = endpoint.address().to_path_buf();
        let client = tokio::spawn(async move {
            let mut client = connect_once(&path).await.unwrap();
            client.write_all(b"hello").await.unwrap();
        });

        let mut server = listener.accept().await.unwrap();
        let mut buf = [0u8; 5];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");

        client.await.unwrap();

        drop(listener);
        assert!(
            !endpoint.address().exists(),
            "socket file should be cleaned up on drop"
        );
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn accepted_connection_outlives_listener() {
        let dir = temp_runtime_dir("outlive");
        let endpoint = Endpoint::for_name("test", Some(&dir)).unwrap();
        let mut listener = UnixDomainSocket::bind(&endpoint, 10).unwrap();

        let path = endpoint.address().to_path_buf();
        let client = tokio::spawn(async move { connect_once(&path).await.unwrap() });
        let mut server = listener.accept().await.unwrap();
        let mut client = client.await.unwrap();
        drop(listener);

        client.write_all(b"still-here").await.unwrap();
        let mut buf = [0u8; 10];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"still-here");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn backlog_holds_clients_across_accepts() {
        let dir = temp_runtime_dir("backlog");
        let endpoint = Endpoint::for_name("busy", Some(&dir)).unwrap();
        let mut listener = UnixDomainSocket::bind(&endpoint, 10).unwrap();

        let path = endpoint.address().to_path_buf();
        let (a, b) = tokio::join!(connect_once(&path), connect_once(&path));
        let (mut a, mut b) = (a.unwrap(), b.unwrap());
        a.write_all(b"a").await.unwrap();
        b.write_all(b"b").await.unwrap();

        let mut seen = Vec::new();
        for _ in 0..2 {
            let mut conn = listener.accept().await.unwrap();
            let mut buf = [0u8; 1];
            conn.read_exact(&mut buf).await.unwrap();
            seen.push(buf[0]);
        }
        seen.sort_unstable();
        assert_eq!(seen, b"ab");

        drop(listener);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn path_too_long() {
        let dir = PathBuf::from("/tmp/".to_string() + &"a".repeat(200));
        let endpoint = Endpoint::for_name("test", Some(&dir)).unwrap();
        let result = UnixDomainSocket::bind(&endpoint, 10);
        assert!(matches!(result, Err(TransportError::PathTooLong { .. })));
    }

    #[tokio::test]
    async fn bind_hardens_permissions() {
        let dir = temp_runtime_dir("perms");
        let endpoint = Endpoint::for_name("perm", Some(&dir)).unwrap();

        let listener = UnixDomainSocket::bind(&endpoint, 10).unwrap();
        let mode = std::fs::metadata(endpoint.address())
            .unwrap()
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(mode, 0o600);
        let dir_mode = std::fs::metadata(&dir).unwrap().permissions().mode() & 0o777;
        assert_eq!(dir_mode, 0o700);

        drop(listener);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn bind_replaces_stale_socket() {
        let dir = temp_runtime_dir("stale");
        let endpoint = Endpoint::for_name("stale", Some(&dir)).unwrap();

        let first = UnixDomainSocket::bind(&endpoint, 10).unwrap();
        // Leak the first instance's socket file without running cleanup.
        std::mem::forget(first);
        assert!(endpoint.address().exists());

        let second = UnixDomainSocket::bind(&endpoint, 10);
        assert!(second.is_ok(), "stale socket should be replaced");
        drop(second);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn bind_rejects_existing_non_socket_file() {
        let dir = temp_runtime_dir("file");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o700)).unwrap();
        let endpoint = Endpoint::for_name("not-a-socket", Some(&dir)).unwrap();
        std::fs::write(endpoint.address(), b"regular-file").unwrap();

        let result = UnixDomainSocket::bind(&endpoint, 10);
        assert!(matches!(result, Err(TransportError::Bind { .. })));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn bind_rejects_runtime_dir_open_to_others() {
        let dir = temp_runtime_dir("open");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o777)).unwrap();
        let endpoint = Endpoint::for_name("planted", Some(&dir)).unwrap();

        let result = UnixDomainSocket::bind(&endpoint, 10);
        assert!(matches!(result, Err(TransportError::Bind { .. })));
        assert!(!endpoint.address().exists());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn drop_does_not_remove_replaced_path() {
        let dir = temp_runtime_dir("drop-race");
        let endpoint = Endpoint::for_name("drop", Some(&dir)).unwrap();

        let listener = UnixDomainSocket::bind(&endpoint, 10).unwrap();
        std::fs::remove_file(endpoint.address()).unwrap();
        std::fs::write(endpoint.address(), b"replacement-file").unwrap();

        drop(listener);
        assert!(
            endpoint.address().exists(),
            "drop must not remove path if inode identity changed"
        );

        let _ = std::fs::remove_dir_all(&dir);
    }
}
