use std::path::{Path, PathBuf};

use tokio::net::windows::named_pipe::{ClientOptions, NamedPipeServer, ServerOptions};
use tracing::{debug, info};

use crate::connection::Connection;
use crate::error::{Result, TransportError};
use crate::name::Endpoint;

/// A channel served over a Windows named pipe.
///
/// A pipe instance serves exactly one client. After each accept the next
/// instance is created before the connected one is handed off, so clients
/// only see `ERROR_PIPE_BUSY` while every instance is taken. `capacity`
/// bounds how many instances may exist at once.
pub struct NamedPipeInstance {
    server: NamedPipeServer,
    path: PathBuf,
    instances: usize,
}

impl NamedPipeInstance {
    /// Windows allows at most 254 explicitly counted instances.
    const MAX_INSTANCES: u32 = 254;

    /// Create the first pipe instance for `endpoint`. Remote clients are rejected.
    pub fn bind(endpoint: &Endpoint, capacity: u32) -> Result<Self> {
        let path = endpoint.address().to_path_buf();
        let instances = capacity.clamp(1, Self::MAX_INSTANCES) as usize;
        let server = create_instance(&path, instances)?;

        info!(?path, instances, "listening on named pipe");

        Ok(Self {
            server,
            path,
            instances,
        })
    }

    /// Wait for the next client.
    pub async fn accept(&mut self) -> Result<Connection> {
        self.server.connect().await.map_err(TransportError::Accept)?;
        let next = create_instance(&self.path, self.instances)?;
        let connected = std::mem::replace(&mut self.server, next);
        debug!(path = ?self.path, "accepted connection");
        Ok(Connection::from_pipe_server(connected))
    }
}

fn create_instance(path: &Path, instances: usize) -> Result<NamedPipeServer> {
    ServerOptions::new()
        .max_instances(instances)
        .reject_remote_clients(true)
        .create(path)
        .map_err(|source| TransportError::Bind {
            path: path.to_path_buf(),
            source,
        })
}

/// Single, immediate connect try.
pub(crate) async fn connect_once(path: &Path) -> std::io::Result<Connection> {
    let client = ClientOptions::new().open(path)?;
    debug!(?path, "connected to named pipe");
    Ok(Connection::from_pipe_client(client))
}
