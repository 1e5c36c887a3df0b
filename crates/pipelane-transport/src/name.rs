//! Channel names and the user-scoped endpoints they resolve to.

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{Result, TransportError};

/// Environment variable overriding the directory that holds channel sockets.
pub const RUNTIME_DIR_ENV: &str = "PIPELANE_RUNTIME_DIR";

/// Maximum channel name length in bytes.
pub const MAX_NAME_LEN: usize = 128;

#[cfg(unix)]
const SOCKET_EXTENSION: &str = "sock";

#[cfg(windows)]
const PIPE_PREFIX: &str = r"\\.\pipe\";

/// A validated channel name.
///
/// Both sides of a channel must use the identical name. Names are opaque;
/// they only have to be usable as a single path component.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelName(String);

impl ChannelName {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let reason = if name.is_empty() {
            Some("name must not be empty")
        } else if name.len() > MAX_NAME_LEN {
            Some("name exceeds 128 bytes")
        } else if name.contains(['/', '\\']) {
            Some("name must not contain path separators")
        } else if name.contains('\0') {
            Some("name must not contain NUL")
        } else if name == "." || name == ".." {
            Some("name must not be a relative path component")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(TransportError::InvalidName { name, reason }),
            None => Ok(Self(name)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for ChannelName {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

/// The OS address a [`ChannelName`] resolves to for the current user.
///
/// - Unix: `<runtime dir>/<name>.sock`
/// - Windows: `\\.\pipe\<name>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    name: ChannelName,
    address: PathBuf,
}

impl Endpoint {
    /// Resolve `name` inside `runtime_dir`, or the default runtime directory.
    ///
    /// Pure: nothing is created on disk until a listener binds.
    pub fn resolve(name: &ChannelName, runtime_dir: Option<&Path>) -> Self {
        #[cfg(unix)]
        let address = {
            let dir = runtime_dir
                .map(Path::to_path_buf)
                .unwrap_or_else(default_runtime_dir);
            dir.join(format!("{}.{SOCKET_EXTENSION}", name.as_str()))
        };

        #[cfg(windows)]
        let address = {
            let _ = runtime_dir;
            PathBuf::from(format!("{PIPE_PREFIX}{}", name.as_str()))
        };

        Self {
            name: name.clone(),
            address,
        }
    }

    /// Convenience for validating and resolving in one step.
    pub fn for_name(name: &str, runtime_dir: Option<&Path>) -> Result<Self> {
        Ok(Self::resolve(&ChannelName::new(name)?, runtime_dir))
    }

    pub fn name(&self) -> &ChannelName {
        &self.name
    }

    /// Socket path (Unix) or pipe path (Windows).
    pub fn address(&self) -> &Path {
        &self.address
    }

    /// Create the runtime directory if missing, readable only by this user.
    ///
    /// An existing directory must already be private to this user.
    #[cfg(unix)]
    pub(crate) fn ensure_parent(&self) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let Some(dir) = self.runtime_dir() else {
            return Ok(());
        };
        let bind_err = |source| TransportError::Bind {
            path: dir.to_path_buf(),
            source,
        };
        if check_private_dir(dir).map_err(bind_err)? {
            return Ok(());
        }

        std::fs::create_dir_all(dir).map_err(bind_err)?;
        std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700)).map_err(bind_err)?;
        tracing::debug!(?dir, "created runtime directory");
        Ok(())
    }

    /// The directory holding the socket, if the address has one.
    #[cfg(unix)]
    pub(crate) fn runtime_dir(&self) -> Option<&Path> {
        self.address
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
    }

    /// Recover the channel name from a file name in the runtime directory.
    #[cfg(unix)]
    pub(crate) fn channel_from_file_name(file_name: &std::ffi::OsStr) -> Option<String> {
        let path = Path::new(file_name);
        if path.extension()? != SOCKET_EXTENSION {
            return None;
        }
        path.file_stem()?.to_str().map(str::to_owned)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.address.display())
    }
}

/// The directory holding this user's channel sockets.
///
/// Resolution order: `$PIPELANE_RUNTIME_DIR`, `$XDG_RUNTIME_DIR/pipelane`,
/// then a per-uid directory under the system temp dir.
pub fn default_runtime_dir() -> PathBuf {
    if let Some(dir) = non_empty_env(RUNTIME_DIR_ENV) {
        return PathBuf::from(dir);
    }
    if let Some(dir) = non_empty_env("XDG_RUNTIME_DIR") {
        return PathBuf::from(dir).join("pipelane");
    }

    #[cfg(unix)]
    {
        std::env::temp_dir().join(format!("pipelane-{}", current_uid()))
    }

    #[cfg(not(unix))]
    {
        std::env::temp_dir().join("pipelane")
    }
}

/// Check that `dir` is a real directory owned by this user and closed to
/// everyone else. `Ok(false)` means it does not exist yet.
#[cfg(unix)]
pub(crate) fn check_private_dir(dir: &Path) -> std::io::Result<bool> {
    use std::io::{Error, ErrorKind};
    use std::os::unix::fs::MetadataExt;

    let metadata = match std::fs::symlink_metadata(dir) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err),
    };

    let reason = if !metadata.file_type().is_dir() {
        Some("runtime directory is not a directory")
    } else if metadata.uid() != current_uid() {
        Some("runtime directory is owned by another user")
    } else if metadata.mode() & 0o077 != 0 {
        Some("runtime directory is accessible to other users")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(Error::new(ErrorKind::PermissionDenied, reason)),
        None => Ok(true),
    }
}

#[cfg(unix)]
fn current_uid() -> u32 {
    // SAFETY: getuid has no preconditions and cannot fail.
    unsafe { libc::getuid() }
}

fn non_empty_env(key: &str) -> Option<OsString> {
    std::env::var_os(key).filter(|value| !value.is_empty())
}
