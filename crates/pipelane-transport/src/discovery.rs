//! Best-effort lookup of currently open channels.
//!
//! Nothing here is part of the protocol: every failure is logged at debug
//! level and treated as "nothing found".

use std::path::Path;

use tracing::debug;

/// Names of the channels currently visible to this user.
pub fn list_channels(runtime_dir: Option<&Path>) -> Vec<String> {
    match scan(runtime_dir) {
        Ok(mut names) => {
            names.sort();
            names
        }
        Err(err) => {
            debug!(error = %err, "channel discovery failed");
            Vec::new()
        }
    }
}

/// First open channel whose name contains `partial`.
pub fn find_channel(partial: &str, runtime_dir: Option<&Path>) -> Option<String> {
    list_channels(runtime_dir)
        .into_iter()
        .find(|name| name.contains(partial))
}

#[cfg(unix)]
fn scan(runtime_dir: Option<&Path>) -> std::io::Result<Vec<String>> {
    use std::os::unix::fs::FileTypeExt;

    use crate::name::{default_runtime_dir, Endpoint};

    let dir = runtime_dir
        .map(Path::to_path_buf)
        .unwrap_or_else(default_runtime_dir);

    let mut names = Vec::new();
    for entry in std::fs::read_dir(&dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_socket() {
            continue;
        }
        if let Some(name) = Endpoint::channel_from_file_name(&entry.file_name()) {
            names.push(name);
        }
    }
    Ok(names)
}

#[cfg(windows)]
fn scan(_runtime_dir: Option<&Path>) -> std::io::Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(r"\\.\pipe\")? {
        let entry = entry?;
        if let Some(name) = entry.file_name().to_str() {
            names.push(name.to_owned());
        }
    }
    Ok(names)
}

#[cfg(all(test, unix))]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::name::Endpoint;
    use crate::uds::UnixDomainSocket;

    fn temp_runtime_dir(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "pl-find-{tag}-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ))
    }

    #[tokio::test]
    async fn finds_live_channel_by_partial_name() {
        let dir = temp_runtime_dir("live");
        let endpoint = Endpoint::for_name("status-feed", Some(&dir)).unwrap();
        let _listener = UnixDomainSocket::bind(&endpoint, 10).unwrap();
        std::fs::write(dir.join("notes.sock.txt"), b"not a socket").unwrap();

        assert_eq!(
            find_channel("feed", Some(&dir)),
            Some("status-feed".to_string())
        );
        assert_eq!(find_channel("missing", Some(&dir)), None);
        assert_eq!(list_channels(Some(&dir)), vec!["status-feed".to_string()]);

        drop(_listener);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_directory_yields_nothing() {
        let dir = temp_runtime_dir("missing");
        assert!(list_channels(Some(&dir)).is_empty());
        assert_eq!(find_channel("", Some(&dir)), None);
    }
}
