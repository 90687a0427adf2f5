//! Persisted SeedLink connection state.
//!
//! Nothing here raises to the caller: a missing or corrupt file means a
//! fresh start, and a failed save leaves the previous file in place.

use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use seedfeed_client::{ClientError, ConnectionState};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum StateStoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt state file: {0}")]
    Corrupt(#[from] ClientError),
}

/// Load the state saved by a previous run.
pub async fn recover(path: &Path) -> Option<ConnectionState> {
    match load(path).await {
        Ok(Some(state)) => {
            info!(path = %path.display(), stations = state.len(), "recovered connection state");
            Some(state)
        }
        Ok(None) => {
            info!(path = %path.display(), "no saved connection state, starting fresh");
            None
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ignoring unusable connection state");
            None
        }
    }
}

/// Replace the state file. Returns whether the new state was persisted.
pub async fn save(path: &Path, state: &ConnectionState) -> bool {
    match write_atomic(path, state.to_text().as_bytes()).await {
        Ok(()) => {
            info!(path = %path.display(), stations = state.len(), "saved connection state");
            true
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to save connection state");
            false
        }
    }
}

async fn load(path: &Path) -> Result<Option<ConnectionState>, StateStoreError> {
    let text = match tokio::fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(StateStoreError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    Ok(Some(ConnectionState::parse(&text)?))
}

/// Write to a sibling temp file, fsync it, then rename over `path`.
async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), StateStoreError> {
    let tmp = temp_path(path);

    let mut file = tokio::fs::File::create(&tmp).await.map_err(io_err(&tmp))?;
    file.write_all(contents).await.map_err(io_err(&tmp))?;
    file.sync_all().await.map_err(io_err(&tmp))?;
    drop(file);

    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(io_err(path)(e));
    }
    Ok(())
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> StateStoreError {
    let path = path.to_path_buf();
    move |source| StateStoreError::Io { path, source }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("state"));
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use seedfeed_client::StationKey;
    use seedfeed_protocol::SequenceNumber;

    fn state() -> ConnectionState {
        let mut state = ConnectionState::new();
        state.insert(StationKey::new("AM", "STA1"), SequenceNumber::new(1234));
        state.insert(StationKey::new("GE", "WLF"), SequenceNumber::new(7));
        state
    }

    #[tokio::test]
    async fn missing_file_is_fresh_start() {
        let dir = tempfile::tempdir().unwrap();
        assert!(recover(&dir.path().join("statefile.sl")).await.is_none());
    }

    #[tokio::test]
    async fn save_then_recover() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("statefile.sl");

        assert!(save(&path, &state()).await);
        assert_eq!(recover(&path).await, Some(state()));
        assert!(!temp_path(&path).exists());
    }

    #[tokio::test]
    async fn corrupt_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("statefile.sl");
        std::fs::write(&path, "AM STA1 not-a-number\n").unwrap();

        assert!(recover(&path).await.is_none());
    }

    #[tokio::test]
    async fn failed_save_keeps_previous_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("statefile.sl");
        assert!(save(&path, &state()).await);

        // A directory where the temp file should go makes the write fail.
        std::fs::create_dir(temp_path(&path)).unwrap();
        let mut newer = state();
        newer.insert(StationKey::new("AM", "STA1"), SequenceNumber::new(9999));
        assert!(!save(&path, &newer).await);

        assert_eq!(recover(&path).await, Some(state()));
    }

    #[tokio::test]
    async fn save_into_missing_directory_fails_quietly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no/such/dir/statefile.sl");
        assert!(!save(&path, &state()).await);
    }

    #[test]
    fn temp_file_is_a_sibling() {
        assert_eq!(
            temp_path(Path::new("/var/lib/seedfeed/statefile.sl")),
            PathBuf::from("/var/lib/seedfeed/statefile.sl.tmp")
        );
    }
}
