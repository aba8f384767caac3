//! Local-directory backend.
//!
//! Serves the same remote path layout (`./<host>_<server_id>/...`) from a
//! directory on disk. Used by the daemon's development mode and by tests.

use std::io::SeekFrom;
use std::path::{Component, Path, PathBuf};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use super::{RemoteEntry, RemoteSession, RemoteStat, SessionConnector, SessionKey};
use crate::error::SessionError;

/// Hands out [`LocalSession`]s rooted at one directory.
#[derive(Debug, Clone)]
pub struct LocalConnector {
    root: PathBuf,
}

impl LocalConnector {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl SessionConnector for LocalConnector {
    type Session = LocalSession;

    async fn connect(&self, _key: &SessionKey, _password: &str) -> Result<LocalSession, SessionError> {
        Ok(LocalSession {
            root: self.root.clone(),
        })
    }
}

/// Session over a local directory. Always open.
#[derive(Debug, Clone)]
pub struct LocalSession {
    root: PathBuf,
}

impl LocalSession {
    /// Maps a remote-style path onto the root, rejecting anything that escapes it.
    fn resolve(&self, path: &str) -> Result<PathBuf, SessionError> {
        let mut resolved = self.root.clone();
        for component in Path::new(path).components() {
            match component {
                Component::CurDir => {}
                Component::Normal(part) => resolved.push(part),
                Component::RootDir | Component::ParentDir | Component::Prefix(_) => {
                    return Err(SessionError::PermissionDenied {
                        path: path.to_owned(),
                    });
                }
            }
        }
        Ok(resolved)
    }
}

fn map_io_error(path: &str, err: std::io::Error) -> SessionError {
    match err.kind() {
        std::io::ErrorKind::NotFound => SessionError::NotFound {
            path: path.to_owned(),
        },
        std::io::ErrorKind::PermissionDenied => SessionError::PermissionDenied {
            path: path.to_owned(),
        },
        _ => SessionError::Io {
            path: path.to_owned(),
            reason: err.to_string(),
        },
    }
}

fn to_remote_stat(meta: &std::fs::Metadata) -> RemoteStat {
    RemoteStat {
        size: meta.len(),
        modified: meta.modified().ok().map(DateTime::<Utc>::from),
        is_dir: meta.is_dir(),
    }
}

impl RemoteSession for LocalSession {
    fn is_open(&self) -> bool {
        true
    }

    async fn stat(&self, path: &str) -> Result<RemoteStat, SessionError> {
        let local = self.resolve(path)?;
        let meta = tokio::fs::metadata(&local)
            .await
            .map_err(|e| map_io_error(path, e))?;
        Ok(to_remote_stat(&meta))
    }

    async fn read_dir(&self, path: &str) -> Result<Vec<RemoteEntry>, SessionError> {
        let local = self.resolve(path)?;
        let mut dir = tokio::fs::read_dir(&local)
            .await
            .map_err(|e| map_io_error(path, e))?;

        let prefix = path.trim_end_matches('/');
        let mut entries = Vec::new();
        while let Some(entry) = dir.next_entry().await.map_err(|e| map_io_error(path, e))? {
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            let meta = entry.metadata().await.map_err(|e| map_io_error(path, e))?;
            entries.push(RemoteEntry {
                path: format!("{prefix}/{name}"),
                stat: to_remote_stat(&meta),
            });
        }
        Ok(entries)
    }

    async fn read_range(
        &self,
        path: &str,
        offset: u64,
        max_len: usize,
    ) -> Result<Bytes, SessionError> {
        let local = self.resolve(path)?;
        let mut file = tokio::fs::File::open(&local)
            .await
            .map_err(|e| map_io_error(path, e))?;
        file.seek(SeekFrom::Start(offset))
            .await
            .map_err(|e| map_io_error(path, e))?;

        let mut buf = Vec::with_capacity(max_len.min(64 * 1024));
        file.take(max_len as u64)
            .read_to_end(&mut buf)
            .await
            .map_err(|e| map_io_error(path, e))?;
        Ok(Bytes::from(buf))
    }
}
