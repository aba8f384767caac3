//! SFTP backend over libssh2.
//!
//! `ssh2` is a blocking API, so every call runs on the blocking thread pool
//! via [`tokio::task::spawn_blocking`]. The TCP connect and libssh2 session
//! timeouts bound each blocking call; the pool's per-attempt timeout bounds the
//! whole connect.

use std::io::{Read, Seek, SeekFrom};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use ssh2::{ErrorCode, FileStat, Session, Sftp};
use tracing::debug;

use super::{RemoteEntry, RemoteSession, RemoteStat, SessionConnector, SessionKey};
use crate::error::SessionError;

// libssh2 error codes (LIBSSH2_ERROR_*)
const LIBSSH2_ERROR_TIMEOUT: i32 = -9;
const LIBSSH2_ERROR_SOCKET_DISCONNECT: i32 = -13;
const LIBSSH2_ERROR_AUTHENTICATION_FAILED: i32 = -18;
const LIBSSH2_ERROR_PUBLICKEY_UNVERIFIED: i32 = -19;
const LIBSSH2_ERROR_SOCKET_TIMEOUT: i32 = -30;

// SFTP status codes (LIBSSH2_FX_*)
const LIBSSH2_FX_NO_SUCH_FILE: i32 = 2;
const LIBSSH2_FX_PERMISSION_DENIED: i32 = 3;
const LIBSSH2_FX_NO_SUCH_PATH: i32 = 10;

/// Connects to game hosts over SSH and opens an SFTP channel.
#[derive(Debug, Clone)]
pub struct SftpConnector {
    timeout: Duration,
}

impl SftpConnector {
    /// `timeout` bounds the TCP connect and every libssh2 call.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl SessionConnector for SftpConnector {
    type Session = SftpSession;

    async fn connect(&self, key: &SessionKey, password: &str) -> Result<SftpSession, SessionError> {
        let key = key.clone();
        let password = password.to_owned();
        let timeout = self.timeout;
        let host = key.host.clone();

        tokio::task::spawn_blocking(move || connect_blocking(&key, &password, timeout))
            .await
            .map_err(|e| SessionError::Unreachable {
                host,
                reason: format!("connect task failed: {e}"),
            })?
    }
}

fn connect_blocking(
    key: &SessionKey,
    password: &str,
    timeout: Duration,
) -> Result<SftpSession, SessionError> {
    let unreachable = |reason: String| SessionError::Unreachable {
        host: key.host.clone(),
        reason,
    };

    let addr = (key.host.as_str(), key.port)
        .to_socket_addrs()
        .map_err(|e| unreachable(format!("resolve failed: {e}")))?
        .next()
        .ok_or_else(|| unreachable("host resolved to no addresses".to_owned()))?;

    let tcp = TcpStream::connect_timeout(&addr, timeout).map_err(|e| {
        if e.kind() == std::io::ErrorKind::TimedOut {
            SessionError::Timeout {
                host: key.host.clone(),
                secs: timeout.as_secs(),
            }
        } else {
            unreachable(e.to_string())
        }
    })?;
    tcp.set_read_timeout(Some(timeout))
        .and_then(|()| tcp.set_write_timeout(Some(timeout)))
        .map_err(|e| unreachable(e.to_string()))?;

    let mut session = Session::new().map_err(|e| unreachable(e.to_string()))?;
    session.set_tcp_stream(tcp);
    session.set_timeout(u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX));
    session
        .handshake()
        .map_err(|e| map_transport_error(&key.host, &e))?;

    session
        .userauth_password(&key.username, password)
        .map_err(|e| match e.code() {
            ErrorCode::Session(
                LIBSSH2_ERROR_AUTHENTICATION_FAILED | LIBSSH2_ERROR_PUBLICKEY_UNVERIFIED,
            ) => SessionError::Auth {
                host: key.host.clone(),
                user: key.username.clone(),
                reason: e.message().to_owned(),
            },
            _ => map_transport_error(&key.host, &e),
        })?;
    if !session.authenticated() {
        return Err(SessionError::Auth {
            host: key.host.clone(),
            user: key.username.clone(),
            reason: "server did not accept credentials".to_owned(),
        });
    }

    let sftp = session
        .sftp()
        .map_err(|e| map_transport_error(&key.host, &e))?;
    debug!(key = %key, "sftp channel opened");

    Ok(SftpSession {
        inner: Arc::new(Mutex::new(SftpInner {
            _session: session,
            sftp,
        })),
        open: Arc::new(AtomicBool::new(true)),
    })
}

struct SftpInner {
    // Keeps the SSH transport alive for the SFTP channel.
    _session: Session,
    sftp: Sftp,
}

/// One authenticated SFTP channel.
pub struct SftpSession {
    inner: Arc<Mutex<SftpInner>>,
    open: Arc<AtomicBool>,
}

impl SftpSession {
    async fn run<T, F>(&self, path: &str, op: F) -> Result<T, SessionError>
    where
        T: Send + 'static,
        F: FnOnce(&Sftp, &Path) -> Result<T, SessionError> + Send + 'static,
    {
        if !self.is_open() {
            return Err(SessionError::Closed);
        }

        let inner = Arc::clone(&self.inner);
        let owned_path = path.to_owned();
        let result = tokio::task::spawn_blocking(move || {
            let guard = inner.lock().unwrap_or_else(PoisonError::into_inner);
            op(&guard.sftp, Path::new(&owned_path))
        })
        .await
        .map_err(|e| SessionError::Io {
            path: path.to_owned(),
            reason: format!("blocking task failed: {e}"),
        })
        .and_then(|r| r);

        if let Err(err) = &result {
            if err.is_connection_fault() {
                self.open.store(false, Ordering::Release);
            }
        }
        result
    }
}

impl RemoteSession for SftpSession {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    async fn stat(&self, path: &str) -> Result<RemoteStat, SessionError> {
        let display = path.to_owned();
        self.run(path, move |sftp, path| {
            sftp.stat(path)
                .map(|st| to_remote_stat(&st))
                .map_err(|e| map_file_error(&display, &e))
        })
        .await
    }

    async fn read_dir(&self, path: &str) -> Result<Vec<RemoteEntry>, SessionError> {
        let dir = path.trim_end_matches('/').to_owned();
        self.run(path, move |sftp, path| {
            let entries = sftp.readdir(path).map_err(|e| map_file_error(&dir, &e))?;
            Ok(entries
                .into_iter()
                .filter_map(|(child, stat)| {
                    let name = child.file_name()?.to_str()?.to_owned();
                    if name == "." || name == ".." {
                        return None;
                    }
                    Some(RemoteEntry {
                        path: format!("{dir}/{name}"),
                        stat: to_remote_stat(&stat),
                    })
                })
                .collect())
        })
        .await
    }

    async fn read_range(
        &self,
        path: &str,
        offset: u64,
        max_len: usize,
    ) -> Result<Bytes, SessionError> {
        let display = path.to_owned();
        self.run(path, move |sftp, path| {
            let io_error = |e: std::io::Error| SessionError::Io {
                path: display.clone(),
                reason: e.to_string(),
            };
            let mut file = sftp.open(path).map_err(|e| map_file_error(&display, &e))?;
            file.seek(SeekFrom::Start(offset)).map_err(io_error)?;
            let mut buf = Vec::with_capacity(max_len.min(64 * 1024));
            file.take(max_len as u64)
                .read_to_end(&mut buf)
                .map_err(io_error)?;
            Ok(Bytes::from(buf))
        })
        .await
    }
}

fn to_remote_stat(stat: &FileStat) -> RemoteStat {
    RemoteStat {
        size: stat.size.unwrap_or(0),
        modified: stat
            .mtime
            .and_then(|secs| i64::try_from(secs).ok())
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0)),
        is_dir: stat.is_dir(),
    }
}

fn map_transport_error(host: &str, err: &ssh2::Error) -> SessionError {
    match err.code() {
        ErrorCode::Session(LIBSSH2_ERROR_TIMEOUT | LIBSSH2_ERROR_SOCKET_TIMEOUT) => {
            SessionError::Timeout {
                host: host.to_owned(),
                secs: 0,
            }
        }
        _ => SessionError::Unreachable {
            host: host.to_owned(),
            reason: err.message().to_owned(),
        },
    }
}

fn map_file_error(path: &str, err: &ssh2::Error) -> SessionError {
    match err.code() {
        ErrorCode::SFTP(LIBSSH2_FX_NO_SUCH_FILE | LIBSSH2_FX_NO_SUCH_PATH) => {
            SessionError::NotFound {
                path: path.to_owned(),
            }
        }
        ErrorCode::SFTP(LIBSSH2_FX_PERMISSION_DENIED) => SessionError::PermissionDenied {
            path: path.to_owned(),
        },
        ErrorCode::Session(LIBSSH2_ERROR_SOCKET_DISCONNECT) => SessionError::Closed,
        _ => SessionError::Io {
            path: path.to_owned(),
            reason: err.message().to_owned(),
        },
    }
}
