//! Remote session abstraction and the per-key session pool.
//!
//! The [`RemoteSession`] trait abstracts the file-transfer protocol so the
//! orchestrator can run against [`SftpConnector`] in production, against
//! [`LocalConnector`] in development mode, and against scripted connectors in tests.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────┐
//! │ IngestOrchestrator │
//! └─────────┬──────────┘
//!           │ acquire(key) -> SessionLease
//!           ▼
//!    ┌─────────────┐
//!    │ SessionPool │  one slot per (host, port, username, credential)
//!    └──────┬──────┘
//!           │ connect (RetryPolicy)
//!           ▼
//!  ┌──────────────────┐
//!  │ SessionConnector │ (trait)
//!  └──────────────────┘
//!       │         │
//!       ▼         ▼
//!   ┌──────┐  ┌───────┐
//!   │ SFTP │  │ Local │
//!   └──────┘  └───────┘
//! ```
//!
//! # Pool semantics
//!
//! - A lease holds the key's slot lock for its whole lifetime, so two sweep
//!   steps never use the same handle concurrently. Unrelated keys never contend.
//! - A cached handle is reused only while it reports itself open and was
//!   opened with the same password.
//! - The pool does not health-check idle handles; callers that hit a
//!   connection fault call [`SessionLease::invalidate`].

pub mod local;
pub mod sftp;

pub use local::{LocalConnector, LocalSession};
pub use sftp::{SftpConnector, SftpSession};

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::ops::Deref;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use killfeed_core::config::SourceConfig;
use killfeed_core::metrics as kf_metrics;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};
use xxhash_rust::xxh3::xxh3_64;

use crate::error::SessionError;
use crate::retry::RetryPolicy;

/// Metadata for one remote path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteStat {
    /// Size in bytes.
    pub size: u64,
    /// Last modification time, if the server reports one.
    pub modified: Option<DateTime<Utc>>,
    /// Whether the path is a directory.
    pub is_dir: bool,
}

/// One entry returned by [`RemoteSession::read_dir`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    /// Full remote path (directory path joined with the entry name).
    pub path: String,
    pub stat: RemoteStat,
}

impl RemoteEntry {
    /// Final path component.
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// Pool key: one cached handle per `(host, port, username, credential)`.
///
/// Only a fingerprint of the password is stored; `Display` leaves it out.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub host: String,
    pub port: u16,
    pub username: String,
    credential: u64,
}

impl SessionKey {
    pub fn new(host: impl Into<String>, port: u16, username: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            credential: credential_fingerprint(""),
        }
    }

    /// Sets the credential fingerprint.
    pub fn with_password(mut self, password: &str) -> Self {
        self.credential = credential_fingerprint(password);
        self
    }

    /// Builds the key for a configured source.
    pub fn for_source(source: &SourceConfig) -> Self {
        Self::new(source.host.clone(), source.port, source.username.clone())
            .with_password(&source.password)
    }
}

fn credential_fingerprint(password: &str) -> u64 {
    xxh3_64(password.as_bytes())
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.username, self.host, self.port)
    }
}

/// Operations the ingestion core needs from a remote file session.
///
/// Paths are `/`-separated and relative to the login directory
/// (for example `./10.0.0.5_7020/Logs/Deadside.log`).
pub trait RemoteSession: Send + Sync + 'static {
    /// Whether the handle is still usable.
    fn is_open(&self) -> bool;

    /// Returns metadata for a single path.
    ///
    /// # Errors
    ///
    /// `SessionError::NotFound` / `PermissionDenied` when the path is missing
    /// or unreadable; transport errors otherwise.
    fn stat(&self, path: &str) -> impl Future<Output = Result<RemoteStat, SessionError>> + Send;

    /// Lists the direct children of a directory.
    fn read_dir(
        &self,
        path: &str,
    ) -> impl Future<Output = Result<Vec<RemoteEntry>, SessionError>> + Send;

    /// Reads at most `max_len` bytes starting at `offset`.
    ///
    /// Returns fewer bytes at end of file, and an empty buffer when
    /// `offset` is at or beyond the end.
    fn read_range(
        &self,
        path: &str,
        offset: u64,
        max_len: usize,
    ) -> impl Future<Output = Result<Bytes, SessionError>> + Send;
}

/// Creates remote sessions for a pool key.
pub trait SessionConnector: Send + Sync + 'static {
    type Session: RemoteSession;

    /// Opens and authenticates one session. Called once per attempt.
    fn connect(
        &self,
        key: &SessionKey,
        password: &str,
    ) -> impl Future<Output = Result<Self::Session, SessionError>> + Send;
}

struct Slot<S> {
    session: Option<Arc<S>>,
    /// Fingerprint of the password the cached session logged in with.
    credential: u64,
    last_used: Option<Instant>,
}

impl<S> Default for Slot<S> {
    fn default() -> Self {
        Self {
            session: None,
            credential: 0,
            last_used: None,
        }
    }
}

type SlotHandle<S> = Arc<tokio::sync::Mutex<Slot<S>>>;

/// Exclusive borrow of a pooled session.
///
/// Dropping the lease returns the handle to the pool; [`invalidate`](Self::invalidate)
/// evicts it instead.
pub struct SessionLease<S: RemoteSession> {
    key: SessionKey,
    session: Arc<S>,
    guard: OwnedMutexGuard<Slot<S>>,
}

impl<S: RemoteSession> SessionLease<S> {
    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    /// Drops the cached handle so the next acquire reconnects.
    pub fn invalidate(mut self) {
        if self.guard.session.take().is_some() {
            metrics::counter!(kf_metrics::SESSION_EVICTIONS_TOTAL).increment(1);
            debug!(key = %self.key, "evicted pooled session");
        }
    }
}

impl<S: RemoteSession> Deref for SessionLease<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.session
    }
}

/// Reusable remote sessions keyed by [`SessionKey`].
pub struct SessionPool<C: SessionConnector> {
    connector: C,
    policy: RetryPolicy,
    slots: Mutex<HashMap<SessionKey, SlotHandle<C::Session>>>,
}

impl<C: SessionConnector> SessionPool<C> {
    pub fn new(connector: C, policy: RetryPolicy) -> Self {
        Self {
            connector,
            policy,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Borrows the session for `key`, connecting if needed.
    ///
    /// Waits while another step holds the same key.
    ///
    /// # Errors
    ///
    /// `SessionError::Auth` immediately on authentication failure; the last
    /// transport error once the retry policy is exhausted.
    pub async fn acquire(
        &self,
        key: &SessionKey,
        password: &str,
    ) -> Result<SessionLease<C::Session>, SessionError> {
        let slot = self.slot(key);
        let mut guard = slot.lock_owned().await;

        let credential = credential_fingerprint(password);
        if let Some(session) = guard.session.clone() {
            if guard.credential != credential {
                guard.session = None;
                metrics::counter!(kf_metrics::SESSION_EVICTIONS_TOTAL).increment(1);
                debug!(key = %key, "credentials changed, reconnecting");
            } else if session.is_open() {
                guard.last_used = Some(Instant::now());
                return Ok(SessionLease {
                    key: key.clone(),
                    session,
                    guard,
                });
            } else {
                guard.session = None;
                metrics::counter!(kf_metrics::SESSION_EVICTIONS_TOTAL).increment(1);
                debug!(key = %key, "cached session reported closed, reconnecting");
            }
        }

        let session = Arc::new(self.connect_with_retry(key, password).await?);
        guard.session = Some(Arc::clone(&session));
        guard.credential = credential;
        guard.last_used = Some(Instant::now());
        Ok(SessionLease {
            key: key.clone(),
            session,
            guard,
        })
    }

    /// Drops the cached handle for `key`, waiting for any active lease to end.
    pub async fn evict(&self, key: &SessionKey) {
        let slot = self
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned();
        let Some(slot) = slot else {
            return;
        };
        let mut guard = slot.lock().await;
        if guard.session.take().is_some() {
            metrics::counter!(kf_metrics::SESSION_EVICTIONS_TOTAL).increment(1);
            debug!(key = %key, "evicted pooled session");
        }
    }

    /// Closes the handle for `key` and removes its slot.
    ///
    /// Only for keys no configured source uses any more.
    pub async fn forget(&self, key: &SessionKey) {
        self.evict(key).await;
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }

    #[cfg(test)]
    pub(crate) fn slot_count(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Number of keys that currently hold a cached handle.
    ///
    /// Slots leased at the time of the call are counted as cached.
    pub fn cached_sessions(&self) -> usize {
        let slots: Vec<SlotHandle<C::Session>> = self
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        slots
            .iter()
            .filter(|slot| match slot.try_lock() {
                Ok(guard) => guard.session.is_some(),
                Err(_) => true,
            })
            .count()
    }

    fn slot(&self, key: &SessionKey) -> SlotHandle<C::Session> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(key.clone()).or_default())
    }

    async fn connect_with_retry(
        &self,
        key: &SessionKey,
        password: &str,
    ) -> Result<C::Session, SessionError> {
        let timeout = self.policy.attempt_timeout();
        let mut attempt = 0;

        loop {
            let result = match tokio::time::timeout(timeout, self.connector.connect(key, password))
                .await
            {
                Ok(result) => result,
                Err(_elapsed) => Err(SessionError::Timeout {
                    host: key.host.clone(),
                    secs: timeout.as_secs(),
                }),
            };

            let err = match result {
                Ok(session) => {
                    info!(key = %key, attempt = attempt + 1, "remote session established");
                    return Ok(session);
                }
                Err(err) => err,
            };

            metrics::counter!(
                kf_metrics::SESSION_CONNECT_FAILURES_TOTAL,
                kf_metrics::LABEL_REASON => err.label()
            )
            .increment(1);

            if !self.policy.should_retry(attempt, &err) {
                return Err(err);
            }

            let backoff = self.policy.delay_for(attempt);
            warn!(
                key = %key,
                attempt = attempt + 1,
                max_attempts = self.policy.max_attempts(),
                backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
                error = %err,
                "remote session connect failed, retrying"
            );
            tokio::time::sleep(backoff).await;
            attempt += 1;
        }
    }
}
