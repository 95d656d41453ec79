//! In-process session backend.
//!
//! All records live in one `HashMap` behind one `RwLock`. The same lock also
//! guards in-place mutation of a record that a [`SessionHandle`] fetched, so
//! concurrent requests touching the same session serialize on it and never
//! lose each other's keys. One map-wide lock caps throughput; entries are
//! small and every critical section is short.
//!
//! Expiry is lazy: an expired record is removed when somebody asks for it.
//! Records nobody asks for again stay in memory unless
//! [`MemoryBackend::purge_expired`] runs, either directly or from the sweeper
//! enabled with the `sweep_interval_secs` option.
//!
//! [`SessionHandle`]: crate::SessionHandle

use std::collections::HashMap;
use std::fmt;
use std::future::{Future, ready};
use std::pin::Pin;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use crate::backend::{Backend, BackendFactory, Fetched};
use crate::environment::{Clock, SystemClock};
use crate::error::{Result, SessionError};
use crate::record::{Record, SessionId};

type Entries = Arc<RwLock<HashMap<SessionId, Record>>>;

/// Registry name of the memory backend.
pub const MEMORY_BACKEND: &str = "memory";

// ═══════════════════════════════════════════════════════════════════════
// Resident Records
// ═══════════════════════════════════════════════════════════════════════

/// A record that lives inside a [`MemoryBackend`].
///
/// Every access takes the backend's lock. If the entry has disappeared
/// (deleted, or purged after expiring) the accessors return `Ok(None)`.
#[derive(Clone)]
pub struct ResidentRecord {
    entries: Entries,
    id: SessionId,
}

impl ResidentRecord {
    /// Session this record belongs to.
    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.id
    }

    /// Run `f` against the record under the read lock.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::LockPoisoned`] if the lock is poisoned.
    pub fn read<R>(&self, f: impl FnOnce(&Record) -> R) -> Result<Option<R>> {
        let entries = self.entries.read().map_err(|_| SessionError::LockPoisoned)?;
        Ok(entries.get(&self.id).map(f))
    }

    /// Run `f` against the record under the write lock.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::LockPoisoned`] if the lock is poisoned.
    pub fn write<R>(&self, f: impl FnOnce(&mut Record) -> R) -> Result<Option<R>> {
        let mut entries = self.entries.write().map_err(|_| SessionError::LockPoisoned)?;
        Ok(entries.get_mut(&self.id).map(f))
    }

    /// Copy the record out.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::LockPoisoned`] if the lock is poisoned.
    pub fn snapshot(&self) -> Result<Option<Record>> {
        self.read(Record::clone)
    }
}

impl fmt::Debug for ResidentRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResidentRecord").field("id", &self.id).finish_non_exhaustive()
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Backend
// ═══════════════════════════════════════════════════════════════════════

/// In-process, concurrency-safe session storage.
///
/// `Clone` shares the underlying map.
///
/// # Examples
///
/// ```
/// use sidstore_core::{Backend, MemoryBackend, Record, SessionId};
/// use chrono::{Duration, Utc};
///
/// # async fn example() -> sidstore_core::Result<()> {
/// let backend = MemoryBackend::new();
/// let id = SessionId::new();
/// backend.set(id, Record::new(Utc::now() + Duration::minutes(5)), Duration::minutes(5)).await?;
/// assert!(backend.get(id).await?.is_some());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct MemoryBackend {
    entries: Entries,
    clock: Arc<dyn Clock>,
}

impl MemoryBackend {
    /// Create an empty backend on the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty backend on the given clock.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            clock,
        }
    }

    /// Number of stored entries, expired ones included.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::LockPoisoned`] if the lock is poisoned.
    pub fn len(&self) -> Result<usize> {
        Ok(self.entries.read().map_err(|_| SessionError::LockPoisoned)?.len())
    }

    /// Returns `true` if nothing is stored.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::LockPoisoned`] if the lock is poisoned.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Remove every expired entry and return how many were removed.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::LockPoisoned`] if the lock is poisoned.
    pub fn purge_expired(&self) -> Result<usize> {
        purge(&self.entries, self.clock.now())
    }

    /// Run [`purge_expired`](Self::purge_expired) every `every` on the current
    /// tokio runtime.
    ///
    /// The task holds only a weak reference to the map and ends once every
    /// clone of this backend has been dropped. Returns `None` (and does
    /// nothing) outside a runtime or for a zero interval.
    pub fn spawn_sweeper(
        &self,
        every: std::time::Duration,
    ) -> Option<tokio::task::JoinHandle<()>> {
        if every.is_zero() {
            tracing::warn!("Ignoring zero sweep interval for memory backend");
            return None;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("No tokio runtime available; memory backend sweeper disabled");
            return None;
        };

        let entries = Arc::downgrade(&self.entries);
        let clock = Arc::clone(&self.clock);

        Some(runtime.spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(entries) = entries.upgrade() else {
                    break;
                };
                match purge(&entries, clock.now()) {
                    Ok(0) => {}
                    Ok(removed) => {
                        tracing::debug!(removed = removed, "Swept expired sessions from memory");
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Memory sweeper stopped");
                        break;
                    }
                }
            }
        }))
    }

    /// Find a live entry, deleting it if it has expired.
    fn lookup(&self, id: SessionId) -> Result<bool> {
        let now = self.clock.now();
        {
            let entries = self.entries.read().map_err(|_| SessionError::LockPoisoned)?;
            match entries.get(&id) {
                None => return Ok(false),
                Some(record) if !record.is_expired(now) => return Ok(true),
                Some(_) => {}
            }
        }

        let mut entries = self.entries.write().map_err(|_| SessionError::LockPoisoned)?;
        // Re-check: a refresh may have committed between the two locks.
        match entries.get(&id) {
            None => Ok(false),
            Some(record) if !record.is_expired(now) => Ok(true),
            Some(_) => {
                entries.remove(&id);
                tracing::debug!(session_id = %id, "Removed expired session from memory");
                Ok(false)
            }
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryBackend").finish_non_exhaustive()
    }
}

fn purge(entries: &Entries, now: DateTime<Utc>) -> Result<usize> {
    let mut entries = entries.write().map_err(|_| SessionError::LockPoisoned)?;
    let before = entries.len();
    entries.retain(|_, record| !record.is_expired(now));
    Ok(before - entries.len())
}

impl Backend for MemoryBackend {
    fn name(&self) -> &'static str {
        MEMORY_BACKEND
    }

    fn get(
        &self,
        id: SessionId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Fetched>>> + Send + '_>> {
        let fetched = self.lookup(id).map(|found| {
            found.then(|| {
                Fetched::Resident(ResidentRecord {
                    entries: Arc::clone(&self.entries),
                    id,
                })
            })
        });
        Box::pin(ready(fetched))
    }

    fn set(
        &self,
        id: SessionId,
        record: Record,
        ttl: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let result = self
            .entries
            .write()
            .map_err(|_| SessionError::LockPoisoned)
            .map(|mut entries| {
                entries.insert(id, record);
            });
        if result.is_ok() {
            tracing::debug!(
                session_id = %id,
                ttl_seconds = ttl.num_seconds(),
                "Stored session in memory"
            );
        }
        Box::pin(ready(result))
    }

    fn delete(&self, id: SessionId) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let result = self
            .entries
            .write()
            .map_err(|_| SessionError::LockPoisoned)
            .map(|mut entries| {
                entries.remove(&id);
            });
        Box::pin(ready(result))
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Factory
// ═══════════════════════════════════════════════════════════════════════

/// Options accepted by the memory backend.
///
/// ```json
/// { "sweep_interval_secs": 60 }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MemoryOptions {
    /// Seconds between background purges of expired entries. Absent or zero
    /// keeps expiry purely lazy.
    #[serde(default)]
    pub sweep_interval_secs: Option<u64>,
}

impl MemoryOptions {
    /// Parse options, falling back to defaults on empty or malformed input.
    #[must_use]
    pub fn parse(options: &str) -> Self {
        if options.trim().is_empty() {
            return Self::default();
        }
        serde_json::from_str(options).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Malformed memory backend options, using defaults");
            Self::default()
        })
    }
}

/// Registry entry for [`MemoryBackend`].
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryFactory;

impl BackendFactory for MemoryFactory {
    fn open(&self, options: &str, clock: Arc<dyn Clock>) -> Result<Arc<dyn Backend>> {
        let options = MemoryOptions::parse(options);
        let backend = MemoryBackend::with_clock(clock);
        if let Some(secs) = options.sweep_interval_secs.filter(|secs| *secs > 0) {
            // Detached: the task stops by itself once the backend is dropped.
            let _sweeper = backend.spawn_sweeper(std::time::Duration::from_secs(secs));
        }
        Ok(Arc::new(backend))
    }
}
