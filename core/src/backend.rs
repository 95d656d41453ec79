//! Storage backend abstraction.
//!
//! A backend stores [`Record`]s keyed by [`SessionId`]. Two implementations
//! exist:
//!
//! - **`MemoryBackend`** (this crate): in-process map, records are handed out
//!   as [`ResidentRecord`]s and mutated in place.
//! - **`RedisBackend`** (`sidstore-redis`): pooled connection to Redis,
//!   records cross the boundary through [`codec`](crate::codec) and are
//!   handed out detached.
//!
//! Backends are selected by name at startup through the
//! [`registry`](crate::registry), which maps names to [`BackendFactory`]s.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::Duration;

use crate::environment::Clock;
use crate::error::Result;
use crate::memory::ResidentRecord;
use crate::record::{Record, SessionId};

/// A record returned by [`Backend::get`].
#[derive(Debug)]
pub enum Fetched {
    /// A private copy; changes reach the backend only through
    /// [`Backend::set`].
    Detached(Record),

    /// A reference into the memory backend; changes are applied in place
    /// under the backend's lock and need no write-back.
    Resident(ResidentRecord),
}

/// Session storage.
///
/// # Expiry
///
/// Expiry travels inside the record. [`get`](Backend::get) never returns a
/// record whose expiry has passed; it removes it instead. The `ttl` passed to
/// [`set`](Backend::set) is a hint a backend may use for its own eviction.
///
/// # Dyn Compatibility
///
/// This trait uses explicit `Pin<Box<dyn Future>>` returns instead of `async fn`
/// so the registry can hand out `Arc<dyn Backend>`.
pub trait Backend: Send + Sync {
    /// Registry name of this backend (for logs).
    fn name(&self) -> &'static str;

    /// Load the record for `id`.
    ///
    /// Returns `Ok(None)` when no record exists or when it has expired (the
    /// expired record is deleted as a side effect).
    ///
    /// # Errors
    ///
    /// Returns error if the backend cannot be reached.
    fn get(
        &self,
        id: SessionId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Fetched>>> + Send + '_>>;

    /// Insert or replace the record for `id`.
    ///
    /// # Errors
    ///
    /// Returns error if the record cannot be encoded or the backend cannot be
    /// reached.
    fn set(
        &self,
        id: SessionId,
        record: Record,
        ttl: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Remove the record for `id`. Removing a missing record is not an error.
    ///
    /// # Errors
    ///
    /// Returns error if the backend cannot be reached.
    fn delete(&self, id: SessionId) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Constructor for a backend, registered under a name.
pub trait BackendFactory: Send + Sync {
    /// Build a backend from its option string (usually JSON).
    ///
    /// Unparsable options fall back to defaults; only a configuration the
    /// backend cannot work with at all is an error.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Configuration`](crate::SessionError::Configuration)
    /// if the backend cannot be built.
    fn open(&self, options: &str, clock: Arc<dyn Clock>) -> Result<Arc<dyn Backend>>;
}
