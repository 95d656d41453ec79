//! Redis-backed session storage.
//!
//! # Architecture
//!
//! Each session is one string key, `{prefix}{session_id}`, holding the
//! bincode-encoded [`Record`]. When a write carries a positive TTL the key is
//! stored with `SET ... EX`, so Redis evicts abandoned sessions by itself.
//! The expiry inside the record stays authoritative: a record read past its
//! expiry is reported as missing and deleted, but only if the key still
//! holds the exact bytes that were read. A concurrent write that refreshed
//! the session in between is left alone.
//!
//! Connections come from a `deadpool-redis` pool. A pooled connection is
//! health-checked with `PING` before reuse and discarded if that fails.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, LazyLock};

use chrono::{DateTime, Duration, Utc};
use deadpool_redis::redis::{AsyncCommands, RedisError, Script};
use deadpool_redis::{Config, Connection, Pool, PoolConfig, Runtime};
use sidstore_core::environment::{Clock, SystemClock};
use sidstore_core::{
    Backend, BackendFactory, Fetched, Record, Result, SessionError, SessionId, codec,
};

use crate::options::RedisOptions;

/// Registry name of the Redis backend.
pub const REDIS_BACKEND: &str = "redis";

/// `DEL KEYS[1]` only while it still holds `ARGV[1]`.
static DELETE_IF_UNCHANGED: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r"if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0",
    )
});

/// What a stored payload turned out to be.
#[derive(Debug)]
enum Payload {
    Live(Record),
    Expired,
    Corrupt(SessionError),
}

fn classify(bytes: &[u8], now: DateTime<Utc>) -> Payload {
    match codec::deserialize(bytes) {
        Ok(record) if record.is_expired(now) => Payload::Expired,
        Ok(record) => Payload::Live(record),
        Err(e) => Payload::Corrupt(e),
    }
}

/// Whole seconds for `SET ... EX`, rounded up so a record with a fraction
/// of a second left still gets an expiry. `None` for non-positive TTLs.
fn expiry_seconds(ttl: Duration) -> Option<u64> {
    if ttl <= Duration::zero() {
        return None;
    }
    let whole = ttl.num_seconds();
    let rounded = if ttl > Duration::seconds(whole) {
        whole.saturating_add(1)
    } else {
        whole
    };
    u64::try_from(rounded).ok()
}

/// Session storage on a Redis server.
///
/// `Clone` shares the pool.
///
/// # Example
///
/// ```no_run
/// use sidstore_redis::{RedisBackend, RedisOptions};
///
/// # async fn example() -> sidstore_core::Result<()> {
/// let backend = RedisBackend::open(&RedisOptions::parse(r#"{"addr": "127.0.0.1:6379"}"#))?;
/// backend.ping().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RedisBackend {
    pool: Pool,
    prefix: String,
    clock: Arc<dyn Clock>,
}

impl RedisBackend {
    /// Build a backend on the system clock.
    ///
    /// No connection is made yet; call [`ping`](Self::ping) to check the
    /// server is reachable.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Configuration`] if the options do not describe
    /// a usable connection.
    pub fn open(options: &RedisOptions) -> Result<Self> {
        Self::with_clock(options, Arc::new(SystemClock))
    }

    /// Build a backend on the given clock.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Configuration`] if the options do not describe
    /// a usable connection.
    pub fn with_clock(options: &RedisOptions, clock: Arc<dyn Clock>) -> Result<Self> {
        let mut config = Config::from_url(options.to_url());
        config.pool = Some(PoolConfig::new(options.max_size()));
        let pool = config.create_pool(Some(Runtime::Tokio1)).map_err(|e| {
            SessionError::Configuration(format!("Invalid redis connection settings: {e}"))
        })?;

        tracing::debug!(
            addr = %options.addr,
            db = options.db,
            pool_size = options.max_size(),
            prefix = %options.prefix,
            "Created redis session pool"
        );

        Ok(Self {
            pool,
            prefix: options.prefix.clone(),
            clock,
        })
    }

    /// Round-trip a `PING` to the server.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Connection`] if the server cannot be reached
    /// or rejects the credentials.
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.connection().await?;
        let _: String = deadpool_redis::redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| redis_error("ping", &e))?;
        Ok(())
    }

    /// Key under which `id` is stored.
    #[must_use]
    pub fn key(&self, id: SessionId) -> String {
        format!("{}{id}", self.prefix)
    }

    async fn connection(&self) -> Result<Connection> {
        self.pool.get().await.map_err(|e| {
            SessionError::Connection(format!("Failed to get redis connection: {e}"))
        })
    }

    /// Delete `id` only if it still holds `expected`.
    ///
    /// Returns whether the key was removed. This is the delete used when a
    /// read finds an expired record, so a session rewritten after that read
    /// survives.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Connection`] on network failures and
    /// [`SessionError::Backend`] if the server rejects the script.
    pub async fn delete_if_unchanged(&self, id: SessionId, expected: &[u8]) -> Result<bool> {
        let key = self.key(id);
        let mut conn = self.connection().await?;
        let deleted: i64 = DELETE_IF_UNCHANGED
            .key(&key)
            .arg(expected)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| redis_error("delete", &e))?;
        Ok(deleted > 0)
    }

    async fn fetch(&self, id: SessionId) -> Result<Option<Fetched>> {
        let key = self.key(id);
        let bytes: Option<Vec<u8>> = {
            let mut conn = self.connection().await?;
            conn.get(&key).await.map_err(|e| redis_error("get", &e))?
        };
        let Some(bytes) = bytes else {
            return Ok(None);
        };

        match classify(&bytes, self.clock.now()) {
            Payload::Live(record) => Ok(Some(Fetched::Detached(record))),
            Payload::Corrupt(e) => {
                tracing::warn!(session_id = %id, error = %e, "Discarding corrupt session payload");
                Ok(None)
            }
            Payload::Expired => {
                match self.delete_if_unchanged(id, &bytes).await {
                    Ok(true) => tracing::debug!(session_id = %id, "Removed expired session from redis"),
                    Ok(false) => tracing::debug!(session_id = %id, "Expired session was rewritten, keeping it"),
                    Err(e) => tracing::warn!(session_id = %id, error = %e, "Failed to delete expired session"),
                }
                Ok(None)
            }
        }
    }

    async fn store(&self, id: SessionId, record: Record, ttl: Duration) -> Result<()> {
        let key = self.key(id);
        let bytes = codec::serialize(&record)?;
        let mut conn = self.connection().await?;

        match expiry_seconds(ttl) {
            Some(ttl_seconds) => {
                let _: () = conn
                    .set_ex(&key, bytes, ttl_seconds)
                    .await
                    .map_err(|e| redis_error("set", &e))?;
                tracing::debug!(session_id = %id, ttl_seconds = ttl_seconds, "Stored session in redis");
            }
            None => {
                let _: () = conn
                    .set(&key, bytes)
                    .await
                    .map_err(|e| redis_error("set", &e))?;
                tracing::debug!(session_id = %id, "Stored session in redis without TTL");
            }
        }
        Ok(())
    }

    async fn remove(&self, id: SessionId) -> Result<()> {
        let key = self.key(id);
        let mut conn = self.connection().await?;
        let _: () = conn.del(&key).await.map_err(|e| redis_error("delete", &e))?;
        Ok(())
    }
}

impl std::fmt::Debug for RedisBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBackend")
            .field("prefix", &self.prefix)
            .field("pool", &self.pool.status())
            .finish_non_exhaustive()
    }
}

/// Network-level failures are transient [`SessionError::Connection`]s;
/// anything the server itself rejected is a [`SessionError::Backend`].
fn redis_error(operation: &str, e: &RedisError) -> SessionError {
    let message = format!("Redis {operation} failed: {e}");
    if e.is_io_error() || e.is_connection_refusal() || e.is_connection_dropped() || e.is_timeout()
    {
        SessionError::Connection(message)
    } else {
        SessionError::Backend(message)
    }
}

impl Backend for RedisBackend {
    fn name(&self) -> &'static str {
        REDIS_BACKEND
    }

    fn get(
        &self,
        id: SessionId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Fetched>>> + Send + '_>> {
        Box::pin(self.fetch(id))
    }

    fn set(
        &self,
        id: SessionId,
        record: Record,
        ttl: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(self.store(id, record, ttl))
    }

    fn delete(&self, id: SessionId) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(self.remove(id))
    }
}

/// Registry entry for [`RedisBackend`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RedisFactory;

impl BackendFactory for RedisFactory {
    fn open(&self, options: &str, clock: Arc<dyn Clock>) -> Result<Arc<dyn Backend>> {
        let options = RedisOptions::parse(options);
        Ok(Arc::new(RedisBackend::with_clock(&options, clock)?))
    }
}
