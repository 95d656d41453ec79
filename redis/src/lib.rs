//! # sidstore Redis backend
//!
//! Stores session records on a Redis server through a `deadpool-redis`
//! connection pool.
//!
//! ## Setup
//!
//! Call [`register`] once during startup, then select the backend by name:
//!
//! ```no_run
//! use sidstore_core::{SessionConfig, SessionManager};
//!
//! # fn example() -> sidstore_core::Result<()> {
//! sidstore_redis::register();
//!
//! let config = SessionConfig::new("secret123")
//!     .with_backend("redis", r#"{"addr": "127.0.0.1:6379", "pools": 20}"#);
//! let manager = SessionManager::open(config)?;
//! # Ok(())
//! # }
//! ```
//!
//! See [`RedisOptions`] for the accepted option fields.

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]

use std::sync::{Arc, Once};

pub mod backend;
pub mod options;

pub use backend::{REDIS_BACKEND, RedisBackend, RedisFactory};
pub use options::{Network, RedisOptions};

static REGISTER: Once = Once::new();

/// Add the `"redis"` backend to the process-wide registry.
///
/// Safe to call more than once; only the first call registers.
pub fn register() {
    REGISTER.call_once(|| {
        sidstore_core::registry::register(REDIS_BACKEND, Arc::new(RedisFactory));
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_is_idempotent() {
        register();
        register();
        assert!(sidstore_core::registry::is_registered("redis"));
        assert!(sidstore_core::registry::open("redis", r#"{"addr": "127.0.0.1:1"}"#).is_ok());
    }
}
