//! Connection options for the Redis backend.
//!
//! Options arrive as the JSON string configured for the backend:
//!
//! ```json
//! {
//!   "addr": "localhost:6379",
//!   "network": "tcp",
//!   "db": 0,
//!   "password": "hunter2",
//!   "pools": 10,
//!   "prefix": "session:"
//! }
//! ```
//!
//! Every field is optional. An empty or unparsable string yields the defaults.

use serde::Deserialize;
use std::fmt;

/// Default server address.
pub const DEFAULT_ADDR: &str = "localhost:6379";

/// Default maximum number of pooled connections.
pub const DEFAULT_POOL_SIZE: usize = 10;

/// Default key prefix.
pub const DEFAULT_PREFIX: &str = "session:";

/// Transport used to reach the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    /// `host:port` over TCP.
    #[default]
    Tcp,
    /// Unix domain socket; `addr` is the socket path.
    Unix,
}

/// Parsed Redis backend options.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RedisOptions {
    /// `host:port`, or a socket path for [`Network::Unix`].
    pub addr: String,
    /// Transport.
    pub network: Network,
    /// Logical database index.
    pub db: i64,
    /// `AUTH` password.
    pub password: Option<String>,
    /// Maximum pooled connections. Zero or negative means the default.
    pub pools: i64,
    /// Prepended to every session id to form the key.
    pub prefix: String,
}

impl RedisOptions {
    /// Parse an option string, falling back to defaults on empty or
    /// malformed input.
    ///
    /// # Examples
    ///
    /// ```
    /// use sidstore_redis::RedisOptions;
    ///
    /// let options = RedisOptions::parse(r#"{"addr": "cache:6380", "db": 2}"#);
    /// assert_eq!(options.to_url(), "redis://cache:6380/2");
    ///
    /// let fallback = RedisOptions::parse("not json");
    /// assert_eq!(fallback, RedisOptions::default());
    /// ```
    #[must_use]
    pub fn parse(options: &str) -> Self {
        if options.trim().is_empty() {
            return Self::default();
        }
        serde_json::from_str(options).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Malformed redis backend options, using defaults");
            Self::default()
        })
    }

    /// Pool size after applying the default for non-positive values.
    #[must_use]
    pub fn max_size(&self) -> usize {
        usize::try_from(self.pools)
            .ok()
            .filter(|size| *size > 0)
            .unwrap_or(DEFAULT_POOL_SIZE)
    }

    /// Connection URL understood by the `redis` crate.
    #[must_use]
    pub fn to_url(&self) -> String {
        match self.network {
            Network::Tcp => {
                let auth = self
                    .password
                    .as_deref()
                    .map(|password| format!(":{}@", urlencoding::encode(password)))
                    .unwrap_or_default();
                format!("redis://{auth}{}/{}", self.addr, self.db)
            }
            Network::Unix => {
                let auth = self
                    .password
                    .as_deref()
                    .map(|password| format!("&pass={}", urlencoding::encode(password)))
                    .unwrap_or_default();
                format!("redis+unix://{}?db={}{auth}", self.addr, self.db)
            }
        }
    }
}

impl Default for RedisOptions {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            network: Network::Tcp,
            db: 0,
            password: None,
            pools: 0,
            prefix: DEFAULT_PREFIX.to_string(),
        }
    }
}

impl fmt::Debug for RedisOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisOptions")
            .field("addr", &self.addr)
            .field("network", &self.network)
            .field("db", &self.db)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("pools", &self.pools)
            .field("prefix", &self.prefix)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = RedisOptions::parse("");
        assert_eq!(options.addr, "localhost:6379");
        assert_eq!(options.network, Network::Tcp);
        assert_eq!(options.db, 0);
        assert_eq!(options.password, None);
        assert_eq!(options.max_size(), 10);
        assert_eq!(options.prefix, "session:");
        assert_eq!(options.to_url(), "redis://localhost:6379/0");
    }

    #[test]
    fn test_partial_options_keep_other_defaults() {
        let options = RedisOptions::parse(r#"{"pools": 25, "prefix": "app:"}"#);
        assert_eq!(options.max_size(), 25);
        assert_eq!(options.prefix, "app:");
        assert_eq!(options.addr, DEFAULT_ADDR);
    }

    #[test]
    fn test_non_positive_pool_size_falls_back() {
        assert_eq!(RedisOptions::parse(r#"{"pools": 0}"#).max_size(), 10);
        assert_eq!(RedisOptions::parse(r#"{"pools": -4}"#).max_size(), 10);
    }

    #[test]
    fn test_malformed_options_fall_back() {
        assert_eq!(RedisOptions::parse("{"), RedisOptions::default());
        assert_eq!(
            RedisOptions::parse(r#"{"network": "carrier-pigeon"}"#),
            RedisOptions::default()
        );
        assert_eq!(RedisOptions::parse(r#"{"db": "zero"}"#), RedisOptions::default());
    }

    #[test]
    fn test_password_is_url_encoded() {
        let options = RedisOptions::parse(r#"{"addr": "10.0.0.5:6379", "password": "p@ss/w:rd", "db": 3}"#);
        assert_eq!(options.to_url(), "redis://:p%40ss%2Fw%3Ard@10.0.0.5:6379/3");
    }

    #[test]
    fn test_unix_socket_url() {
        let options = RedisOptions::parse(
            r#"{"network": "unix", "addr": "/var/run/redis.sock", "db": 1, "password": "s3cret"}"#,
        );
        assert_eq!(options.network, Network::Unix);
        assert_eq!(
            options.to_url(),
            "redis+unix:///var/run/redis.sock?db=1&pass=s3cret"
        );
    }

    #[test]
    fn test_debug_redacts_password() {
        let options = RedisOptions::parse(r#"{"password": "hunter2"}"#);
        let rendered = format!("{options:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }
}
