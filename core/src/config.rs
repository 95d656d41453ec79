//! Session configuration.
//!
//! Built once at startup and shared read-only (behind an `Arc`) by every
//! request. Values should be provided by the application, not hardcoded.

use chrono::Duration;

use crate::error::{Result, SessionError};
use crate::memory::MEMORY_BACKEND;

/// Default cookie name.
pub const DEFAULT_COOKIE_NAME: &str = "sid";

/// Process-wide session settings.
#[derive(Clone)]
pub struct SessionConfig {
    /// Name of the session cookie.
    ///
    /// Default: `sid`
    pub cookie_name: String,

    /// Lifetime of a session created without an explicit TTL.
    ///
    /// Default: 30 days
    pub max_age: Duration,

    /// `HttpOnly` flag on emitted cookies.
    ///
    /// Default: `true`
    pub http_only: bool,

    /// `Secure` flag on emitted cookies.
    ///
    /// Default: `false`
    pub secure: bool,

    /// Key for signing cookie values. Required.
    pub secret: Vec<u8>,

    /// Registry name of the storage backend.
    ///
    /// Default: `memory`
    pub backend: String,

    /// Option string handed to the backend factory (usually JSON).
    ///
    /// Default: empty
    pub backend_options: String,
}

impl SessionConfig {
    /// Create configuration with the given signing secret.
    #[must_use]
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
            ..Self::default()
        }
    }

    /// Set the cookie name.
    #[must_use]
    pub fn with_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = name.into();
        self
    }

    /// Set the default session lifetime.
    #[must_use]
    pub const fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    /// Set the `HttpOnly` flag.
    #[must_use]
    pub const fn with_http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    /// Set the `Secure` flag.
    #[must_use]
    pub const fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Select the backend by registry name, with its option string.
    #[must_use]
    pub fn with_backend(mut self, name: impl Into<String>, options: impl Into<String>) -> Self {
        self.backend = name.into();
        self.backend_options = options.into();
        self
    }

    /// Check the settings that cannot fall back to a default.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Configuration`] if the secret or cookie name is
    /// empty, or the default lifetime is not positive.
    pub fn validate(&self) -> Result<()> {
        if self.secret.is_empty() {
            return Err(SessionError::Configuration(
                "session secret must not be empty".to_string(),
            ));
        }
        if self.cookie_name.is_empty() {
            return Err(SessionError::Configuration(
                "cookie name must not be empty".to_string(),
            ));
        }
        if self.max_age <= Duration::zero() {
            return Err(SessionError::Configuration(format!(
                "max age must be positive, got {}s",
                self.max_age.num_seconds()
            )));
        }
        Ok(())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
            max_age: Duration::days(30),
            http_only: true,
            secure: false,
            secret: Vec::new(),
            backend: MEMORY_BACKEND.to_string(),
            backend_options: String::new(),
        }
    }
}

impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("cookie_name", &self.cookie_name)
            .field("max_age", &self.max_age)
            .field("http_only", &self.http_only)
            .field("secure", &self.secure)
            .field("secret", &"<redacted>")
            .field("backend", &self.backend)
            .field("backend_options", &self.backend_options)
            .finish()
    }
}
