//! Process-wide session wiring.

use std::fmt;
use std::sync::Arc;

use crate::backend::Backend;
use crate::config::SessionConfig;
use crate::cookie::cookie_value;
use crate::environment::{Clock, SystemClock};
use crate::error::Result;
use crate::handle::SessionHandle;
use crate::registry;
use crate::signer::{CookieSigner, HmacSigner};

/// Holds the configuration, backend, signer and clock shared by every
/// request, and mints a [`SessionHandle`] per request.
///
/// Cheap to clone.
///
/// # Examples
///
/// ```
/// use sidstore_core::{SessionConfig, SessionManager};
///
/// # async fn example() -> sidstore_core::Result<()> {
/// let manager = SessionManager::open(SessionConfig::new("secret123"))?;
///
/// // First request: no cookie yet.
/// let mut session = manager.handle(None);
/// session.init().await?;
/// session.set_key("user", "alice")?;
/// let cookie = session.finish().await.expect("new session emits a cookie");
///
/// // Second request presents the cookie.
/// let mut session = manager.handle(Some(&cookie.value));
/// assert!(session.init().await?);
/// assert_eq!(session.get("user")?, Some("alice".into()));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct SessionManager {
    config: Arc<SessionConfig>,
    backend: Arc<dyn Backend>,
    signer: Arc<dyn CookieSigner>,
    clock: Arc<dyn Clock>,
}

impl SessionManager {
    /// Assemble a manager from explicit parts.
    #[must_use]
    pub fn new(
        config: SessionConfig,
        backend: Arc<dyn Backend>,
        signer: Arc<dyn CookieSigner>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            backend,
            signer,
            clock,
        }
    }

    /// Validate `config`, open its backend from the process-wide registry and
    /// sign cookies with its secret.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Configuration`](crate::SessionError::Configuration)
    /// for an invalid config and
    /// [`SessionError::UnknownBackend`](crate::SessionError::UnknownBackend)
    /// for an unregistered backend name. Both are meant to stop startup.
    pub fn open(config: SessionConfig) -> Result<Self> {
        Self::open_with_clock(config, Arc::new(SystemClock))
    }

    /// Like [`open`](Self::open), on the given clock.
    ///
    /// # Errors
    ///
    /// See [`open`](Self::open).
    pub fn open_with_clock(config: SessionConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        let signer = HmacSigner::new(&config.secret)?;
        let backend =
            registry::open_with_clock(&config.backend, &config.backend_options, Arc::clone(&clock))?;
        tracing::info!(
            backend = backend.name(),
            cookie_name = %config.cookie_name,
            max_age_seconds = config.max_age.num_seconds(),
            "Session manager ready"
        );
        Ok(Self::new(config, backend, Arc::new(signer), clock))
    }

    /// Handle for a request that presented `raw_cookie` (the cookie's value,
    /// not the whole header).
    #[must_use]
    pub fn handle(&self, raw_cookie: Option<&str>) -> SessionHandle {
        SessionHandle::new(
            Arc::clone(&self.config),
            Arc::clone(&self.backend),
            Arc::clone(&self.signer),
            Arc::clone(&self.clock),
            raw_cookie.map(str::to_string),
        )
    }

    /// Handle for a request with the given `Cookie` header.
    #[must_use]
    pub fn handle_from_header(&self, cookie_header: Option<&str>) -> SessionHandle {
        self.handle(cookie_header.and_then(|header| cookie_value(header, &self.config.cookie_name)))
    }

    /// Shared configuration.
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The backend every handle talks to.
    #[must_use]
    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("config", &self.config)
            .field("backend", &self.backend.name())
            .finish_non_exhaustive()
    }
}
