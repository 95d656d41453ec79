//! Error types for session storage and lifecycle operations.

use thiserror::Error;

/// Result type alias for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;

/// Error taxonomy for the session store.
///
/// Most of these never reach an HTTP client: signature failures mean "no
/// session", corrupt payloads are treated as misses, and persist failures
/// are logged by [`SessionHandle::finish`](crate::SessionHandle::finish).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    // ═══════════════════════════════════════════════════════════
    // Startup Errors
    // ═══════════════════════════════════════════════════════════

    /// Configuration is unusable (for example an empty secret).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The requested backend name was never registered.
    #[error("Unknown session backend: {0}")]
    UnknownBackend(String),

    // ═══════════════════════════════════════════════════════════
    // Backend Errors
    // ═══════════════════════════════════════════════════════════

    /// Dialing, authenticating or talking to a remote backend failed.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Backend-specific failure that is not a connection problem.
    #[error("Backend error: {0}")]
    Backend(String),

    /// A lock guarding in-process session state was poisoned.
    #[error("Session lock poisoned")]
    LockPoisoned,

    // ═══════════════════════════════════════════════════════════
    // Payload Errors
    // ═══════════════════════════════════════════════════════════

    /// A record could not be encoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Stored bytes could not be decoded into a record.
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    // ═══════════════════════════════════════════════════════════
    // Cookie Errors
    // ═══════════════════════════════════════════════════════════

    /// The cookie value is malformed or its signature does not verify.
    #[error("Invalid session cookie")]
    Signature,
}

impl SessionError {
    /// Returns `true` if this error should abort process startup.
    ///
    /// # Examples
    ///
    /// ```
    /// # use sidstore_core::SessionError;
    /// assert!(SessionError::UnknownBackend("bogus".into()).is_fatal_at_startup());
    /// assert!(!SessionError::Connection("refused".into()).is_fatal_at_startup());
    /// ```
    #[must_use]
    pub const fn is_fatal_at_startup(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::UnknownBackend(_))
    }

    /// Returns `true` if retrying the same call later may succeed.
    ///
    /// # Examples
    ///
    /// ```
    /// # use sidstore_core::SessionError;
    /// assert!(SessionError::Connection("timeout".into()).is_transient());
    /// assert!(!SessionError::Signature.is_transient());
    /// ```
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Connection(_))
    }
}
