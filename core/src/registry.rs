//! Name → backend factory registry.
//!
//! Backends are chosen by a configuration string at startup. A
//! [`BackendRegistry`] can be built and passed around explicitly; the free
//! functions in this module operate on one process-wide instance that comes
//! pre-seeded with the `"memory"` backend. Other backend crates add
//! themselves during startup (see `sidstore_redis::register`).
//!
//! # Example
//!
//! ```
//! use sidstore_core::{registry, SessionError};
//!
//! let backend = registry::open("memory", "").unwrap();
//! assert_eq!(backend.name(), "memory");
//!
//! assert!(matches!(
//!     registry::open("bogus", ""),
//!     Err(SessionError::UnknownBackend(_))
//! ));
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock, RwLock};

use crate::backend::{Backend, BackendFactory};
use crate::environment::{Clock, SystemClock};
use crate::error::{Result, SessionError};
use crate::memory::{MEMORY_BACKEND, MemoryFactory};

/// Maps backend names to factories.
pub struct BackendRegistry {
    factories: HashMap<String, Arc<dyn BackendFactory>>,
}

impl BackendRegistry {
    /// Create a registry containing no backends.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Create a registry containing the `"memory"` backend.
    #[must_use]
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(MEMORY_BACKEND, Arc::new(MemoryFactory));
        registry
    }

    /// Register `factory` under `name`.
    ///
    /// # Panics
    ///
    /// Panics if `name` is already registered. Registration happens once at
    /// startup, so a duplicate is a wiring bug, not a runtime condition.
    #[allow(clippy::panic)]
    pub fn register(&mut self, name: &str, factory: Arc<dyn BackendFactory>) {
        if self.factories.contains_key(name) {
            panic!("sidstore: register called twice for backend {name}");
        }
        self.factories.insert(name.to_string(), factory);
    }

    /// Returns `true` if `name` is registered.
    #[must_use]
    pub fn is_registered(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Open the backend registered as `name`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::UnknownBackend`] if `name` was never
    /// registered, or whatever the factory returns.
    pub fn open(
        &self,
        name: &str,
        options: &str,
        clock: Arc<dyn Clock>,
    ) -> Result<Arc<dyn Backend>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| SessionError::UnknownBackend(name.to_string()))?;
        let backend = factory.open(options, clock)?;
        tracing::debug!(backend = name, "Opened session backend");
        Ok(backend)
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("names", &self.names())
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Process-wide registry
// ═══════════════════════════════════════════════════════════════════════

static GLOBAL: LazyLock<RwLock<BackendRegistry>> =
    LazyLock::new(|| RwLock::new(BackendRegistry::new()));

/// Register `factory` under `name` in the process-wide registry.
///
/// # Panics
///
/// Panics if `name` is already registered.
pub fn register(name: &str, factory: Arc<dyn BackendFactory>) {
    // A poisoned lock only means an earlier registration panicked; the map
    // itself is still consistent.
    let mut registry = GLOBAL.write().unwrap_or_else(std::sync::PoisonError::into_inner);
    registry.register(name, factory);
}

/// Returns `true` if `name` is registered in the process-wide registry.
#[must_use]
pub fn is_registered(name: &str) -> bool {
    GLOBAL
        .read()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .is_registered(name)
}

/// Open a backend from the process-wide registry on the system clock.
///
/// # Errors
///
/// Returns [`SessionError::UnknownBackend`] if `name` was never registered.
pub fn open(name: &str, options: &str) -> Result<Arc<dyn Backend>> {
    open_with_clock(name, options, Arc::new(SystemClock))
}

/// Open a backend from the process-wide registry on the given clock.
///
/// # Errors
///
/// Returns [`SessionError::UnknownBackend`] if `name` was never registered.
pub fn open_with_clock(
    name: &str,
    options: &str,
    clock: Arc<dyn Clock>,
) -> Result<Arc<dyn Backend>> {
    GLOBAL
        .read()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .open(name, options, clock)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_new_registry_has_memory() {
        let registry = BackendRegistry::new();
        assert!(registry.is_registered("memory"));
        assert_eq!(registry.names(), vec!["memory"]);
        assert!(BackendRegistry::empty().names().is_empty());
    }

    #[test]
    fn test_open_unknown_backend() {
        let registry = BackendRegistry::new();
        let result = registry.open("bogus", "", Arc::new(SystemClock));
        assert!(matches!(result, Err(SessionError::UnknownBackend(name)) if name == "bogus"));
    }

    #[test]
    #[should_panic(expected = "register called twice")]
    fn test_duplicate_registration_panics() {
        let mut registry = BackendRegistry::new();
        registry.register("memory", Arc::new(MemoryFactory));
    }

    #[test]
    fn test_register_under_new_name() {
        let mut registry = BackendRegistry::empty();
        registry.register("scratch", Arc::new(MemoryFactory));
        let backend = registry.open("scratch", "", Arc::new(SystemClock)).unwrap();
        assert_eq!(backend.name(), "memory");
    }

    #[test]
    fn test_global_registry_opens_memory() {
        assert!(is_registered("memory"));
        assert_eq!(open("memory", "").unwrap().name(), "memory");
        assert!(matches!(open("bogus", ""), Err(SessionError::UnknownBackend(_))));
    }
}
