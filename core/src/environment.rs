//! Injected dependencies shared by backends and session handles.

use chrono::{DateTime, Utc};

/// Clock trait - abstracts time operations for testability.
///
/// Every expiry comparison goes through a `Clock`, so tests can move time
/// forward instead of sleeping.
///
/// # Examples
///
/// ```
/// use sidstore_core::environment::{Clock, SystemClock};
///
/// let clock = SystemClock;
/// let before = chrono::Utc::now();
/// assert!(clock.now() >= before);
/// ```
pub trait Clock: Send + Sync {
    /// Get the current time
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
