//! Backend that always fails.

use crate::backend::{Backend, Fetched};
use crate::error::{Result, SessionError};
use crate::record::{Record, SessionId};
use chrono::Duration;
use std::future::{Future, ready};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Backend whose every call returns [`SessionError::Connection`].
///
/// Counts calls so tests can check that a failure was attempted rather than
/// skipped.
#[derive(Debug, Clone, Default)]
pub struct FailingBackend {
    calls: Arc<AtomicUsize>,
}

impl FailingBackend {
    /// Create a new failing backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of calls made so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn fail<T: Send + 'static>(&self) -> Pin<Box<dyn Future<Output = Result<T>> + Send + '_>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(ready(Err(SessionError::Connection(
            "connection refused".to_string(),
        ))))
    }
}

impl Backend for FailingBackend {
    fn name(&self) -> &'static str {
        "failing"
    }

    fn get(
        &self,
        _id: SessionId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Fetched>>> + Send + '_>> {
        self.fail()
    }

    fn set(
        &self,
        _id: SessionId,
        _record: Record,
        _ttl: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        self.fail()
    }

    fn delete(&self, _id: SessionId) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        self.fail()
    }
}
