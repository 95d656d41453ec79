//! Per-request session façade.
//!
//! A [`SessionHandle`] binds the cookie a client presented to a [`Record`] in
//! the configured backend. It is created at the start of a request (see
//! [`SessionManager::handle`](crate::SessionManager::handle)), mutated by the
//! application, and flushed with [`finish`](SessionHandle::finish) on every
//! exit path.
//!
//! # Lifecycle
//!
//! ```text
//! Unbound ──create / set_key──────────────────────────────┐
//!                                                          ▼
//! Pending ──init──┬── verified, record found ──────────► Valid
//!                 ├── verified, no record ──► Absent ──create──┘
//!                 └── malformed / bad signature ──► Unbound
//! ```
//!
//! # Write-back
//!
//! Two dirty flags track what must happen before the response goes out:
//!
//! - `should_persist`: the record differs from what the backend holds.
//!   Records resident in the memory backend are mutated in place, so only
//!   detached records (fresh ones, or ones fetched from a remote backend) ever
//!   set it.
//! - `should_emit`: the client needs a new `Set-Cookie` (new session, or a
//!   changed expiry).

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::backend::{Backend, Fetched};
use crate::config::SessionConfig;
use crate::cookie::SessionCookie;
use crate::environment::Clock;
use crate::error::{Result, SessionError};
use crate::record::{Record, SessionId, Value};
use crate::signer::CookieSigner;

/// Where a [`SessionHandle`] is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No usable cookie. The first write creates a new session.
    Unbound,
    /// A cookie was presented but [`init`](SessionHandle::init) has not run.
    Pending,
    /// A record is bound to the handle.
    Valid,
    /// The cookie verified but its record is gone (expired or deleted).
    Absent,
}

/// Per-request view of one session.
pub struct SessionHandle {
    config: Arc<SessionConfig>,
    backend: Arc<dyn Backend>,
    signer: Arc<dyn CookieSigner>,
    clock: Arc<dyn Clock>,
    raw_cookie: Option<String>,
    id: Option<SessionId>,
    current: Option<Fetched>,
    state: SessionState,
    should_persist: bool,
    should_emit: bool,
    outgoing: Option<SessionCookie>,
}

impl SessionHandle {
    pub(crate) fn new(
        config: Arc<SessionConfig>,
        backend: Arc<dyn Backend>,
        signer: Arc<dyn CookieSigner>,
        clock: Arc<dyn Clock>,
        raw_cookie: Option<String>,
    ) -> Self {
        let raw_cookie = raw_cookie.filter(|raw| !raw.is_empty());
        let state = if raw_cookie.is_some() {
            SessionState::Pending
        } else {
            SessionState::Unbound
        };
        Self {
            config,
            backend,
            signer,
            clock,
            raw_cookie,
            id: None,
            current: None,
            state,
            should_persist: false,
            should_emit: false,
            outgoing: None,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Binding
    // ═══════════════════════════════════════════════════════════════════════

    /// Verify the presented cookie and load its record.
    ///
    /// Returns `Ok(true)` only when a live record was loaded. A missing,
    /// malformed or forged cookie is not an error: the handle simply stays
    /// [`Unbound`](SessionState::Unbound).
    ///
    /// # Errors
    ///
    /// Returns error if the backend lookup fails.
    pub async fn init(&mut self) -> Result<bool> {
        let Some(raw) = self.raw_cookie.as_deref() else {
            self.state = SessionState::Unbound;
            return Ok(false);
        };

        let id = match self.verify_cookie(raw) {
            Ok(id) => id,
            Err(e) => {
                tracing::debug!(error = %e, "Ignoring unverifiable session cookie");
                self.state = SessionState::Unbound;
                return Ok(false);
            }
        };

        self.id = Some(id);
        self.current = self.backend.get(id).await?;
        if self.current.is_some() {
            self.state = SessionState::Valid;
            tracing::debug!(session_id = %id, backend = self.backend.name(), "Loaded session");
            Ok(true)
        } else {
            self.state = SessionState::Absent;
            tracing::debug!(session_id = %id, backend = self.backend.name(), "Session not found");
            Ok(false)
        }
    }

    /// Start a new session, replacing whatever the handle was bound to.
    ///
    /// The record expires `ttl_secs` from now, or after the configured
    /// `max_age` when `ttl_secs` is zero or negative. Lifetimes past the
    /// representable range saturate at the latest representable instant.
    pub fn create(&mut self, ttl_secs: i64) {
        if let Some(previous) = self.id {
            tracing::warn!(session_id = %previous, "Overwriting existing session");
        }

        let ttl = if ttl_secs > 0 {
            Duration::try_seconds(ttl_secs).unwrap_or(Duration::MAX)
        } else {
            self.config.max_age
        };
        let expires_at = shift(self.clock.now(), ttl);

        let id = SessionId::new();
        self.id = Some(id);
        self.current = Some(Fetched::Detached(Record::new(expires_at)));
        self.state = SessionState::Valid;
        self.should_persist = true;
        self.should_emit = true;
        tracing::debug!(session_id = %id, ttl_seconds = ttl.num_seconds(), "Created session");
    }

    fn verify_cookie(&self, raw: &str) -> Result<SessionId> {
        let (signature, id) = raw.split_once('-').ok_or(SessionError::Signature)?;
        let parsed: SessionId = id.parse()?;
        if !self.signer.verify(id, signature) {
            return Err(SessionError::Signature);
        }
        Ok(parsed)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Attributes
    // ═══════════════════════════════════════════════════════════════════════

    /// Value stored under `key`, if the handle has a record holding it.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::LockPoisoned`] if the memory backend's lock is
    /// poisoned.
    pub fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.read(|record| record.get(key).cloned())?.flatten())
    }

    /// Store `value` under `key`, creating a session first if there is none.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::LockPoisoned`] if the memory backend's lock is
    /// poisoned.
    pub fn set_key(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Result<()> {
        let (key, value) = (key.into(), value.into());
        self.modify(|record| {
            record.insert(key, value);
        })?;
        self.mark_dirty();
        Ok(())
    }

    /// Remove `key`. Does nothing without a record.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::LockPoisoned`] if the memory backend's lock is
    /// poisoned.
    pub fn del_key(&mut self, key: &str) -> Result<()> {
        if self.write_existing(|record| record.remove(key))?.is_some() {
            self.mark_dirty();
        }
        Ok(())
    }

    /// Drop the record and delete it from the backend immediately.
    ///
    /// # Errors
    ///
    /// Returns error if the backend delete fails.
    pub async fn del_store(&mut self) -> Result<()> {
        self.current = None;
        self.should_persist = false;
        let Some(id) = self.id else {
            return Ok(());
        };
        self.state = SessionState::Absent;
        self.backend.delete(id).await?;
        tracing::debug!(session_id = %id, backend = self.backend.name(), "Deleted session");
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Expiry
    // ═══════════════════════════════════════════════════════════════════════

    /// Push the expiry back by `by`. Does nothing without a record.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::LockPoisoned`] if the memory backend's lock is
    /// poisoned.
    pub fn refresh(&mut self, by: Duration) -> Result<()> {
        self.update_expiry(|current| shift(current, by))
    }

    /// Move the expiry to `at`. Does nothing without a record.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::LockPoisoned`] if the memory backend's lock is
    /// poisoned.
    pub fn refresh_to(&mut self, at: DateTime<Utc>) -> Result<()> {
        self.update_expiry(|_| at)
    }

    fn update_expiry(&mut self, next: impl FnOnce(DateTime<Utc>) -> DateTime<Utc>) -> Result<()> {
        let updated = self.write_existing(|record| {
            let expires_at = next(record.expires_at());
            record.set_expires_at(expires_at);
            expires_at
        })?;
        if let Some(expires_at) = updated {
            self.mark_dirty();
            self.should_emit = true;
            tracing::debug!(
                session_id = ?self.id,
                expires_at = %expires_at,
                "Refreshed session expiry"
            );
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Flashes
    // ═══════════════════════════════════════════════════════════════════════

    /// Queue a one-shot value for a later request, creating a session first
    /// if there is none.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::LockPoisoned`] if the memory backend's lock is
    /// poisoned.
    pub fn add_flash(&mut self, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        self.modify(|record| record.push_flash(value))?;
        self.mark_dirty();
        Ok(())
    }

    /// Remove and return every queued flash, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::LockPoisoned`] if the memory backend's lock is
    /// poisoned.
    pub fn flashes(&mut self) -> Result<Vec<Value>> {
        let flashes = self
            .write_existing(Record::take_flashes)?
            .unwrap_or_default();
        if !flashes.is_empty() {
            self.mark_dirty();
        }
        Ok(flashes)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Write-back
    // ═══════════════════════════════════════════════════════════════════════

    /// Write a detached record back to the backend with its remaining
    /// lifetime as the TTL hint.
    ///
    /// A resident record is already up to date, so this only clears the flag.
    ///
    /// # Errors
    ///
    /// Returns error if the backend write fails. `should_persist` stays set.
    pub async fn set_store(&mut self) -> Result<()> {
        let (Some(id), Some(Fetched::Detached(record))) = (self.id, &self.current) else {
            self.should_persist = false;
            return Ok(());
        };
        let ttl = record.remaining(self.clock.now());
        self.backend.set(id, record.clone(), ttl).await?;
        self.should_persist = false;
        Ok(())
    }

    /// Build the `Set-Cookie` carrying the signed id and the record's expiry.
    ///
    /// Returns `None` when the handle has no record. The cookie is also queued
    /// for [`finish`](Self::finish).
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::LockPoisoned`] if the memory backend's lock is
    /// poisoned.
    pub fn save(&mut self) -> Result<Option<SessionCookie>> {
        let (Some(id), Some(expires_at)) = (self.id, self.read(Record::expires_at)?) else {
            return Ok(None);
        };
        let cookie = self.cookie(self.signed_value(id), expires_at, None);
        self.should_emit = false;
        self.outgoing = Some(cookie.clone());
        Ok(Some(cookie))
    }

    /// Delete the session and build a cookie telling the client to drop it.
    ///
    /// # Errors
    ///
    /// Returns error if the backend delete fails.
    pub async fn clear(&mut self) -> Result<SessionCookie> {
        self.del_store().await?;
        self.should_emit = false;
        let value = self.id.map(|id| self.signed_value(id)).unwrap_or_default();
        let cookie = self.cookie(value, DateTime::<Utc>::UNIX_EPOCH, Some(0));
        self.outgoing = Some(cookie.clone());
        Ok(cookie)
    }

    /// End-of-request hook: persist if needed, then emit if needed.
    ///
    /// Persist failures are logged and swallowed; losing the session beats
    /// failing a response that is already on its way. Returns the cookie to
    /// attach to the response, if any.
    pub async fn finish(&mut self) -> Option<SessionCookie> {
        if self.should_persist {
            if let Err(e) = self.set_store().await {
                tracing::error!(
                    session_id = ?self.id,
                    backend = self.backend.name(),
                    error = %e,
                    "Failed to persist session"
                );
            }
        }
        if self.should_emit {
            if let Err(e) = self.save() {
                tracing::error!(session_id = ?self.id, error = %e, "Failed to build session cookie");
            }
        }
        self.outgoing.take()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Accessors
    // ═══════════════════════════════════════════════════════════════════════

    /// Id of the bound (or last verified) session.
    #[must_use]
    pub const fn id(&self) -> Option<SessionId> {
        self.id
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Returns `true` if the record must be written back.
    #[must_use]
    pub const fn should_persist(&self) -> bool {
        self.should_persist
    }

    /// Returns `true` if the client needs a new cookie.
    #[must_use]
    pub const fn should_emit(&self) -> bool {
        self.should_emit
    }

    /// Expiry of the bound record.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::LockPoisoned`] if the memory backend's lock is
    /// poisoned.
    pub fn expires_at(&self) -> Result<Option<DateTime<Utc>>> {
        self.read(Record::expires_at)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Record access
    // ═══════════════════════════════════════════════════════════════════════

    fn read<R>(&self, f: impl FnOnce(&Record) -> R) -> Result<Option<R>> {
        match &self.current {
            None => Ok(None),
            Some(Fetched::Detached(record)) => Ok(Some(f(record))),
            Some(Fetched::Resident(record)) => record.read(f),
        }
    }

    fn write_existing<R>(&mut self, f: impl FnOnce(&mut Record) -> R) -> Result<Option<R>> {
        match &mut self.current {
            None => Ok(None),
            Some(Fetched::Detached(record)) => Ok(Some(f(record))),
            Some(Fetched::Resident(record)) => record.write(f),
        }
    }

    /// Apply `f` to the bound record, creating a session first if there is
    /// none or the resident record has vanished from the backend.
    fn modify<R>(&mut self, f: impl FnOnce(&mut Record) -> R) -> Result<R> {
        let mut f = Some(f);
        if let Some(Fetched::Resident(record)) = &self.current {
            let applied = record.write(|record| f.take().map(|f| f(record)))?;
            if let Some(Some(out)) = applied {
                return Ok(out);
            }
            tracing::debug!(session_id = %record.id(), "Session vanished from memory backend");
            self.current = None;
        }
        if self.current.is_none() {
            self.create(0);
        }
        match (&mut self.current, f) {
            (Some(Fetched::Detached(record)), Some(f)) => Ok(f(record)),
            _ => Err(SessionError::Backend(
                "session record unavailable after create".to_string(),
            )),
        }
    }

    fn mark_dirty(&mut self) {
        if matches!(self.current, Some(Fetched::Detached(_))) {
            self.should_persist = true;
        }
    }

    fn signed_value(&self, id: SessionId) -> String {
        let id = id.to_string();
        format!("{}-{id}", self.signer.sign(&id))
    }

    fn cookie(
        &self,
        value: String,
        expires: DateTime<Utc>,
        max_age: Option<i64>,
    ) -> SessionCookie {
        SessionCookie {
            name: self.config.cookie_name.clone(),
            value,
            path: "/".to_string(),
            expires,
            max_age,
            http_only: self.config.http_only,
            secure: self.config.secure,
        }
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("backend", &self.backend.name())
            .field("should_persist", &self.should_persist)
            .field("should_emit", &self.should_emit)
            .finish_non_exhaustive()
    }
}

fn shift(at: DateTime<Utc>, by: Duration) -> DateTime<Utc> {
    at.checked_add_signed(by).unwrap_or(if by < Duration::zero() {
        DateTime::<Utc>::MIN_UTC
    } else {
        DateTime::<Utc>::MAX_UTC
    })
}
