//! Session record types.
//!
//! A [`Record`] is the attribute bag behind one session. Expiry and the
//! flash queue are first-class fields rather than reserved keys in the
//! attribute map, so a caller can never overwrite them with a value of the
//! wrong kind.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::SessionError;

// ═══════════════════════════════════════════════════════════════════════
// Session Identifier
// ═══════════════════════════════════════════════════════════════════════

/// Unique identifier for a session.
///
/// Backed by a time-ordered UUID (v7) and rendered as 32 lowercase hex
/// digits, which is both the backend key and the payload of the cookie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub uuid::Uuid);

impl SessionId {
    /// Mint a new time-ordered `SessionId`.
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::now_v7())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl FromStr for SessionId {
    type Err = SessionError;

    /// Parses the canonical 32-digit lowercase hex form only.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let canonical = s.len() == 32
            && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if !canonical {
            return Err(SessionError::Signature);
        }
        uuid::Uuid::try_parse(s)
            .map(Self)
            .map_err(|_| SessionError::Signature)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Values
// ═══════════════════════════════════════════════════════════════════════

/// A value stored in a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// UTF-8 string.
    Str(String),
    /// Signed integer.
    Int(i64),
    /// Floating point number.
    Float(f64),
    /// Boolean flag.
    Bool(bool),
    /// Point in time, always UTC.
    Timestamp(DateTime<Utc>),
    /// Ordered sequence of values.
    List(Vec<Value>),
}

impl Value {
    /// Returns the string slice if this is a [`Value::Str`].
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer if this is a [`Value::Int`].
    #[must_use]
    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the number if this is a [`Value::Float`].
    #[must_use]
    pub const fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the flag if this is a [`Value::Bool`].
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the instant if this is a [`Value::Timestamp`].
    #[must_use]
    pub const fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Timestamp(t) => Some(*t),
            _ => None,
        }
    }

    /// Returns the elements if this is a [`Value::List`].
    #[must_use]
    pub fn as_list(&self) -> Option<&[Self]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Int(i64::from(n))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Float(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(t: DateTime<Utc>) -> Self {
        Self::Timestamp(t)
    }
}

impl From<Vec<Self>> for Value {
    fn from(items: Vec<Self>) -> Self {
        Self::List(items)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Record
// ═══════════════════════════════════════════════════════════════════════

/// Attributes of one session.
///
/// The attribute map is ordered so that encoding a record is deterministic.
///
/// # Examples
///
/// ```
/// # use sidstore_core::Record;
/// use chrono::{Duration, Utc};
///
/// let now = Utc::now();
/// let mut record = Record::new(now + Duration::seconds(60));
/// record.insert("hello", "world");
/// assert_eq!(record.get("hello").and_then(|v| v.as_str()), Some("world"));
/// assert!(!record.is_expired(now));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    expires_at: DateTime<Utc>,
    flashes: Vec<Value>,
    values: BTreeMap<String, Value>,
}

impl Record {
    /// Create an empty record expiring at `expires_at`.
    #[must_use]
    pub const fn new(expires_at: DateTime<Utc>) -> Self {
        Self {
            expires_at,
            flashes: Vec::new(),
            values: BTreeMap::new(),
        }
    }

    /// Absolute expiry instant.
    #[must_use]
    pub const fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Move the expiry instant.
    pub fn set_expires_at(&mut self, expires_at: DateTime<Utc>) {
        self.expires_at = expires_at;
    }

    /// Returns `true` once `now` is strictly past the expiry instant.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Time left until expiry; negative once expired.
    #[must_use]
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        self.expires_at.signed_duration_since(now)
    }

    /// Look up an attribute.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Set an attribute, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.values.insert(key.into(), value.into())
    }

    /// Remove an attribute, returning it if it was present.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    /// Returns `true` if the attribute is present.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Number of attributes (flashes are not counted).
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if there are no attributes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate over attributes in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Queue a flash value.
    pub fn push_flash(&mut self, value: impl Into<Value>) {
        self.flashes.push(value.into());
    }

    /// Pending flash values, oldest first.
    #[must_use]
    pub fn flashes(&self) -> &[Value] {
        &self.flashes
    }

    /// Remove and return every pending flash value, oldest first.
    pub fn take_flashes(&mut self) -> Vec<Value> {
        std::mem::take(&mut self.flashes)
    }
}
