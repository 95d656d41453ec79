//! Session cookie wire format.

use chrono::{DateTime, Utc};
use std::fmt;

/// A `Set-Cookie` to send to the client.
///
/// `Display` renders the header value.
///
/// # Examples
///
/// ```
/// use sidstore_core::SessionCookie;
/// use chrono::{DateTime, Utc};
///
/// let cookie = SessionCookie {
///     name: "sid".to_string(),
///     value: "abc-123".to_string(),
///     path: "/".to_string(),
///     expires: DateTime::<Utc>::UNIX_EPOCH,
///     max_age: Some(0),
///     http_only: true,
///     secure: false,
/// };
/// assert_eq!(
///     cookie.to_string(),
///     "sid=abc-123; Path=/; Expires=Thu, 01 Jan 1970 00:00:00 GMT; Max-Age=0; HttpOnly"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookie {
    /// Cookie name.
    pub name: String,
    /// `<signature>-<session id>`, or empty when clearing an unbound session.
    pub value: String,
    /// Cookie path, always `/` for session cookies.
    pub path: String,
    /// Absolute expiry (the record's expiry, or the Unix epoch to clear).
    pub expires: DateTime<Utc>,
    /// `Max-Age` attribute, set only when clearing.
    pub max_age: Option<i64>,
    /// `HttpOnly` flag.
    pub http_only: bool,
    /// `Secure` flag.
    pub secure: bool,
}

impl SessionCookie {
    /// Returns `true` if this cookie tells the client to drop the session.
    #[must_use]
    pub fn is_removal(&self, now: DateTime<Utc>) -> bool {
        self.max_age == Some(0) || self.expires <= now
    }
}

impl fmt::Display for SessionCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}={}; Path={}; Expires={}",
            self.name,
            self.value,
            self.path,
            self.expires.format("%a, %d %b %Y %H:%M:%S GMT")
        )?;
        if let Some(max_age) = self.max_age {
            write!(f, "; Max-Age={max_age}")?;
        }
        if self.http_only {
            f.write_str("; HttpOnly")?;
        }
        if self.secure {
            f.write_str("; Secure")?;
        }
        Ok(())
    }
}

/// Extract the value of cookie `name` from a `Cookie` request header.
///
/// # Examples
///
/// ```
/// use sidstore_core::cookie::cookie_value;
///
/// assert_eq!(cookie_value("theme=dark; sid=ab-cd", "sid"), Some("ab-cd"));
/// assert_eq!(cookie_value("theme=dark", "sid"), None);
/// ```
#[must_use]
pub fn cookie_value<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key.trim() == name).then(|| value.trim().trim_matches('"'))
    })
}
