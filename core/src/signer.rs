//! Cookie signing.
//!
//! The cookie carries `<signature>-<session id>`. Signatures are hex, so they
//! never contain `-` and the first `-` in a cookie value is the separator.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{Result, SessionError};

type HmacSha256 = Hmac<Sha256>;

/// Signs session ids and verifies signatures presented by clients.
pub trait CookieSigner: Send + Sync {
    /// Signature over `id`. Must not contain `-`.
    fn sign(&self, id: &str) -> String;

    /// Returns `true` if `signature` was produced by [`sign`](Self::sign)
    /// for `id`.
    fn verify(&self, id: &str, signature: &str) -> bool;
}

/// HMAC-SHA256 signer keyed with the process secret.
///
/// # Examples
///
/// ```
/// use sidstore_core::{CookieSigner, HmacSigner};
///
/// let signer = HmacSigner::new(b"secret123").unwrap();
/// let signature = signer.sign("0190a1b2c3d4e5f60718293a4b5c6d7e");
/// assert!(signer.verify("0190a1b2c3d4e5f60718293a4b5c6d7e", &signature));
/// assert!(!signer.verify("0190a1b2c3d4e5f60718293a4b5c6d7f", &signature));
/// ```
#[derive(Clone)]
pub struct HmacSigner {
    mac: HmacSha256,
}

impl HmacSigner {
    /// Create a signer from the process secret.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Configuration`] if the secret is empty.
    pub fn new(secret: &[u8]) -> Result<Self> {
        if secret.is_empty() {
            return Err(SessionError::Configuration(
                "session secret must not be empty".to_string(),
            ));
        }
        let mac = HmacSha256::new_from_slice(secret)
            .map_err(|e| SessionError::Configuration(format!("invalid session secret: {e}")))?;
        Ok(Self { mac })
    }
}

impl std::fmt::Debug for HmacSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("HmacSigner { .. }")
    }
}

impl CookieSigner for HmacSigner {
    fn sign(&self, id: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(id.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn verify(&self, id: &str, signature: &str) -> bool {
        let Ok(expected) = hex::decode(signature) else {
            return false;
        };
        let mut mac = self.mac.clone();
        mac.update(id.as_bytes());
        // Constant-time comparison.
        mac.verify_slice(&expected).is_ok()
    }
}
