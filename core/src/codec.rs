//! Byte encoding of session records for backends that cross a process
//! boundary.
//!
//! Records are encoded with `bincode`. [`Value`](crate::Value) is a closed,
//! externally tagged enum, so nothing in a record needs
//! `deserialize_any`, which bincode cannot provide. The in-process memory
//! backend never calls into this module.

use crate::error::{Result, SessionError};
use crate::record::Record;

/// Encode a record.
///
/// The attribute map is ordered, so equal records encode to equal bytes.
///
/// # Errors
///
/// Returns [`SessionError::Serialization`] if encoding fails.
pub fn serialize(record: &Record) -> Result<Vec<u8>> {
    bincode::serialize(record).map_err(|e| SessionError::Serialization(e.to_string()))
}

/// Decode a record previously produced by [`serialize`].
///
/// # Errors
///
/// Returns [`SessionError::Deserialization`] if `bytes` is truncated,
/// corrupt, or carries trailing garbage.
pub fn deserialize(bytes: &[u8]) -> Result<Record> {
    use bincode::Options;

    // Same wire format as `bincode::serialize`, but trailing bytes are an error.
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .reject_trailing_bytes()
        .deserialize(bytes)
        .map_err(|e| SessionError::Deserialization(e.to_string()))
}
