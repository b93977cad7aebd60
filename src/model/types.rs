//! Core value types shared across the engine.
//!
//! - [`ObjectHash`] — validated content hash addressing an original-file blob.
//! - [`FileMap`] — ordered path → nullable content mapping, the unit the
//!   patch generator diffs.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// FileMap
// ---------------------------------------------------------------------------

/// An ordered mapping from relative path to file content.
///
/// `None` means "does not exist" — a sentinel distinct from an empty file.
/// A path present with content in the original map and absent (or `None`) in
/// the new map is a deletion; the reverse is a creation; different non-null
/// content on both sides is a modification. Equality is byte-exact.
///
/// `BTreeMap` keeps iteration deterministic, so two renders of the same
/// state always produce the same patch.
pub type FileMap = BTreeMap<PathBuf, Option<Vec<u8>>>;

// ---------------------------------------------------------------------------
// ObjectHash
// ---------------------------------------------------------------------------

/// A content hash addressing a blob in the project's object store.
///
/// Stored as a 40-character lowercase hex string — the same addressing the
/// merge toolchain uses in `index <hash>..<hash>` patch headers, so a blob
/// written under this hash is resolvable during a three-way apply.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectHash(String);

impl ObjectHash {
    /// Parse and validate a hash string.
    ///
    /// # Errors
    /// Returns [`HashParseError`] unless the string is exactly 40 lowercase
    /// hex characters.
    pub fn new(s: &str) -> Result<Self, HashParseError> {
        if s.len() != 40 {
            return Err(HashParseError {
                value: s.to_owned(),
                reason: format!("expected 40 hex characters, got {}", s.len()),
            });
        }
        if !s
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
        {
            return Err(HashParseError {
                value: s.to_owned(),
                reason: "must contain only lowercase hex characters (0-9, a-f)".to_owned(),
            });
        }
        Ok(Self(s.to_owned()))
    }

    /// The hash as a hex string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for ObjectHash {
    type Error = HashParseError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(&s)
    }
}

impl From<ObjectHash> for String {
    fn from(hash: ObjectHash) -> Self {
        hash.0
    }
}

/// Error returned when a hash string is malformed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HashParseError {
    /// The invalid value.
    pub value: String,
    /// Human-readable explanation.
    pub reason: String,
}

impl fmt::Display for HashParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid object hash: {:?} — {}", self.value, self.reason)
    }
}

impl std::error::Error for HashParseError {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
