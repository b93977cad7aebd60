//! Blob store — content-addressed storage for original-file snapshots.
//!
//! A three-way merge needs "the original content of path P" even when P has
//! since been edited or deleted in the live tree. Blobs are written into the
//! project's own object database (via `git hash-object -w`), so a patch's
//! `index <hash>..` headers resolve to exactly the bytes stored here. Writes
//! are lazy and idempotent; blobs materialized for one apply are removed
//! again afterwards by [`BlobStore::cleanup_blobs`].

use std::fmt;

use std::path::Path;

use crate::model::ObjectHash;
use crate::vcs::{GitTool, VcsError};

// ---------------------------------------------------------------------------
// BlobError
// ---------------------------------------------------------------------------

/// Errors from blob store operations.
#[derive(Debug)]
pub enum BlobError {
    /// The requested blob is not in the store. Fatal for the requesting
    /// operation: without a base blob, three-way merge is impossible.
    NotFound {
        /// The missing hash.
        hash: ObjectHash,
    },
    /// The store computed a different hash for the contents than the caller
    /// claimed — the caller-supplied hash is not canonical.
    HashMismatch {
        /// Hash the caller addressed the blob by.
        expected: ObjectHash,
        /// Hash the object store computed.
        actual: ObjectHash,
    },
    /// The underlying toolchain failed.
    Vcs(VcsError),
}

impl fmt::Display for BlobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { hash } => write!(f, "blob {hash} not found in object store"),
            Self::HashMismatch { expected, actual } => {
                write!(f, "blob hash mismatch: addressed as {expected}, stored as {actual}")
            }
            Self::Vcs(e) => write!(f, "object store failure: {e}"),
        }
    }
}

impl std::error::Error for BlobError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Vcs(e) => Some(e),
            _ => None,
        }
    }
}

impl From<VcsError> for BlobError {
    fn from(e: VcsError) -> Self {
        Self::Vcs(e)
    }
}

// ---------------------------------------------------------------------------
// BlobStore
// ---------------------------------------------------------------------------

/// Content-addressed blob storage over a project's object database.
pub struct BlobStore {
    git: GitTool,
}

impl BlobStore {
    /// Open the store of the project rooted at `root`.
    pub fn new(root: impl Into<std::path::PathBuf>) -> Self {
        Self {
            git: GitTool::new(root),
        }
    }

    /// Write `contents` under `hash` if not already present.
    ///
    /// Returns `true` when this call created the blob, `false` when it
    /// already existed — callers use that to scope cleanup to blobs they
    /// materialized themselves.
    ///
    /// # Errors
    /// [`BlobError::HashMismatch`] if `hash` is not the canonical content
    /// hash of `contents`; [`BlobError::Vcs`] on toolchain failure.
    pub fn ensure_blob(&self, hash: &ObjectHash, contents: &[u8]) -> Result<bool, BlobError> {
        if self.git.has_object(hash) {
            return Ok(false);
        }
        let written = self.git.write_blob(contents)?;
        if &written != hash {
            return Err(BlobError::HashMismatch {
                expected: hash.clone(),
                actual: written,
            });
        }
        Ok(true)
    }

    /// Read a blob's bytes.
    ///
    /// # Errors
    /// [`BlobError::NotFound`] if no object exists under `hash`.
    pub fn read_blob(&self, hash: &ObjectHash) -> Result<Vec<u8>, BlobError> {
        if !self.git.has_object(hash) {
            return Err(BlobError::NotFound { hash: hash.clone() });
        }
        Ok(self.git.read_object(hash)?)
    }

    /// Remove transiently-materialized blobs after an apply.
    ///
    /// Best-effort: this runs on success, conflict, and failure paths alike,
    /// and a blob that cannot be removed must never mask the primary
    /// outcome, so removal failures are only logged.
    pub fn cleanup_blobs(&self, hashes: &[ObjectHash]) {
        let Ok(git_dir) = self.git.git_dir() else {
            return;
        };
        for hash in hashes {
            let path = loose_object_path(&git_dir, hash);
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::debug!(blob = %hash, error = %e, "failed to remove transient blob");
                }
            }
        }
    }
}

/// Loose object path for `hash`: `<git-dir>/objects/<first 2>/<rest>`.
fn loose_object_path(git_dir: &Path, hash: &ObjectHash) -> std::path::PathBuf {
    let hex = hash.as_str();
    git_dir.join("objects").join(&hex[..2]).join(&hex[2..])
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
