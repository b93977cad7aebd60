//! Lock file — which recipe version is installed and which files it owns.
//!
//! Persisted as `simmer.lock` at the project root. Ownership is
//! reference-counted by path across entries: a file copied by two recipes is
//! only physically deleted when the last owning recipe is uninstalled.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// LockEntry
// ---------------------------------------------------------------------------

/// Per-package record in the lock file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockEntry {
    /// The installed recipe version.
    #[serde(default)]
    pub version: String,

    /// Project-relative paths the recipe owns, sorted.
    #[serde(default)]
    pub files: Vec<String>,
}

// ---------------------------------------------------------------------------
// Lock
// ---------------------------------------------------------------------------

/// The project lock file: package name → [`LockEntry`].
///
/// `BTreeMap` keeps the serialized document stable across writes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Lock {
    path: PathBuf,
    entries: BTreeMap<String, LockEntry>,
}

impl Lock {
    /// Load the lock file at `path`. A missing file is an empty lock, not an
    /// error; a malformed file is.
    ///
    /// # Errors
    /// Returns [`LockError`] on unreadable or malformed content.
    pub fn load(path: &Path) -> Result<Self, LockError> {
        let entries = match std::fs::read_to_string(path) {
            Ok(json) => serde_json::from_str(&json).map_err(|e| LockError::Parse {
                path: path.to_path_buf(),
                detail: e.to_string(),
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(LockError::Io {
                    path: path.to_path_buf(),
                    detail: e.to_string(),
                });
            }
        };
        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    /// An in-memory lock that will persist to `path` on [`Lock::write`].
    #[must_use]
    pub fn empty(path: PathBuf) -> Self {
        Self {
            path,
            entries: BTreeMap::new(),
        }
    }

    /// Whether a package has a lock entry.
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// The entry for a package, if installed.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&LockEntry> {
        self.entries.get(name)
    }

    /// Insert or replace a package's entry.
    pub fn add(&mut self, name: &str, entry: LockEntry) {
        self.entries.insert(name.to_owned(), entry);
    }

    /// Remove a package's entry. Removing an absent entry is a no-op.
    pub fn remove(&mut self, name: &str) {
        self.entries.remove(name);
    }

    /// Record `path` as owned by `name`, creating the entry if needed.
    /// Duplicate paths within one entry are collapsed.
    pub fn record_file(&mut self, name: &str, path: &str) {
        let entry = self.entries.entry(name.to_owned()).or_default();
        if !entry.files.iter().any(|f| f == path) {
            entry.files.push(path.to_owned());
            entry.files.sort();
        }
    }

    /// How many installed recipes own `path`.
    #[must_use]
    pub fn owner_count(&self, path: &str) -> usize {
        self.entries
            .values()
            .filter(|e| e.files.iter().any(|f| f == path))
            .count()
    }

    /// Persist the lock to disk as pretty JSON.
    ///
    /// # Errors
    /// Returns [`LockError`] on serialization or write failure.
    pub fn write(&self) -> Result<(), LockError> {
        let json = serde_json::to_string_pretty(&self.entries).map_err(|e| LockError::Parse {
            path: self.path.clone(),
            detail: e.to_string(),
        })?;
        std::fs::write(&self.path, json + "\n").map_err(|e| LockError::Io {
            path: self.path.clone(),
            detail: e.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// LockError
// ---------------------------------------------------------------------------

/// Errors reading or writing the lock file.
#[derive(Debug)]
pub enum LockError {
    /// The lock file exists but cannot be read or written.
    Io {
        /// Lock file path.
        path: PathBuf,
        /// Underlying I/O error message.
        detail: String,
    },
    /// The lock file content is not valid JSON of the expected shape.
    Parse {
        /// Lock file path.
        path: PathBuf,
        /// Parser diagnostic.
        detail: String,
    },
}

impl fmt::Display for LockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, detail } => {
                write!(f, "lock file I/O error at '{}': {}", path.display(), detail)
            }
            Self::Parse { path, detail } => {
                write!(f, "malformed lock file '{}': {}", path.display(), detail)
            }
        }
    }
}

impl std::error::Error for LockError {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
