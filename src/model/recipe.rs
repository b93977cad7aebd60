//! Recipe model — a named, versioned bundle of declarative file edits.
//!
//! A recipe carries an ordered *manifest* (configurator key → configurator
//! specific config) and a *files* map (relative path → content + executable
//! flag) used by the copy configurator. Recipes arrive already fetched; this
//! module only parses and exposes them.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

// ---------------------------------------------------------------------------
// Recipe
// ---------------------------------------------------------------------------

/// A single recipe version for one package.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Recipe {
    /// Package name the recipe belongs to (e.g. `"acme/http-client"`).
    pub name: String,

    /// Recipe version (e.g. `"1.2"`).
    pub version: String,

    /// Ordered manifest: configurator key → config value.
    ///
    /// Key order is semantic — configurators run in manifest order, so this
    /// relies on `serde_json`'s insertion-ordered map.
    #[serde(default)]
    pub manifest: serde_json::Map<String, Value>,

    /// Files shipped with the recipe, keyed by path relative to the recipe
    /// root. Consumed by the copy configurator.
    #[serde(default)]
    pub files: BTreeMap<String, RecipeFileData>,
}

impl Recipe {
    /// Parse a recipe from its JSON representation.
    ///
    /// # Errors
    /// Returns [`RecipeError`] on malformed JSON or a shape mismatch.
    pub fn from_json(json: &str) -> Result<Self, RecipeError> {
        serde_json::from_str(json).map_err(|e| RecipeError::Parse {
            detail: e.to_string(),
        })
    }

    /// Read and parse a recipe JSON file.
    ///
    /// # Errors
    /// Returns [`RecipeError`] if the file cannot be read or parsed.
    pub fn from_path(path: &Path) -> Result<Self, RecipeError> {
        let json = std::fs::read_to_string(path).map_err(|e| RecipeError::Read {
            path: path.display().to_string(),
            detail: e.to_string(),
        })?;
        Self::from_json(&json)
    }

    /// Config value for a manifest key, if present.
    #[must_use]
    pub fn config(&self, key: &str) -> Option<&Value> {
        self.manifest.get(key)
    }
}

// ---------------------------------------------------------------------------
// RecipeFileData
// ---------------------------------------------------------------------------

/// Content and mode of one file shipped with a recipe.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecipeFileData {
    /// File content, byte-exact.
    pub contents: String,

    /// Whether the file should be written with the executable bit set.
    #[serde(default)]
    pub executable: bool,
}

// ---------------------------------------------------------------------------
// RecipeError
// ---------------------------------------------------------------------------

/// Errors loading a recipe.
#[derive(Debug)]
pub enum RecipeError {
    /// The recipe file could not be read.
    Read {
        /// Path that failed.
        path: String,
        /// Underlying I/O error message.
        detail: String,
    },
    /// The recipe JSON is malformed or has the wrong shape.
    Parse {
        /// Parser diagnostic.
        detail: String,
    },
}

impl fmt::Display for RecipeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read { path, detail } => {
                write!(f, "failed to read recipe '{path}': {detail}")
            }
            Self::Parse { detail } => write!(f, "malformed recipe: {detail}"),
        }
    }
}

impl std::error::Error for RecipeError {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
