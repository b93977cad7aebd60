//! Project configuration (`.simmer/config.toml`).
//!
//! Missing file → all defaults (no error). Missing fields use defaults.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::vcs::GitTool;

// ---------------------------------------------------------------------------
// SimmerConfig
// ---------------------------------------------------------------------------

/// Top-level project configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimmerConfig {
    /// Recipe update behaviour.
    #[serde(default)]
    pub update: UpdateConfig,
}

impl SimmerConfig {
    /// Load the config at `path`.
    ///
    /// # Errors
    /// Returns [`ConfigError`] on unreadable or malformed content; a missing
    /// file is the default config.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(ConfigError {
                    path: path.to_path_buf(),
                    detail: e.to_string(),
                });
            }
        };
        toml::from_str(&raw).map_err(|e| ConfigError {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })
    }

    /// The conventional config path for a project root.
    #[must_use]
    pub fn path_for(root: &Path) -> PathBuf {
        root.join(".simmer").join("config.toml")
    }
}

// ---------------------------------------------------------------------------
// UpdateConfig
// ---------------------------------------------------------------------------

/// Recipe update behaviour.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateConfig {
    /// Which patch applier backend to use.
    #[serde(default)]
    pub applier: ApplierKind,
}

/// The patch applier backend.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApplierKind {
    /// Use three-way merging when the merge toolchain is available, plain
    /// context matching otherwise.
    #[default]
    Auto,
    /// Always use `git apply -3` (fails when git is unavailable).
    ThreeWay,
    /// Always use the built-in context-matching applier.
    Plain,
}

impl ApplierKind {
    /// Resolve `Auto` against the environment: three-way needs a git binary
    /// and a repository at `root`.
    #[must_use]
    pub fn resolve(self, root: &Path) -> Self {
        match self {
            Self::Auto => {
                if GitTool::available() && GitTool::is_repository(root) {
                    Self::ThreeWay
                } else {
                    Self::Plain
                }
            }
            other => other,
        }
    }
}

impl fmt::Display for ApplierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::ThreeWay => write!(f, "three-way"),
            Self::Plain => write!(f, "plain"),
        }
    }
}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// A configuration file could not be loaded or parsed.
#[derive(Debug)]
pub struct ConfigError {
    /// Path to the configuration file.
    pub path: PathBuf,
    /// Human-readable description of the problem.
    pub detail: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "configuration error in '{}': {}",
            self.path.display(),
            self.detail
        )
    }
}

impl std::error::Error for ConfigError {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
