//! Install / uninstall driver.
//!
//! Runs every manifest key's `configure` (or `unconfigure`) in manifest
//! order and maintains the lock entry. Config misuse in one key is skipped
//! with a warning; unknown keys and I/O failures abort the package.

use std::fmt;
use std::path::PathBuf;

use serde_json::Value;

use crate::configurator::{ConfiguratorError, ConfiguratorRegistry, UnknownConfiguratorError};
use crate::model::{Lock, LockEntry, Recipe};

// ---------------------------------------------------------------------------
// InstallError
// ---------------------------------------------------------------------------

/// Errors that abort a package's install or uninstall.
#[derive(Debug)]
pub enum InstallError {
    /// A manifest key matched no configurator kind.
    UnknownConfigurator(UnknownConfiguratorError),
    /// A configurator failed in a non-skippable way.
    Configurator {
        /// The manifest key being processed.
        key: String,
        /// The underlying failure.
        source: ConfiguratorError,
    },
}

impl fmt::Display for InstallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownConfigurator(e) => write!(f, "{e}"),
            Self::Configurator { key, source } => {
                write!(f, "configurator '{key}' failed: {source}")
            }
        }
    }
}

impl std::error::Error for InstallError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::UnknownConfigurator(e) => Some(e),
            Self::Configurator { source, .. } => Some(source),
        }
    }
}

impl From<UnknownConfiguratorError> for InstallError {
    fn from(e: UnknownConfiguratorError) -> Self {
        Self::UnknownConfigurator(e)
    }
}

// ---------------------------------------------------------------------------
// Installer
// ---------------------------------------------------------------------------

/// Applies and reverts whole recipes against one project root.
pub struct Installer {
    root: PathBuf,
}

impl Installer {
    /// Create an installer for the project rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Apply `recipe`: run every configurator's install path and record the
    /// lock entry.
    ///
    /// # Errors
    /// Returns [`InstallError`] on unknown manifest keys or non-skippable
    /// configurator failures.
    pub fn install(&self, recipe: &Recipe, lock: &mut Lock) -> Result<(), InstallError> {
        lock.add(
            &recipe.name,
            LockEntry {
                version: recipe.version.clone(),
                files: Vec::new(),
            },
        );
        self.run(recipe, lock, |configurator, recipe, config, lock| {
            configurator.configure(recipe, config, lock)
        })
    }

    /// Revert `recipe`: run every configurator's uninstall path and drop the
    /// lock entry.
    ///
    /// # Errors
    /// Returns [`InstallError`] on unknown manifest keys or non-skippable
    /// configurator failures.
    pub fn uninstall(&self, recipe: &Recipe, lock: &mut Lock) -> Result<(), InstallError> {
        self.run(recipe, lock, |configurator, recipe, config, lock| {
            configurator.unconfigure(recipe, config, lock)
        })?;
        lock.remove(&recipe.name);
        Ok(())
    }

    fn run(
        &self,
        recipe: &Recipe,
        lock: &mut Lock,
        step: impl Fn(
            &dyn crate::configurator::Configurator,
            &Recipe,
            &Value,
            &mut Lock,
        ) -> Result<(), ConfiguratorError>,
    ) -> Result<(), InstallError> {
        let registry = ConfiguratorRegistry::new(&self.root);
        for (key, config) in &recipe.manifest {
            let configurator = registry.resolve(key)?;
            match step(configurator.as_ref(), recipe, config, lock) {
                Ok(()) => {}
                Err(e) if e.is_config_misuse() => {
                    tracing::warn!(package = %recipe.name, %key, error = %e, "skipping configurator entry");
                }
                Err(source) => {
                    return Err(InstallError::Configurator {
                        key: key.clone(),
                        source,
                    });
                }
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
