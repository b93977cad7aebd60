//! Configurators — one module per recipe feature / file format.
//!
//! Every configurator implements the same three-operation contract:
//!
//! - `configure` — install path: mutate project files directly and record
//!   owned files in the lock.
//! - `unconfigure` — uninstall path: revert those edits.
//! - `update` — produce "original" and "new" virtual file contents for the
//!   patch generator instead of touching the tree. Implementations must omit
//!   paths whose old and new renders are identical, so the final patch stays
//!   minimal.
//!
//! Dispatch is a closed set of kinds keyed by manifest strings; an unknown
//! key is a typed error, not a panic.

pub mod add_lines;
pub mod compose;
pub mod copy_files;
pub mod dockerfile;
pub mod env;
pub mod gitignore;
pub mod json;
pub mod makefile;
pub mod marker;
pub mod yaml;

use std::fmt;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::model::{Lock, Recipe};
use crate::update::RecipeUpdate;

// ---------------------------------------------------------------------------
// Configurator trait
// ---------------------------------------------------------------------------

/// The uniform configure / unconfigure / update contract.
pub trait Configurator {
    /// Apply this feature's edits to the project (install path).
    ///
    /// # Errors
    /// Returns [`ConfiguratorError`] on malformed config or I/O failure.
    fn configure(&self, recipe: &Recipe, config: &Value, lock: &mut Lock)
    -> Result<(), ConfiguratorError>;

    /// Revert this feature's edits (uninstall path).
    ///
    /// # Errors
    /// Returns [`ConfiguratorError`] on malformed config or I/O failure.
    fn unconfigure(
        &self,
        recipe: &Recipe,
        config: &Value,
        lock: &mut Lock,
    ) -> Result<(), ConfiguratorError>;

    /// Contribute original/new renders for a recipe version change. Must not
    /// mutate project files.
    ///
    /// # Errors
    /// Returns [`ConfiguratorError`] on malformed config or I/O failure.
    fn update(
        &self,
        update: &mut RecipeUpdate,
        original: &Value,
        new: &Value,
    ) -> Result<(), ConfiguratorError>;
}

// ---------------------------------------------------------------------------
// ConfiguratorError
// ---------------------------------------------------------------------------

/// Errors from a single configurator invocation.
#[derive(Debug)]
pub enum ConfiguratorError {
    /// The manifest config for this configurator has the wrong shape (e.g. a
    /// missing required key). The orchestrator skips the entry with a
    /// warning; sibling manifest keys still run.
    InvalidConfig {
        /// Which configurator rejected its config.
        configurator: &'static str,
        /// What was wrong.
        detail: String,
    },
    /// A project file could not be read or written.
    Io {
        /// The file involved.
        path: PathBuf,
        /// Underlying I/O error message.
        detail: String,
    },
    /// A live project document this configurator must edit structurally
    /// (e.g. a JSON file) could not be parsed.
    MalformedDocument {
        /// The document path.
        path: PathBuf,
        /// Parser diagnostic.
        detail: String,
    },
}

impl ConfiguratorError {
    /// Whether the orchestrator should skip this entry and continue with
    /// sibling manifest keys.
    #[must_use]
    pub fn is_config_misuse(&self) -> bool {
        matches!(self, Self::InvalidConfig { .. })
    }
}

impl fmt::Display for ConfiguratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig {
                configurator,
                detail,
            } => write!(f, "invalid '{configurator}' config: {detail}"),
            Self::Io { path, detail } => {
                write!(f, "I/O error on '{}': {}", path.display(), detail)
            }
            Self::MalformedDocument { path, detail } => {
                write!(f, "cannot parse '{}': {}", path.display(), detail)
            }
        }
    }
}

impl std::error::Error for ConfiguratorError {}

// ---------------------------------------------------------------------------
// ConfiguratorKind + registry
// ---------------------------------------------------------------------------

/// The closed set of configurator kinds, keyed by manifest strings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConfiguratorKind {
    /// `"copy"` — copy recipe file trees into the project.
    Copy,
    /// `"env"` — `###>` blocks in `.env`.
    Env,
    /// `"gitignore"` — `###>` blocks in `.gitignore`.
    Gitignore,
    /// `"makefile"` — `###>` blocks in `Makefile`.
    Makefile,
    /// `"dockerfile"` — `###>` blocks in `Dockerfile`.
    Dockerfile,
    /// `"compose"` — `###>` blocks inside compose service/volume sections.
    Compose,
    /// `"parameters"` — keys of a YAML `parameters:` mapping.
    Parameters,
    /// `"scripts"` — keys of a JSON document's `scripts` subtree.
    Scripts,
    /// `"add-lines"` — positioned line insertion.
    AddLines,
}

impl ConfiguratorKind {
    /// All kinds, in manifest-key order used for diagnostics.
    pub const ALL: [Self; 9] = [
        Self::Copy,
        Self::Env,
        Self::Gitignore,
        Self::Makefile,
        Self::Dockerfile,
        Self::Compose,
        Self::Parameters,
        Self::Scripts,
        Self::AddLines,
    ];

    /// The manifest key this kind answers to.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::Copy => "copy",
            Self::Env => "env",
            Self::Gitignore => "gitignore",
            Self::Makefile => "makefile",
            Self::Dockerfile => "dockerfile",
            Self::Compose => "compose",
            Self::Parameters => "parameters",
            Self::Scripts => "scripts",
            Self::AddLines => "add-lines",
        }
    }

    /// Look up a kind by manifest key.
    #[must_use]
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.key() == key)
    }
}

impl fmt::Display for ConfiguratorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// A manifest key that matches no configurator kind.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnknownConfiguratorError {
    /// The offending manifest key.
    pub key: String,
}

impl fmt::Display for UnknownConfiguratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown configurator '{}' (known: ", self.key)?;
        for (i, kind) in ConfiguratorKind::ALL.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{kind}")?;
        }
        write!(f, ")")
    }
}

impl std::error::Error for UnknownConfiguratorError {}

/// Resolves manifest keys to configurator instances bound to one project
/// root.
pub struct ConfiguratorRegistry {
    root: PathBuf,
}

impl ConfiguratorRegistry {
    /// Create a registry for the project rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve `key` to its configurator.
    ///
    /// # Errors
    /// Returns [`UnknownConfiguratorError`] for keys outside the closed set.
    pub fn resolve(&self, key: &str) -> Result<Box<dyn Configurator>, UnknownConfiguratorError> {
        let kind = ConfiguratorKind::from_key(key).ok_or_else(|| UnknownConfiguratorError {
            key: key.to_owned(),
        })?;
        Ok(self.build(kind))
    }

    /// Instantiate a configurator for `kind`.
    #[must_use]
    pub fn build(&self, kind: ConfiguratorKind) -> Box<dyn Configurator> {
        let root = self.root.clone();
        match kind {
            ConfiguratorKind::Copy => Box::new(copy_files::CopyFilesConfigurator::new(root)),
            ConfiguratorKind::Env => Box::new(env::EnvConfigurator::new(root)),
            ConfiguratorKind::Gitignore => Box::new(gitignore::GitignoreConfigurator::new(root)),
            ConfiguratorKind::Makefile => Box::new(makefile::MakefileConfigurator::new(root)),
            ConfiguratorKind::Dockerfile => {
                Box::new(dockerfile::DockerfileConfigurator::new(root))
            }
            ConfiguratorKind::Compose => Box::new(compose::ComposeConfigurator::new(root)),
            ConfiguratorKind::Parameters => {
                Box::new(yaml::ParametersConfigurator::new(root))
            }
            ConfiguratorKind::Scripts => Box::new(json::ScriptsConfigurator::new(root)),
            ConfiguratorKind::AddLines => Box::new(add_lines::AddLinesConfigurator::new(root)),
        }
    }
}

// ---------------------------------------------------------------------------
// Shared file helpers
// ---------------------------------------------------------------------------

/// Read a project file as UTF-8 text; `Ok(None)` when it does not exist.
pub(crate) fn read_project_file(
    root: &Path,
    rel: &str,
) -> Result<Option<String>, ConfiguratorError> {
    let full = root.join(rel);
    match std::fs::read_to_string(&full) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ConfiguratorError::Io {
            path: full,
            detail: e.to_string(),
        }),
    }
}

/// Write a project file, creating parent directories as needed.
pub(crate) fn write_project_file(
    root: &Path,
    rel: &str,
    contents: &str,
) -> Result<(), ConfiguratorError> {
    let full = root.join(rel);
    if let Some(parent) = full.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfiguratorError::Io {
            path: full.clone(),
            detail: e.to_string(),
        })?;
    }
    std::fs::write(&full, contents).map_err(|e| ConfiguratorError::Io {
        path: full,
        detail: e.to_string(),
    })
}

/// Record a pair of marker-block renders on the update, with the common
/// in-place semantics: an existing block keeps its position, a missing block
/// is appended, an empty side means "block absent". Identical renders are
/// omitted entirely.
pub(crate) fn marker_block_update(
    update: &mut RecipeUpdate,
    rel_path: &str,
    prefix: &str,
    old_body: Option<&str>,
    new_body: Option<&str>,
) -> Result<(), ConfiguratorError> {
    if old_body.is_none() && new_body.is_none() {
        return Ok(());
    }

    let name = update.package_name().to_owned();
    let live = read_project_file(update.root(), rel_path)?;
    let file_exists = live.is_some();
    let live = live.unwrap_or_default();

    let render = |body: Option<&str>| -> String {
        match body {
            Some(b) => marker::set_block(&live, prefix, &name, b),
            None => marker::remove_block(&live, prefix, &name),
        }
    };

    let original = render(old_body);
    let new = render(new_body);
    if original == new {
        return Ok(());
    }

    let to_contents = |text: String| -> Option<Vec<u8>> {
        if text.is_empty() && !file_exists {
            None
        } else {
            Some(text.into_bytes())
        }
    };

    update.set_original_file(rel_path, to_contents(original));
    update.set_new_file(rel_path, to_contents(new));
    Ok(())
}

/// Parse a lines-array config (`["line one", "line two"]`) into a block
/// body. `Null` or an empty array means "not configured".
pub(crate) fn parse_lines_config(
    config: &Value,
    configurator: &'static str,
) -> Result<Option<String>, ConfiguratorError> {
    match config {
        Value::Null => Ok(None),
        Value::Array(lines) => {
            if lines.is_empty() {
                return Ok(None);
            }
            let mut body = String::new();
            for line in lines {
                match line {
                    Value::String(s) => {
                        body.push_str(s);
                        body.push('\n');
                    }
                    other => {
                        return Err(ConfiguratorError::InvalidConfig {
                            configurator,
                            detail: format!("expected string lines, got {other}"),
                        });
                    }
                }
            }
            Ok(Some(body))
        }
        other => Err(ConfiguratorError::InvalidConfig {
            configurator,
            detail: format!("expected an array of lines, got {other}"),
        }),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_round_trips_through_its_key() {
        for kind in ConfiguratorKind::ALL {
            assert_eq!(ConfiguratorKind::from_key(kind.key()), Some(kind));
        }
    }

    #[test]
    fn registry_resolves_known_keys() {
        let registry = ConfiguratorRegistry::new("/tmp/project");
        for kind in ConfiguratorKind::ALL {
            assert!(registry.resolve(kind.key()).is_ok(), "key {kind} must resolve");
        }
    }

    #[test]
    fn registry_rejects_unknown_key_with_diagnostic() {
        let registry = ConfiguratorRegistry::new("/tmp/project");
        let err = registry.resolve("bundles").map(|_| ()).unwrap_err();
        assert_eq!(err.key, "bundles");
        let msg = format!("{err}");
        assert!(msg.contains("unknown configurator 'bundles'"));
        assert!(msg.contains("env"), "diagnostic lists known keys: {msg}");
    }

    #[test]
    fn config_misuse_is_skippable() {
        let misuse = ConfiguratorError::InvalidConfig {
            configurator: "env",
            detail: "expected object".to_owned(),
        };
        assert!(misuse.is_config_misuse());

        let io = ConfiguratorError::Io {
            path: PathBuf::from(".env"),
            detail: "denied".to_owned(),
        };
        assert!(!io.is_config_misuse());
    }

    #[test]
    fn read_missing_project_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(read_project_file(dir.path(), "absent.txt").unwrap(), None);
    }

    #[test]
    fn write_project_file_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        write_project_file(dir.path(), "config/deep/app.yaml", "a: 1\n").unwrap();
        assert_eq!(
            read_project_file(dir.path(), "config/deep/app.yaml").unwrap(),
            Some("a: 1\n".to_owned())
        );
    }
}
