//! Copy configurator — recipe file trees copied into the project.
//!
//! Config shape: an object of `from` → `to` mappings. A mapping whose `from`
//! ends in `/` copies every recipe file under that prefix; otherwise it
//! copies one file. Copied paths are recorded in the lock, and on uninstall
//! a file is only deleted once no other installed recipe owns it.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde_json::Value;

use crate::model::{Lock, Recipe, RecipeFileData};
use crate::update::RecipeUpdate;

use super::{Configurator, ConfiguratorError, write_project_file};

// ---------------------------------------------------------------------------
// CopyFilesConfigurator
// ---------------------------------------------------------------------------

/// Copies recipe-shipped files into the project tree.
pub struct CopyFilesConfigurator {
    root: PathBuf,
}

impl CopyFilesConfigurator {
    /// Create the configurator for the project rooted at `root`.
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

impl Configurator for CopyFilesConfigurator {
    fn configure(
        &self,
        recipe: &Recipe,
        config: &Value,
        lock: &mut Lock,
    ) -> Result<(), ConfiguratorError> {
        for (from, to) in parse_mappings(config)? {
            let targets = expand(&recipe.files, &from, &to);
            if targets.is_empty() {
                tracing::warn!(package = %recipe.name, %from, "recipe ships no files for mapping");
                continue;
            }
            for (src, target) in targets {
                let data = &recipe.files[&src];
                write_project_file(&self.root, &target, &data.contents)?;
                if data.executable {
                    set_executable(&self.root.join(&target))?;
                }
                lock.record_file(&recipe.name, &target);
            }
        }
        Ok(())
    }

    fn unconfigure(
        &self,
        recipe: &Recipe,
        config: &Value,
        lock: &mut Lock,
    ) -> Result<(), ConfiguratorError> {
        for (from, to) in parse_mappings(config)? {
            for (_, target) in expand(&recipe.files, &from, &to) {
                // Reference-counted ownership: other recipes may still own
                // this path.
                if lock.owner_count(&target) > 1 {
                    tracing::debug!(path = %target, "file still owned by another recipe; kept");
                    continue;
                }
                let full = self.root.join(&target);
                match std::fs::remove_file(&full) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => {
                        return Err(ConfiguratorError::Io {
                            path: full,
                            detail: e.to_string(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    fn update(
        &self,
        update: &mut RecipeUpdate,
        original: &Value,
        new: &Value,
    ) -> Result<(), ConfiguratorError> {
        let old_targets = render_targets(update.original_recipe(), original)?;
        let new_targets = render_targets(update.new_recipe(), new)?;

        let mut paths: Vec<&String> = old_targets.keys().collect();
        for path in new_targets.keys() {
            if !old_targets.contains_key(path) {
                paths.push(path);
            }
        }

        for path in paths {
            let old = old_targets.get(path);
            let new = new_targets.get(path);
            if old == new {
                continue;
            }
            update.set_original_file(
                path.clone(),
                old.map(|c| c.clone().into_bytes()),
            );
            update.set_new_file(path.clone(), new.map(|c| c.clone().into_bytes()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Parse the `from` → `to` mapping object.
fn parse_mappings(config: &Value) -> Result<Vec<(String, String)>, ConfiguratorError> {
    match config {
        Value::Null => Ok(Vec::new()),
        Value::Object(map) => {
            let mut mappings = Vec::with_capacity(map.len());
            for (from, to) in map {
                let Value::String(to) = to else {
                    return Err(ConfiguratorError::InvalidConfig {
                        configurator: "copy",
                        detail: format!("target for '{from}' must be a string, got {to}"),
                    });
                };
                mappings.push((from.clone(), to.clone()));
            }
            Ok(mappings)
        }
        other => Err(ConfiguratorError::InvalidConfig {
            configurator: "copy",
            detail: format!("expected an object of from: to, got {other}"),
        }),
    }
}

/// Expand one mapping over the recipe's files map into
/// `(recipe path, project target)` pairs.
fn expand(
    files: &BTreeMap<String, RecipeFileData>,
    from: &str,
    to: &str,
) -> Vec<(String, String)> {
    if from.ends_with('/') {
        files
            .keys()
            .filter(|path| path.starts_with(from))
            .map(|path| (path.clone(), format!("{to}{}", &path[from.len()..])))
            .collect()
    } else if files.contains_key(from) {
        vec![(from.to_owned(), to.to_owned())]
    } else {
        Vec::new()
    }
}

/// Project target → rendered content for one recipe version + config.
fn render_targets(
    recipe: &Recipe,
    config: &Value,
) -> Result<BTreeMap<String, String>, ConfiguratorError> {
    let mut targets = BTreeMap::new();
    for (from, to) in parse_mappings(config)? {
        for (src, target) in expand(&recipe.files, &from, &to) {
            targets.insert(target, recipe.files[&src].contents.clone());
        }
    }
    Ok(targets)
}

#[cfg(unix)]
fn set_executable(path: &std::path::Path) -> Result<(), ConfiguratorError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).map_err(|e| {
        ConfiguratorError::Io {
            path: path.to_path_buf(),
            detail: e.to_string(),
        }
    })
}

#[cfg(not(unix))]
fn set_executable(_path: &std::path::Path) -> Result<(), ConfiguratorError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
