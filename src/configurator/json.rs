//! Scripts configurator — keys of a JSON document's `scripts` subtree.
//!
//! Unlike the marker-based configurators this one patches the document
//! structurally: the JSON is parsed, the `scripts` object is rewritten, and
//! the whole document is re-serialized. Key order is preserved (including
//! the position of updated keys); byte formatting is normalized to the
//! standard two-space pretty printer.

use std::path::PathBuf;

use serde_json::{Map, Value};

use crate::model::{Lock, Recipe};
use crate::update::RecipeUpdate;

use super::{Configurator, ConfiguratorError, read_project_file, write_project_file};

const DEFAULT_FILE: &str = "package.json";

// ---------------------------------------------------------------------------
// ScriptsConfigurator
// ---------------------------------------------------------------------------

/// Maintains a recipe's entries in a JSON `scripts` object.
pub struct ScriptsConfigurator {
    root: PathBuf,
}

impl ScriptsConfigurator {
    /// Create the configurator for the project rooted at `root`.
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

impl Configurator for ScriptsConfigurator {
    fn configure(
        &self,
        _recipe: &Recipe,
        config: &Value,
        _lock: &mut Lock,
    ) -> Result<(), ConfiguratorError> {
        let Some(cfg) = parse_config(config)? else {
            return Ok(());
        };
        let Some(live) = read_project_file(&self.root, &cfg.file)? else {
            tracing::debug!(file = %cfg.file, "no JSON document; skipping scripts");
            return Ok(());
        };
        let updated = edit_scripts(&self.root.join(&cfg.file), &live, &cfg.values, &[])?;
        if updated != live {
            write_project_file(&self.root, &cfg.file, &updated)?;
        }
        Ok(())
    }

    fn unconfigure(
        &self,
        _recipe: &Recipe,
        config: &Value,
        _lock: &mut Lock,
    ) -> Result<(), ConfiguratorError> {
        let Some(cfg) = parse_config(config)? else {
            return Ok(());
        };
        let Some(live) = read_project_file(&self.root, &cfg.file)? else {
            return Ok(());
        };
        let remove: Vec<&str> = cfg.values.keys().map(String::as_str).collect();
        let updated = edit_scripts(&self.root.join(&cfg.file), &live, &Map::new(), &remove)?;
        if updated != live {
            write_project_file(&self.root, &cfg.file, &updated)?;
        }
        Ok(())
    }

    fn update(
        &self,
        update: &mut RecipeUpdate,
        original: &Value,
        new: &Value,
    ) -> Result<(), ConfiguratorError> {
        let old_cfg = parse_config(original)?;
        let new_cfg = parse_config(new)?;
        if old_cfg.is_none() && new_cfg.is_none() {
            return Ok(());
        }

        let mut files: Vec<&str> = Vec::new();
        for cfg in [&old_cfg, &new_cfg].into_iter().flatten() {
            if !files.contains(&cfg.file.as_str()) {
                files.push(&cfg.file);
            }
        }

        for file in files {
            let Some(live) = read_project_file(update.root(), file)? else {
                tracing::debug!(file, "no JSON document; skipping scripts update");
                continue;
            };
            let full = update.root().join(file);

            let empty = Map::new();
            let old_values = values_for(&old_cfg, file).unwrap_or(&empty);
            let new_values = values_for(&new_cfg, file).unwrap_or(&empty);

            // Base: the document without any of this recipe's keys; each
            // side then re-adds its own.
            let all_keys: Vec<&str> = old_values
                .keys()
                .chain(new_values.keys())
                .map(String::as_str)
                .collect();

            let base = edit_scripts(&full, &live, &Map::new(), &all_keys)?;
            let original_render = edit_scripts(&full, &base, old_values, &[])?;
            let new_render = edit_scripts(&full, &base, new_values, &[])?;
            if original_render == new_render {
                continue;
            }

            update.set_original_file(file, Some(original_render.into_bytes()));
            update.set_new_file(file, Some(new_render.into_bytes()));
        }
        Ok(())
    }
}

fn values_for<'a>(cfg: &'a Option<ScriptsConfig>, file: &str) -> Option<&'a Map<String, Value>> {
    match cfg {
        Some(c) if c.file == file => Some(&c.values),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Config parsing
// ---------------------------------------------------------------------------

struct ScriptsConfig {
    file: String,
    values: Map<String, Value>,
}

/// Parse `{"file": optional, "values": {name: command}}`.
fn parse_config(config: &Value) -> Result<Option<ScriptsConfig>, ConfiguratorError> {
    let map = match config {
        Value::Null => return Ok(None),
        Value::Object(map) => map,
        other => {
            return Err(ConfiguratorError::InvalidConfig {
                configurator: "scripts",
                detail: format!("expected an object, got {other}"),
            });
        }
    };

    let file = match map.get("file") {
        None => DEFAULT_FILE.to_owned(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => {
            return Err(ConfiguratorError::InvalidConfig {
                configurator: "scripts",
                detail: format!("'file' must be a string, got {other}"),
            });
        }
    };

    let values = match map.get("values") {
        Some(Value::Object(values)) => values.clone(),
        Some(other) => {
            return Err(ConfiguratorError::InvalidConfig {
                configurator: "scripts",
                detail: format!("'values' must be an object, got {other}"),
            });
        }
        None => {
            return Err(ConfiguratorError::InvalidConfig {
                configurator: "scripts",
                detail: "missing required key 'values'".to_owned(),
            });
        }
    };

    Ok(Some(ScriptsConfig { file, values }))
}

// ---------------------------------------------------------------------------
// Structural editing
// ---------------------------------------------------------------------------

/// Rewrite the document's `scripts` object: remove `remove` keys, then merge
/// `set` in. Existing keys keep their position; new keys append. The whole
/// document is re-serialized with the standard pretty printer.
fn edit_scripts(
    path: &std::path::Path,
    document: &str,
    set: &Map<String, Value>,
    remove: &[&str],
) -> Result<String, ConfiguratorError> {
    let mut doc: Value =
        serde_json::from_str(document).map_err(|e| ConfiguratorError::MalformedDocument {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;

    let Some(root) = doc.as_object_mut() else {
        return Err(ConfiguratorError::MalformedDocument {
            path: path.to_path_buf(),
            detail: "top-level value is not an object".to_owned(),
        });
    };

    let scripts_entry = root
        .entry("scripts")
        .or_insert_with(|| Value::Object(Map::new()));
    let Some(scripts) = scripts_entry.as_object_mut() else {
        return Err(ConfiguratorError::MalformedDocument {
            path: path.to_path_buf(),
            detail: "'scripts' is not an object".to_owned(),
        });
    };

    for key in remove {
        scripts.remove(*key);
    }
    for (key, value) in set {
        scripts.insert(key.clone(), value.clone());
    }

    let mut out = serde_json::to_string_pretty(&doc).map_err(|e| {
        ConfiguratorError::MalformedDocument {
            path: path.to_path_buf(),
            detail: e.to_string(),
        }
    })?;
    out.push('\n');
    Ok(out)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
