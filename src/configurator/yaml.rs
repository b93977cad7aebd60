//! Parameters configurator — keys of a YAML `parameters:` mapping.
//!
//! Edits are line-scoped: only the managed keys' own lines are rewritten, so
//! comments and the ordering of untouched keys survive verbatim. Values are
//! scalars; nested parameter values are out of scope for recipes.

use std::path::PathBuf;

use serde_json::Value;

use crate::model::{Lock, Recipe};
use crate::update::RecipeUpdate;

use super::compose::section_span;
use super::{Configurator, ConfiguratorError, read_project_file, write_project_file};

const DEFAULT_FILE: &str = "config/services.yaml";
const SECTION: &str = "parameters";
const DEFAULT_INDENT: &str = "    ";

// ---------------------------------------------------------------------------
// ParametersConfigurator
// ---------------------------------------------------------------------------

/// Maintains a recipe's key set inside a `parameters:` mapping.
pub struct ParametersConfigurator {
    root: PathBuf,
}

impl ParametersConfigurator {
    /// Create the configurator for the project rooted at `root`.
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

impl Configurator for ParametersConfigurator {
    fn configure(
        &self,
        _recipe: &Recipe,
        config: &Value,
        _lock: &mut Lock,
    ) -> Result<(), ConfiguratorError> {
        let Some(cfg) = parse_config(config)? else {
            return Ok(());
        };
        let existing = read_project_file(&self.root, &cfg.file)?;
        let file_missing = existing.is_none();
        let live = existing.unwrap_or_else(|| "parameters:\n".to_owned());
        let mut updated = live.clone();
        for (key, value) in &cfg.values {
            updated = set_parameter(&updated, key, value);
        }
        if updated != live || file_missing {
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
        let mut updated = live.clone();
        for (key, _) in &cfg.values {
            updated = remove_parameter(&updated, key);
        }
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
            let live = read_project_file(update.root(), file)?;
            let file_exists = live.is_some();
            let live = live.unwrap_or_default();

            let old_values = values_for(&old_cfg, file);
            let new_values = values_for(&new_cfg, file);

            let original_render = render(&live, old_values, new_values);
            let new_render = render(&live, new_values, old_values);
            if original_render == new_render {
                continue;
            }

            let to_contents = |text: String| -> Option<Vec<u8>> {
                if text.is_empty() && !file_exists {
                    None
                } else {
                    Some(text.into_bytes())
                }
            };
            update.set_original_file(file, to_contents(original_render));
            update.set_new_file(file, to_contents(new_render));
        }
        Ok(())
    }
}

fn values_for<'a>(cfg: &'a Option<ParamsConfig>, file: &str) -> &'a [(String, String)] {
    match cfg {
        Some(c) if c.file == file => &c.values,
        _ => &[],
    }
}

/// Live text with `apply` values set and this recipe's `other`-only keys
/// removed (they would not exist in this render).
fn render(live: &str, apply: &[(String, String)], other: &[(String, String)]) -> String {
    let mut out = live.to_owned();
    for (key, _) in other {
        if !apply.iter().any(|(k, _)| k == key) {
            out = remove_parameter(&out, key);
        }
    }
    for (key, value) in apply {
        out = set_parameter(&out, key, value);
    }
    out
}

// ---------------------------------------------------------------------------
// Config parsing
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct ParamsConfig {
    file: String,
    values: Vec<(String, String)>,
}

/// Parse `{"file": optional, "values": {key: scalar}}`. The `values` key is
/// required — leaving it out is the classic config mistake, reported as
/// misuse so the orchestrator can skip the entry.
fn parse_config(config: &Value) -> Result<Option<ParamsConfig>, ConfiguratorError> {
    let map = match config {
        Value::Null => return Ok(None),
        Value::Object(map) => map,
        other => {
            return Err(ConfiguratorError::InvalidConfig {
                configurator: "parameters",
                detail: format!("expected an object, got {other}"),
            });
        }
    };

    let file = match map.get("file") {
        None => DEFAULT_FILE.to_owned(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => {
            return Err(ConfiguratorError::InvalidConfig {
                configurator: "parameters",
                detail: format!("'file' must be a string, got {other}"),
            });
        }
    };

    let values = match map.get("values") {
        Some(Value::Object(values)) => values,
        Some(other) => {
            return Err(ConfiguratorError::InvalidConfig {
                configurator: "parameters",
                detail: format!("'values' must be an object, got {other}"),
            });
        }
        None => {
            return Err(ConfiguratorError::InvalidConfig {
                configurator: "parameters",
                detail: "missing required key 'values'".to_owned(),
            });
        }
    };

    let mut rendered = Vec::with_capacity(values.len());
    for (key, value) in values {
        let scalar = match value {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Null => "null".to_owned(),
            other => {
                return Err(ConfiguratorError::InvalidConfig {
                    configurator: "parameters",
                    detail: format!("value for '{key}' must be a scalar, got {other}"),
                });
            }
        };
        rendered.push((key.clone(), scalar));
    }

    Ok(Some(ParamsConfig { file, values: rendered }))
}

// ---------------------------------------------------------------------------
// Line-scoped parameter splicing
// ---------------------------------------------------------------------------

/// Set `key: value` inside the `parameters:` mapping, replacing the key's
/// existing line in place or appending at the mapping's end. A missing
/// `parameters:` section is appended at document end.
fn set_parameter(text: &str, key: &str, value: &str) -> String {
    if let Some((start, end, indent)) = section_span(text, SECTION) {
        if let Some((line_start, line_end)) = find_key_line(text, start, end, &indent, key) {
            let mut out = String::with_capacity(text.len());
            out.push_str(&text[..line_start]);
            out.push_str(&format!("{indent}{key}: {value}\n"));
            out.push_str(&text[line_end..]);
            return out;
        }
        let mut out = String::with_capacity(text.len());
        out.push_str(&text[..end]);
        out.push_str(&format!("{indent}{key}: {value}\n"));
        out.push_str(&text[end..]);
        return out;
    }

    let mut out = text.to_owned();
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    if !out.is_empty() {
        out.push('\n');
    }
    out.push_str("parameters:\n");
    out.push_str(&format!("{DEFAULT_INDENT}{key}: {value}\n"));
    out
}

/// Remove `key`'s line from the `parameters:` mapping, if present.
fn remove_parameter(text: &str, key: &str) -> String {
    let Some((start, end, indent)) = section_span(text, SECTION) else {
        return text.to_owned();
    };
    let Some((line_start, line_end)) = find_key_line(text, start, end, &indent, key) else {
        return text.to_owned();
    };
    let mut out = String::with_capacity(text.len());
    out.push_str(&text[..line_start]);
    out.push_str(&text[line_end..]);
    out
}

/// Find the byte span of `key`'s own line at child depth within the section
/// span. Deeper-nested keys (longer indent) never match.
fn find_key_line(
    text: &str,
    start: usize,
    end: usize,
    indent: &str,
    key: &str,
) -> Option<(usize, usize)> {
    let needle = format!("{key}:");
    let mut pos = start;
    for line in text[start..end].split_inclusive('\n') {
        let line_start = pos;
        pos += line.len();
        let Some(rest) = line.strip_prefix(indent) else {
            continue;
        };
        // Exactly child depth: no further leading whitespace.
        if rest.starts_with(' ') || rest.starts_with('\t') {
            continue;
        }
        if rest.starts_with(&needle) {
            return Some((line_start, pos));
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
