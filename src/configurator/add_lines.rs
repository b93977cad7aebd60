//! Add-lines configurator — positioned line insertion into project files.
//!
//! Config shape: an array of entries
//! `{"file", "content", "position": "top"|"bottom"|"after_target",
//!   "target", "requires"}`.
//! `content` may span several lines. `requires` names a package that must be
//! installed for the entry to apply; the guard reads the lock and is
//! evaluated identically for the old and new side of an update. Malformed
//! entries are skipped with a warning; sibling entries still run.

use std::path::PathBuf;

use serde_json::Value;

use crate::model::{Lock, Recipe};
use crate::update::RecipeUpdate;

use super::{Configurator, ConfiguratorError, read_project_file, write_project_file};

// ---------------------------------------------------------------------------
// AddLinesConfigurator
// ---------------------------------------------------------------------------

/// Inserts (and removes) free-form line blocks at configured positions.
pub struct AddLinesConfigurator {
    root: PathBuf,
}

impl AddLinesConfigurator {
    /// Create the configurator for the project rooted at `root`.
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

impl Configurator for AddLinesConfigurator {
    fn configure(
        &self,
        _recipe: &Recipe,
        config: &Value,
        lock: &mut Lock,
    ) -> Result<(), ConfiguratorError> {
        for entry in parse_entries(config)? {
            if !requirement_met(&entry, lock) {
                continue;
            }
            let Some(live) = read_project_file(&self.root, &entry.file)? else {
                tracing::debug!(file = %entry.file, "file missing; add-lines entry skipped");
                continue;
            };
            let updated = add_content(&live, &entry);
            if updated != live {
                write_project_file(&self.root, &entry.file, &updated)?;
            }
        }
        Ok(())
    }

    fn unconfigure(
        &self,
        _recipe: &Recipe,
        config: &Value,
        lock: &mut Lock,
    ) -> Result<(), ConfiguratorError> {
        for entry in parse_entries(config)? {
            if !requirement_met(&entry, lock) {
                continue;
            }
            let Some(live) = read_project_file(&self.root, &entry.file)? else {
                continue;
            };
            let updated = remove_content(&live, &entry.content);
            if updated != live {
                write_project_file(&self.root, &entry.file, &updated)?;
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
        let old_entries: Vec<LineEntry> = parse_entries(original)?
            .into_iter()
            .filter(|e| requirement_met(e, update.lock()))
            .collect();
        let new_entries: Vec<LineEntry> = parse_entries(new)?
            .into_iter()
            .filter(|e| requirement_met(e, update.lock()))
            .collect();
        if old_entries.is_empty() && new_entries.is_empty() {
            return Ok(());
        }

        let mut files: Vec<&str> = Vec::new();
        for entry in old_entries.iter().chain(&new_entries) {
            if !files.contains(&entry.file.as_str()) {
                files.push(&entry.file);
            }
        }

        for file in files {
            let Some(live) = read_project_file(update.root(), file)? else {
                tracing::debug!(file, "file missing; add-lines update skipped");
                continue;
            };

            // Base: the live file with every managed block (old or new)
            // removed; each side then re-inserts its own.
            let mut base = live.clone();
            for entry in old_entries.iter().chain(&new_entries) {
                if entry.file == file {
                    base = remove_content(&base, &entry.content);
                }
            }

            let mut original_render = base.clone();
            for entry in old_entries.iter().filter(|e| e.file == file) {
                original_render = add_content(&original_render, entry);
            }
            let mut new_render = base.clone();
            for entry in new_entries.iter().filter(|e| e.file == file) {
                new_render = add_content(&new_render, entry);
            }

            if original_render == new_render {
                continue;
            }
            update.set_original_file(file, Some(original_render.into_bytes()));
            update.set_new_file(file, Some(new_render.into_bytes()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Position {
    Top,
    Bottom,
    AfterTarget,
}

#[derive(Clone, Debug)]
struct LineEntry {
    file: String,
    content: String,
    position: Position,
    target: Option<String>,
    requires: Option<String>,
}

/// Parse the entry array. Malformed entries are skipped with a warning so a
/// single bad entry never blocks its siblings.
fn parse_entries(config: &Value) -> Result<Vec<LineEntry>, ConfiguratorError> {
    let list = match config {
        Value::Null => return Ok(Vec::new()),
        Value::Array(list) => list,
        other => {
            return Err(ConfiguratorError::InvalidConfig {
                configurator: "add-lines",
                detail: format!("expected an array of entries, got {other}"),
            });
        }
    };

    let mut entries = Vec::with_capacity(list.len());
    for raw in list {
        match parse_entry(raw) {
            Ok(entry) => entries.push(entry),
            Err(reason) => {
                tracing::warn!(%reason, "skipping malformed add-lines entry");
            }
        }
    }
    Ok(entries)
}

fn parse_entry(raw: &Value) -> Result<LineEntry, String> {
    let obj = raw.as_object().ok_or("entry is not an object")?;
    let str_field = |key: &str| -> Option<String> {
        obj.get(key).and_then(Value::as_str).map(str::to_owned)
    };

    let file = str_field("file").ok_or("missing required key 'file'")?;
    let content = str_field("content").ok_or("missing required key 'content'")?;
    let position = match obj.get("position").and_then(Value::as_str) {
        None | Some("bottom") => Position::Bottom,
        Some("top") => Position::Top,
        Some("after_target") => Position::AfterTarget,
        Some(other) => return Err(format!("unknown position '{other}'")),
    };
    let target = str_field("target");
    if position == Position::AfterTarget && target.is_none() {
        return Err("position 'after_target' requires a 'target'".to_owned());
    }

    Ok(LineEntry {
        file,
        content,
        position,
        target,
        requires: str_field("requires"),
    })
}

/// The package-requirement guard.
fn requirement_met(entry: &LineEntry, lock: &Lock) -> bool {
    entry.requires.as_deref().is_none_or(|pkg| lock.has(pkg))
}

// ---------------------------------------------------------------------------
// Content splicing
// ---------------------------------------------------------------------------

/// Insert the entry's content at its position. Content already present
/// (as a contiguous run of lines) is left alone.
fn add_content(text: &str, entry: &LineEntry) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let content: Vec<&str> = entry.content.lines().collect();
    if content.is_empty() || find_run(&lines, &content).is_some() {
        return text.to_owned();
    }

    let mut out: Vec<&str> = Vec::with_capacity(lines.len() + content.len());
    match entry.position {
        Position::Top => {
            out.extend(&content);
            out.extend(&lines);
        }
        Position::Bottom => {
            out.extend(&lines);
            out.extend(&content);
        }
        Position::AfterTarget => {
            let target = entry.target.as_deref().unwrap_or_default();
            let Some(at) = lines.iter().position(|l| l.contains(target)) else {
                tracing::warn!(
                    file = %entry.file,
                    anchor = target,
                    "target line not found; add-lines entry skipped"
                );
                return text.to_owned();
            };
            out.extend(&lines[..=at]);
            out.extend(&content);
            out.extend(&lines[at + 1..]);
        }
    }
    join(&out)
}

/// Remove the first contiguous occurrence of `content`'s lines.
fn remove_content(text: &str, content: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let needle: Vec<&str> = content.lines().collect();
    let Some(at) = find_run(&lines, &needle) else {
        return text.to_owned();
    };
    let mut out: Vec<&str> = Vec::with_capacity(lines.len() - needle.len());
    out.extend(&lines[..at]);
    out.extend(&lines[at + needle.len()..]);
    if out.is_empty() {
        return String::new();
    }
    join(&out)
}

fn find_run(haystack: &[&str], needle: &[&str]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    (0..=haystack.len() - needle.len())
        .find(|&i| haystack[i..i + needle.len()] == *needle)
}

fn join(lines: &[&str]) -> String {
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
