//! Compose configurator — `###>` blocks inside `services:` / `volumes:`
//! sections of compose files.
//!
//! File discovery is environment-driven: when `COMPOSE_FILE` is set it names
//! the file list (`:`-separated, relative to the project root); otherwise the
//! first existing default candidate is used. Blocks are inserted at the end
//! of the named top-level key's mapping, indented like its existing
//! children; a missing top-level key is appended at document end.

use std::path::PathBuf;

use serde_json::Value;

use crate::model::{Lock, Recipe};
use crate::update::RecipeUpdate;

use super::{
    Configurator, ConfiguratorError, marker, read_project_file, write_project_file,
};

const PREFIX: &str = "###";
const DEFAULT_FILE: &str = "docker-compose.yml";
const CANDIDATES: [&str; 4] = [
    "compose.yaml",
    "compose.yml",
    "docker-compose.yaml",
    "docker-compose.yml",
];

// ---------------------------------------------------------------------------
// ComposeConfigurator
// ---------------------------------------------------------------------------

/// Maintains per-recipe blocks inside compose section mappings.
pub struct ComposeConfigurator {
    root: PathBuf,
    compose_file: Option<String>,
}

impl ComposeConfigurator {
    /// Create the configurator for the project rooted at `root`, reading
    /// `COMPOSE_FILE` from the environment.
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        let compose_file = std::env::var("COMPOSE_FILE").ok();
        Self::with_compose_file(root, compose_file)
    }

    /// Create the configurator with an explicit `COMPOSE_FILE` value.
    #[must_use]
    pub fn with_compose_file(root: PathBuf, compose_file: Option<String>) -> Self {
        Self { root, compose_file }
    }

    /// Existing compose files, as project-relative paths.
    fn discovered(&self) -> Vec<String> {
        if let Some(listing) = &self.compose_file {
            let mut files = Vec::new();
            for entry in listing.split(':').filter(|e| !e.is_empty()) {
                if PathBuf::from(entry).is_absolute() {
                    tracing::warn!(path = entry, "ignoring absolute COMPOSE_FILE entry");
                    continue;
                }
                if self.root.join(entry).exists() {
                    files.push(entry.to_owned());
                }
            }
            return files;
        }
        CANDIDATES
            .iter()
            .find(|c| self.root.join(c).exists())
            .map(|c| vec![(*c).to_owned()])
            .unwrap_or_default()
    }
}

impl Configurator for ComposeConfigurator {
    fn configure(
        &self,
        recipe: &Recipe,
        config: &Value,
        _lock: &mut Lock,
    ) -> Result<(), ConfiguratorError> {
        let sections = parse_sections(config)?;
        if sections.is_empty() {
            return Ok(());
        }

        let mut files = self.discovered();
        if files.is_empty() {
            files.push(DEFAULT_FILE.to_owned());
        }

        for file in files {
            let live = read_project_file(&self.root, &file)?.unwrap_or_default();
            let mut updated = live.clone();
            for (section, body) in &sections {
                updated = set_section_block(&updated, section, &recipe.name, body);
            }
            if updated != live {
                write_project_file(&self.root, &file, &updated)?;
            }
        }
        Ok(())
    }

    fn unconfigure(
        &self,
        recipe: &Recipe,
        config: &Value,
        _lock: &mut Lock,
    ) -> Result<(), ConfiguratorError> {
        let sections = parse_sections(config)?;
        for file in self.discovered() {
            let Some(live) = read_project_file(&self.root, &file)? else {
                continue;
            };
            let mut updated = live.clone();
            for (section, _) in &sections {
                updated = remove_section_block(&updated, section, &recipe.name);
            }
            if updated != live {
                write_project_file(&self.root, &file, &updated)?;
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
        let old_sections = parse_sections(original)?;
        let new_sections = parse_sections(new)?;
        if old_sections.is_empty() && new_sections.is_empty() {
            return Ok(());
        }

        let files = self.discovered();
        if files.is_empty() {
            tracing::debug!(package = %update.package_name(), "no compose file; skipping");
            return Ok(());
        }

        let name = update.package_name().to_owned();
        for file in files {
            let live = read_project_file(update.root(), &file)?.unwrap_or_default();

            let original_render =
                render_sections(&live, &name, &old_sections, &new_sections);
            let new_render = render_sections(&live, &name, &new_sections, &old_sections);
            if original_render == new_render {
                continue;
            }

            update.set_original_file(file.clone(), Some(original_render.into_bytes()));
            update.set_new_file(file, Some(new_render.into_bytes()));
        }
        Ok(())
    }
}

/// Render the live text as it would look with `apply` sections configured:
/// apply blocks are set, and sections present only in `other` have this
/// recipe's block removed.
fn render_sections(
    live: &str,
    name: &str,
    apply: &[(String, String)],
    other: &[(String, String)],
) -> String {
    let mut out = live.to_owned();
    for (section, body) in apply {
        out = set_section_block(&out, section, name, body);
    }
    for (section, _) in other {
        if !apply.iter().any(|(s, _)| s == section) {
            out = remove_section_block(&out, section, name);
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Config parsing
// ---------------------------------------------------------------------------

/// Parse `{"services": [lines], "volumes": [lines]}` into ordered
/// `(section, block body)` pairs.
fn parse_sections(config: &Value) -> Result<Vec<(String, String)>, ConfiguratorError> {
    match config {
        Value::Null => Ok(Vec::new()),
        Value::Object(map) => {
            let mut sections = Vec::with_capacity(map.len());
            for (section, lines) in map {
                let body = super::parse_lines_config(lines, "compose")?.ok_or_else(|| {
                    ConfiguratorError::InvalidConfig {
                        configurator: "compose",
                        detail: format!("section '{section}' must be a non-empty array of lines"),
                    }
                })?;
                sections.push((section.clone(), body));
            }
            Ok(sections)
        }
        other => Err(ConfiguratorError::InvalidConfig {
            configurator: "compose",
            detail: format!("expected an object of section: lines, got {other}"),
        }),
    }
}

// ---------------------------------------------------------------------------
// Section-scoped block splicing
// ---------------------------------------------------------------------------

/// Byte span of a top-level `section:` mapping: header line start, end after
/// the last indented child line (trailing blanks excluded), and the indent
/// of its children. Also used by the parameters configurator.
pub(crate) fn section_span(text: &str, section: &str) -> Option<(usize, usize, String)> {
    let header = format!("{section}:");

    let mut pos = 0;
    let mut header_start = None;
    let mut header_end = 0;
    for line in text.split_inclusive('\n') {
        let start = pos;
        pos += line.len();
        if line.trim_end() == header {
            header_start = Some(start);
            header_end = pos;
            break;
        }
    }
    let header_start = header_start?;

    let mut end = header_end;
    let mut indent: Option<String> = None;
    let mut scan = header_end;
    for line in text[header_end..].split_inclusive('\n') {
        scan += line.len();
        let content = line.trim_end_matches(['\n', '\r']);
        if content.trim().is_empty() {
            // Blank lines only belong to the section if more children
            // follow; `end` is extended by the next indented line.
            continue;
        }
        if content.starts_with(' ') || content.starts_with('\t') {
            if indent.is_none() {
                let lead = content.len() - content.trim_start().len();
                indent = Some(content[..lead].to_owned());
            }
            end = scan;
        } else {
            break;
        }
    }

    Some((header_start, end, indent.unwrap_or_else(|| "  ".to_owned())))
}

/// Set this recipe's block inside `section`, replacing it in place when
/// present, appending at the section's end otherwise, or appending a new
/// top-level section at document end when the key is absent.
fn set_section_block(text: &str, section: &str, name: &str, body: &str) -> String {
    if let Some((start, end, indent)) = section_span(text, section) {
        let slice = &text[start..end];
        if let Some(span) = marker::find_block(slice, PREFIX, name) {
            let rendered = marker::render_block(PREFIX, name, body, &span.indent);
            let mut out = String::with_capacity(text.len());
            out.push_str(&text[..start + span.start]);
            out.push_str(&rendered);
            out.push_str(&text[start + span.end..]);
            return out;
        }
        let rendered = marker::render_block(PREFIX, name, body, &indent);
        let mut out = String::with_capacity(text.len() + rendered.len());
        out.push_str(&text[..end]);
        out.push_str(&rendered);
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
    out.push_str(section);
    out.push_str(":\n");
    out.push_str(&marker::render_block(PREFIX, name, body, "  "));
    out
}

/// Remove this recipe's block from `section`, leaving everything else —
/// including the section header — untouched.
fn remove_section_block(text: &str, section: &str, name: &str) -> String {
    let Some((start, end, _)) = section_span(text, section) else {
        return text.to_owned();
    };
    let Some(span) = marker::find_block(&text[start..end], PREFIX, name) else {
        return text.to_owned();
    };
    let mut out = String::with_capacity(text.len());
    out.push_str(&text[..start + span.start]);
    out.push_str(&text[start + span.end..]);
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
