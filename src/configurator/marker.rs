//! Delimited marker blocks: `###> name ###` … `###< name ###`.
//!
//! Every marker-based configurator (env, gitignore, makefile, dockerfile,
//! compose) splices the same block shape into its target file; this module
//! is the single implementation. Content outside the markers is preserved
//! byte for byte. The comment prefix is a parameter (`"###"` everywhere
//! today).

// ---------------------------------------------------------------------------
// Markers
// ---------------------------------------------------------------------------

/// The opening marker line for a named block.
#[must_use]
pub fn begin_marker(prefix: &str, name: &str) -> String {
    format!("{prefix}> {name} {prefix}")
}

/// The closing marker line for a named block.
#[must_use]
pub fn end_marker(prefix: &str, name: &str) -> String {
    format!("{prefix}< {name} {prefix}")
}

// ---------------------------------------------------------------------------
// BlockSpan
// ---------------------------------------------------------------------------

/// Byte span of a found block, marker lines included.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockSpan {
    /// Offset of the opening marker line's first byte.
    pub start: usize,
    /// Offset one past the closing marker line (past its newline when
    /// present).
    pub end: usize,
    /// Leading whitespace of the opening marker line. Blocks nested inside
    /// an indented section keep this indent on every line.
    pub indent: String,
}

/// Locate the block named `name`, tolerating leading indentation on the
/// marker lines. Returns `None` when either marker is missing.
#[must_use]
pub fn find_block(text: &str, prefix: &str, name: &str) -> Option<BlockSpan> {
    let begin = begin_marker(prefix, name);
    let end = end_marker(prefix, name);

    let mut start = None;
    let mut indent = String::new();
    let mut pos = 0;
    for line in text.split_inclusive('\n') {
        let line_start = pos;
        pos += line.len();
        let trimmed_line = line.trim_end_matches(['\n', '\r']);
        let stripped = trimmed_line.trim_start();
        if start.is_none() && stripped == begin {
            start = Some(line_start);
            indent = trimmed_line[..trimmed_line.len() - stripped.len()].to_owned();
        } else if start.is_some() && stripped == end {
            return Some(BlockSpan {
                start: start?,
                end: pos,
                indent,
            });
        }
    }
    None
}

/// The raw text between the markers of block `name` (indent preserved),
/// or `None` when the block is absent.
#[must_use]
pub fn block_body<'a>(text: &'a str, prefix: &str, name: &str) -> Option<&'a str> {
    let span = find_block(text, prefix, name)?;
    let inner = &text[span.start..span.end];
    // Skip the opening marker line; the closing marker is the final line.
    let body_start = inner.find('\n')? + 1;
    let without_trailing_nl = inner.strip_suffix('\n').unwrap_or(inner);
    let close_start = without_trailing_nl.rfind('\n').map_or(0, |i| i + 1);
    if body_start >= close_start {
        return Some("");
    }
    Some(&inner[body_start..close_start])
}

/// Render a full block (markers included) with every line indented by
/// `indent`. `body` lines are taken as-is; a trailing newline on the result
/// is always present.
#[must_use]
pub fn render_block(prefix: &str, name: &str, body: &str, indent: &str) -> String {
    let mut out = String::new();
    out.push_str(indent);
    out.push_str(&begin_marker(prefix, name));
    out.push('\n');
    for line in body.lines() {
        if line.is_empty() {
            out.push('\n');
        } else {
            out.push_str(indent);
            out.push_str(line);
            out.push('\n');
        }
    }
    out.push_str(indent);
    out.push_str(&end_marker(prefix, name));
    out.push('\n');
    out
}

/// Replace the body of block `name` in place, or append the block at the end
/// of `text` (separated by one blank line) when absent. Everything outside
/// the block is untouched.
#[must_use]
pub fn set_block(text: &str, prefix: &str, name: &str, body: &str) -> String {
    if let Some(span) = find_block(text, prefix, name) {
        let rendered = render_block(prefix, name, body, &span.indent);
        let mut out = String::with_capacity(text.len());
        out.push_str(&text[..span.start]);
        out.push_str(&rendered);
        out.push_str(&text[span.end..]);
        return out;
    }

    let rendered = render_block(prefix, name, body, "");
    if text.is_empty() {
        return rendered;
    }
    let mut out = text.to_owned();
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out.push('\n');
    out.push_str(&rendered);
    out
}

/// Remove block `name` entirely, including the blank separator line that
/// [`set_block`] inserts before appended blocks. Absent block → unchanged.
#[must_use]
pub fn remove_block(text: &str, prefix: &str, name: &str) -> String {
    let Some(span) = find_block(text, prefix, name) else {
        return text.to_owned();
    };
    let mut head = text[..span.start].to_owned();
    if head.ends_with("\n\n") {
        head.pop();
    }
    head.push_str(&text[span.end..]);
    head
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
