//! Patch application against the live project tree.
//!
//! Two implementations stand behind the same [`PatchApplier`] contract:
//!
//! - [`ThreeWayApplier`] — the default. Materializes the patch's base blobs
//!   into the project's object store and applies the body with `git apply
//!   -3`, so hunks that no longer match are merged against base/ours/theirs
//!   and irreconcilable ones are left in-place bracketed by standard
//!   conflict markers. A conflicted apply is a normal `Ok(false)`, not an
//!   error.
//! - [`PlainApplier`] — for environments without the merge tool. A classic
//!   context-matching patch algorithm: no conflict markers, and any hunk
//!   mismatch fails the whole operation before a single file is written.
//!
//! Both variants remove [`Patch::deleted_files`] after the apply step, and
//! both release every transient resource (temp patch file, blobs written for
//! this call) on success, conflict, and failure paths alike.

use std::collections::BTreeSet;
use std::fmt;
use std::io::Write as IoWrite;
use std::path::{Path, PathBuf};

use crate::blob::{BlobError, BlobStore};
use crate::model::ObjectHash;
use crate::vcs::{ApplyOutcome, GitTool, VcsError};

use super::Patch;

// ---------------------------------------------------------------------------
// PatchApplier
// ---------------------------------------------------------------------------

/// The common apply contract.
pub trait PatchApplier {
    /// Apply `patch` to the live tree.
    ///
    /// Returns `Ok(true)` when the patch applied cleanly, `Ok(false)` when
    /// it applied with textual conflicts that the user must resolve.
    ///
    /// # Errors
    /// Returns [`ApplyError`] on any unexpected failure; conflicts are not
    /// errors.
    fn apply_patch(&self, patch: &Patch) -> Result<bool, ApplyError>;
}

// ---------------------------------------------------------------------------
// ApplyError
// ---------------------------------------------------------------------------

/// Errors during patch application.
#[derive(Debug)]
pub enum ApplyError {
    /// Blob store failure while materializing merge bases.
    Blob(BlobError),
    /// The merge tool failed in an unrecognized way. Carries the tool's
    /// diagnostic output verbatim.
    Vcs(VcsError),
    /// Filesystem failure while writing results or removing deleted files.
    Io(std::io::Error),
    /// The patch body could not be parsed.
    Malformed {
        /// What the parser choked on.
        detail: String,
    },
    /// A hunk found no matching context in the live file (plain applier
    /// only — the three-way applier turns this situation into conflict
    /// markers instead).
    HunkMismatch {
        /// File the hunk targets.
        path: PathBuf,
        /// 1-based hunk number within that file's block.
        hunk: usize,
    },
}

impl fmt::Display for ApplyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Blob(e) => write!(f, "blob store failure during apply: {e}"),
            Self::Vcs(e) => write!(f, "merge tool failure: {e}"),
            Self::Io(e) => write!(f, "I/O error during apply: {e}"),
            Self::Malformed { detail } => write!(f, "malformed patch: {detail}"),
            Self::HunkMismatch { path, hunk } => {
                write!(
                    f,
                    "hunk #{hunk} does not apply to '{}' (no matching context)",
                    path.display()
                )
            }
        }
    }
}

impl std::error::Error for ApplyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Blob(e) => Some(e),
            Self::Vcs(e) => Some(e),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<BlobError> for ApplyError {
    fn from(e: BlobError) -> Self {
        Self::Blob(e)
    }
}

impl From<VcsError> for ApplyError {
    fn from(e: VcsError) -> Self {
        Self::Vcs(e)
    }
}

impl From<std::io::Error> for ApplyError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

// ---------------------------------------------------------------------------
// ThreeWayApplier
// ---------------------------------------------------------------------------

/// Applies patches with `git apply -3` against the project's object store.
pub struct ThreeWayApplier {
    root: PathBuf,
}

impl ThreeWayApplier {
    /// Create an applier for the project rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Blob materialization + merge apply, separated out so the caller can
    /// run blob cleanup across every exit path.
    fn merge_step(
        &self,
        git: &GitTool,
        store: &BlobStore,
        patch: &Patch,
        materialized: &mut Vec<ObjectHash>,
    ) -> Result<ApplyOutcome, ApplyError> {
        // Bases must all exist before the merge tool runs, or it cannot
        // locate them mid-apply.
        for (hash, contents) in &patch.blobs {
            if store.ensure_blob(hash, contents)? {
                materialized.push(hash.clone());
            }
        }

        // The temp patch file is dropped (and so deleted) when this function
        // returns, whatever the outcome.
        let mut patch_file = tempfile::NamedTempFile::new()?;
        patch_file.write_all(patch.body.as_bytes())?;
        patch_file.flush()?;

        // Make uncommitted local edits visible to the merge.
        git.refresh_index()?;

        Ok(git.apply_three_way(patch_file.path())?)
    }
}

impl PatchApplier for ThreeWayApplier {
    fn apply_patch(&self, patch: &Patch) -> Result<bool, ApplyError> {
        if patch.body.is_empty() {
            remove_deleted_files(&self.root, &patch.deleted_files)?;
            return Ok(true);
        }

        let git = GitTool::new(&self.root);
        let store = BlobStore::new(&self.root);
        let mut materialized = Vec::new();

        let outcome = self.merge_step(&git, &store, patch, &mut materialized);
        store.cleanup_blobs(&materialized);

        let clean = match outcome? {
            ApplyOutcome::Clean => true,
            ApplyOutcome::Conflicts(details) => {
                tracing::debug!(%details, "patch applied with conflicts");
                false
            }
        };

        remove_deleted_files(&self.root, &patch.deleted_files)?;
        Ok(clean)
    }
}

// ---------------------------------------------------------------------------
// PlainApplier
// ---------------------------------------------------------------------------

/// Applies patches without a merge tool: strict context matching, all
/// results computed in memory first, nothing written unless every hunk of
/// every file applies.
pub struct PlainApplier {
    root: PathBuf,
}

impl PlainApplier {
    /// Create an applier for the project rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl PatchApplier for PlainApplier {
    fn apply_patch(&self, patch: &Patch) -> Result<bool, ApplyError> {
        let file_patches = parse_unified(&patch.body)?;

        // Phase 1: compute every file's new content. Any mismatch aborts
        // before anything touches the tree.
        let mut planned: Vec<(PathBuf, Option<String>)> = Vec::new();
        for fp in &file_patches {
            match (&fp.old_path, &fp.new_path) {
                (None, Some(path)) => {
                    planned.push((path.clone(), Some(build_created_file(fp))));
                }
                (Some(path), None) => {
                    planned.push((path.clone(), None));
                }
                (Some(old), Some(new)) => {
                    let full = self.root.join(old);
                    let current = std::fs::read_to_string(&full)?;
                    let patched = apply_file_patch(old, &current, fp)?;
                    planned.push((new.clone(), Some(patched)));
                }
                (None, None) => {
                    return Err(ApplyError::Malformed {
                        detail: "file block with neither old nor new path".to_owned(),
                    });
                }
            }
        }

        // Phase 2: write.
        for (path, contents) in planned {
            let full = self.root.join(&path);
            match contents {
                Some(text) => {
                    if let Some(parent) = full.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::write(&full, text)?;
                }
                None => match std::fs::remove_file(&full) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                },
            }
        }

        remove_deleted_files(&self.root, &patch.deleted_files)?;
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Remove every deleted path still present. Already-absent paths are fine.
fn remove_deleted_files(root: &Path, files: &BTreeSet<PathBuf>) -> Result<(), ApplyError> {
    for rel in files {
        let full = root.join(rel);
        match std::fs::remove_file(&full) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Unified diff parsing (plain applier)
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq, Eq)]
struct FilePatch {
    /// `None` for created files (`--- /dev/null`).
    old_path: Option<PathBuf>,
    /// `None` for deleted files (`+++ /dev/null`).
    new_path: Option<PathBuf>,
    hunks: Vec<Hunk>,
}

#[derive(Debug, PartialEq, Eq)]
struct Hunk {
    old_start: usize,
    lines: Vec<HunkLine>,
}

#[derive(Debug, PartialEq, Eq)]
struct HunkLine {
    kind: LineKind,
    text: String,
    /// Set when the line was followed by `\ No newline at end of file`.
    no_newline: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LineKind {
    Context,
    Add,
    Remove,
}

fn parse_unified(body: &str) -> Result<Vec<FilePatch>, ApplyError> {
    let mut patches: Vec<FilePatch> = Vec::new();
    let mut in_hunk = false;

    for line in body.lines() {
        if line.starts_with("diff --git ") {
            patches.push(FilePatch {
                old_path: None,
                new_path: None,
                hunks: Vec::new(),
            });
            in_hunk = false;
        } else if let Some(rest) = line.strip_prefix("--- ") {
            let fp = patches.last_mut().ok_or_else(|| malformed(line))?;
            fp.old_path = parse_file_line(rest, "a/");
            in_hunk = false;
        } else if let Some(rest) = line.strip_prefix("+++ ") {
            let fp = patches.last_mut().ok_or_else(|| malformed(line))?;
            fp.new_path = parse_file_line(rest, "b/");
            in_hunk = false;
        } else if line.starts_with("@@ -") {
            let (old_start, _old_len) = parse_hunk_header(line).ok_or_else(|| malformed(line))?;
            let fp = patches.last_mut().ok_or_else(|| malformed(line))?;
            fp.hunks.push(Hunk {
                old_start,
                lines: Vec::new(),
            });
            in_hunk = true;
        } else if in_hunk && line == "\\ No newline at end of file" {
            let fp = patches.last_mut().ok_or_else(|| malformed(line))?;
            if let Some(hunk) = fp.hunks.last_mut()
                && let Some(last) = hunk.lines.last_mut()
            {
                last.no_newline = true;
            }
        } else if in_hunk {
            let kind = match line.chars().next() {
                Some(' ') | None => LineKind::Context,
                Some('+') => LineKind::Add,
                Some('-') => LineKind::Remove,
                _ => {
                    // Metadata between blocks ends the hunk.
                    in_hunk = false;
                    continue;
                }
            };
            let fp = patches.last_mut().ok_or_else(|| malformed(line))?;
            if let Some(hunk) = fp.hunks.last_mut() {
                let text = if line.is_empty() {
                    String::new()
                } else {
                    line[1..].to_owned()
                };
                hunk.lines.push(HunkLine {
                    kind,
                    text,
                    no_newline: false,
                });
            }
        }
        // index / mode / similarity lines between headers: ignored.
    }

    Ok(patches)
}

fn malformed(line: &str) -> ApplyError {
    ApplyError::Malformed {
        detail: format!("unexpected line: {line:?}"),
    }
}

/// Parse a `--- a/path` / `+++ b/path` operand; `/dev/null` maps to `None`.
fn parse_file_line(rest: &str, prefix: &str) -> Option<PathBuf> {
    let rest = rest.trim_end();
    if rest == "/dev/null" {
        return None;
    }
    let path = rest.strip_prefix(prefix).unwrap_or(rest);
    Some(PathBuf::from(path))
}

/// Parse `@@ -start[,len] +start[,len] @@ …` into the old-side range.
fn parse_hunk_header(line: &str) -> Option<(usize, usize)> {
    let rest = line.strip_prefix("@@ -")?;
    let (old_part, rest) = rest.split_once(" +")?;
    rest.split_once(" @@")?;
    parse_range(old_part)
}

fn parse_range(s: &str) -> Option<(usize, usize)> {
    if let Some((start, len)) = s.split_once(',') {
        Some((start.parse().ok()?, len.parse().ok()?))
    } else {
        Some((s.parse().ok()?, 1))
    }
}

// ---------------------------------------------------------------------------
// Plain hunk application
// ---------------------------------------------------------------------------

/// Content of a created file: the `+` lines of its hunks.
fn build_created_file(fp: &FilePatch) -> String {
    let mut out = String::new();
    let mut no_trailing_newline = false;
    for hunk in &fp.hunks {
        for line in &hunk.lines {
            if line.kind == LineKind::Add {
                out.push_str(&line.text);
                out.push('\n');
                no_trailing_newline = line.no_newline;
            }
        }
    }
    if no_trailing_newline && out.ends_with('\n') {
        out.pop();
    }
    out
}

/// Apply every hunk of `fp` to `current`, strictly: a hunk whose old lines
/// match nowhere fails the file.
fn apply_file_patch(path: &Path, current: &str, fp: &FilePatch) -> Result<String, ApplyError> {
    let (mut lines, mut trailing_newline) = split_lines(current);
    let mut offset: isize = 0;

    for (i, hunk) in fp.hunks.iter().enumerate() {
        let old: Vec<&str> = hunk
            .lines
            .iter()
            .filter(|l| l.kind != LineKind::Add)
            .map(|l| l.text.as_str())
            .collect();
        let new: Vec<&HunkLine> = hunk
            .lines
            .iter()
            .filter(|l| l.kind != LineKind::Remove)
            .collect();

        let pos = if old.is_empty() {
            // Pure insertion: old_start is the line the insertion follows.
            let want = saturating_add_offset(hunk.old_start, offset);
            Some(want.min(lines.len()))
        } else {
            // The header position is a hint; search outward from it.
            let want = saturating_add_offset(hunk.old_start.saturating_sub(1), offset);
            find_match(&lines, &old, want)
        };

        let Some(pos) = pos else {
            return Err(ApplyError::HunkMismatch {
                path: path.to_path_buf(),
                hunk: i + 1,
            });
        };

        let replacement: Vec<String> = new.iter().map(|l| l.text.clone()).collect();
        let removed = old.len();
        lines.splice(pos..pos + removed, replacement);

        // A no-newline marker on the final new-side line controls the
        // file's trailing newline when the hunk reaches end of file.
        if pos + new.len() == lines.len() {
            if let Some(last) = new.last() {
                trailing_newline = !last.no_newline;
            }
        }

        offset += new.len() as isize - removed as isize;
    }

    Ok(join_lines(&lines, trailing_newline))
}

fn saturating_add_offset(base: usize, offset: isize) -> usize {
    if offset >= 0 {
        base.saturating_add(offset.unsigned_abs())
    } else {
        base.saturating_sub(offset.unsigned_abs())
    }
}

/// Find where `old` matches inside `lines`, preferring positions near
/// `want`.
fn find_match(lines: &[String], old: &[&str], want: usize) -> Option<usize> {
    let max = lines.len().checked_sub(old.len())?;
    let mut distance = 0;
    loop {
        let forward = want.checked_add(distance).filter(|p| *p <= max);
        let backward = want.checked_sub(distance);

        if let Some(pos) = forward
            && matches_at(lines, old, pos)
        {
            return Some(pos);
        }
        if distance > 0
            && let Some(pos) = backward
            && pos <= max
            && matches_at(lines, old, pos)
        {
            return Some(pos);
        }

        if forward.is_none() && backward.is_none() {
            return None;
        }
        distance += 1;
    }
}

fn matches_at(lines: &[String], old: &[&str], pos: usize) -> bool {
    old.iter()
        .enumerate()
        .all(|(i, expected)| lines.get(pos + i).map(String::as_str) == Some(*expected))
}

/// Split into lines plus a trailing-newline flag, so the exact byte shape
/// can be reconstructed.
fn split_lines(content: &str) -> (Vec<String>, bool) {
    if content.is_empty() {
        return (Vec::new(), true);
    }
    let trailing = content.ends_with('\n');
    let trimmed = if trailing {
        &content[..content.len() - 1]
    } else {
        content
    };
    (trimmed.split('\n').map(str::to_owned).collect(), trailing)
}

fn join_lines(lines: &[String], trailing_newline: bool) -> String {
    let mut out = lines.join("\n");
    if trailing_newline && !lines.is_empty() {
        out.push('\n');
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const MODIFY: &str = "\
diff --git a/notes.txt b/notes.txt
index 1111111111111111111111111111111111111111..2222222222222222222222222222222222222222 100644
--- a/notes.txt
+++ b/notes.txt
@@ -1,3 +1,3 @@
 first
-second
+changed
 third
";

    #[test]
    fn parse_modify_block() {
        let patches = parse_unified(MODIFY).unwrap();
        assert_eq!(patches.len(), 1);
        let fp = &patches[0];
        assert_eq!(fp.old_path.as_deref(), Some(Path::new("notes.txt")));
        assert_eq!(fp.new_path.as_deref(), Some(Path::new("notes.txt")));
        assert_eq!(fp.hunks.len(), 1);
        assert_eq!(fp.hunks[0].old_start, 1);
        assert_eq!(fp.hunks[0].lines.len(), 4);
    }

    #[test]
    fn parse_dev_null_paths() {
        let body = "\
diff --git a/new.txt b/new.txt
new file mode 100644
--- /dev/null
+++ b/new.txt
@@ -0,0 +1,2 @@
+alpha
+beta
";
        let patches = parse_unified(body).unwrap();
        assert_eq!(patches[0].old_path, None);
        assert_eq!(patches[0].new_path.as_deref(), Some(Path::new("new.txt")));
    }

    #[test]
    fn apply_modify_in_place() {
        let fp = &parse_unified(MODIFY).unwrap()[0];
        let result = apply_file_patch(Path::new("notes.txt"), "first\nsecond\nthird\n", fp).unwrap();
        assert_eq!(result, "first\nchanged\nthird\n");
    }

    #[test]
    fn apply_finds_drifted_context() {
        // The live file gained two lines above the hunk's position hint.
        let fp = &parse_unified(MODIFY).unwrap()[0];
        let live = "zero a\nzero b\nfirst\nsecond\nthird\n";
        let result = apply_file_patch(Path::new("notes.txt"), live, fp).unwrap();
        assert_eq!(result, "zero a\nzero b\nfirst\nchanged\nthird\n");
    }

    #[test]
    fn apply_mismatch_is_error() {
        let fp = &parse_unified(MODIFY).unwrap()[0];
        let err = apply_file_patch(Path::new("notes.txt"), "entirely\nunrelated\n", fp).unwrap_err();
        assert!(
            matches!(err, ApplyError::HunkMismatch { hunk: 1, .. }),
            "got {err}"
        );
    }

    #[test]
    fn build_created_file_joins_added_lines() {
        let body = "\
diff --git a/new.txt b/new.txt
--- /dev/null
+++ b/new.txt
@@ -0,0 +1,2 @@
+alpha
+beta
";
        let fp = &parse_unified(body).unwrap()[0];
        assert_eq!(build_created_file(fp), "alpha\nbeta\n");
    }

    #[test]
    fn build_created_file_honors_no_newline_marker() {
        let body = "\
diff --git a/new.txt b/new.txt
--- /dev/null
+++ b/new.txt
@@ -0,0 +1 @@
+only line
\\ No newline at end of file
";
        let fp = &parse_unified(body).unwrap()[0];
        assert_eq!(build_created_file(fp), "only line");
    }

    #[test]
    fn split_join_round_trips() {
        for content in ["", "a\n", "a\nb\n", "a\nb"] {
            let (lines, trailing) = split_lines(content);
            assert_eq!(join_lines(&lines, trailing), content);
        }
    }

    #[test]
    fn plain_applier_is_atomic_on_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("good.txt"), "first\nsecond\nthird\n").unwrap();
        std::fs::write(dir.path().join("bad.txt"), "not\nwhat\nwe expect\n").unwrap();

        let body = format!(
            "{MODIFY}\
diff --git a/bad.txt b/bad.txt
--- a/bad.txt
+++ b/bad.txt
@@ -1,2 +1,2 @@
 original
-line
+edit
"
        )
        .replace("a/notes.txt b/notes.txt", "a/good.txt b/good.txt")
        .replace("--- a/notes.txt", "--- a/good.txt")
        .replace("+++ b/notes.txt", "+++ b/good.txt");

        let patch = Patch {
            body,
            ..Patch::default()
        };
        let err = PlainApplier::new(dir.path()).apply_patch(&patch).unwrap_err();
        assert!(matches!(err, ApplyError::HunkMismatch { .. }), "got {err}");

        // good.txt must be untouched even though its hunk would have applied.
        assert_eq!(
            std::fs::read_to_string(dir.path().join("good.txt")).unwrap(),
            "first\nsecond\nthird\n"
        );
    }

    #[test]
    fn plain_applier_full_flow() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "first\nsecond\nthird\n").unwrap();
        std::fs::write(dir.path().join("stale.cfg"), "obsolete\n").unwrap();

        let mut patch = Patch {
            body: MODIFY.to_owned(),
            ..Patch::default()
        };
        patch.deleted_files.insert(PathBuf::from("stale.cfg"));

        let clean = PlainApplier::new(dir.path()).apply_patch(&patch).unwrap();
        assert!(clean);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("notes.txt")).unwrap(),
            "first\nchanged\nthird\n"
        );
        assert!(!dir.path().join("stale.cfg").exists());
    }

    #[test]
    fn empty_body_removes_deleted_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("leftover.txt"), "x\n").unwrap();

        let mut patch = Patch::default();
        patch.deleted_files.insert(PathBuf::from("leftover.txt"));
        patch.deleted_files.insert(PathBuf::from("never-existed.txt"));

        // Works without any merge tool: the three-way applier short-circuits
        // on an empty body.
        let clean = ThreeWayApplier::new(dir.path()).apply_patch(&patch).unwrap();
        assert!(clean);
        assert!(!dir.path().join("leftover.txt").exists());
    }
}
