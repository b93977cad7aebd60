//! Patch generation — structural diff of two rendered file maps.
//!
//! The generator never touches the live project tree. Both file maps are
//! materialized as two sequential snapshots of a disposable repository in a
//! temp directory (snapshot 1 committed, snapshot 2 staged), and the diff
//! engine computes the patch between them. The live tree is consulted only
//! for existence checks: a path that changed between the maps but is gone
//! from the project cannot be merged and is pulled out of the body into
//! [`Patch::removed_patches`] verbatim.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::model::FileMap;
use crate::vcs::{GitTool, VcsError};

use super::Patch;

// ---------------------------------------------------------------------------
// GenerateError
// ---------------------------------------------------------------------------

/// Errors during patch generation.
#[derive(Debug)]
pub enum GenerateError {
    /// Building a snapshot tree failed.
    Io(std::io::Error),
    /// The diff engine failed.
    Vcs(VcsError),
}

impl fmt::Display for GenerateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "snapshot I/O error: {e}"),
            Self::Vcs(e) => write!(f, "diff engine failure: {e}"),
        }
    }
}

impl std::error::Error for GenerateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Vcs(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for GenerateError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<VcsError> for GenerateError {
    fn from(e: VcsError) -> Self {
        Self::Vcs(e)
    }
}

// ---------------------------------------------------------------------------
// PatchGenerator
// ---------------------------------------------------------------------------

/// Turns an (original, new) file-map pair into a [`Patch`].
pub struct PatchGenerator {
    root: PathBuf,
}

impl PatchGenerator {
    /// Create a generator for the project rooted at `root`. The root is used
    /// for live-tree existence checks only; generation never writes there.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Generate the patch between `original` and `new`.
    ///
    /// `None` values are "does not exist" sentinels and are dropped up
    /// front; a path with content in `original` and no entry in `new` is a
    /// deletion. Deletions are carried in [`Patch::deleted_files`] and
    /// removed from the diff body — the applier deletes them directly
    /// instead of merging a delete hunk.
    ///
    /// # Errors
    /// Returns [`GenerateError`] on snapshot I/O or diff engine failure.
    pub fn generate(&self, original: &FileMap, new: &FileMap) -> Result<Patch, GenerateError> {
        // Drop the "does not exist" sentinels from both sides.
        let original: BTreeMap<&Path, &[u8]> = original
            .iter()
            .filter_map(|(p, c)| c.as_deref().map(|c| (p.as_path(), c)))
            .collect();
        let mut new_state: BTreeMap<&Path, Option<&[u8]>> = new
            .iter()
            .filter_map(|(p, c)| c.as_deref().map(|c| (p.as_path(), Some(c))))
            .collect();

        // Model deletions explicitly: original paths missing from the new
        // render become nulls so the diff engine sees a complete pair.
        for path in original.keys() {
            new_state.entry(*path).or_insert(None);
        }

        if new_state.is_empty() {
            return Ok(Patch::default());
        }

        // Orphans must be decided before diffing: modified on both sides but
        // gone from the live tree, so there is no local copy to merge into.
        let mut orphaned: BTreeSet<PathBuf> = BTreeSet::new();
        for (path, contents) in &original {
            if let Some(Some(new_contents)) = new_state.get(path)
                && contents != new_contents
                && !self.root.join(path).exists()
            {
                orphaned.insert(path.to_path_buf());
            }
        }

        // Snapshot 1: the original render, committed.
        let tmp = tempfile::tempdir()?;
        let git = GitTool::new(tmp.path());
        git.init_snapshot_repo()?;
        for (path, contents) in &original {
            write_tree_file(tmp.path(), path, contents)?;
        }
        git.stage_all()?;
        git.commit_snapshot("original")?;

        // Snapshot 2: the new render, staged on top.
        let mut deleted_files: BTreeSet<PathBuf> = BTreeSet::new();
        for (path, contents) in &new_state {
            match contents {
                Some(c) => write_tree_file(tmp.path(), path, c)?,
                None => {
                    std::fs::remove_file(tmp.path().join(path))?;
                    deleted_files.insert(path.to_path_buf());
                }
            }
        }
        git.stage_all()?;
        let raw_body = git.diff_staged()?;

        // Base blobs for every path a three-way merge will need: modified in
        // place and still patchable. Deletions and orphans are never merged,
        // and identical paths produce no hunk to merge.
        let mut blobs = BTreeMap::new();
        for (path, contents) in &original {
            if let Some(Some(new_contents)) = new_state.get(path)
                && contents != new_contents
                && !orphaned.contains(*path)
            {
                let hash = git.hash_object(contents)?;
                blobs.insert(hash, contents.to_vec());
            }
        }

        let (body, removed_patches) = strip_blocks(&raw_body, &orphaned, &deleted_files);

        Ok(Patch {
            body,
            blobs,
            deleted_files,
            removed_patches,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Write one snapshot file, creating parent directories as needed.
fn write_tree_file(root: &Path, rel: &Path, contents: &[u8]) -> std::io::Result<()> {
    let full = root.join(rel);
    if let Some(parent) = full.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(full, contents)
}

/// Split the diff body into per-path blocks; move blocks for `orphaned`
/// paths into the returned map verbatim and drop blocks for `deleted`
/// paths (those are handled by direct removal, not by merging delete
/// hunks). Everything else is kept, byte for byte.
fn strip_blocks(
    body: &str,
    orphaned: &BTreeSet<PathBuf>,
    deleted: &BTreeSet<PathBuf>,
) -> (String, BTreeMap<PathBuf, String>) {
    if orphaned.is_empty() && deleted.is_empty() {
        return (body.to_owned(), BTreeMap::new());
    }

    let mut kept = String::with_capacity(body.len());
    let mut removed: BTreeMap<PathBuf, String> = BTreeMap::new();

    for (path, block) in split_file_blocks(body) {
        match path {
            Some(p) if orphaned.contains(&p) => {
                removed.insert(p, block.to_owned());
            }
            Some(p) if deleted.contains(&p) => {}
            _ => kept.push_str(block),
        }
    }

    (kept, removed)
}

/// Iterate `(path, block)` pairs, where each block spans from a
/// `diff --git a/P b/P` header up to the next header or end of text. Any
/// preamble before the first header is yielded with `None`.
fn split_file_blocks(body: &str) -> Vec<(Option<PathBuf>, &str)> {
    let mut starts: Vec<usize> = Vec::new();
    let mut pos = 0;
    while pos < body.len() {
        let line_end = body[pos..]
            .find('\n')
            .map_or(body.len(), |i| pos + i + 1);
        if body[pos..line_end].starts_with("diff --git a/") {
            starts.push(pos);
        }
        pos = line_end;
    }

    let mut blocks = Vec::new();
    if let Some(&first) = starts.first()
        && first > 0
    {
        blocks.push((None, &body[..first]));
    } else if starts.is_empty() && !body.is_empty() {
        blocks.push((None, body));
    }

    for (i, &start) in starts.iter().enumerate() {
        let end = starts.get(i + 1).copied().unwrap_or(body.len());
        let block = &body[start..end];
        blocks.push((header_path(block), block));
    }
    blocks
}

/// Extract the path from a `diff --git a/<path> b/<path>` header line.
fn header_path(block: &str) -> Option<PathBuf> {
    let header = block.lines().next()?;
    let rest = header.strip_prefix("diff --git a/")?;
    let (path, _) = rest.split_once(" b/")?;
    Some(PathBuf::from(path))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
