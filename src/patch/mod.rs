//! Patch model and the generate/apply machinery.
//!
//! A [`Patch`] is the structural diff between two rendered recipe states,
//! packaged with everything a three-way apply needs: base blobs for every
//! path that existed originally, the set of deleted paths, and any per-path
//! fragments that had to be pulled out because their target no longer exists
//! in the live project.

pub mod apply;
pub mod generate;

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use crate::model::ObjectHash;

pub use apply::{ApplyError, PatchApplier, PlainApplier, ThreeWayApplier};
pub use generate::{GenerateError, PatchGenerator};

// ---------------------------------------------------------------------------
// Patch
// ---------------------------------------------------------------------------

/// The result of diffing an original against a new [`crate::model::FileMap`].
///
/// All collections are ordered so that equal inputs always produce equal
/// patches.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Patch {
    /// Unified diff body covering every path that remains patchable, in
    /// per-path blocks (`diff --git a/P b/P` … next header).
    pub body: String,

    /// Base blobs: content hash → original bytes, one entry per path that
    /// existed with content in the original map. These are what a
    /// three-way merge resolves `index <hash>..` headers against.
    pub blobs: BTreeMap<ObjectHash, Vec<u8>>,

    /// Paths present in the original map and absent from the new one. The
    /// applier removes them from the live tree after the merge step.
    pub deleted_files: BTreeSet<PathBuf>,

    /// Per-path diff fragments stripped out of [`Patch::body`] because the
    /// target path does not exist in the live project — there is nothing to
    /// merge against. Reported so callers can warn instead of silently
    /// dropping the change. Each fragment is byte-identical to the block the
    /// full diff would have contained.
    pub removed_patches: BTreeMap<PathBuf, String>,
}

impl Patch {
    /// Whether applying this patch would be a complete no-op.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
            && self.blobs.is_empty()
            && self.deleted_files.is_empty()
            && self.removed_patches.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
