//! Patch generate/apply integration tests against a real git toolchain.

mod common;

use std::collections::BTreeMap;
use std::path::PathBuf;

use proptest::prelude::*;

use simmer::model::FileMap;
use simmer::patch::{PatchApplier, PatchGenerator, PlainApplier, ThreeWayApplier};

use common::{commit_all, read_file, setup_project_repo, write_file};

fn file_map(entries: &[(&str, &str)]) -> FileMap {
    entries
        .iter()
        .map(|(path, contents)| (PathBuf::from(*path), Some(contents.as_bytes().to_vec())))
        .collect()
}

/// Write every map entry into the live tree and commit.
fn materialize(dir: &std::path::Path, map: &FileMap) {
    for (path, contents) in map {
        if let Some(contents) = contents {
            let full = dir.join(path);
            if let Some(parent) = full.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(full, contents).unwrap();
        }
    }
    commit_all(dir, "initial project state");
}

// ---------------------------------------------------------------------------
// Round trip + idempotence
// ---------------------------------------------------------------------------

#[test]
fn round_trip_reproduces_new_state_exactly() {
    let project = setup_project_repo();
    let original = file_map(&[
        (".env", "APP_ENV=dev\nAPP_SECRET=abc\n"),
        ("config/app.yaml", "debug: true\nlocale: en\n"),
    ]);
    let new = file_map(&[
        (".env", "APP_ENV=dev\nAPP_SECRET=abc\nAPP_DEBUG=1\n"),
        ("config/app.yaml", "debug: false\nlocale: en\n"),
    ]);
    materialize(project.path(), &original);

    let patch = PatchGenerator::new(project.path())
        .generate(&original, &new)
        .unwrap();
    let clean = ThreeWayApplier::new(project.path()).apply_patch(&patch).unwrap();

    assert!(clean, "unmodified tree must apply cleanly");
    assert_eq!(
        read_file(project.path(), ".env"),
        "APP_ENV=dev\nAPP_SECRET=abc\nAPP_DEBUG=1\n"
    );
    assert_eq!(
        read_file(project.path(), "config/app.yaml"),
        "debug: false\nlocale: en\n"
    );
}

#[test]
fn plain_applier_round_trips_the_same_patch() {
    let project = setup_project_repo();
    let original = file_map(&[("notes.md", "alpha\nbeta\ngamma\n")]);
    let new = file_map(&[("notes.md", "alpha\nBETA\ngamma\n"), ("extra.md", "fresh\n")]);
    materialize(project.path(), &original);

    let patch = PatchGenerator::new(project.path())
        .generate(&original, &new)
        .unwrap();
    let clean = PlainApplier::new(project.path()).apply_patch(&patch).unwrap();

    assert!(clean);
    assert_eq!(read_file(project.path(), "notes.md"), "alpha\nBETA\ngamma\n");
    assert_eq!(read_file(project.path(), "extra.md"), "fresh\n");
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 8, ..ProptestConfig::default() })]

    // Generating a patch from two identical maps is a complete no-op, for
    // any map.
    #[test]
    fn generating_from_identical_maps_is_empty(
        files in proptest::collection::btree_map("[a-z]{1,8}", "[ -~]{0,40}", 0..4usize)
    ) {
        let live = tempfile::tempdir().unwrap();
        let map: FileMap = files
            .into_iter()
            .map(|(path, contents)| {
                (PathBuf::from(format!("{path}.txt")), Some(format!("{contents}\n").into_bytes()))
            })
            .collect();

        let patch = PatchGenerator::new(live.path()).generate(&map, &map).unwrap();
        prop_assert!(patch.body.is_empty());
        prop_assert!(patch.blobs.is_empty());
        prop_assert!(patch.deleted_files.is_empty());
        prop_assert!(patch.removed_patches.is_empty());
    }
}

// ---------------------------------------------------------------------------
// Deletion tracking
// ---------------------------------------------------------------------------

#[test]
fn deleted_path_is_tracked_and_removed_from_disk() {
    let project = setup_project_repo();
    let original = file_map(&[
        ("config/security.yaml", "security:\n    firewalls: ~\n"),
        ("config/app.yaml", "app: {}\n"),
    ]);
    let new = file_map(&[("config/app.yaml", "app: {}\n")]);
    materialize(project.path(), &original);

    let patch = PatchGenerator::new(project.path())
        .generate(&original, &new)
        .unwrap();
    assert!(patch.deleted_files.contains(&PathBuf::from("config/security.yaml")));

    let clean = ThreeWayApplier::new(project.path()).apply_patch(&patch).unwrap();
    assert!(clean);
    assert!(!project.path().join("config/security.yaml").exists());
    assert!(project.path().join("config/app.yaml").exists());
}

// ---------------------------------------------------------------------------
// Orphan isolation
// ---------------------------------------------------------------------------

#[test]
fn orphaned_change_is_reported_not_applied() {
    let project = setup_project_repo();
    // The live tree never had routes.yaml — the user deleted it, or it was
    // never installed.
    let original = file_map(&[
        ("config/routes.yaml", "routes:\n    app: /\n"),
        ("readme.md", "hello\n"),
    ]);
    let new = file_map(&[
        ("config/routes.yaml", "routes:\n    app: /home\n"),
        ("readme.md", "hello\n"),
    ]);
    materialize(project.path(), &file_map(&[("readme.md", "hello\n")]));

    let patch = PatchGenerator::new(project.path())
        .generate(&original, &new)
        .unwrap();

    let fragment = patch
        .removed_patches
        .get(&PathBuf::from("config/routes.yaml"))
        .expect("orphaned fragment must be reported");
    assert!(fragment.starts_with("diff --git a/config/routes.yaml b/config/routes.yaml"));
    assert!(!patch.body.contains("routes.yaml"));

    let clean = ThreeWayApplier::new(project.path()).apply_patch(&patch).unwrap();
    assert!(clean, "an orphaned change never blocks the rest");
    assert!(
        !project.path().join("config/routes.yaml").exists(),
        "the orphaned change must not be silently applied"
    );
}

// ---------------------------------------------------------------------------
// Conflict detection
// ---------------------------------------------------------------------------

#[test]
fn incompatible_local_edit_produces_conflict_markers() {
    let project = setup_project_repo();
    let original = file_map(&[("package.json", "{\n  \"left-pad\": \"^2.0.0\"\n}\n")]);
    let new = file_map(&[("package.json", "{\n  \"left-pad\": \"^3.0.0\"\n}\n")]);
    materialize(project.path(), &original);

    // The user bumped the same line on their own, uncommitted.
    write_file(project.path(), "package.json", "{\n  \"left-pad\": \"^2.1.0\"\n}\n");

    let patch = PatchGenerator::new(project.path())
        .generate(&original, &new)
        .unwrap();
    let clean = ThreeWayApplier::new(project.path()).apply_patch(&patch).unwrap();

    assert!(!clean, "divergent edits to the same region must conflict");
    let merged = read_file(project.path(), "package.json");
    assert!(merged.contains("<<<<<<< ours"), "merged: {merged}");
    assert!(merged.contains("======="));
    assert!(merged.contains(">>>>>>> theirs"));
    assert!(merged.contains("^2.1.0"), "ours side present");
    assert!(merged.contains("^3.0.0"), "theirs side present");
}

#[test]
fn compatible_local_edit_merges_cleanly() {
    let project = setup_project_repo();
    let original = file_map(&[(
        ".env",
        "APP_ENV=dev\n\n# SQLite is the simplest DB engine\nDATABASE_URL=sqlite:///data.db\n",
    )]);
    let new = file_map(&[(
        ".env",
        "APP_ENV=dev\n\n# SQL-HEAVY is the beefiest DB engine\nDATABASE_URL=sqlite:///data.db\n",
    )]);
    materialize(project.path(), &original);

    // User edit in a different region of the same file.
    write_file(
        project.path(),
        ".env",
        "APP_ENV=staging\n\n# SQLite is the simplest DB engine\nDATABASE_URL=sqlite:///data.db\n",
    );

    let patch = PatchGenerator::new(project.path())
        .generate(&original, &new)
        .unwrap();
    let clean = ThreeWayApplier::new(project.path()).apply_patch(&patch).unwrap();

    assert!(clean, "non-overlapping edits must merge");
    let merged = read_file(project.path(), ".env");
    assert!(merged.contains("APP_ENV=staging"), "user's edit kept: {merged}");
    assert!(merged.contains("SQL-HEAVY"), "recipe's edit applied: {merged}");
}

// ---------------------------------------------------------------------------
// Creation
// ---------------------------------------------------------------------------

#[test]
fn new_file_has_no_blobs_and_exact_content() {
    let project = setup_project_repo();
    materialize(project.path(), &file_map(&[("readme.md", "hi\n")]));

    let original = FileMap::new();
    let contents = "webpack_encore:\n    output_path: '%kernel.project_dir%/public/build'\n";
    let new = file_map(&[("config/packages/webpack_encore.yaml", contents)]);

    let patch = PatchGenerator::new(project.path())
        .generate(&original, &new)
        .unwrap();
    assert!(patch.blobs.is_empty(), "nothing existed before, nothing to merge against");

    let clean = ThreeWayApplier::new(project.path()).apply_patch(&patch).unwrap();
    assert!(clean);
    assert_eq!(
        read_file(project.path(), "config/packages/webpack_encore.yaml"),
        contents
    );
}

// ---------------------------------------------------------------------------
// Transient blob cleanup
// ---------------------------------------------------------------------------

#[test]
fn apply_cleans_up_materialized_blobs() {
    let project = setup_project_repo();
    // The committed live content already diverges from the recipe's
    // original render, so the base blob is NOT in the project's history and
    // must be materialized transiently for the merge.
    materialize(
        project.path(),
        &file_map(&[("a.txt", "one\nextra user line\n")]),
    );
    let original = file_map(&[("a.txt", "one\n")]);
    let new = file_map(&[("a.txt", "two\n")]);

    let patch = PatchGenerator::new(project.path())
        .generate(&original, &new)
        .unwrap();
    assert_eq!(patch.blobs.len(), 1);
    let hash = patch.blobs.keys().next().unwrap().clone();

    let clean = ThreeWayApplier::new(project.path()).apply_patch(&patch).unwrap();
    assert!(clean, "line-1 change and user's line-2 addition must merge");
    assert_eq!(read_file(project.path(), "a.txt"), "two\nextra user line\n");

    // The base blob was written for the merge and released afterwards.
    let loose = project
        .path()
        .join(".git/objects")
        .join(&hash.as_str()[..2])
        .join(&hash.as_str()[2..]);
    assert!(!loose.exists(), "transient blob must be cleaned up");
}

// ---------------------------------------------------------------------------
// BTreeMap input sanity
// ---------------------------------------------------------------------------

#[test]
fn maps_with_none_entries_behave_like_absent_paths() {
    let project = setup_project_repo();
    materialize(project.path(), &file_map(&[("keep.txt", "keep\n")]));

    let mut original: FileMap = BTreeMap::new();
    original.insert(PathBuf::from("keep.txt"), Some(b"keep\n".to_vec()));
    original.insert(PathBuf::from("phantom.txt"), None);
    let mut new: FileMap = BTreeMap::new();
    new.insert(PathBuf::from("keep.txt"), Some(b"keep\n".to_vec()));
    new.insert(PathBuf::from("phantom.txt"), None);

    let patch = PatchGenerator::new(project.path())
        .generate(&original, &new)
        .unwrap();
    assert!(patch.is_empty(), "null sentinels are not deletions of real files");
}
