//! End-to-end recipe update scenarios: orchestrator → generator → applier.

mod common;

use std::path::PathBuf;

use simmer::install::Installer;
use simmer::model::{Lock, Recipe};
use simmer::patch::ThreeWayApplier;
use simmer::update::UpdateOrchestrator;

use common::{commit_all, read_file, setup_project_repo, write_file};

fn lock_for(root: &std::path::Path) -> Lock {
    Lock::empty(root.join("simmer.lock"))
}

// ---------------------------------------------------------------------------
// Scenario: clean text update
// ---------------------------------------------------------------------------

#[test]
fn env_comment_change_merges_over_user_edit() {
    let project = setup_project_repo();
    let root = project.path();

    let old_recipe = Recipe::from_json(
        r##"{
        "name": "acme/db",
        "version": "1.0",
        "manifest": {"env": {
            "APP_ENV": "dev",
            "#1": "SQLite is the default engine",
            "DATABASE_URL": "sqlite:///var/data.db"
        }}
    }"##,
    )
    .unwrap();
    let new_recipe = Recipe::from_json(
        r##"{
        "name": "acme/db",
        "version": "1.1",
        "manifest": {"env": {
            "APP_ENV": "dev",
            "#1": "SQL-HEAVY is the default engine",
            "DATABASE_URL": "sqlite:///var/data.db"
        }}
    }"##,
    )
    .unwrap();

    let mut lock = lock_for(root);
    Installer::new(root).install(&old_recipe, &mut lock).unwrap();
    commit_all(root, "install acme/db 1.0");

    // The user changed APP_ENV but left the DATABASE_URL block lines alone.
    let env = read_file(root, ".env").replace("APP_ENV=dev", "APP_ENV=staging");
    write_file(root, ".env", &env);

    let outcome = UpdateOrchestrator::new(root)
        .update_package(&old_recipe, &new_recipe, &lock, &ThreeWayApplier::new(root))
        .unwrap();

    assert!(outcome.clean, "non-overlapping edits must merge cleanly");
    let merged = read_file(root, ".env");
    assert!(merged.contains("APP_ENV=staging"), "user's value kept: {merged}");
    assert!(merged.contains("SQL-HEAVY is the default engine"), "new comment adopted");
    assert!(!merged.contains("SQLite is the default engine"));
}

// ---------------------------------------------------------------------------
// Scenario: conflicting JSON dependency bump
// ---------------------------------------------------------------------------

#[test]
fn conflicting_dependency_bump_leaves_markers() {
    let project = setup_project_repo();
    let root = project.path();

    let old_recipe = Recipe::from_json(
        r#"{
        "name": "acme/frontend",
        "version": "1.0",
        "manifest": {"copy": {"package.json": "package.json"}},
        "files": {"package.json": {"contents": "{\n  \"left-pad\": \"^2.0.0\"\n}\n"}}
    }"#,
    )
    .unwrap();
    let new_recipe = Recipe::from_json(
        r#"{
        "name": "acme/frontend",
        "version": "2.0",
        "manifest": {"copy": {"package.json": "package.json"}},
        "files": {"package.json": {"contents": "{\n  \"left-pad\": \"^3.0.0\"\n}\n"}}
    }"#,
    )
    .unwrap();

    let mut lock = lock_for(root);
    Installer::new(root).install(&old_recipe, &mut lock).unwrap();
    commit_all(root, "install acme/frontend 1.0");

    // The user independently bumped the same dependency.
    write_file(root, "package.json", "{\n  \"left-pad\": \"^2.1.0\"\n}\n");

    let outcome = UpdateOrchestrator::new(root)
        .update_package(&old_recipe, &new_recipe, &lock, &ThreeWayApplier::new(root))
        .unwrap();

    assert!(!outcome.clean, "same-region edits must conflict");
    let merged = read_file(root, "package.json");
    let ours = merged.find("<<<<<<< ours").expect("ours marker");
    let sep = merged.find("=======").expect("separator");
    let theirs = merged.find(">>>>>>> theirs").expect("theirs marker");
    assert!(ours < sep && sep < theirs);
    assert!(merged[ours..sep].contains("^2.1.0"), "ours is the user's bump");
    assert!(merged[sep..theirs].contains("^3.0.0"), "theirs is the recipe's bump");
}

// ---------------------------------------------------------------------------
// Scenario: new file addition
// ---------------------------------------------------------------------------

#[test]
fn added_recipe_file_is_created_exactly() {
    let project = setup_project_repo();
    let root = project.path();
    write_file(root, "readme.md", "app\n");
    commit_all(root, "init");

    let old_recipe = Recipe::from_json(
        r#"{
        "name": "acme/encore",
        "version": "1.0",
        "manifest": {"copy": {"config/": "config/packages/"}}
    }"#,
    )
    .unwrap();
    let new_recipe = Recipe::from_json(
        r#"{
        "name": "acme/encore",
        "version": "1.1",
        "manifest": {"copy": {"config/": "config/packages/"}},
        "files": {"config/webpack_encore.yaml": {"contents": "webpack_encore:\n    output_path: public/build\n"}}
    }"#,
    )
    .unwrap();

    let lock = lock_for(root);
    let outcome = UpdateOrchestrator::new(root)
        .update_package(&old_recipe, &new_recipe, &lock, &ThreeWayApplier::new(root))
        .unwrap();

    assert!(outcome.clean);
    assert!(
        outcome.patch.blobs.is_empty(),
        "a brand-new file has nothing to base a merge on"
    );
    assert_eq!(
        read_file(root, "config/packages/webpack_encore.yaml"),
        "webpack_encore:\n    output_path: public/build\n"
    );
}

// ---------------------------------------------------------------------------
// Scenario: removed file with live copy present
// ---------------------------------------------------------------------------

#[test]
fn removed_recipe_file_is_deleted_without_patch_body() {
    let project = setup_project_repo();
    let root = project.path();

    let old_recipe = Recipe::from_json(
        r#"{
        "name": "acme/security",
        "version": "1.0",
        "manifest": {"copy": {"config/": "config/"}},
        "files": {"config/security.yaml": {"contents": "security:\n    firewalls: ~\n"}}
    }"#,
    )
    .unwrap();
    let new_recipe = Recipe::from_json(
        r#"{
        "name": "acme/security",
        "version": "2.0",
        "manifest": {"copy": {"config/": "config/"}}
    }"#,
    )
    .unwrap();

    let mut lock = lock_for(root);
    Installer::new(root).install(&old_recipe, &mut lock).unwrap();
    commit_all(root, "install acme/security 1.0");
    assert!(root.join("config/security.yaml").exists());

    let outcome = UpdateOrchestrator::new(root)
        .update_package(&old_recipe, &new_recipe, &lock, &ThreeWayApplier::new(root))
        .unwrap();

    assert!(outcome.clean);
    assert_eq!(outcome.patch.body, "", "pure deletion needs no diff body");
    assert!(
        outcome
            .patch
            .deleted_files
            .contains(&PathBuf::from("config/security.yaml"))
    );
    assert!(!root.join("config/security.yaml").exists());
}

// ---------------------------------------------------------------------------
// Identical recipes
// ---------------------------------------------------------------------------

#[test]
fn identical_recipe_versions_are_a_no_op() {
    let project = setup_project_repo();
    let root = project.path();

    let recipe = Recipe::from_json(
        r#"{
        "name": "acme/db",
        "version": "1.0",
        "manifest": {
            "env": {"DB_HOST": "localhost"},
            "gitignore": ["/var/db/"]
        }
    }"#,
    )
    .unwrap();

    let mut lock = lock_for(root);
    Installer::new(root).install(&recipe, &mut lock).unwrap();
    commit_all(root, "install");

    let outcome = UpdateOrchestrator::new(root)
        .update_package(&recipe, &recipe, &lock, &ThreeWayApplier::new(root))
        .unwrap();

    assert!(outcome.clean);
    assert!(outcome.patch.is_empty(), "identical recipes produce no patch at all");
}

// ---------------------------------------------------------------------------
// Several configurators combined into one patch
// ---------------------------------------------------------------------------

#[test]
fn multi_configurator_update_lands_in_one_apply() {
    let project = setup_project_repo();
    let root = project.path();

    let old_recipe = Recipe::from_json(
        r#"{
        "name": "acme/suite",
        "version": "1.0",
        "manifest": {
            "env": {"SUITE_MODE": "basic"},
            "gitignore": ["/var/suite/"],
            "copy": {"config/": "config/"}
        },
        "files": {"config/suite.yaml": {"contents": "suite:\n    level: 1\n"}}
    }"#,
    )
    .unwrap();
    let new_recipe = Recipe::from_json(
        r#"{
        "name": "acme/suite",
        "version": "2.0",
        "manifest": {
            "env": {"SUITE_MODE": "advanced"},
            "gitignore": ["/var/suite/", "/var/suite-cache/"],
            "copy": {"config/": "config/"}
        },
        "files": {"config/suite.yaml": {"contents": "suite:\n    level: 2\n"}}
    }"#,
    )
    .unwrap();

    let mut lock = lock_for(root);
    Installer::new(root).install(&old_recipe, &mut lock).unwrap();
    commit_all(root, "install acme/suite 1.0");

    let outcome = UpdateOrchestrator::new(root)
        .update_package(&old_recipe, &new_recipe, &lock, &ThreeWayApplier::new(root))
        .unwrap();

    assert!(outcome.clean);
    assert!(read_file(root, ".env").contains("SUITE_MODE=advanced"));
    assert!(read_file(root, ".gitignore").contains("/var/suite-cache/"));
    assert!(read_file(root, "config/suite.yaml").contains("level: 2"));
    assert!(
        outcome.owned_files.contains(&PathBuf::from("config/suite.yaml")),
        "owned files reported for lock refresh"
    );
}

// ---------------------------------------------------------------------------
// Orphan reporting at the orchestration level
// ---------------------------------------------------------------------------

#[test]
fn update_reports_user_deleted_file_as_orphan() {
    let project = setup_project_repo();
    let root = project.path();

    let old_recipe = Recipe::from_json(
        r#"{
        "name": "acme/routes",
        "version": "1.0",
        "manifest": {"copy": {"config/": "config/"}},
        "files": {"config/routes.yaml": {"contents": "routes:\n    app: /\n"}}
    }"#,
    )
    .unwrap();
    let new_recipe = Recipe::from_json(
        r#"{
        "name": "acme/routes",
        "version": "1.1",
        "manifest": {"copy": {"config/": "config/"}},
        "files": {"config/routes.yaml": {"contents": "routes:\n    app: /home\n"}}
    }"#,
    )
    .unwrap();

    let mut lock = lock_for(root);
    Installer::new(root).install(&old_recipe, &mut lock).unwrap();
    commit_all(root, "install");

    // The user deleted the recipe-owned file entirely.
    std::fs::remove_file(root.join("config/routes.yaml")).unwrap();

    let outcome = UpdateOrchestrator::new(root)
        .update_package(&old_recipe, &new_recipe, &lock, &ThreeWayApplier::new(root))
        .unwrap();

    assert!(outcome.clean, "an orphan never fails the update");
    let fragment = outcome
        .patch
        .removed_patches
        .get(&PathBuf::from("config/routes.yaml"))
        .expect("orphaned change must be reported");
    assert!(fragment.contains("+    app: /home"));
    assert!(
        !root.join("config/routes.yaml").exists(),
        "the change must not resurrect the file"
    );
}
