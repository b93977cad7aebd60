//! Shared test helpers for simmer integration tests.
//!
//! All tests use temp directories — no side effects on the real project.
//! Each test gets its own git-backed project via `setup_project_repo()`.

use std::path::Path;
use std::process::Command;

use tempfile::TempDir;

/// Create a fresh project directory with an initialized git repository and
/// a local identity, so commits never depend on user-level configuration.
pub fn setup_project_repo() -> TempDir {
    let dir = TempDir::new().expect("failed to create temp dir");
    git(dir.path(), &["init"]);
    git(dir.path(), &["config", "user.name", "Test User"]);
    git(dir.path(), &["config", "user.email", "test@example.com"]);
    git(dir.path(), &["config", "commit.gpgsign", "false"]);
    git(dir.path(), &["config", "core.autocrlf", "false"]);
    dir
}

/// Run a git command in `dir`, panicking on failure (test helper only).
pub fn git(dir: &Path, args: &[&str]) -> String {
    let out = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("git must be installed");
    assert!(
        out.status.success(),
        "git {} failed: {}",
        args.join(" "),
        String::from_utf8_lossy(&out.stderr)
    );
    String::from_utf8_lossy(&out.stdout).trim().to_owned()
}

/// Stage everything and commit.
pub fn commit_all(dir: &Path, message: &str) {
    git(dir, &["add", "-A", "."]);
    git(dir, &["commit", "-m", message]);
}

/// Write `content` to `dir/rel`, creating parent directories as needed.
pub fn write_file(dir: &Path, rel: &str, content: &str) {
    let full = dir.join(rel);
    if let Some(parent) = full.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(full, content).unwrap();
}

/// Read `dir/rel` as UTF-8 text.
pub fn read_file(dir: &Path, rel: &str) -> String {
    std::fs::read_to_string(dir.join(rel))
        .unwrap_or_else(|e| panic!("failed to read {rel}: {e}"))
}
