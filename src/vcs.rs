//! Git plumbing layer.
//!
//! Every `git` invocation in the engine goes through [`GitTool`], a thin
//! runner bound to one working directory. The engine needs five primitives
//! from the toolchain: init/stage/commit (snapshot building), structural
//! diff of staged state, object hashing, object read/write, and three-way
//! patch apply. Any toolchain exposing equivalents could be swapped in here.
//!
//! Paths are always threaded in explicitly — nothing resolves against the
//! process working directory.

use std::fmt;
use std::io::Write as IoWrite;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::model::ObjectHash;

// ---------------------------------------------------------------------------
// VcsError
// ---------------------------------------------------------------------------

/// Errors from git invocations.
#[derive(Debug)]
pub enum VcsError {
    /// A git command exited unsuccessfully.
    Command {
        /// The full command string (for diagnostics).
        command: String,
        /// Captured stderr from git.
        stderr: String,
        /// Process exit code, if available.
        exit_code: Option<i32>,
    },
    /// Spawning git or piping its stdio failed.
    Io(std::io::Error),
    /// Git printed a malformed object hash.
    InvalidHash {
        /// The raw string git printed.
        raw: String,
    },
}

impl fmt::Display for VcsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Command {
                command,
                stderr,
                exit_code,
            } => {
                write!(f, "`{command}` failed")?;
                if let Some(code) = exit_code {
                    write!(f, " (exit {code})")?;
                }
                if !stderr.is_empty() {
                    write!(f, ": {stderr}")?;
                }
                Ok(())
            }
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::InvalidHash { raw } => write!(f, "invalid object hash from git: {raw:?}"),
        }
    }
}

impl std::error::Error for VcsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for VcsError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

// ---------------------------------------------------------------------------
// ApplyOutcome
// ---------------------------------------------------------------------------

/// Result of a three-way patch apply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Every hunk merged without conflict markers.
    Clean,
    /// The patch was applied but at least one hunk produced conflict
    /// markers. Carries git's diagnostic listing the conflicted paths.
    Conflicts(String),
}

// ---------------------------------------------------------------------------
// GitTool
// ---------------------------------------------------------------------------

/// A git runner bound to one working directory.
pub struct GitTool {
    dir: PathBuf,
}

impl GitTool {
    /// Bind a runner to `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The bound working directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Whether a `git` binary is on PATH and answers `--version`.
    #[must_use]
    pub fn available() -> bool {
        Command::new("git")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    /// The toolchain version string, e.g. `"git version 2.43.0"`.
    #[must_use]
    pub fn version() -> Option<String> {
        let out = Command::new("git").arg("--version").output().ok()?;
        if out.status.success() {
            Some(String::from_utf8_lossy(&out.stdout).trim().to_owned())
        } else {
            None
        }
    }

    /// Whether `dir` is the top of a git working tree.
    #[must_use]
    pub fn is_repository(dir: &Path) -> bool {
        dir.join(".git").exists()
    }

    /// Run git with `args`, optionally piping `stdin` in, and return the raw
    /// output regardless of exit status.
    fn output(&self, args: &[&str], stdin: Option<&[u8]>) -> Result<std::process::Output, VcsError> {
        let mut cmd = Command::new("git");
        cmd.args(args).current_dir(&self.dir);

        if let Some(input) = stdin {
            cmd.stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped());
            let mut child = cmd.spawn()?;
            // The child's stdin handle is piped, so it is always present.
            if let Some(mut pipe) = child.stdin.take() {
                pipe.write_all(input)?;
            }
            Ok(child.wait_with_output()?)
        } else {
            Ok(cmd.output()?)
        }
    }

    /// Run git and return stdout on success, a typed error otherwise.
    fn run(&self, args: &[&str]) -> Result<String, VcsError> {
        let out = self.output(args, None)?;
        if out.status.success() {
            Ok(String::from_utf8_lossy(&out.stdout).into_owned())
        } else {
            Err(command_error(args, &out))
        }
    }

    // -- snapshot repository primitives (disposable diff repos) --

    /// Initialize a throwaway repository for snapshot diffing, with a local
    /// identity so commits never depend on user-level configuration.
    pub fn init_snapshot_repo(&self) -> Result<(), VcsError> {
        self.run(&["init"])?;
        self.run(&["config", "user.name", "simmer"])?;
        self.run(&["config", "user.email", "simmer@localhost"])?;
        self.run(&["config", "commit.gpgsign", "false"])?;
        self.run(&["config", "core.autocrlf", "false"])?;
        Ok(())
    }

    /// Stage every change in the working tree, including deletions.
    pub fn stage_all(&self) -> Result<(), VcsError> {
        self.run(&["add", "-A", "."])?;
        Ok(())
    }

    /// Commit the staged state. `--allow-empty` so an empty original
    /// snapshot still produces a base commit to diff against.
    pub fn commit_snapshot(&self, message: &str) -> Result<(), VcsError> {
        self.run(&["commit", "--allow-empty", "-m", message])?;
        Ok(())
    }

    /// Unified diff of the staged state against HEAD.
    ///
    /// The flags pin the output shape regardless of user configuration:
    /// stable `a/`/`b/` prefixes, no external drivers, no rename collapsing
    /// (every path keeps its own block), and full object hashes in `index`
    /// lines so a later three-way apply resolves bases exactly.
    pub fn diff_staged(&self) -> Result<String, VcsError> {
        self.run(&[
            "diff",
            "--cached",
            "--no-color",
            "--no-ext-diff",
            "--no-renames",
            "--full-index",
            "--src-prefix=a/",
            "--dst-prefix=b/",
        ])
    }

    // -- object database primitives --

    /// Hash `contents` as a blob without writing it to the object database.
    pub fn hash_object(&self, contents: &[u8]) -> Result<ObjectHash, VcsError> {
        self.hash_with(&["hash-object", "--stdin"], contents)
    }

    /// Hash `contents` as a blob and write it into the object database.
    pub fn write_blob(&self, contents: &[u8]) -> Result<ObjectHash, VcsError> {
        self.hash_with(&["hash-object", "-w", "--stdin"], contents)
    }

    fn hash_with(&self, args: &[&str], contents: &[u8]) -> Result<ObjectHash, VcsError> {
        let out = self.output(args, Some(contents))?;
        if !out.status.success() {
            return Err(command_error(args, &out));
        }
        let raw = String::from_utf8_lossy(&out.stdout).trim().to_owned();
        ObjectHash::new(&raw).map_err(|_| VcsError::InvalidHash { raw })
    }

    /// Whether the object database contains `hash`.
    #[must_use]
    pub fn has_object(&self, hash: &ObjectHash) -> bool {
        self.output(&["cat-file", "-e", hash.as_str()], None)
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    /// Read a blob's raw bytes from the object database.
    pub fn read_object(&self, hash: &ObjectHash) -> Result<Vec<u8>, VcsError> {
        let args = ["cat-file", "blob", hash.as_str()];
        let out = self.output(&args, None)?;
        if out.status.success() {
            Ok(out.stdout)
        } else {
            Err(command_error(&args, &out))
        }
    }

    /// Absolute path of the repository's git directory.
    pub fn git_dir(&self) -> Result<PathBuf, VcsError> {
        let raw = self.run(&["rev-parse", "--git-dir"])?;
        let path = PathBuf::from(raw.trim());
        if path.is_absolute() {
            Ok(path)
        } else {
            Ok(self.dir.join(path))
        }
    }

    // -- live tree primitives --

    /// Update the index to match the working tree for tracked files, so
    /// uncommitted local edits are visible to a subsequent merge apply. The
    /// merge tool refuses to touch a file whose working copy diverges from
    /// the index ("does not match index") otherwise.
    pub fn refresh_index(&self) -> Result<(), VcsError> {
        self.run(&["add", "--update"])?;
        Ok(())
    }

    /// Apply the patch at `patch_path` with three-way merge semantics.
    ///
    /// Unmergeable hunks are left in the file bracketed by conflict markers
    /// rather than rejected; that outcome is reported as
    /// [`ApplyOutcome::Conflicts`], not an error.
    pub fn apply_three_way(&self, patch_path: &Path) -> Result<ApplyOutcome, VcsError> {
        let path_str = patch_path.display().to_string();
        let args = ["apply", "-3", path_str.as_str()];
        let out = self.output(&args, None)?;
        if out.status.success() {
            return Ok(ApplyOutcome::Clean);
        }
        let stderr = String::from_utf8_lossy(&out.stderr).trim().to_owned();
        if stderr.contains("with conflicts") {
            Ok(ApplyOutcome::Conflicts(stderr))
        } else {
            Err(VcsError::Command {
                command: "git apply -3".to_owned(),
                stderr,
                exit_code: out.status.code(),
            })
        }
    }
}

/// Build a [`VcsError::Command`] from a finished process.
fn command_error(args: &[&str], out: &std::process::Output) -> VcsError {
    VcsError::Command {
        command: format!("git {}", args.join(" ")),
        stderr: String::from_utf8_lossy(&out.stderr).trim().to_owned(),
        exit_code: out.status.code(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
