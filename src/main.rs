use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

use simmer::config::{ApplierKind, SimmerConfig};
use simmer::model::{Lock, LockEntry, Recipe};
use simmer::patch::{PatchApplier, PlainApplier, ThreeWayApplier};
use simmer::update::UpdateOrchestrator;
use simmer::vcs::GitTool;

/// Recipe engine for package managers
///
/// simmer applies and reverts recipes — declarative, versioned sets of
/// file edits — when dependencies change, and re-applies updated recipe
/// versions as three-way merges against your locally modified files.
///
/// Conflicts are left in-place with standard conflict markers; resolve
/// them with your usual tooling (`git diff`, `git add -p`,
/// `git checkout -p`).
#[derive(Parser)]
#[command(name = "simmer")]
#[command(version, about)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply a recipe version change as a three-way merge
    Update {
        /// Project root directory
        #[arg(long, default_value = ".")]
        root: PathBuf,

        /// Path to the currently installed recipe (JSON)
        #[arg(long)]
        from: PathBuf,

        /// Path to the new recipe version (JSON)
        #[arg(long)]
        to: PathBuf,
    },

    /// Check that the merge toolchain is available
    ///
    /// Verifies that git is installed and whether the project is a
    /// repository, and reports which patch applier would be used.
    Doctor {
        /// Project root directory
        #[arg(long, default_value = ".")]
        root: PathBuf,
    },
}

fn main() -> Result<()> {
    simmer::telemetry::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Update { root, from, to } => run_update(&root, &from, &to),
        Commands::Doctor { root } => run_doctor(&root),
    }
}

fn run_update(root: &PathBuf, from: &PathBuf, to: &PathBuf) -> Result<()> {
    let config = SimmerConfig::load(&SimmerConfig::path_for(root))?;
    let original = Recipe::from_path(from).context("loading installed recipe")?;
    let new = Recipe::from_path(to).context("loading new recipe")?;
    if original.name != new.name {
        bail!(
            "recipe names differ: '{}' vs '{}' — update is per package",
            original.name,
            new.name
        );
    }

    let lock_path = root.join("simmer.lock");
    let mut lock = Lock::load(&lock_path)?;

    let kind = config.update.applier.resolve(root);
    let applier: Box<dyn PatchApplier> = match kind {
        ApplierKind::Plain => Box::new(PlainApplier::new(root)),
        _ => Box::new(ThreeWayApplier::new(root)),
    };

    let outcome = UpdateOrchestrator::new(root)
        .update_package(&original, &new, &lock, applier.as_ref())
        .with_context(|| format!("updating recipe for '{}'", new.name))?;

    for path in outcome.patch.removed_patches.keys() {
        println!(
            "  skipped: '{}' no longer exists in the project; the recipe change for it was not applied",
            path.display()
        );
    }
    for path in &outcome.patch.deleted_files {
        println!("  removed: {}", path.display());
    }

    if outcome.clean {
        println!(
            "Recipe for '{}' updated: {} -> {}",
            new.name, original.version, new.version
        );
    } else {
        println!(
            "Recipe for '{}' updated with CONFLICTS: {} -> {}",
            new.name, original.version, new.version
        );
        println!("  Files contain <<<<<<< / >>>>>>> markers.");
        println!("  Review with `git diff`, then resolve and stage with `git add -p`.");
    }

    // Refresh the lock entry: previous files minus deletions, plus the new
    // render's owned paths.
    let previous = lock.get(&new.name).cloned().unwrap_or_default();
    let mut files: Vec<String> = previous
        .files
        .into_iter()
        .filter(|f| !outcome.patch.deleted_files.contains(&PathBuf::from(f)))
        .collect();
    for path in &outcome.owned_files {
        let path = path.display().to_string();
        if !files.contains(&path) {
            files.push(path);
        }
    }
    files.sort();
    lock.add(
        &new.name,
        LockEntry {
            version: new.version.clone(),
            files,
        },
    );
    lock.write()?;

    Ok(())
}

fn run_doctor(root: &PathBuf) -> Result<()> {
    let config = SimmerConfig::load(&SimmerConfig::path_for(root))?;

    match GitTool::version() {
        Some(version) => println!("ok: {version}"),
        None => println!("missing: git not found on PATH"),
    }
    if GitTool::is_repository(root) {
        println!("ok: '{}' is a git repository", root.display());
    } else {
        println!("note: '{}' is not a git repository", root.display());
    }

    let configured = config.update.applier;
    let resolved = configured.resolve(root);
    println!("applier: {configured} (resolves to: {resolved})");

    if configured == ApplierKind::ThreeWay && !GitTool::available() {
        bail!("applier is pinned to 'three-way' but git is not available");
    }
    Ok(())
}
