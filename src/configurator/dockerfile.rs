//! Dockerfile configurator — `###>` blocks in `Dockerfile`.
//!
//! Projects without a `Dockerfile` simply skip this configurator: a recipe
//! never creates one, it only decorates an existing one.

use std::path::PathBuf;

use serde_json::Value;

use crate::model::{Lock, Recipe};
use crate::update::RecipeUpdate;

use super::{
    Configurator, ConfiguratorError, marker, marker_block_update, parse_lines_config,
    read_project_file, write_project_file,
};

const DOCKERFILE: &str = "Dockerfile";
const PREFIX: &str = "###";

/// Maintains one instruction block per recipe in `Dockerfile`.
pub struct DockerfileConfigurator {
    root: PathBuf,
}

impl DockerfileConfigurator {
    /// Create the configurator for the project rooted at `root`.
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

impl Configurator for DockerfileConfigurator {
    fn configure(
        &self,
        recipe: &Recipe,
        config: &Value,
        _lock: &mut Lock,
    ) -> Result<(), ConfiguratorError> {
        let Some(body) = parse_lines_config(config, "dockerfile")? else {
            return Ok(());
        };
        let Some(live) = read_project_file(&self.root, DOCKERFILE)? else {
            tracing::debug!(package = %recipe.name, "no Dockerfile; skipping");
            return Ok(());
        };
        let updated = marker::set_block(&live, PREFIX, &recipe.name, &body);
        if updated != live {
            write_project_file(&self.root, DOCKERFILE, &updated)?;
        }
        Ok(())
    }

    fn unconfigure(
        &self,
        recipe: &Recipe,
        _config: &Value,
        _lock: &mut Lock,
    ) -> Result<(), ConfiguratorError> {
        let Some(live) = read_project_file(&self.root, DOCKERFILE)? else {
            return Ok(());
        };
        let updated = marker::remove_block(&live, PREFIX, &recipe.name);
        if updated != live {
            write_project_file(&self.root, DOCKERFILE, &updated)?;
        }
        Ok(())
    }

    fn update(
        &self,
        update: &mut RecipeUpdate,
        original: &Value,
        new: &Value,
    ) -> Result<(), ConfiguratorError> {
        let old_body = parse_lines_config(original, "dockerfile")?;
        let new_body = parse_lines_config(new, "dockerfile")?;
        // Nothing to decorate: a project without a Dockerfile never diffs it.
        if read_project_file(update.root(), DOCKERFILE)?.is_none() {
            return Ok(());
        }
        marker_block_update(
            update,
            DOCKERFILE,
            PREFIX,
            old_body.as_deref(),
            new_body.as_deref(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::Path;

    fn recipe() -> Recipe {
        Recipe::from_json(r#"{"name": "acme/worker", "version": "1.0"}"#).unwrap()
    }

    #[test]
    fn configure_skips_without_dockerfile() {
        let dir = tempfile::tempdir().unwrap();
        let mut lock = Lock::empty(dir.path().join("simmer.lock"));
        DockerfileConfigurator::new(dir.path().to_path_buf())
            .configure(&recipe(), &json!(["RUN apt-get install -y acme"]), &mut lock)
            .unwrap();
        assert!(!dir.path().join("Dockerfile").exists());
    }

    #[test]
    fn configure_decorates_existing_dockerfile() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Dockerfile"), "FROM debian:stable\n").unwrap();
        let mut lock = Lock::empty(dir.path().join("simmer.lock"));

        DockerfileConfigurator::new(dir.path().to_path_buf())
            .configure(&recipe(), &json!(["RUN apt-get install -y acme"]), &mut lock)
            .unwrap();

        let text = std::fs::read_to_string(dir.path().join("Dockerfile")).unwrap();
        assert!(text.starts_with("FROM debian:stable\n"));
        assert!(text.contains("###> acme/worker ###\nRUN apt-get install -y acme\n###< acme/worker ###"));
    }

    #[test]
    fn update_skips_without_dockerfile() {
        let dir = tempfile::tempdir().unwrap();
        let mut update = RecipeUpdate::new(
            dir.path().to_path_buf(),
            recipe(),
            recipe(),
            Lock::empty(dir.path().join("simmer.lock")),
        );
        DockerfileConfigurator::new(dir.path().to_path_buf())
            .update(&mut update, &Value::Null, &json!(["RUN true"]))
            .unwrap();
        assert!(update.new_files().is_empty());
    }

    #[test]
    fn update_changes_block_in_place() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("Dockerfile"),
            "FROM debian:stable\n\n###> acme/worker ###\nRUN true\n###< acme/worker ###\n\nCMD [\"app\"]\n",
        )
        .unwrap();
        let mut update = RecipeUpdate::new(
            dir.path().to_path_buf(),
            recipe(),
            recipe(),
            Lock::empty(dir.path().join("simmer.lock")),
        );

        DockerfileConfigurator::new(dir.path().to_path_buf())
            .update(&mut update, &json!(["RUN true"]), &json!(["RUN acme-setup"]))
            .unwrap();

        let new = update.new_files().get(Path::new("Dockerfile")).unwrap().as_ref().unwrap();
        let new = String::from_utf8(new.clone()).unwrap();
        assert!(new.contains("RUN acme-setup"));
        assert!(new.ends_with("CMD [\"app\"]\n"), "text after the block survives");
    }
}
