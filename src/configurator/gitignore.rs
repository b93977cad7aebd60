//! Gitignore configurator — `###>` blocks in `.gitignore`.

use std::path::PathBuf;

use serde_json::Value;

use crate::model::{Lock, Recipe};
use crate::update::RecipeUpdate;

use super::{
    Configurator, ConfiguratorError, marker, marker_block_update, parse_lines_config,
    read_project_file, write_project_file,
};

const IGNORE_FILE: &str = ".gitignore";
const PREFIX: &str = "###";

/// Maintains one ignore-pattern block per recipe in `.gitignore`.
pub struct GitignoreConfigurator {
    root: PathBuf,
}

impl GitignoreConfigurator {
    /// Create the configurator for the project rooted at `root`.
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

impl Configurator for GitignoreConfigurator {
    fn configure(
        &self,
        recipe: &Recipe,
        config: &Value,
        _lock: &mut Lock,
    ) -> Result<(), ConfiguratorError> {
        let Some(body) = parse_lines_config(config, "gitignore")? else {
            return Ok(());
        };
        let live = read_project_file(&self.root, IGNORE_FILE)?.unwrap_or_default();
        let updated = marker::set_block(&live, PREFIX, &recipe.name, &body);
        if updated != live {
            write_project_file(&self.root, IGNORE_FILE, &updated)?;
        }
        Ok(())
    }

    fn unconfigure(
        &self,
        recipe: &Recipe,
        _config: &Value,
        _lock: &mut Lock,
    ) -> Result<(), ConfiguratorError> {
        let Some(live) = read_project_file(&self.root, IGNORE_FILE)? else {
            return Ok(());
        };
        let updated = marker::remove_block(&live, PREFIX, &recipe.name);
        if updated != live {
            write_project_file(&self.root, IGNORE_FILE, &updated)?;
        }
        Ok(())
    }

    fn update(
        &self,
        update: &mut RecipeUpdate,
        original: &Value,
        new: &Value,
    ) -> Result<(), ConfiguratorError> {
        let old_body = parse_lines_config(original, "gitignore")?;
        let new_body = parse_lines_config(new, "gitignore")?;
        marker_block_update(
            update,
            IGNORE_FILE,
            PREFIX,
            old_body.as_deref(),
            new_body.as_deref(),
        )
    }
}
