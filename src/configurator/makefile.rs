//! Makefile configurator — `###>` blocks in `Makefile`.

use std::path::PathBuf;

use serde_json::Value;

use crate::model::{Lock, Recipe};
use crate::update::RecipeUpdate;

use super::{
    Configurator, ConfiguratorError, marker, marker_block_update, parse_lines_config,
    read_project_file, write_project_file,
};

const MAKEFILE: &str = "Makefile";
const PREFIX: &str = "###";

/// Maintains one make-target block per recipe in `Makefile`.
pub struct MakefileConfigurator {
    root: PathBuf,
}

impl MakefileConfigurator {
    /// Create the configurator for the project rooted at `root`.
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

impl Configurator for MakefileConfigurator {
    fn configure(
        &self,
        recipe: &Recipe,
        config: &Value,
        _lock: &mut Lock,
    ) -> Result<(), ConfiguratorError> {
        let Some(body) = parse_lines_config(config, "makefile")? else {
            return Ok(());
        };
        let live = read_project_file(&self.root, MAKEFILE)?.unwrap_or_default();
        let updated = marker::set_block(&live, PREFIX, &recipe.name, &body);
        if updated != live {
            write_project_file(&self.root, MAKEFILE, &updated)?;
        }
        Ok(())
    }

    fn unconfigure(
        &self,
        recipe: &Recipe,
        _config: &Value,
        _lock: &mut Lock,
    ) -> Result<(), ConfiguratorError> {
        let Some(live) = read_project_file(&self.root, MAKEFILE)? else {
            return Ok(());
        };
        let updated = marker::remove_block(&live, PREFIX, &recipe.name);
        if updated != live {
            write_project_file(&self.root, MAKEFILE, &updated)?;
        }
        Ok(())
    }

    fn update(
        &self,
        update: &mut RecipeUpdate,
        original: &Value,
        new: &Value,
    ) -> Result<(), ConfiguratorError> {
        let old_body = parse_lines_config(original, "makefile")?;
        let new_body = parse_lines_config(new, "makefile")?;
        marker_block_update(
            update,
            MAKEFILE,
            PREFIX,
            old_body.as_deref(),
            new_body.as_deref(),
        )
    }
}
