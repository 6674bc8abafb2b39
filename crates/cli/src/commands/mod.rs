//! Command implementations.

mod checkpoint;
mod info;
mod run;
mod validate;

pub use checkpoint::run_checkpoint;
pub use info::run_info;
pub use run::run_pipeline;
pub use validate::run_validate;

use std::path::Path;

use anyhow::{Context, Result};
use contracts::StreamBlueprint;

/// Load and validate the configuration file
pub(crate) fn load_blueprint(path: &Path) -> Result<StreamBlueprint> {
    if !path.exists() {
        anyhow::bail!("Configuration file not found: {}", path.display());
    }
    config_loader::ConfigLoader::load_from_path(path)
        .with_context(|| format!("Failed to load config from {}", path.display()))
}
