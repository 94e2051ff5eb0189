//! Config loader: assembles the source layers into an `EngineConfig`.

use super::merge::merge_policy;
use super::sources::{environment, global_file, workspace_file};
use super::EngineConfig;
use crate::error::ApiError;
use config::ConfigError;
use std::path::{Path, PathBuf};

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for a workspace.
    ///
    /// Later layers win: defaults, global file, `config/config.toml`,
    /// `config/{AESTHETIC_ENV}.toml`, then `AESTHETIC__*` environment variables.
    pub fn load(workspace_root: &Path) -> Result<EngineConfig, ConfigError> {
        let builder = merge_policy::builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder)?;
        let builder = workspace_file::add_to_builder(builder, workspace_root)?;
        let builder = environment::add_to_builder(builder);
        builder.build()?.try_deserialize()
    }

    /// Load from one explicit file; environment overrides still apply.
    pub fn load_from_file(path: &Path) -> Result<EngineConfig, ConfigError> {
        let builder = merge_policy::builder_with_defaults()?
            .add_source(config::File::from(path.to_path_buf()).required(true));
        let builder = environment::add_to_builder(builder);
        builder.build()?.try_deserialize()
    }

    /// Load and validate, folding every validation failure into one error.
    pub fn load_validated(
        workspace_root: &Path,
        explicit_file: Option<&Path>,
    ) -> Result<EngineConfig, ApiError> {
        let config = match explicit_file {
            Some(path) => Self::load_from_file(path)?,
            None => Self::load(workspace_root)?,
        };
        config.validate().map_err(|errors| {
            let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            ApiError::ConfigError(format!(
                "Configuration validation failed:\n{}",
                messages.join("\n")
            ))
        })?;
        Ok(config)
    }

    pub fn global_config_path() -> Option<PathBuf> {
        global_file::global_config_path()
    }
}
