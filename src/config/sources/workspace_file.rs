//! Workspace config file source: config/config.toml and config/{env}.toml

use config::builder::DefaultState;
use config::ConfigBuilder;
use config::ConfigError;
use config::File;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Selects the environment-specific workspace file.
pub const ENV_NAME_VAR: &str = "AESTHETIC_ENV";

const DEFAULT_ENV_NAME: &str = "development";

/// Existing workspace config files, lowest precedence first.
pub fn workspace_layers(workspace_root: &Path, env_name: &str) -> Vec<PathBuf> {
    let config_dir = workspace_root.join("config");
    [
        config_dir.join("config.toml"),
        config_dir.join(format!("{}.toml", env_name)),
    ]
    .into_iter()
    .filter(|path| path.is_file())
    .collect()
}

/// Add workspace config files to builder; the env-specific file wins over the base file.
pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
    workspace_root: &Path,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let env_name = std::env::var(ENV_NAME_VAR).unwrap_or_else(|_| DEFAULT_ENV_NAME.to_string());

    let layers = workspace_layers(workspace_root, &env_name);
    debug!(env = %env_name, files = layers.len(), "Workspace configuration layers");

    Ok(layers.into_iter().fold(builder, |builder, path| {
        builder.add_source(File::from(path).required(false))
    }))
}
