//! Workspace configuration loading into a runnable pipeline.

use aesthetic_engine::config::{ConfigLoader, ProviderType};
use aesthetic_engine::error::ApiError;
use aesthetic_engine::pipeline::Pipeline;
use std::path::Path;
use std::sync::Mutex;
use tempfile::TempDir;

// Serializes tests that read or write process-wide environment variables
static ENV_MUTEX: Mutex<()> = Mutex::new(());

fn write_config(root: &Path, body: &str) {
    let dir = root.join("config");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("config.toml"), body).unwrap();
}

const WORKSPACE_CONFIG: &str = r#"
[providers.seedream]
provider_type = "seedream"
api_key_env = "AESTHETIC_IT_SEEDREAM_KEY"
timeout_secs = 90

[providers.flux]
provider_type = "pollinations"
model = "flux"

[generation]
max_variations = 6
pre_call_delay_min_ms = 0
pre_call_delay_max_ms = 0

[retry]
max_attempts = 2
delays_ms = [10, 20]

[scoring]
default_modules = ["holistic", "color_score"]
"#;

#[test]
fn workspace_file_builds_a_pipeline() {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let workspace = TempDir::new().unwrap();
    write_config(workspace.path(), WORKSPACE_CONFIG);

    let config = ConfigLoader::load_validated(workspace.path(), None).unwrap();
    assert_eq!(config.providers.len(), 2);
    assert_eq!(config.providers["seedream"].provider_type, ProviderType::Seedream);
    assert_eq!(config.providers["seedream"].timeout_secs, 90);
    assert_eq!(config.generation.max_variations, 6);
    assert_eq!(config.retry.delays_ms, vec![10, 20]);
    // Unset keys keep their defaults
    assert_eq!(config.generation.default_size, "2048x2048");

    let pipeline = Pipeline::from_config(&config).unwrap();
    assert_eq!(pipeline.registry().ids(), vec!["flux", "seedream"]);
    assert_eq!(pipeline.aggregator().module_names().len(), 6);
    assert!(!pipeline.aggregator().has_vision());
}

#[test]
fn environment_overrides_workspace_file() {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let workspace = TempDir::new().unwrap();
    write_config(workspace.path(), WORKSPACE_CONFIG);

    std::env::set_var("AESTHETIC__GENERATION__MAX_PROVIDERS", "2");
    let config = ConfigLoader::load_validated(workspace.path(), None);
    std::env::remove_var("AESTHETIC__GENERATION__MAX_PROVIDERS");

    assert_eq!(config.unwrap().generation.max_providers, 2);
}

#[test]
fn invalid_provider_entry_is_a_config_error() {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let workspace = TempDir::new().unwrap();
    write_config(
        workspace.path(),
        "[providers.broken]\nprovider_type = \"openai_images\"\nendpoint = \"ftp://images\"\n",
    );

    let err = ConfigLoader::load_validated(workspace.path(), None).unwrap_err();
    match err {
        ApiError::ConfigError(message) => {
            assert!(message.contains("Provider 'broken'"), "{message}");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn unknown_provider_type_fails_to_load() {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let workspace = TempDir::new().unwrap();
    write_config(
        workspace.path(),
        "[providers.mystery]\nprovider_type = \"midjourney\"\n",
    );

    assert!(ConfigLoader::load_validated(workspace.path(), None).is_err());
}
