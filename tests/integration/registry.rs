//! Provider registry built from configuration entries.

use aesthetic_engine::config::{EngineConfig, ProviderConfig, ProviderType};
use aesthetic_engine::error::{ApiError, ProviderError};
use aesthetic_engine::provider::{ProviderFactory, ProviderRegistry};
use aesthetic_engine::types::{GenerationRequest, TaskKind};

fn keyless(provider_type: ProviderType) -> ProviderConfig {
    let mut config = ProviderConfig::new(provider_type);
    config.api_key_env = Some("AESTHETIC_IT_NEVER_SET".to_string());
    config
}

fn engine_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config
        .providers
        .insert("seedream".to_string(), keyless(ProviderType::Seedream));
    config
        .providers
        .insert("dalle".to_string(), keyless(ProviderType::OpenAiImages));
    let mut flux = ProviderConfig::new(ProviderType::Pollinations);
    flux.model = Some("turbo".to_string());
    config.providers.insert("flux".to_string(), flux);
    config
}

#[test]
fn registry_describes_every_backend_in_id_order() {
    let registry = ProviderRegistry::from_config(&engine_config()).unwrap();

    assert_eq!(registry.ids(), vec!["dalle", "flux", "seedream"]);
    let descriptors = registry.describe();
    let kinds: Vec<&str> = descriptors.iter().map(|d| d.kind.as_str()).collect();
    assert_eq!(kinds, vec!["openai_images", "pollinations", "seedream"]);
    assert_eq!(descriptors[1].model, "turbo");
    assert!(descriptors[2].supports_batch);
    assert_eq!(descriptors[2].max_batch, 15);
    assert!(!descriptors[0].supports_batch);
}

#[test]
fn batch_can_be_disabled_per_entry() {
    let mut config = keyless(ProviderType::Seedream);
    config.supports_batch = Some(false);
    let client = ProviderFactory::create_client(&config).unwrap();
    assert!(!client.capabilities().supports_batch);
}

#[test]
fn lookups_of_unknown_ids_fail() {
    let registry = ProviderRegistry::from_config(&engine_config()).unwrap();
    assert!(registry.contains("flux"));
    assert!(registry.get("midjourney").is_none());
    match registry.get_or_error("midjourney") {
        Err(ApiError::UnknownProvider(id)) => assert_eq!(id, "midjourney"),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("unknown provider resolved"),
    }
}

#[test]
fn invalid_entry_rejects_the_whole_registry() {
    let mut config = engine_config();
    let mut broken = ProviderConfig::new(ProviderType::OpenAiImages);
    broken.timeout_secs = 0;
    config.providers.insert("broken".to_string(), broken);

    let err = ProviderRegistry::from_config(&config).unwrap_err();
    assert!(err.to_string().contains("broken"));
}

#[tokio::test]
async fn missing_credentials_surface_at_call_time() {
    let registry = ProviderRegistry::from_config(&engine_config()).unwrap();
    let request = GenerationRequest::new(TaskKind::TextToImage, "a lighthouse", "1024x1024");

    for id in ["seedream", "dalle"] {
        let provider = registry.get(id).unwrap();
        let err = provider.generate(&request, 1).await.unwrap_err();
        assert!(
            matches!(err, ProviderError::MissingCredentials(_)),
            "{id}: {err}"
        );
    }
}
