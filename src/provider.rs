//! Image Provider Abstraction
//!
//! Unified interface over image generation backends (Seedream, OpenAI-compatible image
//! endpoints, Pollinations). Each backend turns one `GenerationRequest` into one or more image
//! locators; the registry maps configured provider ids to ready clients.

use crate::config::EngineConfig;
use crate::error::{ApiError, ProviderError};
use crate::types::{GenerationRequest, Metadata, ProviderId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

pub mod clients;
pub mod http;
pub mod profile;

pub use clients::{OpenAiImagesClient, PollinationsClient, SeedreamClient};
pub use profile::{ProviderConfig, ProviderType};

/// What a backend can do in one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCapabilities {
    /// Can return several images for one request
    pub supports_batch: bool,
    /// Upper bound on images per call
    pub max_batch: u32,
}

impl ProviderCapabilities {
    pub fn single() -> Self {
        Self {
            supports_batch: false,
            max_batch: 1,
        }
    }

    pub fn batch(max_batch: u32) -> Self {
        Self {
            supports_batch: max_batch > 1,
            max_batch: max_batch.max(1),
        }
    }
}

/// Locators returned by one provider call, in provider order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderOutput {
    pub locators: Vec<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl ProviderOutput {
    pub fn new(locators: Vec<String>) -> Self {
        Self {
            locators,
            metadata: Metadata::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

/// Image generation backend
#[async_trait]
pub trait ImageProvider: Send + Sync {
    /// Backend kind, e.g. `seedream`
    fn kind(&self) -> &'static str;

    fn model_name(&self) -> &str;

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities::single()
    }

    /// Capabilities for one request. Request params may switch batching off.
    fn capabilities_for(&self, _request: &GenerationRequest) -> ProviderCapabilities {
        self.capabilities()
    }

    /// Generate `variations` images for `request`. Backends without batch support are only
    /// ever called with `variations == 1`.
    async fn generate(
        &self,
        request: &GenerationRequest,
        variations: u32,
    ) -> Result<ProviderOutput, ProviderError>;
}

/// Parse `WIDTHxHEIGHT` (also accepts `×` and `X`).
pub fn parse_size(size: &str) -> Option<(u32, u32)> {
    let normalized = normalize_size(size);
    let (width, height) = normalized.split_once('x')?;
    let width: u32 = width.trim().parse().ok()?;
    let height: u32 = height.trim().parse().ok()?;
    if width == 0 || height == 0 {
        return None;
    }
    Some((width, height))
}

pub fn normalize_size(size: &str) -> String {
    size.trim().replace(['×', 'X'], "x")
}

/// Provider factory for creating provider clients
pub struct ProviderFactory;

impl ProviderFactory {
    pub fn create_client(config: &ProviderConfig) -> Result<Arc<dyn ImageProvider>, ApiError> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let api_key = config.resolve_api_key();
        let client: Arc<dyn ImageProvider> = match config.provider_type {
            ProviderType::Seedream => Arc::new(SeedreamClient::new(
                config.model.clone(),
                config.endpoint.clone(),
                api_key,
                timeout,
                config.supports_batch.unwrap_or(true),
            )?),
            ProviderType::OpenAiImages => Arc::new(OpenAiImagesClient::new(
                config.model.clone(),
                config.endpoint.clone(),
                api_key,
                timeout,
            )?),
            ProviderType::Pollinations => Arc::new(PollinationsClient::new(
                config.model.clone(),
                config.endpoint.clone(),
                timeout,
            )?),
        };
        Ok(client)
    }
}

/// Listing entry for one registered provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    pub id: ProviderId,
    pub kind: String,
    pub model: String,
    pub supports_batch: bool,
    pub max_batch: u32,
}

/// Immutable map of provider id to client, built once per engine.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<ProviderId, Arc<dyn ImageProvider>>,
}

impl ProviderRegistry {
    pub fn builder() -> ProviderRegistryBuilder {
        ProviderRegistryBuilder::default()
    }

    /// One client per `[providers.<id>]` entry.
    pub fn from_config(config: &EngineConfig) -> Result<Self, ApiError> {
        let mut builder = Self::builder();
        for (id, provider_config) in &config.providers {
            provider_config
                .validate()
                .map_err(|e| ApiError::ConfigError(format!("Provider '{}': {}", id, e)))?;
            builder = builder.register(id.clone(), ProviderFactory::create_client(provider_config)?);
        }
        Ok(builder.build())
    }

    pub fn get(&self, provider_id: &str) -> Option<Arc<dyn ImageProvider>> {
        self.providers.get(provider_id).cloned()
    }

    /// Get a provider by id or return `UnknownProvider`
    pub fn get_or_error(&self, provider_id: &str) -> Result<Arc<dyn ImageProvider>, ApiError> {
        self.get(provider_id)
            .ok_or_else(|| ApiError::UnknownProvider(provider_id.to_string()))
    }

    pub fn contains(&self, provider_id: &str) -> bool {
        self.providers.contains_key(provider_id)
    }

    /// Registered ids in sorted order
    pub fn ids(&self) -> Vec<ProviderId> {
        self.providers.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn describe(&self) -> Vec<ProviderDescriptor> {
        self.providers
            .iter()
            .map(|(id, provider)| {
                let capabilities = provider.capabilities();
                ProviderDescriptor {
                    id: id.clone(),
                    kind: provider.kind().to_string(),
                    model: provider.model_name().to_string(),
                    supports_batch: capabilities.supports_batch,
                    max_batch: capabilities.max_batch,
                }
            })
            .collect()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.ids())
            .finish()
    }
}

#[derive(Default)]
pub struct ProviderRegistryBuilder {
    providers: BTreeMap<ProviderId, Arc<dyn ImageProvider>>,
}

impl ProviderRegistryBuilder {
    /// Later registrations under the same id replace earlier ones.
    pub fn register(mut self, id: impl Into<ProviderId>, provider: Arc<dyn ImageProvider>) -> Self {
        self.providers.insert(id.into(), provider);
        self
    }

    pub fn build(self) -> ProviderRegistry {
        ProviderRegistry {
            providers: self.providers,
        }
    }
}
