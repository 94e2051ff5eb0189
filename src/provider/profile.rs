//! Provider profile: the `[providers.<id>]` config entry.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderType {
    #[serde(rename = "seedream")]
    Seedream,
    #[serde(rename = "openai_images", alias = "openai")]
    OpenAiImages,
    #[serde(rename = "pollinations")]
    Pollinations,
}

impl ProviderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderType::Seedream => "seedream",
            ProviderType::OpenAiImages => "openai_images",
            ProviderType::Pollinations => "pollinations",
        }
    }

    /// Environment variable consulted for the key when none is configured
    pub fn default_key_env(&self) -> Option<&'static str> {
        match self {
            ProviderType::Seedream => Some("ARK_API_KEY"),
            ProviderType::OpenAiImages => Some("OPENAI_API_KEY"),
            ProviderType::Pollinations => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub provider_type: ProviderType,

    /// Backend default when unset
    #[serde(default)]
    pub model: Option<String>,

    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default)]
    pub api_key: Option<String>,

    /// Environment variable holding the key
    #[serde(default)]
    pub api_key_env: Option<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Turn off multi-image calls for a batch-capable backend
    #[serde(default)]
    pub supports_batch: Option<bool>,
}

fn default_timeout_secs() -> u64 {
    120
}

impl ProviderConfig {
    pub fn new(provider_type: ProviderType) -> Self {
        Self {
            provider_type,
            model: None,
            endpoint: None,
            api_key: None,
            api_key_env: None,
            timeout_secs: default_timeout_secs(),
            supports_batch: None,
        }
    }

    /// Inline key, then `api_key_env`, then the backend's conventional variable.
    pub fn resolve_api_key(&self) -> Option<String> {
        if let Some(key) = self.api_key.as_ref().filter(|k| !k.trim().is_empty()) {
            return Some(key.trim().to_string());
        }
        let env_name = self
            .api_key_env
            .as_deref()
            .or_else(|| self.provider_type.default_key_env())?;
        std::env::var(env_name)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    pub fn validate(&self) -> Result<(), String> {
        if let Some(model) = &self.model {
            if model.trim().is_empty() {
                return Err("Model name cannot be empty".to_string());
            }
        }
        if let Some(endpoint) = &self.endpoint {
            if !crate::config::is_http_url(endpoint) {
                return Err(format!("Endpoint must be an http(s) URL, got '{}'", endpoint));
            }
        }
        if self.timeout_secs == 0 {
            return Err("timeout_secs must be greater than zero".to_string());
        }
        Ok(())
    }
}
