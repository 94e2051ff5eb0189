//! Configuration System
//!
//! Layered engine configuration: built-in defaults, the user's global file, workspace files,
//! then `AESTHETIC__SECTION__KEY` environment overrides. Validation reports every problem at
//! once rather than stopping at the first.

use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

pub use crate::provider::{ProviderConfig, ProviderType};

mod facade;
mod merge;
mod sources;

pub use facade::ConfigLoader;

/// Hard ceiling on variations per provider per run.
pub const MAX_VARIATIONS: u32 = 15;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Image provider configurations keyed by provider id
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderConfig>,

    #[serde(default)]
    pub generation: GenerationConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub scoring: ScoringConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Fan-out limits and pacing for candidate generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_max_variations")]
    pub max_variations: u32,

    /// Maximum distinct providers in one request
    #[serde(default = "default_max_providers")]
    pub max_providers: usize,

    /// Random delay before each provider call, lower bound
    #[serde(default = "default_pre_call_delay_min_ms")]
    pub pre_call_delay_min_ms: u64,

    #[serde(default = "default_pre_call_delay_max_ms")]
    pub pre_call_delay_max_ms: u64,

    /// Size used when a request names neither a size nor a ratio
    #[serde(default = "default_size")]
    pub default_size: String,
}

fn default_max_variations() -> u32 {
    MAX_VARIATIONS
}

fn default_max_providers() -> usize {
    4
}

fn default_pre_call_delay_min_ms() -> u64 {
    100
}

fn default_pre_call_delay_max_ms() -> u64 {
    200
}

fn default_size() -> String {
    "2048x2048".to_string()
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_variations: default_max_variations(),
            max_providers: default_max_providers(),
            pre_call_delay_min_ms: default_pre_call_delay_min_ms(),
            pre_call_delay_max_ms: default_pre_call_delay_max_ms(),
            default_size: default_size(),
        }
    }
}

impl GenerationConfig {
    /// Zero pacing; handy for tests and local mocks.
    pub fn without_delay() -> Self {
        Self {
            pre_call_delay_min_ms: 0,
            pre_call_delay_max_ms: 0,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_variations == 0 || self.max_variations > MAX_VARIATIONS {
            return Err(format!(
                "max_variations must be between 1 and {}, got {}",
                MAX_VARIATIONS, self.max_variations
            ));
        }
        if self.max_providers == 0 {
            return Err("max_providers must be at least 1".to_string());
        }
        if self.pre_call_delay_min_ms > self.pre_call_delay_max_ms {
            return Err(format!(
                "pre_call_delay_min_ms ({}) exceeds pre_call_delay_max_ms ({})",
                self.pre_call_delay_min_ms, self.pre_call_delay_max_ms
            ));
        }
        if !is_size_spec(&self.default_size) {
            return Err(format!(
                "default_size must look like WIDTHxHEIGHT, got '{}'",
                self.default_size
            ));
        }
        Ok(())
    }
}

/// Retry schedule shared by provider calls and remote scorers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts including the first call
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base delay before attempt 2, 3, ...; the last entry repeats
    #[serde(default = "default_delays_ms")]
    pub delays_ms: Vec<u64>,

    #[serde(default = "default_max_jitter_ms")]
    pub max_jitter_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_delays_ms() -> Vec<u64> {
    vec![300, 800, 1500]
}

fn default_max_jitter_ms() -> u64 {
    200
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delays_ms: default_delays_ms(),
            max_jitter_ms: default_max_jitter_ms(),
        }
    }
}

impl RetryConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("max_attempts must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Scoring modules and remote evaluators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Modules applied when a request does not name any
    #[serde(default = "default_modules")]
    pub default_modules: Vec<String>,

    /// Remote multi-criteria vision evaluator; disabled when absent
    #[serde(default)]
    pub vision: Option<VisionConfig>,

    /// Remote holistic scorer; when absent only the vision evaluator yields `holistic`
    #[serde(default)]
    pub holistic: Option<HolisticConfig>,
}

pub fn default_modules() -> Vec<String> {
    [
        "holistic",
        "color_score",
        "contrast_score",
        "clarity_eval",
        "noise_eval",
        "quality_score",
    ]
    .iter()
    .map(|name| name.to_string())
    .collect()
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            default_modules: default_modules(),
            vision: None,
            holistic: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisionConfig {
    #[serde(default = "default_vision_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_vision_model")]
    pub model: String,

    /// Inline key; `api_key_env` is consulted when unset
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_vision_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_vision_timeout_secs")]
    pub timeout_secs: u64,

    /// Overrides the built-in evaluation prompt
    #[serde(default)]
    pub system_prompt: Option<String>,

    #[serde(default)]
    pub system_prompt_path: Option<PathBuf>,
}

fn default_vision_endpoint() -> String {
    "https://ark.cn-beijing.volces.com/api/v3/chat/completions".to_string()
}

fn default_vision_model() -> String {
    "doubao-seed-1-6-vision-250815".to_string()
}

fn default_vision_key_env() -> String {
    "ARK_API_KEY".to_string()
}

fn default_vision_timeout_secs() -> u64 {
    60
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            endpoint: default_vision_endpoint(),
            model: default_vision_model(),
            api_key: None,
            api_key_env: default_vision_key_env(),
            timeout_secs: default_vision_timeout_secs(),
            system_prompt: None,
            system_prompt_path: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HolisticConfig {
    pub endpoint: String,

    #[serde(default)]
    pub api_token: Option<String>,

    #[serde(default = "default_holistic_token_env")]
    pub api_token_env: String,

    #[serde(default = "default_holistic_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_holistic_token_env() -> String {
    "HOLISTIC_API_TOKEN".to_string()
}

fn default_holistic_timeout_secs() -> u64 {
    10
}

impl ScoringConfig {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(name) = self.default_modules.iter().find(|m| m.trim().is_empty()) {
            return Err(format!("default_modules contains a blank name: '{}'", name));
        }
        if let Some(vision) = &self.vision {
            if !is_http_url(&vision.endpoint) {
                return Err(format!(
                    "vision endpoint must be an http(s) URL, got '{}'",
                    vision.endpoint
                ));
            }
            if vision.model.trim().is_empty() {
                return Err("vision model cannot be empty".to_string());
            }
        }
        if let Some(holistic) = &self.holistic {
            if !is_http_url(&holistic.endpoint) {
                return Err(format!(
                    "holistic endpoint must be an http(s) URL, got '{}'",
                    holistic.endpoint
                ));
            }
        }
        Ok(())
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    Provider(String, String),
    Generation(String),
    Retry(String),
    Scoring(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Provider(name, msg) => write!(f, "Provider '{}': {}", name, msg),
            ValidationError::Generation(msg) => write!(f, "Generation: {}", msg),
            ValidationError::Retry(msg) => write!(f, "Retry: {}", msg),
            ValidationError::Scoring(msg) => write!(f, "Scoring: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl EngineConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        for (name, provider) in &self.providers {
            if let Err(e) = provider.validate() {
                errors.push(ValidationError::Provider(name.clone(), e));
            }
        }
        if let Err(e) = self.generation.validate() {
            errors.push(ValidationError::Generation(e));
        }
        if let Err(e) = self.retry.validate() {
            errors.push(ValidationError::Retry(e));
        }
        if let Err(e) = self.scoring.validate() {
            errors.push(ValidationError::Scoring(e));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

pub(crate) fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

/// `WIDTHxHEIGHT` with positive integer sides.
pub(crate) fn is_size_spec(value: &str) -> bool {
    crate::provider::parse_size(value).is_some()
}
