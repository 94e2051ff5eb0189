use crate::config::GenerationConfig;
use crate::error::ApiError;
use crate::provider::{normalize_size, parse_size, ProviderRegistry};
use crate::types::{GenerationRequest, Metadata, ModuleName, ProviderId, TaskKind, HOLISTIC_MODULE};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Size used for an unknown or absent ratio.
pub const DEFAULT_RATIO_SIZE: &str = "2048x2048";

/// Concrete pixel size for an aspect ratio label.
pub fn ratio_to_size(ratio: &str) -> &'static str {
    match ratio.trim() {
        "1:1" => "2048x2048",
        "3:4" => "1728x2304",
        "4:3" => "2304x1728",
        "9:16" => "1440x2560",
        "16:9" => "2560x1440",
        _ => DEFAULT_RATIO_SIZE,
    }
}

fn default_variations() -> u32 {
    1
}

/// One pipeline run as submitted by a caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRequest {
    #[serde(default)]
    pub task: TaskKind,

    pub prompt: String,

    pub providers: Vec<ProviderId>,

    /// Candidates requested from each provider
    #[serde(default = "default_variations")]
    pub variations: u32,

    /// Explicit `WIDTHxHEIGHT`; wins over `ratio`
    #[serde(default)]
    pub size: Option<String>,

    #[serde(default)]
    pub ratio: Option<String>,

    /// `None` applies the configured defaults; an empty list skips scoring
    #[serde(default)]
    pub modules: Option<Vec<ModuleName>>,

    #[serde(default)]
    pub reference_images: Vec<String>,

    #[serde(default)]
    pub params: Metadata,

    #[serde(default)]
    pub correlation_id: Option<String>,

    /// Treat each provider's candidates as one set: holistic scoring only, results ranked
    /// best first
    #[serde(default)]
    pub group_mode: bool,

    /// Check every candidate against the reference images
    #[serde(default)]
    pub verify_consistency: bool,
}

impl PipelineRequest {
    pub fn text_to_image(prompt: impl Into<String>, providers: Vec<ProviderId>) -> Self {
        Self {
            task: TaskKind::TextToImage,
            prompt: prompt.into(),
            providers,
            variations: default_variations(),
            size: None,
            ratio: None,
            modules: None,
            reference_images: Vec::new(),
            params: Metadata::new(),
            correlation_id: None,
            group_mode: false,
            verify_consistency: false,
        }
    }

    pub fn image_to_image(
        prompt: impl Into<String>,
        providers: Vec<ProviderId>,
        reference_images: Vec<String>,
    ) -> Self {
        Self {
            task: TaskKind::ImageToImage,
            reference_images,
            ..Self::text_to_image(prompt, providers)
        }
    }

    pub fn with_variations(mut self, variations: u32) -> Self {
        self.variations = variations;
        self
    }

    pub fn with_modules(mut self, modules: Vec<ModuleName>) -> Self {
        self.modules = Some(modules);
        self
    }

    pub fn with_size(mut self, size: impl Into<String>) -> Self {
        self.size = Some(size.into());
        self
    }

    pub fn with_ratio(mut self, ratio: impl Into<String>) -> Self {
        self.ratio = Some(ratio.into());
        self
    }

    pub fn with_params(mut self, params: Metadata) -> Self {
        self.params = params;
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn with_group_mode(mut self) -> Self {
        self.group_mode = true;
        self
    }

    pub fn with_consistency_check(mut self) -> Self {
        self.verify_consistency = true;
        self
    }

    /// Modules to score with: holistic alone in group mode, else the request's list or
    /// `defaults`.
    pub fn resolve_modules(&self, defaults: &[ModuleName]) -> Vec<ModuleName> {
        if self.group_mode {
            return vec![HOLISTIC_MODULE.to_string()];
        }
        self.modules.clone().unwrap_or_else(|| defaults.to_vec())
    }

    fn has_references(&self) -> bool {
        self.reference_images.iter().any(|image| !image.trim().is_empty())
    }

    /// Distinct provider ids in request order.
    pub fn distinct_providers(&self) -> Vec<ProviderId> {
        let mut seen = HashSet::new();
        self.providers
            .iter()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty() && seen.insert(id.clone()))
            .collect()
    }

    /// Reject requests that cannot produce a meaningful run.
    pub fn validate(&self, limits: &GenerationConfig, registry: &ProviderRegistry) -> Result<(), ApiError> {
        if self.prompt.trim().is_empty() {
            return Err(ApiError::InvalidRequest("prompt cannot be empty".to_string()));
        }

        let providers = self.distinct_providers();
        if providers.is_empty() {
            return Err(ApiError::InvalidRequest(
                "at least one provider is required".to_string(),
            ));
        }
        if providers.len() > limits.max_providers {
            return Err(ApiError::InvalidRequest(format!(
                "at most {} providers per request, got {}",
                limits.max_providers,
                providers.len()
            )));
        }
        if let Some(unknown) = providers.iter().find(|id| !registry.contains(id)) {
            return Err(ApiError::UnknownProvider(unknown.clone()));
        }

        if self.variations == 0 || self.variations > limits.max_variations {
            return Err(ApiError::InvalidRequest(format!(
                "variations must be between 1 and {}, got {}",
                limits.max_variations, self.variations
            )));
        }

        if self.task == TaskKind::ImageToImage && !self.has_references() {
            return Err(ApiError::InvalidRequest(
                "image_to_image requires at least one reference image".to_string(),
            ));
        }
        if self.verify_consistency && !self.has_references() {
            return Err(ApiError::InvalidRequest(
                "consistency checks require at least one reference image".to_string(),
            ));
        }

        if let Some(size) = &self.size {
            if parse_size(size).is_none() {
                return Err(ApiError::InvalidRequest(format!(
                    "size must look like WIDTHxHEIGHT, got '{}'",
                    size
                )));
            }
        }
        Ok(())
    }

    /// Explicit size, else the ratio's size, else `default_size`.
    pub fn resolve_size(&self, default_size: &str) -> String {
        match (&self.size, &self.ratio) {
            (Some(size), _) => normalize_size(size),
            (None, Some(ratio)) => ratio_to_size(ratio).to_string(),
            (None, None) => normalize_size(default_size),
        }
    }

    /// Provider-facing request template for this run.
    pub fn to_generation_request(&self, default_size: &str, correlation_id: &str) -> GenerationRequest {
        let mut params = self.params.clone();
        if let Some(ratio) = &self.ratio {
            params
                .entry("ratio".to_string())
                .or_insert_with(|| serde_json::Value::from(ratio.trim()));
        }
        let reference_images = self
            .reference_images
            .iter()
            .map(|image| image.trim().to_string())
            .filter(|image| !image.is_empty())
            .collect();

        GenerationRequest::new(self.task, self.prompt.trim(), self.resolve_size(default_size))
            .with_params(params)
            .with_reference_images(reference_images)
            .with_correlation_id(correlation_id)
    }
}
