//! Seedream (Ark platform) image generation.
//!
//! One call can return up to 15 images through sequential generation, which makes this the
//! batch-capable backend.

use crate::error::ProviderError;
use crate::provider::http::{build_http_client, send_json, upstream_error, upstream_error_message};
use crate::provider::{normalize_size, ImageProvider, ProviderCapabilities, ProviderOutput};
use crate::types::GenerationRequest;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str = "https://ark.cn-beijing.volces.com/api/v3/images/generations";
pub const DEFAULT_MODEL: &str = "doubao-seedream-4-0-250828";
pub const MAX_SEQUENTIAL_IMAGES: u32 = 15;

/// `params.sequential_mode` as the wire value, if the request sets one.
fn sequential_override(request: &GenerationRequest) -> Option<String> {
    match request.params.get("sequential_mode")? {
        Value::String(mode) if !mode.is_empty() => Some(mode.clone()),
        Value::Bool(true) => Some("auto".to_string()),
        Value::Bool(false) => Some("disabled".to_string()),
        _ => None,
    }
}

pub struct SeedreamClient {
    client: Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    batch: bool,
}

impl SeedreamClient {
    pub fn new(
        model: Option<String>,
        endpoint: Option<String>,
        api_key: Option<String>,
        timeout: Duration,
        batch: bool,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            client: build_http_client(timeout)?,
            endpoint: endpoint.unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            api_key,
            batch,
        })
    }

    /// Request body for `variations` images. `params.model`, `params.watermark` and
    /// `params.sequential_mode` override the defaults.
    pub fn build_payload(&self, request: &GenerationRequest, variations: u32) -> Value {
        let params = &request.params;
        let model = params
            .get("model")
            .and_then(Value::as_str)
            .unwrap_or(self.model.as_str());
        let watermark = params
            .get("watermark")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let requested = variations.clamp(1, MAX_SEQUENTIAL_IMAGES);
        let sequential = match sequential_override(request) {
            Some(mode) => mode,
            None if requested > 1 || !request.reference_images.is_empty() => "auto".to_string(),
            None => "disabled".to_string(),
        };

        let mut payload = json!({
            "model": model,
            "prompt": request.prompt,
            "size": normalize_size(&request.size),
            "response_format": "url",
            "stream": false,
            "watermark": watermark,
            "sequential_image_generation": sequential,
        });

        if !request.reference_images.is_empty() {
            payload["image"] = json!(request.reference_images);
        }
        if requested > 1 {
            payload["sequential_image_generation_options"] = json!({ "max_images": requested });
        }

        payload
    }

    /// Collect `data[].url` in response order.
    pub fn parse_response(body: &Value) -> Result<ProviderOutput, ProviderError> {
        if let Some(message) = upstream_error_message(body) {
            return Err(upstream_error(message));
        }

        let items = body.get("data").and_then(Value::as_array);
        let locators: Vec<String> = items
            .into_iter()
            .flatten()
            .filter_map(|item| item.get("url").and_then(Value::as_str))
            .filter(|url| !url.is_empty())
            .map(str::to_string)
            .collect();

        if locators.is_empty() {
            return Err(ProviderError::MalformedResponse(
                "Seedream response contained no image URLs".to_string(),
            ));
        }

        let mut output = ProviderOutput::new(locators);
        if let Some(model) = body.get("model").and_then(Value::as_str) {
            output = output.with_metadata("model", model);
        }
        let size = items
            .into_iter()
            .flatten()
            .find_map(|item| item.get("size").and_then(Value::as_str));
        if let Some(size) = size {
            output = output.with_metadata("size", size);
        }
        if let Some(usage) = body.get("usage") {
            output = output.with_metadata("usage", usage.clone());
        }
        Ok(output)
    }
}

#[async_trait]
impl ImageProvider for SeedreamClient {
    fn kind(&self) -> &'static str {
        "seedream"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn capabilities(&self) -> ProviderCapabilities {
        if self.batch {
            ProviderCapabilities::batch(MAX_SEQUENTIAL_IMAGES)
        } else {
            ProviderCapabilities::single()
        }
    }

    /// A request with sequential generation disabled gets one image per call.
    fn capabilities_for(&self, request: &GenerationRequest) -> ProviderCapabilities {
        match sequential_override(request).as_deref() {
            Some("disabled") => ProviderCapabilities::single(),
            _ => self.capabilities(),
        }
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
        variations: u32,
    ) -> Result<ProviderOutput, ProviderError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::MissingCredentials("Seedream API key".to_string()))?;

        let payload = self.build_payload(request, variations);
        let body = send_json(
            self.client
                .post(&self.endpoint)
                .bearer_auth(api_key)
                .json(&payload),
        )
        .await?;

        Self::parse_response(&body)
    }
}
