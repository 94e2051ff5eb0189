//! Pollinations: keyless GET endpoint that renders an image per (prompt, seed) URL.

use crate::error::ProviderError;
use crate::provider::http::{build_http_client, status_error};
use crate::provider::{parse_size, ImageProvider, ProviderOutput};
use crate::types::GenerationRequest;
use async_trait::async_trait;
use rand::Rng;
use reqwest::{Client, Url};
use serde_json::Value;
use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str = "https://image.pollinations.ai/prompt";
pub const DEFAULT_MODEL: &str = "flux";
const DEFAULT_REFERRER: &str = "aesthetic-engine.local";
const MIN_SIDE: u32 = 64;

pub struct PollinationsClient {
    client: Client,
    endpoint: String,
    model: String,
}

impl PollinationsClient {
    pub fn new(
        model: Option<String>,
        endpoint: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            client: build_http_client(timeout)?,
            endpoint: endpoint.unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        })
    }

    /// Image URL for one seed; the prompt becomes a percent-encoded path segment.
    pub fn image_url(&self, request: &GenerationRequest, seed: u64) -> Result<Url, ProviderError> {
        let (width, height) = parse_size(&request.size).unwrap_or((1024, 1024));
        let model = request
            .params
            .get("model")
            .and_then(Value::as_str)
            .unwrap_or(self.model.as_str());
        let referrer = request
            .params
            .get("referrer")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_REFERRER);

        let mut url = Url::parse(&self.endpoint)
            .map_err(|e| ProviderError::MalformedRequest(format!("Invalid endpoint: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| ProviderError::MalformedRequest("Endpoint cannot take a path".to_string()))?
            .pop_if_empty()
            .push(&request.prompt);
        url.query_pairs_mut()
            .append_pair("width", &width.max(MIN_SIDE).to_string())
            .append_pair("height", &height.max(MIN_SIDE).to_string())
            .append_pair("seed", &seed.to_string())
            .append_pair("model", model)
            .append_pair("referrer", referrer);
        Ok(url)
    }

    fn seed_for(request: &GenerationRequest) -> u64 {
        request
            .params
            .get("seed")
            .and_then(Value::as_u64)
            .unwrap_or_else(|| rand::thread_rng().gen_range(0..(1u64 << 31)))
    }
}

#[async_trait]
impl ImageProvider for PollinationsClient {
    fn kind(&self) -> &'static str {
        "pollinations"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
        _variations: u32,
    ) -> Result<ProviderOutput, ProviderError> {
        if request.prompt.trim().is_empty() {
            return Err(ProviderError::MalformedRequest(
                "Pollinations requires a prompt".to_string(),
            ));
        }

        let seed = Self::seed_for(request);
        let url = self.image_url(request, seed)?;

        // Rendering happens on the GET; a success status means the URL now serves the image.
        let response = self
            .client
            .get(url.clone())
            .header("Accept", "image/*")
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status.as_u16(), &body));
        }

        Ok(ProviderOutput::new(vec![url.to_string()])
            .with_metadata("seed", seed)
            .with_metadata("model", self.model.as_str()))
    }
}
