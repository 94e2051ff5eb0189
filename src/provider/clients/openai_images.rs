//! OpenAI-compatible `/images/generations` endpoints.

use crate::error::ProviderError;
use crate::provider::http::{build_http_client, send_json, upstream_error, upstream_error_message};
use crate::provider::{normalize_size, ImageProvider, ProviderOutput};
use crate::types::GenerationRequest;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/images/generations";
pub const DEFAULT_MODEL: &str = "dall-e-3";

pub struct OpenAiImagesClient {
    client: Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAiImagesClient {
    pub fn new(
        model: Option<String>,
        endpoint: Option<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            client: build_http_client(timeout)?,
            endpoint: endpoint.unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            api_key,
        })
    }

    pub fn build_payload(&self, request: &GenerationRequest) -> Value {
        let mut payload = json!({
            "model": request.params.get("model").and_then(Value::as_str).unwrap_or(self.model.as_str()),
            "prompt": request.prompt,
            "size": normalize_size(&request.size),
            "n": 1,
        });
        for key in ["quality", "style", "response_format"] {
            if let Some(value) = request.params.get(key) {
                payload[key] = value.clone();
            }
        }
        payload
    }

    /// `data[].url`, or `data[].b64_json` wrapped as a PNG data URL.
    pub fn parse_response(body: &Value) -> Result<ProviderOutput, ProviderError> {
        if let Some(message) = upstream_error_message(body) {
            return Err(upstream_error(message));
        }

        let locators: Vec<String> = body
            .get("data")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|item| {
                if let Some(url) = item.get("url").and_then(Value::as_str) {
                    return Some(url.to_string());
                }
                item.get("b64_json")
                    .and_then(Value::as_str)
                    .map(|encoded| format!("data:image/png;base64,{}", encoded))
            })
            .filter(|locator| !locator.is_empty())
            .collect();

        if locators.is_empty() {
            return Err(ProviderError::MalformedResponse(
                "Image response contained no images".to_string(),
            ));
        }

        let mut output = ProviderOutput::new(locators);
        let revised = body
            .get("data")
            .and_then(|data| data.get(0))
            .and_then(|item| item.get("revised_prompt"))
            .and_then(Value::as_str);
        if let Some(revised) = revised {
            output = output.with_metadata("revised_prompt", revised);
        }
        Ok(output)
    }
}

#[async_trait]
impl ImageProvider for OpenAiImagesClient {
    fn kind(&self) -> &'static str {
        "openai_images"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
        _variations: u32,
    ) -> Result<ProviderOutput, ProviderError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::MissingCredentials("OpenAI API key".to_string()))?;

        let body = send_json(
            self.client
                .post(&self.endpoint)
                .bearer_auth(api_key)
                .json(&self.build_payload(request)),
        )
        .await?;

        Self::parse_response(&body)
    }
}
