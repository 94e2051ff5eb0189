//! Remote holistic scorer: uploads the image (downloaded, or decoded when inline) to an
//! aesthetic-score service and reads back a single number, whatever scale and envelope the
//! service uses.

use crate::config::HolisticConfig;
use crate::error::{ProviderError, ScoringError};
use crate::provider::http::{build_http_client, send_json};
use crate::retry::RetryPolicy;
use crate::scoring::extract::find_number;
use crate::scoring::modules::{ScoreModule, ScoringContext};
use crate::types::{display_locator, round3, Candidate, ModuleScore, HOLISTIC_MODULE};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Url};
use std::time::Duration;
use tracing::debug;

const SCORE_KEYS: [&str; 5] = ["holistic", "holistic_score", "holisticScore", "score", "value"];
const SCORE_CONTAINERS: [&str; 6] = ["data", "scores", "result", "results", "payload", "items"];

/// Map a raw score of unknown scale onto [0, 1].
///
/// Unit-scale values are stretched onto 1..10 first so weak-but-valid images do not sink
/// below vision-scored ones; 0-10 and 0-100 scales are divided down; anything larger is 1.
pub fn clamp_holistic(value: f64) -> f64 {
    if value.is_nan() || value < 0.0 {
        0.0
    } else if value <= 1.0 {
        round3((1.0 + value * 9.0) / 10.0)
    } else if value <= 10.0 {
        round3(value / 10.0)
    } else if value <= 100.0 {
        round3(value / 100.0)
    } else {
        1.0
    }
}

const INLINE_FILE_NAME: &str = "image";
const INLINE_CONTENT_TYPE: &str = "image/png";

/// Image bytes as uploaded in the multipart `file` field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// Decode a `data:<mime>;base64,<payload>` locator. A missing mime type means PNG.
pub fn decode_data_url(locator: &str) -> Result<ImagePayload, ProviderError> {
    let malformed = |reason: &str| {
        ProviderError::MalformedRequest(format!(
            "{}: {}",
            reason,
            display_locator(locator)
        ))
    };
    let (header, payload) = locator
        .strip_prefix("data:")
        .and_then(|rest| rest.split_once(','))
        .ok_or_else(|| malformed("not a data URL"))?;

    let mut attributes = header.split(';');
    let content_type = attributes
        .next()
        .map(str::trim)
        .filter(|mime| !mime.is_empty())
        .unwrap_or(INLINE_CONTENT_TYPE)
        .to_string();
    if !attributes.any(|attribute| attribute.trim().eq_ignore_ascii_case("base64")) {
        return Err(malformed("inline image is not base64 encoded"));
    }

    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = STANDARD
        .decode(compact.as_bytes())
        .map_err(|err| malformed(&format!("invalid base64 payload ({})", err)))?;
    Ok(ImagePayload {
        file_name: INLINE_FILE_NAME.to_string(),
        bytes,
        content_type,
    })
}

/// Extract the raw holistic score from a service response.
pub fn extract_holistic(body: &serde_json::Value) -> Option<f64> {
    find_number(body, &SCORE_KEYS, &SCORE_CONTAINERS)
}

pub struct HolisticScorer {
    client: Client,
    endpoint: String,
    api_token: Option<String>,
    retry: RetryPolicy,
}

impl HolisticScorer {
    pub fn new(
        endpoint: impl Into<String>,
        api_token: Option<String>,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, ScoringError> {
        Ok(Self {
            client: build_http_client(timeout)?,
            endpoint: endpoint.into(),
            api_token,
            retry,
        })
    }

    pub fn from_config(config: &HolisticConfig, retry: RetryPolicy) -> Result<Self, ScoringError> {
        let api_token = config
            .api_token
            .clone()
            .or_else(|| std::env::var(&config.api_token_env).ok())
            .filter(|token| !token.trim().is_empty());
        Self::new(
            config.endpoint.clone(),
            api_token,
            Duration::from_secs(config.timeout_secs),
            retry,
        )
    }

    /// Bytes to upload: inline `data:` locators are decoded, http(s) locators downloaded.
    async fn load_image(&self, locator: &str) -> Result<ImagePayload, ProviderError> {
        if locator.starts_with("data:") {
            return decode_data_url(locator);
        }

        let url = Url::parse(locator)
            .ok()
            .filter(|url| matches!(url.scheme(), "http" | "https"))
            .ok_or_else(|| {
                ProviderError::MalformedRequest(format!(
                    "unsupported image locator: {}",
                    display_locator(locator)
                ))
            })?;
        let file_name = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|name| !name.is_empty())
            .unwrap_or(INLINE_FILE_NAME)
            .to_string();

        let response = self.client.get(url).send().await?.error_for_status()?;
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = response.bytes().await?;
        Ok(ImagePayload {
            file_name,
            bytes: bytes.to_vec(),
            content_type,
        })
    }

    async fn upload(&self, image: &ImagePayload) -> Result<serde_json::Value, ProviderError> {
        let part = Part::bytes(image.bytes.clone())
            .file_name(image.file_name.clone())
            .mime_str(&image.content_type)?;
        let mut request = self
            .client
            .post(&self.endpoint)
            .multipart(Form::new().part("file", part));
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }
        send_json(request).await
    }
}

#[async_trait]
impl ScoreModule for HolisticScorer {
    fn name(&self) -> &str {
        HOLISTIC_MODULE
    }

    async fn score(
        &self,
        ctx: &ScoringContext,
        candidate: &Candidate,
    ) -> Result<ModuleScore, ScoringError> {
        let label = format!("holistic:{}", candidate.provider);
        let image = self
            .retry
            .run(&label, |_| self.load_image(&candidate.locator))
            .await?;

        let image = &image;
        let body = self.retry.run(&label, |_| self.upload(image)).await?;

        let raw = extract_holistic(&body).ok_or_else(|| {
            ScoringError::MalformedResponse("holistic response has no usable score".to_string())
        })?;
        let score = clamp_holistic(raw);
        debug!(correlation_id = %ctx.correlation_id, raw, score, "Holistic score");
        Ok(ModuleScore::new(HOLISTIC_MODULE, score))
    }
}
