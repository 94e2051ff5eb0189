//! Vision evaluator: one multimodal chat call that scores several dimensions at once.
//!
//! The model is asked for a JSON object of per-criterion `{score, comment}` entries on a 0-10
//! scale plus a `final_score`. Criterion names are mapped onto module names, scores are
//! normalized to [0, 1], and a poor clarity verdict caps the holistic score.
//!
//! The same endpoint also answers subject-consistency checks for image-to-image runs: the
//! reference images and one candidate go in, a single 0-1 similarity score comes out.

use crate::config::VisionConfig;
use crate::error::{ProviderError, ScoringError};
use crate::provider::http::{build_http_client, send_json, upstream_error_message};
use crate::retry::RetryPolicy;
use crate::scoring::extract::{coerce_number, expand_embedded_json, find_key};
use crate::scoring::modules::ScoringContext;
use crate::types::{round3, Candidate, ModuleName, HOLISTIC_MODULE};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Current criterion names.
pub const PRIMARY_CRITERIA: [(&str, &str); 5] = [
    ("prompt_adherence", "quality_score"),
    ("anatomical_integrity", "clarity_eval"),
    ("physical_logic", "contrast_score"),
    ("cleanliness", "noise_eval"),
    ("aesthetic_value", "color_score"),
];

/// Older criterion names some model versions still emit.
pub const LEGACY_CRITERIA: [(&str, &str); 6] = [
    ("light_color", "color_score"),
    ("composition", "contrast_score"),
    ("clarity_integrity", "clarity_eval"),
    ("style_coherence", "noise_eval"),
    ("emotional_impact", "quality_score"),
    ("aesthetic_score", "color_score"),
];

pub const FINAL_SCORE_KEY: &str = "final_score";

/// Keys a consistency answer may carry its score under, in lookup order.
pub const CONSISTENCY_KEYS: [&str; 4] = ["score", "similarity", "consistency", "consistency_score"];

/// Holistic drops to `CLARITY_CAPPED_HOLISTIC` when clarity is below this threshold and
/// holistic is above `CLARITY_CAP_TRIGGER`.
pub const CLARITY_CAP_THRESHOLD: f64 = 0.6;
pub const CLARITY_CAP_TRIGGER: f64 = 0.5;
pub const CLARITY_CAPPED_HOLISTIC: f64 = 0.4;

const USER_INSTRUCTION: &str = "Output the JSON result directly.";

pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are a strict art director reviewing AI-generated images.
Score the image on each criterion from 0 to 10 and justify each score in one short sentence.
Criteria:
- prompt_adherence: how faithfully the image depicts the request
- anatomical_integrity: correct anatomy, hands, faces and object structure; no melted or fused parts
- physical_logic: plausible lighting, shadows, perspective and physics
- cleanliness: absence of noise, artifacts, watermarks and garbled text
- aesthetic_value: color harmony, composition and overall visual appeal
Then give final_score from 0 to 10 for the image as a whole.
Respond with a single JSON object and nothing else, shaped like:
{"prompt_adherence": {"score": 8, "comment": "..."}, "anatomical_integrity": {"score": 7, "comment": "..."},
 "physical_logic": {"score": 8, "comment": "..."}, "cleanliness": {"score": 9, "comment": "..."},
 "aesthetic_value": {"score": 7, "comment": "..."}, "final_score": 7.5}"#;

pub const CONSISTENCY_PROMPT: &str = r#"You review product images for subject consistency.
The first images are references; the last image is a generated candidate.
Judge whether the candidate shows the same kind of product with the same dominant colors and key features.
Respond with a single JSON object and nothing else: {"score": <0 to 1, 1 means identical subject>, "comment": "<at most 30 words>"}"#;

/// Scores and comments keyed by module name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VisionVerdict {
    pub scores: BTreeMap<ModuleName, f64>,
    pub comments: BTreeMap<ModuleName, String>,
}

/// External multi-criteria evaluator. Failures are non-fatal to the caller.
#[async_trait]
pub trait VisionEvaluator: Send + Sync {
    async fn evaluate(
        &self,
        ctx: &ScoringContext,
        candidate: &Candidate,
    ) -> Result<VisionVerdict, ScoringError>;

    /// Subject consistency of `candidate` against `references`, within [0, 1].
    async fn verify_consistency(
        &self,
        _ctx: &ScoringContext,
        _candidate: &Candidate,
        _references: &[String],
    ) -> Result<f64, ScoringError> {
        Err(ScoringError::Disabled(
            "evaluator does not check consistency".to_string(),
        ))
    }
}

/// 0-10 scale → [0, 1], three decimals. Negative → 0; above 10 → 1.
pub fn normalize_score(value: &Value) -> Option<f64> {
    let numeric = coerce_number(value)?;
    if numeric > 10.0 {
        return Some(1.0);
    }
    Some(round3((numeric.max(0.0) / 10.0).min(1.0)))
}

/// Similarity on a 0-1 scale, or a percentage. Values above 100 saturate at 1.
pub fn normalize_consistency(value: &Value) -> Option<f64> {
    let numeric = coerce_number(value)?;
    let scaled = if numeric > 100.0 {
        1.0
    } else if numeric > 1.0 {
        numeric / 100.0
    } else {
        numeric.max(0.0)
    };
    Some(round3(scaled))
}

/// Map criterion entries found anywhere in `root` onto module names.
///
/// Primary names are read before legacy ones and the first score for a module wins.
/// Returns `None` when no criterion and no final score could be read.
pub fn map_scores(root: &Value) -> Option<VisionVerdict> {
    let mut verdict = VisionVerdict::default();

    for (source, target) in PRIMARY_CRITERIA.iter().chain(LEGACY_CRITERIA.iter()) {
        if verdict.scores.contains_key(*target) {
            continue;
        }
        let Some(entry) = find_key(root, source) else {
            continue;
        };
        match entry {
            Value::Object(fields) => {
                if let Some(score) = fields.get("score").and_then(normalize_score) {
                    verdict.scores.insert(target.to_string(), score);
                }
                let comment = fields
                    .get("comment")
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|comment| !comment.is_empty());
                if let Some(comment) = comment {
                    verdict
                        .comments
                        .entry(target.to_string())
                        .or_insert_with(|| comment.to_string());
                }
            }
            other => {
                if let Some(score) = normalize_score(other) {
                    verdict.scores.insert(target.to_string(), score);
                }
            }
        }
    }

    if let Some(final_score) = find_key(root, FINAL_SCORE_KEY).and_then(normalize_score) {
        verdict.scores.insert(HOLISTIC_MODULE.to_string(), final_score);
    }

    let clarity = verdict.scores.get("clarity_eval").copied();
    let holistic = verdict.scores.get(HOLISTIC_MODULE).copied();
    if let (Some(clarity), Some(holistic)) = (clarity, holistic) {
        if clarity < CLARITY_CAP_THRESHOLD && holistic > CLARITY_CAP_TRIGGER {
            verdict
                .scores
                .insert(HOLISTIC_MODULE.to_string(), CLARITY_CAPPED_HOLISTIC);
        }
    }

    if verdict.scores.is_empty() {
        None
    } else {
        Some(verdict)
    }
}

/// Chat-completions backed evaluator.
pub struct HttpVisionEvaluator {
    client: Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    system_prompt: String,
    retry: RetryPolicy,
}

impl HttpVisionEvaluator {
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        system_prompt: impl Into<String>,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, ScoringError> {
        Ok(Self {
            client: build_http_client(timeout)?,
            endpoint: endpoint.into(),
            model: model.into(),
            api_key,
            system_prompt: system_prompt.into(),
            retry,
        })
    }

    /// Key comes from `api_key`, else the `api_key_env` variable. The prompt comes from
    /// `system_prompt`, else `system_prompt_path`, else the built-in prompt.
    pub fn from_config(config: &VisionConfig, retry: RetryPolicy) -> Result<Self, ScoringError> {
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var(&config.api_key_env).ok())
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty());
        if api_key.is_none() {
            warn!(
                key_env = %config.api_key_env,
                "Vision evaluator has no API key; vision scores will be skipped"
            );
        }

        let system_prompt = match (&config.system_prompt, &config.system_prompt_path) {
            (Some(prompt), _) if !prompt.trim().is_empty() => prompt.trim().to_string(),
            (_, Some(path)) => match std::fs::read_to_string(path) {
                Ok(prompt) if !prompt.trim().is_empty() => prompt.trim().to_string(),
                Ok(_) => DEFAULT_SYSTEM_PROMPT.to_string(),
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "Failed to read vision prompt; using built-in prompt");
                    DEFAULT_SYSTEM_PROMPT.to_string()
                }
            },
            _ => DEFAULT_SYSTEM_PROMPT.to_string(),
        };

        Self::new(
            config.endpoint.clone(),
            config.model.clone(),
            api_key,
            system_prompt,
            Duration::from_secs(config.timeout_secs),
            retry,
        )
    }

    pub fn is_enabled(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn build_payload(&self, locator: &str) -> Result<Value, ScoringError> {
        let locator = usable_locator(locator)?;

        Ok(json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": self.system_prompt},
                {
                    "role": "user",
                    "content": [
                        {"type": "image_url", "image_url": {"url": locator}},
                        {"type": "text", "text": USER_INSTRUCTION}
                    ]
                }
            ],
            "response_format": {"type": "json_object"}
        }))
    }

    /// References first, candidate last, as image parts of one user message.
    pub fn build_consistency_payload(
        &self,
        references: &[String],
        locator: &str,
    ) -> Result<Value, ScoringError> {
        let mut content = references
            .iter()
            .map(|reference| usable_locator(reference))
            .map(|reference| reference.map(|url| json!({"type": "image_url", "image_url": {"url": url}})))
            .collect::<Result<Vec<Value>, ScoringError>>()?;
        if content.is_empty() {
            return Err(ProviderError::MalformedRequest("no reference images".to_string()).into());
        }
        content.push(json!({"type": "image_url", "image_url": {"url": usable_locator(locator)?}}));
        content.push(json!({"type": "text", "text": USER_INSTRUCTION}));

        Ok(json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": CONSISTENCY_PROMPT},
                {"role": "user", "content": content}
            ],
            "response_format": {"type": "json_object"}
        }))
    }

    /// First consistency score found in the expanded body.
    pub fn parse_consistency(body: &Value) -> Result<f64, ScoringError> {
        let expanded = expand_embedded_json(body.clone());
        CONSISTENCY_KEYS
            .iter()
            .find_map(|key| find_key(&expanded, key).and_then(normalize_consistency))
            .ok_or_else(|| {
                ScoringError::MalformedResponse("no consistency score in vision response".to_string())
            })
    }

    fn api_key(&self) -> Result<&str, ScoringError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| ScoringError::Disabled("vision evaluator has no API key".to_string()))
    }

    async fn post(&self, label: &str, api_key: &str, payload: &Value) -> Result<Value, ScoringError> {
        self.retry
            .run(label, |_| async move {
                let body = send_json(
                    self.client
                        .post(&self.endpoint)
                        .bearer_auth(api_key)
                        .json(payload),
                )
                .await?;
                if let Some(message) = upstream_error_message(&body) {
                    return Err(ScoringError::Upstream(message));
                }
                Ok::<Value, ScoringError>(body)
            })
            .await
    }

    /// Pull a verdict out of a raw response body, whatever envelope it uses.
    pub fn parse_verdict(body: &Value) -> Result<VisionVerdict, ScoringError> {
        let expanded = expand_embedded_json(body.clone());
        map_scores(&expanded).ok_or_else(|| {
            ScoringError::MalformedResponse("no recognizable criteria in vision response".to_string())
        })
    }
}

#[async_trait]
impl VisionEvaluator for HttpVisionEvaluator {
    async fn evaluate(
        &self,
        ctx: &ScoringContext,
        candidate: &Candidate,
    ) -> Result<VisionVerdict, ScoringError> {
        let api_key = self.api_key()?;
        let payload = self.build_payload(&candidate.locator)?;
        let body = self.post("vision", api_key, &payload).await?;

        let verdict = Self::parse_verdict(&body)?;
        debug!(
            correlation_id = %ctx.correlation_id,
            provider = %candidate.provider,
            scores = ?verdict.scores,
            "Vision verdict"
        );
        Ok(verdict)
    }

    async fn verify_consistency(
        &self,
        ctx: &ScoringContext,
        candidate: &Candidate,
        references: &[String],
    ) -> Result<f64, ScoringError> {
        let api_key = self.api_key()?;
        let payload = self.build_consistency_payload(references, &candidate.locator)?;
        let body = self.post("consistency", api_key, &payload).await?;

        let score = Self::parse_consistency(&body)?;
        debug!(
            correlation_id = %ctx.correlation_id,
            provider = %candidate.provider,
            score,
            "Consistency score"
        );
        Ok(score)
    }
}

/// Trimmed locator, rejecting blanks and inline images without a payload.
fn usable_locator(locator: &str) -> Result<&str, ScoringError> {
    let locator = locator.trim();
    if locator.is_empty() {
        return Err(ProviderError::MalformedRequest("empty image locator".to_string()).into());
    }
    if let Some(inline) = locator.strip_prefix("data:") {
        let encoded = inline.split_once(',').map(|(_, data)| data).unwrap_or("");
        if encoded.is_empty() {
            return Err(
                ProviderError::MalformedRequest("inline image has no payload".to_string()).into(),
            );
        }
    }
    Ok(locator)
}
