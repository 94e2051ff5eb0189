//! Core data model shared by the generator, aggregator, selector, and pipeline.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Provider identifier as registered in the provider registry.
pub type ProviderId = String;

/// Scoring module name (`holistic`, `color_score`, ...).
pub type ModuleName = String;

/// Opaque metadata bag attached to requests and candidates.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Module whose score alone is the composite ranking signal.
pub const HOLISTIC_MODULE: &str = "holistic";

/// Metadata key for the 0-based position within a provider batch.
pub const SEQUENCE_INDEX_KEY: &str = "sequence_index";

/// Kind of generation task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    #[default]
    #[serde(alias = "text2image")]
    TextToImage,
    #[serde(alias = "image2image")]
    ImageToImage,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::TextToImage => "text_to_image",
            TaskKind::ImageToImage => "image_to_image",
        }
    }
}

/// Immutable description of what to generate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub task: TaskKind,
    pub prompt: String,
    /// Target size, e.g. `1024x1024`.
    pub size: String,
    #[serde(default)]
    pub params: Metadata,
    #[serde(default)]
    pub reference_images: Vec<String>,
    #[serde(default)]
    pub correlation_id: Option<String>,
}

impl GenerationRequest {
    pub fn new(task: TaskKind, prompt: impl Into<String>, size: impl Into<String>) -> Self {
        Self {
            task,
            prompt: prompt.into(),
            size: size.into(),
            params: Metadata::new(),
            reference_images: Vec::new(),
            correlation_id: None,
        }
    }

    pub fn with_reference_images(mut self, images: Vec<String>) -> Self {
        self.reference_images = images;
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
}

/// One generated output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// URL or inline `data:` payload; the key downstream components index by.
    pub locator: String,
    pub provider: ProviderId,
    pub prompt: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Candidate {
    pub fn sequence_index(&self) -> Option<u64> {
        self.metadata
            .get(SEQUENCE_INDEX_KEY)
            .and_then(serde_json::Value::as_u64)
    }
}

/// One module's verdict on one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleScore {
    pub module: ModuleName,
    /// Always within [0, 1].
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl ModuleScore {
    pub fn new(module: impl Into<ModuleName>, value: f64) -> Self {
        Self {
            module: module.into(),
            value: clamp_unit(value),
            comment: None,
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

/// All scores for one candidate plus the derived composite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateEvaluation {
    pub module_scores: BTreeMap<ModuleName, f64>,
    pub composite_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_comments: Option<BTreeMap<ModuleName, String>>,
}

impl CandidateEvaluation {
    /// Freeze a set of module scores: composite is the holistic score, or 0.0.
    pub fn from_scores(
        module_scores: BTreeMap<ModuleName, f64>,
        module_comments: BTreeMap<ModuleName, String>,
    ) -> Self {
        let composite_score = module_scores
            .get(HOLISTIC_MODULE)
            .copied()
            .map(clamp_unit)
            .unwrap_or(0.0);
        Self {
            module_scores,
            composite_score,
            module_comments: if module_comments.is_empty() {
                None
            } else {
                Some(module_comments)
            },
        }
    }

    pub fn holistic(&self) -> Option<f64> {
        self.module_scores.get(HOLISTIC_MODULE).copied()
    }

    /// Ranking signal: holistic when present, otherwise the composite.
    pub fn ranking_score(&self) -> f64 {
        self.holistic().unwrap_or(self.composite_score)
    }

    /// Module scores with the holistic module removed.
    pub fn visible_scores(&self) -> BTreeMap<ModuleName, f64> {
        self.module_scores
            .iter()
            .filter(|(name, _)| name.as_str() != HOLISTIC_MODULE)
            .map(|(name, score)| (name.clone(), *score))
            .collect()
    }
}

/// Scores for a batch, keyed by candidate locator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregationResult {
    pub evaluations: BTreeMap<String, CandidateEvaluation>,
    /// Sorted union of module names present in any evaluation.
    pub modules_used: Vec<ModuleName>,
}

impl AggregationResult {
    pub fn from_evaluations(evaluations: BTreeMap<String, CandidateEvaluation>) -> Self {
        let mut modules_used: Vec<ModuleName> = evaluations
            .values()
            .flat_map(|evaluation| evaluation.module_scores.keys().cloned())
            .collect();
        modules_used.sort();
        modules_used.dedup();
        Self {
            evaluations,
            modules_used,
        }
    }

    pub fn get(&self, locator: &str) -> Option<&CandidateEvaluation> {
        self.evaluations.get(locator)
    }
}

/// The winner of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionResult {
    pub candidate: Candidate,
    pub evaluation: Option<CandidateEvaluation>,
    pub correlation_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Scored,
    /// The check could not be made; a person has to compare the images.
    PendingReview,
}

/// How closely a candidate keeps the subject of the reference images.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyCheck {
    pub status: VerificationStatus,
    /// Within [0, 1]; 0.0 while pending review.
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl ConsistencyCheck {
    pub fn scored(score: f64) -> Self {
        Self {
            status: VerificationStatus::Scored,
            score: clamp_unit(score),
            comment: None,
        }
    }

    pub fn pending_review(reason: impl Into<String>) -> Self {
        Self {
            status: VerificationStatus::PendingReview,
            score: 0.0,
            comment: Some(reason.into()),
        }
    }
}

/// Clamp to [0, 1]; NaN collapses to 0.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Round to three decimals, the precision every scorer reports.
pub fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Shorten inline payloads for log fields.
pub fn display_locator(locator: &str) -> &str {
    if locator.starts_with("data:") {
        let end = locator
            .char_indices()
            .nth(48)
            .map(|(index, _)| index)
            .unwrap_or(locator.len());
        &locator[..end]
    } else {
        locator
    }
}
