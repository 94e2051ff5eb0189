use crate::types::{
    AggregationResult, Candidate, CandidateEvaluation, ConsistencyCheck, ModuleName, ProviderId,
    SelectionResult, HOLISTIC_MODULE,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Comment order used when summarizing the winner.
const SUMMARY_ORDER: [&str; 5] = [
    "contrast_score",
    "color_score",
    "clarity_eval",
    "quality_score",
    "noise_eval",
];

/// Human-readable label for a module name.
pub fn module_label(module: &str) -> &str {
    match module {
        "color_score" => "Light and color",
        "contrast_score" => "Composition",
        "clarity_eval" => "Clarity and integrity",
        "noise_eval" => "Style coherence",
        "quality_score" => "Emotional impact",
        HOLISTIC_MODULE => "Overall aesthetics",
        other => other,
    }
}

/// Result of one run, tagged by `status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PipelineOutcome {
    Success(PipelineReport),
    Failed(PipelineFailure),
}

impl PipelineOutcome {
    pub fn correlation_id(&self) -> &str {
        match self {
            PipelineOutcome::Success(report) => &report.correlation_id,
            PipelineOutcome::Failed(failure) => &failure.correlation_id,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, PipelineOutcome::Success(_))
    }

    pub fn report(&self) -> Option<&PipelineReport> {
        match self {
            PipelineOutcome::Success(report) => Some(report),
            PipelineOutcome::Failed(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&PipelineFailure> {
        match self {
            PipelineOutcome::Success(_) => None,
            PipelineOutcome::Failed(failure) => Some(failure),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineFailure {
    pub correlation_id: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
    pub correlation_id: String,
    pub best_locator: String,
    pub best_provider: ProviderId,
    /// `None` when the winner was never scored
    pub composite_score: Option<f64>,
    pub candidates: Vec<CandidateBreakdown>,
    pub modules_used: Vec<ModuleName>,
    /// Sorted providers with at least one surviving candidate
    pub providers_used: Vec<ProviderId>,
    pub summary: String,
    pub prompt: String,
    pub size: String,
    /// Generation calls dropped after retries
    #[serde(default)]
    pub failed_attempts: usize,
    /// Candidates are ranked best first and carry their provider's `group_size`
    #[serde(default)]
    pub group_mode: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Per-candidate view; holistic is kept out of `scores` and only surfaces as the composite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateBreakdown {
    pub locator: String,
    pub provider: ProviderId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence_index: Option<u64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub scores: BTreeMap<ModuleName, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub composite_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification: Option<ConsistencyCheck>,
    /// Candidates delivered by the same provider; group mode only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_size: Option<usize>,
}

impl CandidateBreakdown {
    pub fn new(candidate: &Candidate, evaluation: Option<&CandidateEvaluation>) -> Self {
        Self {
            locator: candidate.locator.clone(),
            provider: candidate.provider.clone(),
            sequence_index: candidate.sequence_index(),
            scores: evaluation
                .map(CandidateEvaluation::visible_scores)
                .unwrap_or_default(),
            composite_score: evaluation.map(|evaluation| evaluation.composite_score),
            verification: None,
            group_size: None,
        }
    }

    /// Group view: no per-module scores, and single-image candidates take their variation
    /// number as the position within the group.
    fn into_group_member(mut self, candidate: &Candidate, group_size: usize) -> Self {
        self.scores.clear();
        if self.sequence_index.is_none() {
            self.sequence_index = candidate
                .metadata
                .get("variation_index")
                .and_then(serde_json::Value::as_u64);
        }
        self.group_size = Some(group_size);
        self
    }
}

/// Inputs gathered by the pipeline once a winner is known.
pub(crate) struct ReportParts<'a> {
    pub correlation_id: &'a str,
    pub candidates: &'a [Candidate],
    pub aggregation: Option<&'a AggregationResult>,
    pub selection: &'a SelectionResult,
    pub prompt: &'a str,
    pub size: &'a str,
    pub failed_attempts: usize,
    pub group_mode: bool,
    pub verification: &'a BTreeMap<String, ConsistencyCheck>,
    pub started_at: DateTime<Utc>,
}

impl PipelineReport {
    pub(crate) fn build(parts: ReportParts<'_>) -> Self {
        let evaluation_for =
            |candidate: &Candidate| parts.aggregation.and_then(|agg| agg.get(&candidate.locator));

        let mut group_sizes: BTreeMap<&str, usize> = BTreeMap::new();
        for candidate in parts.candidates {
            *group_sizes.entry(candidate.provider.as_str()).or_default() += 1;
        }

        let mut candidates: Vec<CandidateBreakdown> = parts
            .candidates
            .iter()
            .map(|candidate| {
                let mut breakdown = CandidateBreakdown::new(candidate, evaluation_for(candidate));
                breakdown.verification = parts.verification.get(&candidate.locator).cloned();
                if parts.group_mode {
                    let size = group_sizes
                        .get(candidate.provider.as_str())
                        .copied()
                        .unwrap_or(1);
                    breakdown = breakdown.into_group_member(candidate, size);
                }
                breakdown
            })
            .collect();
        if parts.group_mode {
            // Stable: equal composites keep generation order
            candidates.sort_by(|a, b| {
                b.composite_score
                    .unwrap_or(0.0)
                    .total_cmp(&a.composite_score.unwrap_or(0.0))
            });
        }

        let providers_used: BTreeSet<&str> = parts
            .candidates
            .iter()
            .map(|candidate| candidate.provider.as_str())
            .collect();

        let winner = &parts.selection.candidate;
        let best_evaluation = parts.selection.evaluation.as_ref();

        Self {
            correlation_id: parts.correlation_id.to_string(),
            best_locator: winner.locator.clone(),
            best_provider: winner.provider.clone(),
            composite_score: best_evaluation.map(|evaluation| evaluation.composite_score),
            candidates,
            modules_used: parts
                .aggregation
                .map(|agg| agg.modules_used.clone())
                .unwrap_or_default(),
            providers_used: providers_used.into_iter().map(str::to_string).collect(),
            summary: build_summary(best_evaluation),
            prompt: parts.prompt.to_string(),
            size: parts.size.to_string(),
            failed_attempts: parts.failed_attempts,
            group_mode: parts.group_mode,
            started_at: parts.started_at,
            finished_at: Utc::now(),
        }
    }
}

/// One-paragraph description of the winner.
///
/// Comments come first in a fixed dimension order, followed by the overall score. Without
/// comments, dimensions scoring at least 0.8 are called out.
pub fn build_summary(evaluation: Option<&CandidateEvaluation>) -> String {
    let Some(evaluation) = evaluation else {
        return "Generation complete.".to_string();
    };

    if let Some(comments) = &evaluation.module_comments {
        let mut parts: Vec<String> = Vec::new();
        let ordered = SUMMARY_ORDER.iter().filter_map(|key| {
            comments
                .get_key_value(*key)
                .map(|(key, comment)| (key.as_str(), comment))
        });
        let rest = comments
            .iter()
            .filter(|(key, _)| !SUMMARY_ORDER.contains(&key.as_str()))
            .map(|(key, comment)| (key.as_str(), comment));
        for (key, comment) in ordered.chain(rest) {
            if !comment.trim().is_empty() {
                parts.push(format!("{}: {}", module_label(key), comment.trim()));
            }
        }
        if let Some(holistic) = evaluation.holistic() {
            parts.push(format!("Overall aesthetic score about {:.1}/10.", holistic * 10.0));
        }
        if !parts.is_empty() {
            return parts.join("; ");
        }
    }

    let standouts: Vec<&str> = evaluation
        .module_scores
        .iter()
        .filter(|(name, score)| name.as_str() != HOLISTIC_MODULE && **score >= 0.8)
        .map(|(name, _)| module_label(name))
        .collect();
    if standouts.is_empty() {
        "Balanced across all dimensions.".to_string()
    } else {
        format!("Stands out in {}.", standouts.join(", "))
    }
}
