//! Deterministic winner selection.

use crate::error::ApiError;
use crate::types::{Candidate, CandidateEvaluation, SelectionResult};
use std::collections::BTreeMap;
use tracing::debug;

/// Pick the best candidate.
///
/// Candidates are ranked by their holistic score, falling back to the composite score, and a
/// candidate without an evaluation ranks at 0.0. Ties keep the earliest candidate. Without
/// evaluations (or with an empty map) the first candidate wins unscored.
pub fn select_best(
    candidates: &[Candidate],
    evaluations: Option<&BTreeMap<String, CandidateEvaluation>>,
    correlation_id: &str,
) -> Result<SelectionResult, ApiError> {
    let first = candidates.first().ok_or(ApiError::EmptyCandidateSet)?;

    let evaluations = match evaluations {
        Some(evaluations) if !evaluations.is_empty() => evaluations,
        _ => {
            debug!(correlation_id, "No evaluations; selecting first candidate");
            return Ok(SelectionResult {
                candidate: first.clone(),
                evaluation: None,
                correlation_id: correlation_id.to_string(),
            });
        }
    };

    let rank = |candidate: &Candidate| {
        evaluations
            .get(&candidate.locator)
            .map(CandidateEvaluation::ranking_score)
            .unwrap_or(0.0)
    };

    let mut best = first;
    let mut best_score = rank(first);
    for candidate in &candidates[1..] {
        let score = rank(candidate);
        if score > best_score {
            best = candidate;
            best_score = score;
        }
    }

    debug!(
        correlation_id,
        provider = %best.provider,
        score = best_score,
        "Selected candidate"
    );

    Ok(SelectionResult {
        candidate: best.clone(),
        evaluation: evaluations.get(&best.locator).cloned(),
        correlation_id: correlation_id.to_string(),
    })
}
