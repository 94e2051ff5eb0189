//! Scoring aggregator: vision verdict first, then every still-missing module concurrently.

use crate::config::ScoringConfig;
use crate::error::ScoringError;
use crate::retry::RetryPolicy;
use crate::scoring::holistic::HolisticScorer;
use crate::scoring::modules::{fallback_modules, ModuleSet, ScoreModule, ScoringContext, VisionOnlyModule};
use crate::scoring::vision::{HttpVisionEvaluator, VisionEvaluator};
use crate::types::{
    clamp_unit, display_locator, AggregationResult, Candidate, CandidateEvaluation,
    ConsistencyCheck, ModuleName, HOLISTIC_MODULE,
};
use futures::future::join_all;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Stateless between runs; one instance can serve any number of concurrent runs.
pub struct ScoringAggregator {
    modules: ModuleSet,
    vision: Option<Arc<dyn VisionEvaluator>>,
}

impl ScoringAggregator {
    pub fn new(modules: ModuleSet, vision: Option<Arc<dyn VisionEvaluator>>) -> Self {
        Self { modules, vision }
    }

    /// Holistic (remote when configured, vision-only otherwise), the five fallback modules,
    /// and the vision evaluator when a `vision` block is present.
    pub fn from_config(config: &ScoringConfig, retry: &RetryPolicy) -> Result<Self, ScoringError> {
        let holistic: Arc<dyn ScoreModule> = match &config.holistic {
            Some(holistic) => Arc::new(HolisticScorer::from_config(holistic, retry.clone())?),
            None => Arc::new(VisionOnlyModule::new(HOLISTIC_MODULE)),
        };
        let modules = fallback_modules()
            .into_iter()
            .fold(ModuleSet::new().register(holistic), ModuleSet::register);

        let vision = match &config.vision {
            Some(vision) => {
                let evaluator = HttpVisionEvaluator::from_config(vision, retry.clone())?;
                Some(Arc::new(evaluator) as Arc<dyn VisionEvaluator>)
            }
            None => None,
        };

        Ok(Self::new(modules, vision))
    }

    pub fn module_names(&self) -> Vec<ModuleName> {
        self.modules.names()
    }

    pub fn has_vision(&self) -> bool {
        self.vision.is_some()
    }

    /// Score every distinct candidate. Never fails: a scorer that errors simply leaves its
    /// module absent from that candidate's evaluation.
    pub async fn score_candidates(
        &self,
        ctx: &ScoringContext,
        candidates: &[Candidate],
        modules: &[ModuleName],
    ) -> AggregationResult {
        let selected = self.modules.select(modules);
        let selected_names: HashSet<&str> = selected.iter().map(|module| module.name()).collect();

        let mut seen = HashSet::new();
        let distinct: Vec<&Candidate> = candidates
            .iter()
            .filter(|candidate| seen.insert(candidate.locator.as_str()))
            .collect();

        info!(
            correlation_id = %ctx.correlation_id,
            candidates = distinct.len(),
            modules = selected.len(),
            vision = self.vision.is_some(),
            "Scoring candidates"
        );

        let evaluations = join_all(
            distinct
                .iter()
                .map(|candidate| self.score_one(ctx, candidate, &selected, &selected_names)),
        )
        .await;

        let evaluations: BTreeMap<String, CandidateEvaluation> = distinct
            .into_iter()
            .map(|candidate| candidate.locator.clone())
            .zip(evaluations)
            .collect();

        let result = AggregationResult::from_evaluations(evaluations);
        debug!(
            correlation_id = %ctx.correlation_id,
            modules_used = ?result.modules_used,
            "Scoring complete"
        );
        result
    }

    /// Compare every distinct candidate with `references` through the vision evaluator.
    ///
    /// Never fails: a candidate that cannot be checked is marked pending review. Without a
    /// vision evaluator nothing is checked and the map is empty.
    pub async fn verify_consistency(
        &self,
        ctx: &ScoringContext,
        candidates: &[Candidate],
        references: &[String],
    ) -> BTreeMap<String, ConsistencyCheck> {
        let Some(vision) = &self.vision else {
            info!(
                correlation_id = %ctx.correlation_id,
                "No vision evaluator; skipping consistency checks"
            );
            return BTreeMap::new();
        };

        let mut seen = HashSet::new();
        let distinct: Vec<&Candidate> = candidates
            .iter()
            .filter(|candidate| seen.insert(candidate.locator.as_str()))
            .collect();

        let checks = join_all(distinct.iter().map(|candidate| async move {
            match vision.verify_consistency(ctx, candidate, references).await {
                Ok(score) => ConsistencyCheck::scored(score),
                Err(err) => {
                    warn!(
                        correlation_id = %ctx.correlation_id,
                        provider = %candidate.provider,
                        locator = display_locator(&candidate.locator),
                        error = %err,
                        "Consistency check failed; leaving for review"
                    );
                    ConsistencyCheck::pending_review(err.to_string())
                }
            }
        }))
        .await;

        distinct
            .into_iter()
            .map(|candidate| candidate.locator.clone())
            .zip(checks)
            .collect()
    }

    async fn score_one(
        &self,
        ctx: &ScoringContext,
        candidate: &Candidate,
        selected: &[Arc<dyn ScoreModule>],
        selected_names: &HashSet<&str>,
    ) -> CandidateEvaluation {
        let locator = display_locator(&candidate.locator);
        let mut scores: BTreeMap<ModuleName, f64> = BTreeMap::new();
        let mut comments: BTreeMap<ModuleName, String> = BTreeMap::new();

        if let Some(vision) = &self.vision {
            match vision.evaluate(ctx, candidate).await {
                Ok(verdict) => {
                    for (name, value) in verdict.scores {
                        if selected_names.contains(name.as_str()) {
                            scores.insert(name, clamp_unit(value));
                        }
                    }
                    for (name, comment) in verdict.comments {
                        if selected_names.contains(name.as_str()) && !comment.trim().is_empty() {
                            comments.insert(name, comment);
                        }
                    }
                }
                Err(ScoringError::Disabled(reason)) => {
                    debug!(locator, reason = %reason, "Vision evaluator skipped")
                }
                Err(err) => warn!(
                    correlation_id = %ctx.correlation_id,
                    provider = %candidate.provider,
                    locator,
                    error = %err,
                    "Vision evaluation failed; continuing with local modules"
                ),
            }
        }

        let residual: Vec<&Arc<dyn ScoreModule>> = selected
            .iter()
            .filter(|module| !scores.contains_key(module.name()))
            .collect();
        let results = join_all(residual.iter().map(|module| async move {
            (module.name().to_string(), module.score(ctx, candidate).await)
        }))
        .await;

        for (module, result) in results {
            match result {
                Ok(score) => {
                    if let Some(comment) = score.comment {
                        comments.entry(module.clone()).or_insert(comment);
                    }
                    scores.entry(module).or_insert_with(|| clamp_unit(score.value));
                }
                Err(ScoringError::Disabled(reason)) => {
                    debug!(module = %module, locator, reason = %reason, "Module skipped")
                }
                Err(err) => warn!(
                    correlation_id = %ctx.correlation_id,
                    module = %module,
                    locator,
                    error = %err,
                    "Scoring module failed"
                ),
            }
        }

        CandidateEvaluation::from_scores(scores, comments)
    }
}

impl std::fmt::Debug for ScoringAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScoringAggregator")
            .field("modules", &self.modules)
            .field("vision", &self.vision.is_some())
            .finish()
    }
}
