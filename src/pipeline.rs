//! Pipeline orchestrator: validate → generate → score → select → report.
//!
//! [`Pipeline::run`] is the single failure boundary of a run. Errors and panics from any
//! stage become a `failed` outcome carrying the run's correlation id; nothing propagates.

use crate::config::{EngineConfig, GenerationConfig};
use crate::error::ApiError;
use crate::generation::CandidateGenerator;
use crate::provider::ProviderRegistry;
use crate::retry::RetryPolicy;
use crate::scoring::{ScoringAggregator, ScoringContext};
use crate::selector::select_best;
use crate::types::ModuleName;
use chrono::Utc;
use futures::FutureExt;
use std::any::Any;
use std::collections::BTreeMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

mod report;
mod request;

pub use report::{
    build_summary, module_label, CandidateBreakdown, PipelineFailure, PipelineOutcome,
    PipelineReport,
};
pub use request::{ratio_to_size, PipelineRequest, DEFAULT_RATIO_SIZE};

use report::ReportParts;

pub struct Pipeline {
    registry: Arc<ProviderRegistry>,
    generator: CandidateGenerator,
    aggregator: ScoringAggregator,
    generation: GenerationConfig,
    default_modules: Vec<ModuleName>,
}

impl Pipeline {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        aggregator: ScoringAggregator,
        retry: RetryPolicy,
        generation: GenerationConfig,
        default_modules: Vec<ModuleName>,
    ) -> Self {
        Self {
            generator: CandidateGenerator::new(registry.clone(), retry, generation.clone()),
            registry,
            aggregator,
            generation,
            default_modules,
        }
    }

    /// Build providers, scorers, and limits from a loaded configuration.
    pub fn from_config(config: &EngineConfig) -> Result<Self, ApiError> {
        let registry = Arc::new(ProviderRegistry::from_config(config)?);
        let retry = RetryPolicy::from_config(&config.retry);
        let aggregator = ScoringAggregator::from_config(&config.scoring, &retry)
            .map_err(|err| ApiError::ConfigError(format!("Failed to build scorers: {}", err)))?;
        Ok(Self::new(
            registry,
            aggregator,
            retry,
            config.generation.clone(),
            config.scoring.default_modules.clone(),
        ))
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn aggregator(&self) -> &ScoringAggregator {
        &self.aggregator
    }

    /// Run to completion.
    pub async fn run(&self, request: PipelineRequest) -> PipelineOutcome {
        self.run_with_cancel(request, futures::future::pending::<()>())
            .await
    }

    /// Run until done or until `timeout` elapses, whichever comes first.
    pub async fn run_with_timeout(&self, request: PipelineRequest, timeout: Duration) -> PipelineOutcome {
        self.run_with_cancel(request, tokio::time::sleep(timeout)).await
    }

    /// Run until done or until `cancel` resolves. Cancelling drops every in-flight provider
    /// and scorer call; provider permits are released as their futures drop.
    pub async fn run_with_cancel<C>(&self, request: PipelineRequest, cancel: C) -> PipelineOutcome
    where
        C: Future<Output = ()>,
    {
        let correlation_id = request
            .correlation_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let span = info_span!("pipeline", correlation_id = %correlation_id);

        let guarded = AssertUnwindSafe(self.execute(&request, &correlation_id))
            .catch_unwind()
            .instrument(span);

        tokio::select! {
            biased;

            _ = cancel => {
                warn!(correlation_id = %correlation_id, "Pipeline run cancelled");
                failed(&correlation_id, ApiError::Cancelled.to_string())
            }
            result = guarded => match result {
                Ok(Ok(report)) => PipelineOutcome::Success(report),
                Ok(Err(err)) => {
                    error!(correlation_id = %correlation_id, error = %err, "Pipeline run failed");
                    failed(&correlation_id, err.to_string())
                }
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    error!(correlation_id = %correlation_id, panic = %message, "Pipeline run panicked");
                    failed(&correlation_id, message)
                }
            },
        }
    }

    async fn execute(
        &self,
        request: &PipelineRequest,
        correlation_id: &str,
    ) -> Result<PipelineReport, ApiError> {
        let started_at = Utc::now();
        request.validate(&self.generation, &self.registry)?;

        let providers = request.distinct_providers();
        let template = request.to_generation_request(&self.generation.default_size, correlation_id);
        info!(
            task = template.task.as_str(),
            providers = ?providers,
            variations = request.variations,
            size = %template.size,
            group_mode = request.group_mode,
            "Pipeline run started"
        );

        let generation = self
            .generator
            .generate(&providers, request.variations, &template)
            .await?;

        let ctx = ScoringContext::new(correlation_id);
        let modules = request.resolve_modules(&self.default_modules);
        let aggregation = if modules.is_empty() {
            info!("No scoring modules requested; skipping scoring");
            None
        } else {
            Some(
                self.aggregator
                    .score_candidates(&ctx, &generation.candidates, &modules)
                    .await,
            )
        };

        let verification = if request.verify_consistency {
            self.aggregator
                .verify_consistency(&ctx, &generation.candidates, &template.reference_images)
                .await
        } else {
            BTreeMap::new()
        };

        let selection = select_best(
            &generation.candidates,
            aggregation.as_ref().map(|aggregation| &aggregation.evaluations),
            correlation_id,
        )?;

        let report = PipelineReport::build(ReportParts {
            correlation_id,
            candidates: &generation.candidates,
            aggregation: aggregation.as_ref(),
            selection: &selection,
            prompt: &template.prompt,
            size: &template.size,
            failed_attempts: generation.failures.len(),
            group_mode: request.group_mode,
            verification: &verification,
            started_at,
        });

        info!(
            best_provider = %report.best_provider,
            composite_score = ?report.composite_score,
            candidates = report.candidates.len(),
            "Pipeline run complete"
        );
        Ok(report)
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("registry", &self.registry)
            .field("aggregator", &self.aggregator)
            .field("default_modules", &self.default_modules)
            .finish()
    }
}

fn failed(correlation_id: &str, message: String) -> PipelineOutcome {
    PipelineOutcome::Failed(PipelineFailure {
        correlation_id: correlation_id.to_string(),
        message,
    })
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "pipeline stage panicked".to_string()
    }
}
