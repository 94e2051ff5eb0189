//! Candidate generator: runs a generation plan against the provider registry.
//!
//! Calls to different providers overlap freely. Calls to the same provider are serialized by a
//! gate created for this run only; a call holds its provider's permit across all of its
//! retries. Failed calls are logged and dropped, and only a run that yields nothing is fatal.

use crate::config::GenerationConfig;
use crate::error::{ApiError, ProviderError};
use crate::generation::plan::{AttemptKind, GenerationPlan, PlannedAttempt};
use crate::provider::{ImageProvider, ProviderOutput, ProviderRegistry};
use crate::retry::{random_delay, RetryPolicy};
use crate::types::{display_locator, Candidate, GenerationRequest, ProviderId, SEQUENCE_INDEX_KEY};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// One provider call that produced nothing after retries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptFailure {
    pub provider: ProviderId,
    pub kind: AttemptKind,
    pub message: String,
}

/// Everything a generation run produced, in plan order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationReport {
    pub candidates: Vec<Candidate>,
    pub failures: Vec<AttemptFailure>,
    /// Requested ids that are not registered
    pub skipped: Vec<ProviderId>,
}

struct AttemptOutcome {
    slot: usize,
    attempt: PlannedAttempt,
    model: String,
    result: Result<ProviderOutput, ProviderError>,
}

pub struct CandidateGenerator {
    registry: Arc<ProviderRegistry>,
    retry: RetryPolicy,
    config: GenerationConfig,
}

impl CandidateGenerator {
    pub fn new(registry: Arc<ProviderRegistry>, retry: RetryPolicy, config: GenerationConfig) -> Self {
        Self {
            registry,
            retry,
            config,
        }
    }

    /// Generate up to `variations` candidates per distinct provider.
    ///
    /// Fails only with `InvalidRequest` (bad variation count) or `NoCandidates`.
    pub async fn generate_candidates(
        &self,
        providers: &[ProviderId],
        variations: u32,
        template: &GenerationRequest,
    ) -> Result<Vec<Candidate>, ApiError> {
        Ok(self.generate(providers, variations, template).await?.candidates)
    }

    /// Same as `generate_candidates`, also returning the dropped attempts.
    pub async fn generate(
        &self,
        providers: &[ProviderId],
        variations: u32,
        template: &GenerationRequest,
    ) -> Result<GenerationReport, ApiError> {
        if variations > self.config.max_variations {
            return Err(ApiError::InvalidRequest(format!(
                "variations must be at most {}, got {}",
                self.config.max_variations, variations
            )));
        }

        let plan = GenerationPlan::build(providers, variations, |id| {
            self.registry.get(id).map(|provider| provider.capabilities_for(template))
        })?;
        for id in &plan.skipped {
            warn!(provider = %id, "Skipping unregistered provider");
        }

        info!(
            providers = plan.providers.len(),
            variations,
            attempts = plan.total_attempts(),
            "Generating candidates"
        );

        let gates: HashMap<&str, Semaphore> = plan
            .providers
            .iter()
            .map(|provider_plan| (provider_plan.provider.as_str(), Semaphore::new(1)))
            .collect();

        let mut pending = FuturesUnordered::new();
        for (slot, attempt) in plan.attempts().enumerate() {
            let provider = self.registry.get_or_error(&attempt.provider)?;
            let gate = gates
                .get(attempt.provider.as_str())
                .ok_or_else(|| ApiError::UnknownProvider(attempt.provider.clone()))?;
            pending.push(self.run_attempt(slot, attempt, provider, gate, template));
        }

        let mut outcomes = Vec::with_capacity(plan.total_attempts());
        while let Some(outcome) = pending.next().await {
            outcomes.push(outcome);
        }
        outcomes.sort_by_key(|outcome| outcome.slot);

        let mut candidates = Vec::new();
        let mut failures = Vec::new();
        for outcome in outcomes {
            match outcome.result {
                Ok(output) => {
                    candidates.extend(tag_candidates(&outcome.attempt, &outcome.model, output, template))
                }
                Err(err) => {
                    warn!(
                        provider = %outcome.attempt.provider,
                        attempt = ?outcome.attempt.kind,
                        error = %err,
                        "Dropping failed generation attempt"
                    );
                    failures.push(AttemptFailure {
                        provider: outcome.attempt.provider,
                        kind: outcome.attempt.kind,
                        message: err.to_string(),
                    });
                }
            }
        }

        if candidates.is_empty() {
            let mut requested = plan.provider_ids();
            requested.extend(plan.skipped.iter().cloned());
            return Err(ApiError::NoCandidates {
                providers: requested,
            });
        }

        info!(
            generated = candidates.len(),
            failed = failures.len(),
            "Candidate generation complete"
        );

        Ok(GenerationReport {
            candidates,
            failures,
            skipped: plan.skipped,
        })
    }

    async fn run_attempt(
        &self,
        slot: usize,
        attempt: PlannedAttempt,
        provider: Arc<dyn ImageProvider>,
        gate: &Semaphore,
        template: &GenerationRequest,
    ) -> AttemptOutcome {
        let model = provider.model_name().to_string();
        let result = match gate.acquire().await {
            Ok(_permit) => {
                let pause = random_delay(
                    Duration::from_millis(self.config.pre_call_delay_min_ms),
                    Duration::from_millis(self.config.pre_call_delay_max_ms),
                );
                if !pause.is_zero() {
                    sleep(pause).await;
                }
                self.call_with_retry(&attempt, provider.as_ref(), template).await
            }
            Err(_) => Err(ProviderError::Other("provider gate closed".to_string())),
        };
        AttemptOutcome {
            slot,
            attempt,
            model,
            result,
        }
    }

    async fn call_with_retry(
        &self,
        attempt: &PlannedAttempt,
        provider: &dyn ImageProvider,
        template: &GenerationRequest,
    ) -> Result<ProviderOutput, ProviderError> {
        let label = format!("generate:{}", attempt.provider);
        let requested = attempt.kind.requested();
        self.retry
            .run(&label, |call| async move {
                debug!(provider = %attempt.provider, call, requested, "Calling provider");
                let output = provider.generate(template, requested).await?;
                if output.locators.iter().all(|locator| locator.trim().is_empty()) {
                    return Err(ProviderError::MalformedResponse(
                        "provider returned no image locators".to_string(),
                    ));
                }
                Ok(output)
            })
            .await
    }
}

/// Turn one successful call into candidates. Batch results keep provider order, are
/// truncated to the requested count, and carry `sequence_index`.
fn tag_candidates(
    attempt: &PlannedAttempt,
    model: &str,
    output: ProviderOutput,
    template: &GenerationRequest,
) -> Vec<Candidate> {
    let locators: Vec<String> = output
        .locators
        .into_iter()
        .filter(|locator| !locator.trim().is_empty())
        .collect();

    let mut base = output.metadata;
    base.entry("model".to_string())
        .or_insert_with(|| Value::from(model));
    base.insert("task".to_string(), Value::from(template.task.as_str()));
    if let Some(correlation_id) = &template.correlation_id {
        base.insert("correlation_id".to_string(), Value::from(correlation_id.as_str()));
    }

    match attempt.kind {
        AttemptKind::Single { index } => locators
            .into_iter()
            .take(1)
            .map(|locator| {
                let mut metadata = base.clone();
                metadata.insert("variation_index".to_string(), Value::from(index));
                Candidate {
                    locator,
                    provider: attempt.provider.clone(),
                    prompt: template.prompt.clone(),
                    metadata,
                }
            })
            .collect(),
        AttemptKind::Batch { offset, requested } => {
            if (locators.len() as u32) < requested {
                info!(
                    provider = %attempt.provider,
                    requested,
                    delivered = locators.len(),
                    "Provider returned a short batch"
                );
            }
            let delivered = locators.len().min(requested as usize);
            locators
                .into_iter()
                .take(requested as usize)
                .enumerate()
                .map(|(position, locator)| {
                    let mut metadata = base.clone();
                    metadata.insert(
                        SEQUENCE_INDEX_KEY.to_string(),
                        Value::from(offset + position as u32),
                    );
                    metadata.insert("batch_size".to_string(), Value::from(delivered));
                    debug!(
                        provider = %attempt.provider,
                        sequence_index = offset + position as u32,
                        locator = display_locator(&locator),
                        "Tagged batch candidate"
                    );
                    Candidate {
                        locator,
                        provider: attempt.provider.clone(),
                        prompt: template.prompt.clone(),
                        metadata,
                    }
                })
                .collect()
        }
    }
}
