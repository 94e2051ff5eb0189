//! Shared mocks for integration tests: scripted providers and vision evaluators.

use aesthetic_engine::config::GenerationConfig;
use aesthetic_engine::error::{ProviderError, ScoringError};
use aesthetic_engine::pipeline::Pipeline;
use aesthetic_engine::provider::{ImageProvider, ProviderCapabilities, ProviderOutput, ProviderRegistry};
use aesthetic_engine::retry::RetryPolicy;
use aesthetic_engine::scoring::{
    fallback_modules, ModuleSet, ScoringAggregator, ScoringContext, VisionEvaluator, VisionOnlyModule,
    VisionVerdict,
};
use aesthetic_engine::types::{Candidate, GenerationRequest, HOLISTIC_MODULE};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Provider that fails its first `failures` calls with `error`, then succeeds.
pub struct MockProvider {
    name: String,
    capabilities: ProviderCapabilities,
    failures: u32,
    error: ProviderError,
    latency: Duration,
    state: Mutex<MockState>,
}

#[derive(Default)]
pub struct MockState {
    pub calls: u32,
    pub in_flight: u32,
    pub max_in_flight: u32,
    pub requested: Vec<u32>,
}

impl MockProvider {
    pub fn healthy(name: &str) -> Self {
        Self {
            name: name.to_string(),
            capabilities: ProviderCapabilities::single(),
            failures: 0,
            error: ProviderError::Other("unused".to_string()),
            latency: Duration::from_millis(2),
            state: Mutex::new(MockState::default()),
        }
    }

    pub fn batching(name: &str, max_batch: u32) -> Self {
        Self {
            capabilities: ProviderCapabilities::batch(max_batch),
            ..Self::healthy(name)
        }
    }

    pub fn failing(name: &str, failures: u32, error: ProviderError) -> Self {
        Self {
            failures,
            error,
            ..Self::healthy(name)
        }
    }

    pub fn always_failing(name: &str, error: ProviderError) -> Self {
        Self::failing(name, u32::MAX, error)
    }

    pub fn calls(&self) -> u32 {
        self.state.lock().calls
    }

    pub fn max_in_flight(&self) -> u32 {
        self.state.lock().max_in_flight
    }

    pub fn requested(&self) -> Vec<u32> {
        self.state.lock().requested.clone()
    }
}

#[async_trait]
impl ImageProvider for MockProvider {
    fn kind(&self) -> &'static str {
        "mock"
    }

    fn model_name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> ProviderCapabilities {
        self.capabilities
    }

    async fn generate(
        &self,
        _request: &GenerationRequest,
        variations: u32,
    ) -> Result<ProviderOutput, ProviderError> {
        let call = {
            let mut state = self.state.lock();
            state.calls += 1;
            state.in_flight += 1;
            state.max_in_flight = state.max_in_flight.max(state.in_flight);
            state.requested.push(variations);
            state.calls
        };

        tokio::time::sleep(self.latency).await;
        self.state.lock().in_flight -= 1;

        if call <= self.failures {
            return Err(self.error.clone());
        }
        let count = if self.capabilities.supports_batch { variations } else { 1 };
        let locators = (0..count)
            .map(|position| format!("https://{}/call{}-{}.png", self.name, call, position))
            .collect();
        Ok(ProviderOutput::new(locators).with_metadata("seed", call))
    }
}

/// Registry over the given mocks, keyed by their names.
pub fn registry(providers: &[(&str, Arc<MockProvider>)]) -> Arc<ProviderRegistry> {
    let builder = providers
        .iter()
        .fold(ProviderRegistry::builder(), |builder, (id, provider)| {
            builder.register(*id, provider.clone() as Arc<dyn ImageProvider>)
        });
    Arc::new(builder.build())
}

/// Vision evaluator that always fails with a transient error.
#[derive(Default)]
pub struct DownVision {
    pub calls: Mutex<u32>,
}

#[async_trait]
impl VisionEvaluator for DownVision {
    async fn evaluate(
        &self,
        _ctx: &ScoringContext,
        _candidate: &Candidate,
    ) -> Result<VisionVerdict, ScoringError> {
        *self.calls.lock() += 1;
        Err(ScoringError::Upstream("service temporarily unavailable".to_string()))
    }
}

/// Vision evaluator that rates each candidate by a per-provider holistic score, and checks
/// consistency by a per-provider similarity.
#[derive(Default)]
pub struct RatingVision {
    pub holistic_by_provider: BTreeMap<String, f64>,
    pub consistency_by_provider: BTreeMap<String, f64>,
}

#[async_trait]
impl VisionEvaluator for RatingVision {
    async fn evaluate(
        &self,
        _ctx: &ScoringContext,
        candidate: &Candidate,
    ) -> Result<VisionVerdict, ScoringError> {
        let holistic = self
            .holistic_by_provider
            .get(&candidate.provider)
            .copied()
            .ok_or_else(|| ScoringError::MalformedResponse("unrated provider".to_string()))?;
        Ok(VisionVerdict {
            scores: BTreeMap::from([
                (HOLISTIC_MODULE.to_string(), holistic),
                ("color_score".to_string(), 0.9),
            ]),
            comments: BTreeMap::from([("color_score".to_string(), "vivid".to_string())]),
        })
    }

    async fn verify_consistency(
        &self,
        _ctx: &ScoringContext,
        candidate: &Candidate,
        _references: &[String],
    ) -> Result<f64, ScoringError> {
        self.consistency_by_provider
            .get(&candidate.provider)
            .copied()
            .ok_or_else(|| ScoringError::Upstream("similarity service unavailable".to_string()))
    }
}

pub fn default_modules() -> ModuleSet {
    fallback_modules().into_iter().fold(
        ModuleSet::new().register(Arc::new(VisionOnlyModule::new(HOLISTIC_MODULE))),
        ModuleSet::register,
    )
}

pub fn module_names() -> Vec<String> {
    default_modules().names()
}

pub fn pipeline(
    registry: Arc<ProviderRegistry>,
    vision: Option<Arc<dyn VisionEvaluator>>,
) -> Pipeline {
    Pipeline::new(
        registry,
        ScoringAggregator::new(default_modules(), vision),
        RetryPolicy::immediate(3),
        GenerationConfig::without_delay(),
        module_names(),
    )
}
