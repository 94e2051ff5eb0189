//! Fan-out shape: candidate counts, batch splits, and sequence indices across provider mixes.

use aesthetic_engine::config::GenerationConfig;
use aesthetic_engine::error::ProviderError;
use aesthetic_engine::generation::{AttemptKind, CandidateGenerator, GenerationPlan};
use aesthetic_engine::provider::{ImageProvider, ProviderCapabilities, ProviderOutput, ProviderRegistry};
use aesthetic_engine::retry::RetryPolicy;
use aesthetic_engine::types::{GenerationRequest, TaskKind};
use async_trait::async_trait;
use parking_lot::Mutex;
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Always delivers exactly the requested number of images.
struct CountingProvider {
    name: String,
    capabilities: ProviderCapabilities,
    calls: AtomicUsize,
    requested: Mutex<Vec<u32>>,
}

#[async_trait]
impl ImageProvider for CountingProvider {
    fn kind(&self) -> &'static str {
        "counting"
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
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.requested.lock().push(variations);
        Ok(ProviderOutput::new(
            (0..variations)
                .map(|i| format!("https://{}/call{}-{}.png", self.name, call, i))
                .collect(),
        ))
    }
}

/// `None` is a single-image provider, `Some(n)` batches up to `n` per call.
fn provider_mix() -> impl Strategy<Value = Vec<Option<u32>>> {
    prop::collection::vec(prop::option::of(1u32..=16), 1..=4)
}

fn expected_split(variations: u32, caps: ProviderCapabilities) -> Vec<u32> {
    if variations > 1 && caps.supports_batch {
        let mut sizes = vec![caps.max_batch; (variations / caps.max_batch) as usize];
        if variations % caps.max_batch != 0 {
            sizes.push(variations % caps.max_batch);
        }
        sizes
    } else {
        vec![1; variations as usize]
    }
}

#[test]
fn test_fan_out_respects_counts_and_batch_shape() {
    let mut runner = proptest::test_runner::TestRunner::default();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap();

    runner
        .run(&(provider_mix(), 1u32..=15), |(mix, variations)| {
            let providers: Vec<Arc<CountingProvider>> = mix
                .iter()
                .enumerate()
                .map(|(index, max_batch)| {
                    Arc::new(CountingProvider {
                        name: format!("p{}", index),
                        capabilities: max_batch
                            .map(ProviderCapabilities::batch)
                            .unwrap_or_else(ProviderCapabilities::single),
                        calls: AtomicUsize::new(0),
                        requested: Mutex::new(Vec::new()),
                    })
                })
                .collect();

            let mut builder = ProviderRegistry::builder();
            for provider in &providers {
                builder = builder.register(provider.name.clone(), provider.clone());
            }
            let generator = CandidateGenerator::new(
                Arc::new(builder.build()),
                RetryPolicy::immediate(1),
                GenerationConfig::without_delay(),
            );
            let ids: Vec<String> = providers.iter().map(|p| p.name.clone()).collect();
            let template = GenerationRequest::new(TaskKind::TextToImage, "prop", "1024x1024");

            let candidates = runtime
                .block_on(generator.generate_candidates(&ids, variations, &template))
                .unwrap();

            prop_assert!(candidates.len() <= ids.len() * variations as usize);
            prop_assert_eq!(candidates.len(), ids.len() * variations as usize);

            let plan = GenerationPlan::build(&ids, variations, |id| {
                providers
                    .iter()
                    .find(|p| p.name == id)
                    .map(|p| p.capabilities)
            })
            .unwrap();

            let mut indices: BTreeMap<&str, Vec<u64>> = BTreeMap::new();
            for candidate in &candidates {
                if let Some(index) = candidate.sequence_index() {
                    indices.entry(candidate.provider.as_str()).or_default().push(index);
                }
            }

            for (provider, provider_plan) in providers.iter().zip(&plan.providers) {
                let split = expected_split(variations, provider.capabilities);
                let planned: Vec<u32> = provider_plan.attempts.iter().map(AttemptKind::requested).collect();
                prop_assert_eq!(&planned, &split);

                let mut sent = provider.requested.lock().clone();
                sent.sort_unstable();
                let mut sorted_split = split.clone();
                sorted_split.sort_unstable();
                prop_assert_eq!(sent, sorted_split);

                let batched = split.iter().any(|size| *size > 1);
                match indices.get(provider.name.as_str()) {
                    Some(found) => {
                        prop_assert!(batched);
                        let contiguous: Vec<u64> = (0..variations as u64).collect();
                        prop_assert_eq!(found, &contiguous);
                    }
                    None => prop_assert!(!batched),
                }
            }
            Ok(())
        })
        .unwrap();
}
