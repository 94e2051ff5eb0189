//! Candidate generation against mock providers through the public API.

use super::support::{registry, MockProvider};
use aesthetic_engine::config::GenerationConfig;
use aesthetic_engine::error::{ApiError, ProviderError};
use aesthetic_engine::generation::CandidateGenerator;
use aesthetic_engine::retry::RetryPolicy;
use aesthetic_engine::types::{GenerationRequest, TaskKind};
use std::collections::HashSet;
use std::sync::Arc;

fn generator(registry: Arc<aesthetic_engine::provider::ProviderRegistry>) -> CandidateGenerator {
    CandidateGenerator::new(registry, RetryPolicy::immediate(3), GenerationConfig::without_delay())
}

fn template() -> GenerationRequest {
    GenerationRequest::new(TaskKind::TextToImage, "koi pond in the rain", "2048x2048")
        .with_correlation_id("gen-run")
}

fn ids(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

#[tokio::test]
async fn every_provider_yields_every_variation() {
    let a = Arc::new(MockProvider::healthy("alpha"));
    let b = Arc::new(MockProvider::healthy("beta"));
    let c = Arc::new(MockProvider::batching("gamma", 15));
    let registry = registry(&[("alpha", a.clone()), ("beta", b.clone()), ("gamma", c.clone())]);

    let candidates = generator(registry)
        .generate_candidates(&ids(&["alpha", "beta", "gamma"]), 3, &template())
        .await
        .unwrap();

    assert_eq!(candidates.len(), 9);
    for provider in ["alpha", "beta", "gamma"] {
        assert_eq!(
            candidates.iter().filter(|c| c.provider == provider).count(),
            3,
            "provider {provider}"
        );
    }
    let locators: HashSet<&str> = candidates.iter().map(|c| c.locator.as_str()).collect();
    assert_eq!(locators.len(), 9);
    assert_eq!(a.calls(), 3);
    assert_eq!(c.calls(), 1);
    assert_eq!(c.requested(), vec![3]);
}

#[tokio::test]
async fn calls_to_one_provider_never_overlap() {
    let a = Arc::new(MockProvider::healthy("alpha"));
    let b = Arc::new(MockProvider::healthy("beta"));
    let registry = registry(&[("alpha", a.clone()), ("beta", b.clone())]);

    let candidates = generator(registry)
        .generate_candidates(&ids(&["alpha", "beta"]), 4, &template())
        .await
        .unwrap();

    assert_eq!(candidates.len(), 8);
    assert_eq!(a.max_in_flight(), 1);
    assert_eq!(b.max_in_flight(), 1);
}

#[tokio::test]
async fn transient_failures_below_the_limit_recover() {
    let flaky = Arc::new(MockProvider::failing(
        "flaky",
        2,
        ProviderError::Status {
            status: 503,
            message: "overloaded".to_string(),
        },
    ));
    let registry = registry(&[("flaky", flaky.clone())]);

    let candidates = generator(registry)
        .generate_candidates(&ids(&["flaky"]), 1, &template())
        .await
        .unwrap();

    assert_eq!(candidates.len(), 1);
    assert_eq!(flaky.calls(), 3);
}

#[tokio::test]
async fn exhausted_attempts_are_dropped_without_hurting_siblings() {
    let flaky = Arc::new(MockProvider::always_failing(
        "flaky",
        ProviderError::RateLimited("slow down".to_string()),
    ));
    let steady = Arc::new(MockProvider::healthy("steady"));
    let registry = registry(&[("flaky", flaky.clone()), ("steady", steady.clone())]);

    let report = generator(registry)
        .generate(&ids(&["flaky", "steady"]), 2, &template())
        .await
        .unwrap();

    assert_eq!(report.candidates.len(), 2);
    assert!(report.candidates.iter().all(|c| c.provider == "steady"));
    assert_eq!(report.failures.len(), 2);
    // Three attempts per planned call
    assert_eq!(flaky.calls(), 6);
}

#[tokio::test]
async fn permanent_failures_are_not_retried() {
    let locked = Arc::new(MockProvider::always_failing(
        "locked",
        ProviderError::MissingCredentials("ARK_API_KEY".to_string()),
    ));
    let registry = registry(&[("locked", locked.clone())]);

    let err = generator(registry)
        .generate_candidates(&ids(&["locked"]), 2, &template())
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::NoCandidates { .. }));
    assert_eq!(locked.calls(), 2);
}

#[tokio::test]
async fn total_failure_is_no_candidates() {
    let a = Arc::new(MockProvider::always_failing(
        "alpha",
        ProviderError::Timeout("deadline".to_string()),
    ));
    let b = Arc::new(MockProvider::always_failing(
        "beta",
        ProviderError::Status {
            status: 500,
            message: "boom".to_string(),
        },
    ));
    let registry = registry(&[("alpha", a), ("beta", b)]);

    let err = generator(registry)
        .generate_candidates(&ids(&["alpha", "beta"]), 1, &template())
        .await
        .unwrap_err();

    match err {
        ApiError::NoCandidates { providers } => assert_eq!(providers, vec!["alpha", "beta"]),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn batch_of_four_is_sequence_tagged() {
    let seq = Arc::new(MockProvider::batching("seq", 15));
    let registry = registry(&[("seq", seq.clone())]);

    let candidates = generator(registry)
        .generate_candidates(&ids(&["seq"]), 4, &template())
        .await
        .unwrap();

    assert_eq!(seq.calls(), 1);
    let indices: Vec<Option<u64>> = candidates.iter().map(|c| c.sequence_index()).collect();
    assert_eq!(indices, vec![Some(0), Some(1), Some(2), Some(3)]);
    let locators: Vec<&str> = candidates.iter().map(|c| c.locator.as_str()).collect();
    assert_eq!(
        locators,
        vec![
            "https://seq/call1-0.png",
            "https://seq/call1-1.png",
            "https://seq/call1-2.png",
            "https://seq/call1-3.png"
        ]
    );
    assert_eq!(candidates[0].metadata["seed"], 1);
    assert_eq!(candidates[0].metadata["model"], "seq");
}

#[tokio::test]
async fn batches_split_at_the_provider_maximum() {
    let small = Arc::new(MockProvider::batching("small", 4));
    let registry = registry(&[("small", small.clone())]);

    let candidates = generator(registry)
        .generate_candidates(&ids(&["small"]), 10, &template())
        .await
        .unwrap();

    assert_eq!(candidates.len(), 10);
    assert_eq!(small.requested(), vec![4, 4, 2]);
    let indices: Vec<u64> = candidates.iter().filter_map(|c| c.sequence_index()).collect();
    assert_eq!(indices, (0..10).collect::<Vec<u64>>());
}
