//! Aggregation and selection over mock scorers.

use super::support::{default_modules, DownVision, RatingVision};
use aesthetic_engine::scoring::{HttpVisionEvaluator, ScoringAggregator, ScoringContext};
use aesthetic_engine::selector::select_best;
use aesthetic_engine::types::{Candidate, Metadata};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;

fn candidate(provider: &str, locator: &str) -> Candidate {
    Candidate {
        locator: locator.to_string(),
        provider: provider.to_string(),
        prompt: "a paper lantern festival".to_string(),
        metadata: Metadata::new(),
    }
}

#[tokio::test]
async fn vision_outage_leaves_fallback_scores_and_zero_composite() {
    let vision = Arc::new(DownVision::default());
    let aggregator = ScoringAggregator::new(default_modules(), Some(vision.clone()));
    let candidates = vec![
        candidate("alpha", "https://alpha/1.png"),
        candidate("beta", "https://beta/1.png"),
    ];

    let result = aggregator
        .score_candidates(&ScoringContext::new("outage"), &candidates, &[])
        .await;

    assert_eq!(*vision.calls.lock(), 2);
    assert_eq!(result.evaluations.len(), 2);
    for evaluation in result.evaluations.values() {
        assert_eq!(evaluation.composite_score, 0.0);
        assert!(evaluation.holistic().is_none());
        assert_eq!(evaluation.module_scores.len(), 5);
        assert!(evaluation
            .module_scores
            .values()
            .all(|score| (0.0..=1.0).contains(score)));
    }
    assert!(!result.modules_used.contains(&"holistic".to_string()));

    let selection = select_best(&candidates, Some(&result.evaluations), "outage").unwrap();
    assert_eq!(selection.candidate.provider, "alpha");
}

#[tokio::test]
async fn holistic_from_vision_drives_selection() {
    let vision = RatingVision {
        holistic_by_provider: BTreeMap::from([
            ("alpha".to_string(), 0.5),
            ("beta".to_string(), 0.9),
        ]),
        ..RatingVision::default()
    };
    let aggregator = ScoringAggregator::new(default_modules(), Some(Arc::new(vision)));
    let candidates = vec![
        candidate("alpha", "https://alpha/1.png"),
        candidate("beta", "https://beta/1.png"),
    ];

    let result = aggregator
        .score_candidates(&ScoringContext::new("rated"), &candidates, &[])
        .await;
    let selection = select_best(&candidates, Some(&result.evaluations), "rated").unwrap();

    assert_eq!(selection.candidate.provider, "beta");
    let evaluation = selection.evaluation.unwrap();
    assert_eq!(evaluation.composite_score, 0.9);
    assert_eq!(evaluation.module_scores["color_score"], 0.9);
    assert_eq!(evaluation.module_comments.unwrap()["color_score"], "vivid");
    assert_eq!(result.modules_used.len(), 6);
}

#[tokio::test]
async fn deterministic_fallbacks_are_reproducible() {
    let aggregator = ScoringAggregator::new(default_modules(), None);
    let candidates = vec![candidate("alpha", "https://alpha/1.png")];
    let ctx = ScoringContext::new("repeat");

    let first = aggregator.score_candidates(&ctx, &candidates, &[]).await;
    let second = aggregator.score_candidates(&ctx, &candidates, &[]).await;
    assert_eq!(first, second);

    let other_run = aggregator
        .score_candidates(&ScoringContext::new("another"), &candidates, &[])
        .await;
    assert_ne!(
        first.evaluations["https://alpha/1.png"].module_scores,
        other_run.evaluations["https://alpha/1.png"].module_scores
    );
}

#[test]
fn vision_verdicts_survive_inconsistent_envelopes() {
    let chat = json!({
        "id": "resp-1",
        "choices": [{
            "message": {
                "role": "assistant",
                "content": "```json\n{\"evaluation\": {\"prompt_adherence\": {\"score\": 9, \"comment\": \"faithful\"}, \"anatomical_integrity\": {\"score\": 4}, \"cleanliness\": \"7\"}, \"final_score\": 8}\n```"
            }
        }]
    });
    let verdict = HttpVisionEvaluator::parse_verdict(&chat).unwrap();
    assert_eq!(verdict.scores["quality_score"], 0.9);
    assert_eq!(verdict.scores["clarity_eval"], 0.4);
    assert_eq!(verdict.scores["noise_eval"], 0.7);
    // Poor clarity caps the holistic score
    assert_eq!(verdict.scores["holistic"], 0.4);
    assert_eq!(verdict.comments["quality_score"], "faithful");

    let legacy = json!({
        "output": {"text": "{\"light_color\": 6.5, \"composition\": {\"score\": 12}}"}
    });
    let verdict = HttpVisionEvaluator::parse_verdict(&legacy).unwrap();
    assert_eq!(verdict.scores["color_score"], 0.65);
    assert_eq!(verdict.scores["contrast_score"], 1.0);
    assert!(!verdict.scores.contains_key("holistic"));

    assert!(HttpVisionEvaluator::parse_verdict(&json!({"choices": []})).is_err());
}
