//! Selection is the first candidate with the highest ranking score.

use aesthetic_engine::selector::select_best;
use aesthetic_engine::types::{Candidate, CandidateEvaluation, Metadata};
use proptest::prelude::*;
use std::collections::BTreeMap;

fn candidates(count: usize) -> Vec<Candidate> {
    (0..count)
        .map(|index| Candidate {
            locator: format!("https://img/{}.png", index),
            provider: format!("p{}", index % 3),
            prompt: "prop".to_string(),
            metadata: Metadata::new(),
        })
        .collect()
}

fn evaluation(holistic: Option<f64>) -> CandidateEvaluation {
    let mut scores = BTreeMap::from([("color_score".to_string(), 0.5)]);
    if let Some(value) = holistic {
        scores.insert("holistic".to_string(), value);
    }
    CandidateEvaluation::from_scores(scores, BTreeMap::new())
}

/// Per candidate: not evaluated, evaluated without holistic, or evaluated with one.
fn outcome_strategy() -> impl Strategy<Value = Option<Option<f64>>> {
    prop_oneof![
        Just(None),
        Just(Some(None)),
        (0u32..=20).prop_map(|step| Some(Some(step as f64 / 20.0))),
    ]
}

#[test]
fn test_selection_is_first_maximal_candidate() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(
            &prop::collection::vec(outcome_strategy(), 1..12),
            |outcomes| {
                let candidates = candidates(outcomes.len());
                let evaluations: BTreeMap<String, CandidateEvaluation> = candidates
                    .iter()
                    .zip(&outcomes)
                    .filter_map(|(candidate, outcome)| {
                        outcome.map(|holistic| (candidate.locator.clone(), evaluation(holistic)))
                    })
                    .collect();

                let ranks: Vec<f64> = outcomes
                    .iter()
                    .map(|outcome| outcome.flatten().unwrap_or(0.0))
                    .collect();

                let selection = select_best(&candidates, Some(&evaluations), "prop").unwrap();

                if evaluations.is_empty() {
                    prop_assert_eq!(&selection.candidate.locator, &candidates[0].locator);
                    prop_assert!(selection.evaluation.is_none());
                } else {
                    let best = ranks.iter().cloned().fold(f64::MIN, f64::max);
                    let expected = ranks.iter().position(|rank| *rank == best).unwrap();
                    prop_assert_eq!(&selection.candidate.locator, &candidates[expected].locator);
                }
                prop_assert_eq!(selection.correlation_id.as_str(), "prop");
                Ok(())
            },
        )
        .unwrap();
}

#[test]
fn test_selection_is_stable_across_calls() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(
            &prop::collection::vec(0u32..=4, 1..10),
            |steps| {
                let candidates = candidates(steps.len());
                let evaluations: BTreeMap<String, CandidateEvaluation> = candidates
                    .iter()
                    .zip(&steps)
                    .map(|(candidate, step)| {
                        (candidate.locator.clone(), evaluation(Some(*step as f64 / 4.0)))
                    })
                    .collect();

                let first = select_best(&candidates, Some(&evaluations), "a").unwrap();
                let second = select_best(&candidates, Some(&evaluations), "b").unwrap();
                prop_assert_eq!(first.candidate, second.candidate);
                Ok(())
            },
        )
        .unwrap();
}

#[test]
fn test_empty_candidate_set_is_rejected() {
    let evaluations = BTreeMap::new();
    assert!(select_best(&[], Some(&evaluations), "none").is_err());
    assert!(select_best(&[], None, "none").is_err());
}
