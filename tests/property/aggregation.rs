//! Score normalization and aggregation bookkeeping hold for arbitrary inputs.

use aesthetic_engine::scoring::clamp_holistic;
use aesthetic_engine::types::{clamp_unit, AggregationResult, CandidateEvaluation};
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

#[test]
fn test_normalized_scores_stay_in_unit_range() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&any::<f64>(), |value| {
            let holistic = clamp_holistic(value);
            prop_assert!((0.0..=1.0).contains(&holistic), "{} -> {}", value, holistic);

            let unit = clamp_unit(value);
            prop_assert!((0.0..=1.0).contains(&unit), "{} -> {}", value, unit);
            Ok(())
        })
        .unwrap();
}

#[test]
fn test_composite_is_clamped_holistic_or_zero() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(
            &(proptest::option::of(any::<f64>()), 0.0f64..=1.0),
            |(holistic, color)| {
                let mut scores = BTreeMap::from([("color_score".to_string(), color)]);
                if let Some(value) = holistic {
                    scores.insert("holistic".to_string(), value);
                }
                let evaluation = CandidateEvaluation::from_scores(scores, BTreeMap::new());

                prop_assert!((0.0..=1.0).contains(&evaluation.composite_score));
                match holistic {
                    Some(value) => prop_assert_eq!(evaluation.composite_score, clamp_unit(value)),
                    None => prop_assert_eq!(evaluation.composite_score, 0.0),
                }
                prop_assert!(!evaluation.visible_scores().contains_key("holistic"));
                Ok(())
            },
        )
        .unwrap();
}

#[test]
fn test_modules_used_is_sorted_union() {
    let mut runner = proptest::test_runner::TestRunner::default();
    let names = ["holistic", "color_score", "contrast_score", "clarity_eval", "noise_eval"];

    runner
        .run(
            &prop::collection::vec(prop::collection::btree_set(0usize..names.len(), 0..5), 0..6),
            |per_candidate| {
                let evaluations: BTreeMap<String, CandidateEvaluation> = per_candidate
                    .iter()
                    .enumerate()
                    .map(|(index, modules)| {
                        let scores = modules
                            .iter()
                            .map(|module| (names[*module].to_string(), 0.5))
                            .collect();
                        (
                            format!("https://img/{}.png", index),
                            CandidateEvaluation::from_scores(scores, BTreeMap::new()),
                        )
                    })
                    .collect();

                let expected: Vec<String> = per_candidate
                    .iter()
                    .flatten()
                    .map(|module| names[*module].to_string())
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .collect();

                let result = AggregationResult::from_evaluations(evaluations);
                prop_assert_eq!(result.modules_used, expected);
                Ok(())
            },
        )
        .unwrap();
}
