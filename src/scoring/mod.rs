//! Candidate scoring: named modules, the remote vision and holistic scorers, and the
//! aggregator that merges them into one evaluation per candidate.

pub mod aggregator;
pub mod extract;
pub mod holistic;
pub mod modules;
pub mod vision;

pub use aggregator::ScoringAggregator;
pub use holistic::{clamp_holistic, HolisticScorer};
pub use modules::{
    deterministic_score, fallback_modules, DeterministicModule, ModuleSet, ScoreModule,
    ScoringContext, VisionOnlyModule,
};
pub use vision::{HttpVisionEvaluator, VisionEvaluator, VisionVerdict};
