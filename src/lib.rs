//! Aesthetic Engine: generate, score, select
//!
//! Fans a creative request out to several unreliable image providers, scores every candidate
//! across pluggable modules, and deterministically keeps the best one.

pub mod cli;
pub mod config;
pub mod error;
pub mod generation;
pub mod logging;
pub mod pipeline;
pub mod provider;
pub mod retry;
pub mod scoring;
pub mod selector;
pub mod types;

pub use error::{ApiError, ProviderError, ScoringError};
pub use pipeline::{Pipeline, PipelineOutcome, PipelineReport, PipelineRequest};
pub use types::{
    AggregationResult, Candidate, CandidateEvaluation, ConsistencyCheck, GenerationRequest,
    ModuleScore, SelectionResult, TaskKind, VerificationStatus,
};
