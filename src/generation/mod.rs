//! Candidate generation: plan the provider calls for a request, then run them concurrently.
//! The plan owns fan-out shape; the executor owns gating, pacing, retries, and tagging.

pub mod executor;
pub mod plan;

pub use executor::{AttemptFailure, CandidateGenerator, GenerationReport};
pub use plan::{AttemptKind, GenerationPlan, PlannedAttempt, ProviderPlan};
