//! Property-based tests for fan-out shape, ranking, and score normalization

mod aggregation;
mod generation;
mod selection;
