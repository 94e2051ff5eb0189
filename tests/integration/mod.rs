//! Integration tests for the generate, score, select pipeline

mod support;

mod config;
mod generation;
mod registry;
mod scoring;
