//! Scoring modules: one named scorer per quality dimension.

use crate::error::ScoringError;
use crate::types::{round3, Candidate, ModuleName, ModuleScore};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;

/// Per-run inputs shared by every module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoringContext {
    /// Run identifier; also seeds the deterministic fallback scorers.
    pub correlation_id: String,
}

impl ScoringContext {
    pub fn new(correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
        }
    }
}

/// A single named scorer producing one [`ModuleScore`] per candidate.
#[async_trait]
pub trait ScoreModule: Send + Sync {
    fn name(&self) -> &str;

    async fn score(
        &self,
        ctx: &ScoringContext,
        candidate: &Candidate,
    ) -> Result<ModuleScore, ScoringError>;
}

/// Stable pseudo-score in [0, 1) with millesimal resolution, derived from `seed` and `offset`.
pub fn deterministic_score(seed: &str, offset: u32) -> f64 {
    let digest = blake3::hash(format!("{}:{}", seed, offset).as_bytes());
    let bytes = digest.as_bytes();
    let prefix = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    round3(f64::from(prefix % 1000) / 1000.0)
}

/// Placeholder scorer used when no model backs a dimension. Identical inputs always produce
/// identical scores, which keeps selection reproducible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterministicModule {
    name: &'static str,
    offset: u32,
    /// Report `1 - raw` (for "lower is better" dimensions such as noise)
    inverted: bool,
}

impl DeterministicModule {
    pub const fn new(name: &'static str, offset: u32, inverted: bool) -> Self {
        Self {
            name,
            offset,
            inverted,
        }
    }

    pub const fn color() -> Self {
        Self::new("color_score", 1, false)
    }

    pub const fn contrast() -> Self {
        Self::new("contrast_score", 2, false)
    }

    pub const fn clarity() -> Self {
        Self::new("clarity_eval", 3, false)
    }

    pub const fn noise() -> Self {
        Self::new("noise_eval", 4, true)
    }

    pub const fn quality() -> Self {
        Self::new("quality_score", 5, false)
    }

    pub fn score_for(&self, correlation_id: &str, locator: &str) -> f64 {
        let raw = deterministic_score(&format!("{}:{}", correlation_id, locator), self.offset);
        if self.inverted {
            round3(1.0 - raw)
        } else {
            raw
        }
    }
}

#[async_trait]
impl ScoreModule for DeterministicModule {
    fn name(&self) -> &str {
        self.name
    }

    async fn score(
        &self,
        ctx: &ScoringContext,
        candidate: &Candidate,
    ) -> Result<ModuleScore, ScoringError> {
        Ok(ModuleScore::new(
            self.name,
            self.score_for(&ctx.correlation_id, &candidate.locator),
        ))
    }
}

/// Registered name with no local implementation; its score only ever arrives through the
/// vision evaluator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisionOnlyModule {
    name: String,
}

impl VisionOnlyModule {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl ScoreModule for VisionOnlyModule {
    fn name(&self) -> &str {
        &self.name
    }

    async fn score(
        &self,
        _ctx: &ScoringContext,
        _candidate: &Candidate,
    ) -> Result<ModuleScore, ScoringError> {
        Err(ScoringError::Disabled(format!(
            "{} is only produced by the vision evaluator",
            self.name
        )))
    }
}

/// The five placeholder dimensions in their canonical order.
pub fn fallback_modules() -> Vec<Arc<dyn ScoreModule>> {
    vec![
        Arc::new(DeterministicModule::color()),
        Arc::new(DeterministicModule::contrast()),
        Arc::new(DeterministicModule::clarity()),
        Arc::new(DeterministicModule::noise()),
        Arc::new(DeterministicModule::quality()),
    ]
}

/// Ordered set of modules with unique names.
#[derive(Clone, Default)]
pub struct ModuleSet {
    modules: Vec<Arc<dyn ScoreModule>>,
}

impl ModuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a module; a module with the same name replaces the earlier one in place.
    pub fn register(mut self, module: Arc<dyn ScoreModule>) -> Self {
        match self.modules.iter().position(|m| m.name() == module.name()) {
            Some(index) => self.modules[index] = module,
            None => self.modules.push(module),
        }
        self
    }

    pub fn names(&self) -> Vec<ModuleName> {
        self.modules.iter().map(|m| m.name().to_string()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn ScoreModule>> {
        self.modules.iter().find(|m| m.name() == name)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Resolve requested names to modules in registration order. An empty request, or one
    /// naming no registered module, selects everything; unknown names are ignored.
    pub fn select(&self, requested: &[ModuleName]) -> Vec<Arc<dyn ScoreModule>> {
        let wanted: HashSet<&str> = requested.iter().map(|name| name.trim()).collect();
        let selected: Vec<Arc<dyn ScoreModule>> = self
            .modules
            .iter()
            .filter(|m| wanted.contains(m.name()))
            .cloned()
            .collect();
        if selected.is_empty() {
            self.modules.clone()
        } else {
            selected
        }
    }
}

impl std::fmt::Debug for ModuleSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleSet")
            .field("modules", &self.names())
            .finish()
    }
}
