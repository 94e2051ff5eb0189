//! Merge rules: defaults first, then global file, workspace files, environment.

use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
///
/// Only scalars are seeded here; list-valued defaults come from serde so a file that sets
/// `delays_ms` replaces the schedule instead of merging element-wise.
pub fn builder_with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError>
{
    Config::builder()
        .set_default("generation.max_variations", 15)?
        .set_default("generation.max_providers", 4)?
        .set_default("generation.default_size", "2048x2048")?
        .set_default("retry.max_attempts", 3)?
        .set_default("retry.max_jitter_ms", 200)
}
