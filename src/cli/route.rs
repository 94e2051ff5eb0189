//! CLI route: single route table and run context. Dispatches to the pipeline and output.

use crate::cli::output::{
    format_config_toml, format_outcome_json, format_outcome_text, format_providers_json,
    format_providers_text,
};
use crate::cli::parse::{command_name, Commands};
use crate::config::{ConfigLoader, EngineConfig};
use crate::error::ApiError;
use crate::pipeline::{Pipeline, PipelineRequest};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::info;

/// Rendered command result. `success` is false when a pipeline run reported failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub text: String,
    pub success: bool,
}

impl CommandOutput {
    fn ok(text: String) -> Self {
        Self { text, success: true }
    }
}

/// Runtime context for CLI execution: loaded configuration and the pipeline built from it.
pub struct RunContext {
    config: EngineConfig,
    pipeline: Pipeline,
    workspace_root: PathBuf,
}

impl RunContext {
    /// Create run context from workspace root and optional config path. Uses ConfigLoader only.
    pub fn new(workspace_root: PathBuf, config_path: Option<PathBuf>) -> Result<Self, ApiError> {
        let config = ConfigLoader::load_validated(&workspace_root, config_path.as_deref())?;
        Self::from_config(workspace_root, config)
    }

    pub fn from_config(workspace_root: PathBuf, config: EngineConfig) -> Result<Self, ApiError> {
        let pipeline = Pipeline::from_config(&config)?;
        Ok(Self {
            config,
            pipeline,
            workspace_root,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Execute a CLI command via the single route table.
    pub async fn execute(&self, command: &Commands) -> Result<CommandOutput, ApiError> {
        let started = Instant::now();
        info!(
            command = command_name(command),
            workspace = %self.workspace_root.display(),
            "Executing command"
        );
        let result = self.execute_inner(command).await;
        info!(
            command = command_name(command),
            ok = result.as_ref().map(|output| output.success).unwrap_or(false),
            duration_ms = started.elapsed().as_millis() as u64,
            "Command finished"
        );
        result
    }

    async fn execute_inner(&self, command: &Commands) -> Result<CommandOutput, ApiError> {
        match command {
            Commands::Run {
                prompt,
                providers,
                task,
                variations,
                modules,
                no_scoring,
                ratio,
                size,
                references,
                group_mode,
                verify_consistency,
                correlation_id,
                timeout_secs,
                format,
            } => {
                let mut request = PipelineRequest::text_to_image(prompt.clone(), providers.clone())
                    .with_variations(*variations);
                request.task = (*task).into();
                request.reference_images = references.clone();
                request.ratio = ratio.clone();
                request.size = size.clone();
                request.correlation_id = correlation_id.clone();
                request.group_mode = *group_mode;
                request.verify_consistency = *verify_consistency;
                if *no_scoring {
                    request.modules = Some(Vec::new());
                } else if !modules.is_empty() {
                    request.modules = Some(modules.clone());
                }

                let outcome = match timeout_secs {
                    Some(secs) => {
                        self.pipeline
                            .run_with_timeout(request, Duration::from_secs(*secs))
                            .await
                    }
                    None => self.pipeline.run(request).await,
                };

                let text = match format.as_str() {
                    "json" => format_outcome_json(&outcome)?,
                    _ => format_outcome_text(&outcome),
                };
                Ok(CommandOutput {
                    text,
                    success: outcome.is_success(),
                })
            }
            Commands::Providers { format } => {
                let providers = self.pipeline.registry().describe();
                let text = match format.as_str() {
                    "json" => format_providers_json(&providers)?,
                    _ => format_providers_text(&providers),
                };
                Ok(CommandOutput::ok(text))
            }
            Commands::Config => Ok(CommandOutput::ok(format_config_toml(&self.config)?)),
        }
    }
}
