//! CLI output: error mapping and text/json formatters for command results.

use crate::config::EngineConfig;
use crate::error::ApiError;
use crate::pipeline::{PipelineOutcome, PipelineReport};
use crate::provider::ProviderDescriptor;
use crate::types::VerificationStatus;
use comfy_table::{presets::UTF8_FULL, Table};
use serde_json::json;

/// Map domain errors to a string for CLI output.
pub fn map_error(e: &ApiError) -> String {
    e.to_string()
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, ApiError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| ApiError::InvalidRequest(format!("Failed to serialize output: {}", e)))
}

pub fn format_outcome_json(outcome: &PipelineOutcome) -> Result<String, ApiError> {
    to_json(outcome)
}

pub fn format_outcome_text(outcome: &PipelineOutcome) -> String {
    match outcome {
        PipelineOutcome::Failed(failure) => format!(
            "Pipeline failed\n  Correlation: {}\n  Reason: {}",
            failure.correlation_id, failure.message
        ),
        PipelineOutcome::Success(report) => format_report_text(report),
    }
}

fn format_score(score: Option<f64>) -> String {
    score
        .map(|score| format!("{:.3}", score))
        .unwrap_or_else(|| "-".to_string())
}

fn format_report_text(report: &PipelineReport) -> String {
    let mut output = format!(
        "Best candidate:\n  Locator: {}\n  Provider: {}\n  Composite: {}\n  Correlation: {}\n  Summary: {}\n",
        report.best_locator,
        report.best_provider,
        format_score(report.composite_score),
        report.correlation_id,
        report.summary
    );

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["#", "Provider", "Seq", "Composite", "Scores", "Consistency", "Locator"]);
    for (index, candidate) in report.candidates.iter().enumerate() {
        let scores = candidate
            .scores
            .iter()
            .map(|(module, score)| format!("{}={:.3}", module, score))
            .collect::<Vec<_>>()
            .join(" ");
        let sequence = match (candidate.sequence_index, candidate.group_size) {
            (Some(index), Some(size)) => format!("{}/{}", index + 1, size),
            (Some(index), None) => index.to_string(),
            (None, _) => "-".to_string(),
        };
        let consistency = match &candidate.verification {
            Some(check) if check.status == VerificationStatus::Scored => format!("{:.3}", check.score),
            Some(_) => "review".to_string(),
            None => "-".to_string(),
        };
        table.add_row(vec![
            (index + 1).to_string(),
            candidate.provider.clone(),
            sequence,
            format_score(candidate.composite_score),
            if scores.is_empty() { "-".to_string() } else { scores },
            consistency,
            crate::types::display_locator(&candidate.locator).to_string(),
        ]);
    }
    output.push_str(&format!("\n{}\n", table));
    output.push_str(&format!(
        "\nProviders: {}\nModules: {}\nDropped attempts: {}",
        report.providers_used.join(", "),
        if report.modules_used.is_empty() {
            "(none)".to_string()
        } else {
            report.modules_used.join(", ")
        },
        report.failed_attempts
    ));
    output
}

pub fn format_providers_text(providers: &[ProviderDescriptor]) -> String {
    if providers.is_empty() {
        return "No providers configured.\n\nAdd a [providers.<id>] section to config/config.toml."
            .to_string();
    }
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["ID", "Type", "Model", "Batch"]);
    for provider in providers {
        let batch = if provider.supports_batch {
            format!("up to {}", provider.max_batch)
        } else {
            "no".to_string()
        };
        table.add_row(vec![
            provider.id.clone(),
            provider.kind.clone(),
            provider.model.clone(),
            batch,
        ]);
    }
    format!("{}\n\nTotal: {} provider(s)", table, providers.len())
}

pub fn format_providers_json(providers: &[ProviderDescriptor]) -> Result<String, ApiError> {
    to_json(&json!({ "providers": providers, "total": providers.len() }))
}

pub fn format_config_toml(config: &EngineConfig) -> Result<String, ApiError> {
    toml::to_string_pretty(config)
        .map_err(|e| ApiError::ConfigError(format!("Failed to render configuration: {}", e)))
}
