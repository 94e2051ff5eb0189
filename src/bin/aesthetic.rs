//! Aesthetic CLI Binary
//!
//! Command-line interface for the generate → score → select engine.

use aesthetic_engine::cli::{map_error, Cli, RunContext};
use aesthetic_engine::config::ConfigLoader;
use aesthetic_engine::logging::{init_logging, LoggingConfig};
use anyhow::Context;
use clap::Parser;
use std::process;
use tracing::{error, info};

fn main() {
    let cli = Cli::parse();

    // Build logging config from CLI args, env vars, and config file
    let logging_config = build_logging_config(&cli);

    // Initialize logging early
    if let Err(e) = init_logging(Some(&logging_config)) {
        eprintln!("Failed to initialize logging: {}", e);
        process::exit(1);
    }

    info!("Aesthetic CLI starting");

    match run(&cli) {
        Ok(true) => {}
        Ok(false) => process::exit(2),
        Err(e) => {
            error!("Command failed: {:#}", e);
            eprintln!("{:#}", e);
            process::exit(1);
        }
    }
}

/// Execute the parsed command; `Ok(false)` means the pipeline ran but reported failure.
fn run(cli: &Cli) -> anyhow::Result<bool> {
    let context = RunContext::new(cli.workspace.clone(), cli.config.clone())
        .map_err(|e| anyhow::anyhow!(map_error(&e)))
        .context("Error initializing engine")?;
    info!("CLI context initialized");

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let output = runtime
        .block_on(context.execute(&cli.command))
        .map_err(|e| anyhow::anyhow!(map_error(&e)))?;
    println!("{}", output.text);
    Ok(output.success)
}

/// Build logging configuration from CLI args, environment, and config file
fn build_logging_config(cli: &Cli) -> LoggingConfig {
    // If --verbose is not set, disable logging
    if !cli.verbose {
        return LoggingConfig {
            level: "off".to_string(),
            ..LoggingConfig::default()
        };
    }

    // Try to load config file first
    let loaded = match &cli.config {
        Some(config_path) => ConfigLoader::load_from_file(config_path),
        None => ConfigLoader::load(&cli.workspace),
    };
    let mut config = loaded.map(|c| c.logging).unwrap_or_default();

    // Override with CLI arguments (highest priority)
    if let Some(ref level) = cli.log_level {
        config.level = level.clone();
    }
    if let Some(ref format) = cli.log_format {
        config.format = format.clone();
    }
    if let Some(ref output) = cli.log_output {
        config.output = output.clone();
    }
    if let Some(ref file) = cli.log_file {
        config.file = file.clone();
    } else if config.file.is_relative() {
        config.file = cli.workspace.join(&config.file);
    }

    config
}
