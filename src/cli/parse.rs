//! CLI parse: clap types for the `aesthetic` binary. No behavior; definitions only.

use crate::types::TaskKind;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Aesthetic CLI - generate candidates across providers, score them, keep the best
#[derive(Parser)]
#[command(name = "aesthetic")]
#[command(about = "Multi-provider image generation with scoring and deterministic selection")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging (default: off)
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output is "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one generate → score → select pipeline
    Run {
        /// Prompt text
        #[arg(long)]
        prompt: String,

        /// Provider id (repeat for several providers)
        #[arg(long = "provider", required = true)]
        providers: Vec<String>,

        /// Task kind
        #[arg(long, value_enum, default_value_t = TaskArg::TextToImage)]
        task: TaskArg,

        /// Candidates per provider
        #[arg(long, default_value = "1")]
        variations: u32,

        /// Scoring module (repeat; omit for configured defaults)
        #[arg(long = "module")]
        modules: Vec<String>,

        /// Skip scoring and keep the first candidate
        #[arg(long, conflicts_with = "modules")]
        no_scoring: bool,

        /// Aspect ratio (1:1, 3:4, 4:3, 9:16, 16:9)
        #[arg(long, conflicts_with = "size")]
        ratio: Option<String>,

        /// Explicit size, e.g. 1024x1024
        #[arg(long)]
        size: Option<String>,

        /// Reference image URL (repeat; required for image-to-image)
        #[arg(long = "reference")]
        references: Vec<String>,

        /// Score each provider's candidates as one set (holistic only, best first)
        #[arg(long)]
        group_mode: bool,

        /// Check candidates against the reference images
        #[arg(long, requires = "references")]
        verify_consistency: bool,

        /// Correlation id for the run (generated when omitted)
        #[arg(long)]
        correlation_id: Option<String>,

        /// Abandon the run after this many seconds
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// List registered providers
    Providers {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Print the effective configuration as TOML
    Config,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TaskArg {
    #[value(name = "text-to-image", alias = "t2i")]
    TextToImage,
    #[value(name = "image-to-image", alias = "i2i")]
    ImageToImage,
}

impl From<TaskArg> for TaskKind {
    fn from(task: TaskArg) -> Self {
        match task {
            TaskArg::TextToImage => TaskKind::TextToImage,
            TaskArg::ImageToImage => TaskKind::ImageToImage,
        }
    }
}

/// Command name used in log fields.
pub fn command_name(command: &Commands) -> &'static str {
    match command {
        Commands::Run { .. } => "run",
        Commands::Providers { .. } => "providers",
        Commands::Config => "config",
    }
}
