//! CLI domain: parse, route, and output only.
//! No domain orchestration; single route table dispatches to the pipeline.

mod output;
mod parse;
mod route;

pub use output::{
    format_config_toml, format_outcome_json, format_outcome_text, format_providers_json,
    format_providers_text, map_error,
};
pub use parse::{command_name, Cli, Commands, TaskArg};
pub use route::{CommandOutput, RunContext};
