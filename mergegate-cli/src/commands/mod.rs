pub mod aggregate;
pub mod plan;
pub mod run;
pub mod validate;

use crate::output;

use std::path::{Path, PathBuf};

use clap::Args;
use color_eyre::eyre::{bail, WrapErr};
use color_eyre::Result;

use mergegate_core::{GateError, PipelineGraph, PipelineParser, RunContext};

/// Exit code for definitions that fail validation; nothing runs
pub const EXIT_CONFIG: i32 = 2;

/// Facts about the run that skip predicates can inspect
#[derive(Args, Debug, Default)]
pub struct ContextArgs {
    /// Commit message seen by skip predicates
    #[arg(long, env = "MERGEGATE_COMMIT_MESSAGE", value_name = "TEXT")]
    pub commit_message: Option<String>,

    /// Read the commit message from a file (takes precedence over --commit-message)
    #[arg(long, value_name = "FILE")]
    pub commit_message_file: Option<PathBuf>,

    /// Branch being built (commit.branch)
    #[arg(long, env = "MERGEGATE_BRANCH")]
    pub branch: Option<String>,

    /// Triggering event, e.g. push or pull_request
    #[arg(long, env = "MERGEGATE_EVENT")]
    pub event: Option<String>,

    /// Variable visible to predicates as env.NAME (can be repeated)
    #[arg(long = "env", short = 'e', value_name = "NAME=VALUE")]
    pub env: Vec<String>,
}

impl ContextArgs {
    pub fn to_context(&self) -> Result<RunContext> {
        let message = match &self.commit_message_file {
            Some(path) => std::fs::read_to_string(path).wrap_err_with(|| {
                format!("failed to read commit message from {}", path.display())
            })?,
            None => self.commit_message.clone().unwrap_or_default(),
        };

        let mut context = RunContext::new(message);
        context.branch = self.branch.clone();
        context.event = self.event.clone();

        for pair in &self.env {
            let Some((name, value)) = pair.split_once('=') else {
                bail!("Invalid variable format '{}'. Expected NAME=VALUE", pair);
            };
            context = context.with_env(name, value);
        }

        Ok(context)
    }
}

/// Load and validate a pipeline, printing every configuration error.
///
/// Returns `None` when the definition is unusable.
pub fn load_graph(path: &Path) -> Option<PipelineGraph> {
    output::status("Loading", &path.display().to_string());

    match PipelineParser::load(path) {
        Ok(graph) => Some(graph),
        Err(GateError::Config(errors)) => {
            output::error(&format!("{} configuration error(s):", errors.len()));
            for error in &errors {
                output::error(&format!("  - {}", error));
            }
            None
        }
        Err(e) => {
            output::error(&format!("{}: {}", path.display(), e));
            None
        }
    }
}
