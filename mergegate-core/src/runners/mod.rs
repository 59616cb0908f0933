// Runners Module
// Job runners execute the steps of one job instance

pub mod scripted;
pub mod shell;

// Re-export key types
pub use scripted::ScriptedRunner;
pub use shell::{Shell, ShellRunner};

use crate::execution::events::ProgressSender;
use crate::execution::instance::JobInstance;
use crate::workflow::models::Step;

use std::collections::HashMap;
use std::path::Path;

/// Everything a runner needs to execute one instance
#[derive(Debug, Clone)]
pub struct RunRequest<'a> {
    pub instance: &'a JobInstance,
    pub steps: &'a [Step],
    /// Pipeline, job and matrix variables, already merged
    pub env: HashMap<String, String>,
    pub working_dir: &'a Path,
    pub events: Option<ProgressSender>,
}

/// Result of running an instance's steps
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Success,
    /// The first failing step; later steps did not run
    Failure {
        step_index: usize,
        exit_code: Option<i32>,
    },
}

/// Executes the steps of a job instance in order.
///
/// Implementations stop at the first failing step and never report a
/// pending result.
#[async_trait::async_trait]
pub trait JobRunner: Send + Sync {
    async fn run(&self, request: RunRequest<'_>) -> RunOutcome;
}
