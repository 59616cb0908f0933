// Execution Events
// Progress reporting and event types for pipeline execution

use crate::execution::aggregate::{AggregateReport, AggregateStatus};
use crate::execution::instance::InstanceStatus;

use std::time::Duration;
use tokio::sync::mpsc;

/// Sender for execution progress events
pub type ProgressSender = mpsc::UnboundedSender<ExecutionEvent>;

/// Receiver for execution progress events
pub type ProgressReceiver = mpsc::UnboundedReceiver<ExecutionEvent>;

/// Create a new progress channel
pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    mpsc::unbounded_channel()
}

/// Events emitted during pipeline execution
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    /// Pipeline execution started
    PipelineStarted {
        pipeline_name: String,
        total_jobs: usize,
        total_instances: usize,
    },

    /// Pipeline execution completed with the gate signal
    PipelineCompleted {
        pipeline_name: String,
        status: AggregateStatus,
        duration: Duration,
    },

    /// Job was skipped by its skip_if predicate
    JobSkipped {
        job_name: String,
        predicate: String,
        instances: usize,
    },

    /// Job did not run because a needed job failed
    JobBlocked {
        job_name: String,
        failed_dependencies: Vec<String>,
    },

    /// Instance handed to the job runner
    InstanceStarted { instance: String, total_steps: usize },

    /// Instance reached its terminal status
    InstanceCompleted {
        instance: String,
        status: InstanceStatus,
        duration: Duration,
    },

    /// Step execution started
    StepStarted {
        instance: String,
        step_index: usize,
        display_name: String,
    },

    /// Step output (stdout/stderr)
    StepOutput {
        instance: String,
        step_index: usize,
        output: String,
        is_error: bool,
    },

    /// Step execution completed
    StepCompleted {
        instance: String,
        step_index: usize,
        success: bool,
        exit_code: Option<i32>,
        duration: Duration,
    },

    /// Step was not executed by this runner
    StepSkipped {
        instance: String,
        step_index: usize,
        display_name: String,
        reason: String,
    },

    /// An aggregator job computed its status
    AggregateComputed {
        job_name: String,
        report: AggregateReport,
    },

    /// The run was cancelled or hit its deadline
    Cancelled { reason: String },
}

impl ExecutionEvent {
    pub fn pipeline_started(
        name: impl Into<String>,
        total_jobs: usize,
        total_instances: usize,
    ) -> Self {
        Self::PipelineStarted {
            pipeline_name: name.into(),
            total_jobs,
            total_instances,
        }
    }

    pub fn pipeline_completed(
        name: impl Into<String>,
        status: AggregateStatus,
        duration: Duration,
    ) -> Self {
        Self::PipelineCompleted {
            pipeline_name: name.into(),
            status,
            duration,
        }
    }

    pub fn job_skipped(
        job_name: impl Into<String>,
        predicate: impl Into<String>,
        instances: usize,
    ) -> Self {
        Self::JobSkipped {
            job_name: job_name.into(),
            predicate: predicate.into(),
            instances,
        }
    }

    pub fn job_blocked(job_name: impl Into<String>, failed_dependencies: Vec<String>) -> Self {
        Self::JobBlocked {
            job_name: job_name.into(),
            failed_dependencies,
        }
    }

    pub fn instance_started(instance: impl Into<String>, total_steps: usize) -> Self {
        Self::InstanceStarted {
            instance: instance.into(),
            total_steps,
        }
    }

    pub fn instance_completed(
        instance: impl Into<String>,
        status: InstanceStatus,
        duration: Duration,
    ) -> Self {
        Self::InstanceCompleted {
            instance: instance.into(),
            status,
            duration,
        }
    }

    pub fn step_started(
        instance: impl Into<String>,
        step_index: usize,
        display_name: impl Into<String>,
    ) -> Self {
        Self::StepStarted {
            instance: instance.into(),
            step_index,
            display_name: display_name.into(),
        }
    }

    pub fn step_output(
        instance: impl Into<String>,
        step_index: usize,
        output: impl Into<String>,
        is_error: bool,
    ) -> Self {
        Self::StepOutput {
            instance: instance.into(),
            step_index,
            output: output.into(),
            is_error,
        }
    }

    pub fn step_completed(
        instance: impl Into<String>,
        step_index: usize,
        exit_code: Option<i32>,
        duration: Duration,
    ) -> Self {
        Self::StepCompleted {
            instance: instance.into(),
            step_index,
            success: exit_code == Some(0),
            exit_code,
            duration,
        }
    }

    pub fn step_skipped(
        instance: impl Into<String>,
        step_index: usize,
        display_name: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::StepSkipped {
            instance: instance.into(),
            step_index,
            display_name: display_name.into(),
            reason: reason.into(),
        }
    }

    pub fn aggregate_computed(job_name: impl Into<String>, report: AggregateReport) -> Self {
        Self::AggregateComputed {
            job_name: job_name.into(),
            report,
        }
    }

    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::Cancelled {
            reason: reason.into(),
        }
    }
}

/// Helper trait for sending events, ignoring errors (fire-and-forget)
pub trait EventSender {
    fn send_event(&self, event: ExecutionEvent);
}

impl EventSender for ProgressSender {
    fn send_event(&self, event: ExecutionEvent) {
        let _ = self.send(event);
    }
}

impl EventSender for Option<ProgressSender> {
    fn send_event(&self, event: ExecutionEvent) {
        if let Some(sender) = self {
            let _ = sender.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_progress_channel() {
        let (tx, mut rx) = progress_channel();

        tx.send_event(ExecutionEvent::pipeline_started("CI", 3, 5));
        tx.send_event(ExecutionEvent::job_skipped(
            "rstar",
            "contains(commit.message, '[ci skip]')",
            3,
        ));

        let first = rx.recv().await.unwrap();
        assert!(matches!(
            first,
            ExecutionEvent::PipelineStarted {
                total_instances: 5,
                ..
            }
        ));

        let second = rx.recv().await.unwrap();
        assert!(matches!(second, ExecutionEvent::JobSkipped { instances: 3, .. }));
    }

    #[test]
    fn test_step_completed_success_flag() {
        let ok = ExecutionEvent::step_completed("no_std", 0, Some(0), Duration::from_secs(1));
        assert!(matches!(ok, ExecutionEvent::StepCompleted { success: true, .. }));

        let killed = ExecutionEvent::step_completed("no_std", 0, None, Duration::from_secs(1));
        assert!(matches!(
            killed,
            ExecutionEvent::StepCompleted { success: false, .. }
        ));
    }

    #[test]
    fn test_optional_sender() {
        let sender: Option<ProgressSender> = None;
        // Should not panic
        sender.send_event(ExecutionEvent::cancelled("interrupted"));
    }

    #[test]
    fn test_closed_channel_is_ignored() {
        let (tx, rx) = progress_channel();
        drop(rx);
        tx.send_event(ExecutionEvent::cancelled("interrupted"));
    }
}
