// Mergegate Core Library
// Matrix expansion, skip predicates, dependency gating and result aggregation

pub mod error;
pub mod execution;
pub mod expression;
pub mod runners;
pub mod workflow;

// Re-export commonly used types
pub use error::{ConfigError, GateError, GateResult, StatusError};

// Re-export workflow types
pub use workflow::{JobNeeds, JobSpec, Matrix, MatrixAxis, Pipeline, PipelineParser, Step};

// Re-export expression types
pub use expression::{PredicateError, RunContext, SkipPredicate};

// Re-export execution types
pub use execution::{
    progress_channel, AggregateReport, AggregateStatus, CancelHandle, DependencyVerdict,
    ExecutionEvent, ExecutionResult, ExecutorConfig, FailureKind, InstanceId, InstanceOutcome,
    InstanceSlot, InstanceStatus, JobId, JobInstance, JobNode, MatrixExpander, PipelineExecutor,
    PipelineGraph, ProgressReceiver, ProgressSender, ReportedStatus, ResultAggregator, ResultSet,
    SkipEvaluator,
};

// Re-export runner types
pub use runners::{JobRunner, RunOutcome, RunRequest, ScriptedRunner, ShellRunner};
