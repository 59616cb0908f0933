// Execution Module
// Matrix expansion, dependency graph, skip evaluation, aggregation and orchestration

pub mod aggregate;
pub mod events;
pub mod executor;
pub mod graph;
pub mod instance;
pub mod matrix;
pub mod skip;

// Re-export key types
pub use aggregate::{
    AggregateReport, AggregateStatus, DependencyVerdict, InstanceOutcome, ReportedInstance,
    ReportedStatus, ResultAggregator, ResultSet,
};
pub use events::{progress_channel, EventSender, ExecutionEvent, ProgressReceiver, ProgressSender};
pub use executor::{CancelHandle, ExecutionResult, ExecutorConfig, PipelineExecutor};
pub use graph::{JobId, JobNode, PipelineGraph};
pub use instance::{FailureKind, InstanceId, InstanceSlot, InstanceStatus, JobInstance};
pub use matrix::MatrixExpander;
pub use skip::SkipEvaluator;
