// Error Types
// Configuration, state-machine and I/O errors for the gating model

use crate::expression::PredicateError;

use thiserror::Error;

pub type GateResult<T> = Result<T, GateError>;

/// Top-level error for loading, validating and evaluating pipelines
#[derive(Debug, Error)]
pub enum GateError {
    #[error("failed to read input: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid pipeline YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid result set JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{}", summarize(.0))]
    Config(Vec<ConfigError>),
}

impl From<Vec<ConfigError>> for GateError {
    fn from(errors: Vec<ConfigError>) -> Self {
        GateError::Config(errors)
    }
}

fn summarize(errors: &[ConfigError]) -> String {
    match errors {
        [] => "invalid pipeline configuration".to_string(),
        [single] => single.to_string(),
        [first, rest @ ..] => format!("{} (and {} more configuration errors)", first, rest.len()),
    }
}

/// A pipeline definition problem detected before anything runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("pipeline defines no jobs")]
    EmptyPipeline,

    #[error("job '{name}' is defined more than once")]
    DuplicateJob { name: String },

    #[error("job '{job}' needs undefined job '{dependency}'")]
    UnknownDependency { job: String, dependency: String },

    #[error("job '{job}' needs itself")]
    SelfDependency { job: String },

    #[error("circular dependency detected: {}", .cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },

    #[error("matrix axis '{axis}' of job '{job}' has no values")]
    EmptyMatrixAxis { job: String, axis: String },

    #[error("matrix axis '{axis}' of job '{job}' lists '{value}' more than once")]
    DuplicateMatrixValue {
        job: String,
        axis: String,
        value: String,
    },

    #[error("matrix axis '{axis}' of job '{job}' has value '{value}' containing ', ', which makes instance names ambiguous")]
    AmbiguousMatrixValue {
        job: String,
        axis: String,
        value: String,
    },

    #[error("step {index} of job '{job}' {reason}")]
    InvalidStep {
        job: String,
        index: usize,
        reason: String,
    },

    #[error("job '{job}' has no steps")]
    NoSteps { job: String },

    #[error("skip_if of job '{job}' is invalid: {source}")]
    InvalidPredicate {
        job: String,
        #[source]
        source: PredicateError,
    },

    #[error("aggregator '{job}' {reason}")]
    InvalidAggregator { job: String, reason: String },

    #[error("gate '{name}' is not a defined job")]
    UnknownGate { name: String },

    #[error("gate '{name}' is not an aggregator job")]
    GateNotAggregator { name: String },

    #[error("pipeline has no aggregator job to act as the gate")]
    NoGate,

    #[error("pipeline has several aggregators ({}); set 'gate' to choose one", .candidates.join(", "))]
    AmbiguousGate { candidates: Vec<String> },

    #[error("needed job '{job}' does not appear in the reported results")]
    UnreportedDependency { job: String },

    #[error("job '{job}' is not reachable from any aggregator; add it to a 'needs' list or mark it 'gating: false'")]
    UncoveredJob { job: String },
}

/// Violation of the write-once instance status contract
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StatusError {
    #[error("instance '{instance}' is already {current}; refusing to record {rejected}")]
    AlreadySettled {
        instance: String,
        current: String,
        rejected: String,
    },

    #[error("instance '{instance}' cannot be settled to pending")]
    NotTerminal { instance: String },
}
