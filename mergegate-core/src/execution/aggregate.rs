// Result Aggregation
// Reduces the statuses of every instance of a set of jobs to one gate signal

use crate::error::{ConfigError, GateResult};
use crate::execution::instance::{FailureKind, InstanceStatus};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Terminal status of one instance as recorded in a result set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceOutcome {
    pub instance: String,
    pub status: InstanceStatus,
}

/// Job name to the statuses of all of that job's instances
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultSet {
    jobs: BTreeMap<String, Vec<InstanceOutcome>>,
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job, possibly without any instances
    pub fn insert_job(&mut self, job: impl Into<String>) {
        self.jobs.entry(job.into()).or_default();
    }

    pub fn record(
        &mut self,
        job: impl Into<String>,
        instance: impl Into<String>,
        status: InstanceStatus,
    ) {
        self.jobs
            .entry(job.into())
            .or_default()
            .push(InstanceOutcome {
                instance: instance.into(),
                status,
            });
    }

    pub fn get(&self, job: &str) -> Option<&[InstanceOutcome]> {
        self.jobs.get(job).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[InstanceOutcome])> {
        self.jobs
            .iter()
            .map(|(job, outcomes)| (job.as_str(), outcomes.as_slice()))
    }

    /// Check that every needed job appears, even if only with an empty list.
    ///
    /// A job absent from an externally reported set was never reported, which
    /// is a configuration problem rather than a pass.
    pub fn require_jobs(&self, jobs: &[String]) -> Result<(), Vec<ConfigError>> {
        let errors: Vec<ConfigError> = jobs
            .iter()
            .filter(|job| !self.jobs.contains_key(job.as_str()))
            .map(|job| ConfigError::UnreportedDependency { job: job.clone() })
            .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Parse a result set reported by an external CI platform.
    ///
    /// Each job maps to a list whose entries are either a bare status
    /// (`"success"`) or an object with `instance` and `status` fields.
    pub fn from_json(content: &str) -> GateResult<Self> {
        let reported: BTreeMap<String, Vec<ReportedInstance>> = serde_json::from_str(content)?;
        Ok(Self::from_reported(reported))
    }

    pub fn from_reported(reported: BTreeMap<String, Vec<ReportedInstance>>) -> Self {
        let mut results = Self::new();

        for (job, instances) in reported {
            results.insert_job(job.clone());
            for (i, entry) in instances.into_iter().enumerate() {
                let (instance, status) = match entry {
                    ReportedInstance::Bare(status) => (format!("{} #{}", job, i + 1), status),
                    ReportedInstance::Named { instance, status } => (instance, status),
                };
                results.record(job.clone(), instance, status.into());
            }
        }

        results
    }
}

/// Instance entry in an externally reported result set
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ReportedInstance {
    Bare(ReportedStatus),
    Named {
        instance: String,
        status: ReportedStatus,
    },
}

/// Status vocabulary accepted from external platforms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportedStatus {
    #[serde(alias = "succeeded")]
    Success,
    #[serde(alias = "failed")]
    Failure,
    Skipped,
    Pending,
    #[serde(alias = "canceled")]
    Cancelled,
    TimedOut,
}

impl From<ReportedStatus> for InstanceStatus {
    fn from(status: ReportedStatus) -> Self {
        match status {
            ReportedStatus::Success => InstanceStatus::Success,
            ReportedStatus::Failure => InstanceStatus::Failure(FailureKind::Reported),
            ReportedStatus::Skipped => InstanceStatus::Skipped,
            ReportedStatus::Pending => InstanceStatus::Pending,
            ReportedStatus::Cancelled => InstanceStatus::Failure(FailureKind::Cancelled),
            ReportedStatus::TimedOut => InstanceStatus::Failure(FailureKind::TimedOut),
        }
    }
}

/// The gate signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateStatus {
    Success,
    Failure,
}

impl AggregateStatus {
    pub fn is_success(self) -> bool {
        self == AggregateStatus::Success
    }

    /// Process exit code carrying this signal
    pub fn exit_code(self) -> i32 {
        match self {
            AggregateStatus::Success => 0,
            AggregateStatus::Failure => 1,
        }
    }
}

impl fmt::Display for AggregateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregateStatus::Success => write!(f, "success"),
            AggregateStatus::Failure => write!(f, "failure"),
        }
    }
}

/// How one dependency fared
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyVerdict {
    pub job: String,
    pub passed: bool,
    /// False when the job is absent from the result set
    pub reported: bool,
    pub total: usize,
    pub succeeded: usize,
    pub skipped: usize,
    /// Instances that failed, with the failure reason
    pub failed: Vec<String>,
    /// Instances still pending at evaluation time
    pub pending: Vec<String>,
}

/// Aggregate status plus the per-dependency detail behind it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateReport {
    pub status: AggregateStatus,
    pub dependencies: Vec<DependencyVerdict>,
}

impl AggregateReport {
    /// Names of the dependencies that did not pass
    pub fn failed_dependencies(&self) -> Vec<&str> {
        self.dependencies
            .iter()
            .filter(|d| !d.passed)
            .map(|d| d.job.as_str())
            .collect()
    }
}

pub struct ResultAggregator;

impl ResultAggregator {
    /// Reduce the results of the named dependencies to one status.
    ///
    /// A dependency passes iff every instance succeeded or was skipped.
    /// Pending instances count as failures, and so does a dependency missing
    /// from `results`. A dependency present with no instances passes. The
    /// result is success iff every dependency passed, so an empty dependency
    /// list succeeds.
    pub fn aggregate(dependencies: &[String], results: &ResultSet) -> AggregateReport {
        let verdicts: Vec<DependencyVerdict> = dependencies
            .iter()
            .map(|job| match results.get(job) {
                Some(outcomes) => Self::judge(job, outcomes),
                None => Self::unreported(job),
            })
            .collect();

        let status = if verdicts.iter().all(|v| v.passed) {
            AggregateStatus::Success
        } else {
            AggregateStatus::Failure
        };

        AggregateReport {
            status,
            dependencies: verdicts,
        }
    }

    fn unreported(job: &str) -> DependencyVerdict {
        DependencyVerdict {
            job: job.to_string(),
            passed: false,
            reported: false,
            total: 0,
            succeeded: 0,
            skipped: 0,
            failed: Vec::new(),
            pending: Vec::new(),
        }
    }

    fn judge(job: &str, outcomes: &[InstanceOutcome]) -> DependencyVerdict {
        let mut verdict = DependencyVerdict {
            job: job.to_string(),
            passed: true,
            reported: true,
            total: outcomes.len(),
            succeeded: 0,
            skipped: 0,
            failed: Vec::new(),
            pending: Vec::new(),
        };

        for outcome in outcomes {
            match &outcome.status {
                InstanceStatus::Success => verdict.succeeded += 1,
                InstanceStatus::Skipped => verdict.skipped += 1,
                InstanceStatus::Failure(kind) => {
                    verdict.failed.push(format!("{}: {}", outcome.instance, kind))
                }
                InstanceStatus::Pending => verdict.pending.push(outcome.instance.clone()),
            }
        }

        verdict.passed = verdict.failed.is_empty() && verdict.pending.is_empty();
        verdict
    }
}
