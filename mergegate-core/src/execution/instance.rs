// Job Instances
// Instance identity, terminal statuses and the write-once status slot

use crate::error::StatusError;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Identity of one matrix combination of a job.
///
/// Two instances are the same iff they belong to the same job and picked
/// the same value on every axis, in axis declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceId {
    pub job: String,
    pub values: Vec<String>,
}

impl InstanceId {
    pub fn new(job: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            job: job.into(),
            values,
        }
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.values.is_empty() {
            write!(f, "{}", self.job)
        } else {
            write!(f, "{} ({})", self.job, self.values.join(", "))
        }
    }
}

/// One concrete point of a job's matrix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobInstance {
    pub id: InstanceId,
    /// Axis name and chosen value, in axis declaration order
    pub parameters: Vec<(String, String)>,
}

impl JobInstance {
    /// Environment variables exposing the matrix values to steps
    pub fn matrix_env(&self) -> Vec<(String, String)> {
        self.parameters
            .iter()
            .map(|(axis, value)| (matrix_env_name(axis), value.clone()))
            .collect()
    }
}

/// `container_image` becomes `MATRIX_CONTAINER_IMAGE`
pub fn matrix_env_name(axis: &str) -> String {
    let normalized: String = axis
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("MATRIX_{}", normalized)
}

/// Why an instance failed. Aggregation treats every kind the same.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// A step exited unsuccessfully
    StepFailed {
        step_index: usize,
        exit_code: Option<i32>,
    },
    /// The instance exceeded its deadline
    TimedOut,
    /// The run was cancelled before the instance finished
    Cancelled,
    /// A needed job failed, so this instance never ran
    DependencyFailed,
    /// Reported as failed by an external runner
    Reported,
    /// The runner task ended without reporting a result
    RunnerAborted,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::StepFailed {
                step_index,
                exit_code: Some(code),
            } => write!(f, "step {} exited with code {}", step_index + 1, code),
            FailureKind::StepFailed {
                step_index,
                exit_code: None,
            } => write!(f, "step {} failed", step_index + 1),
            FailureKind::TimedOut => write!(f, "timed out"),
            FailureKind::Cancelled => write!(f, "cancelled"),
            FailureKind::DependencyFailed => write!(f, "dependency failed"),
            FailureKind::Reported => write!(f, "reported failure"),
            FailureKind::RunnerAborted => write!(f, "runner aborted"),
        }
    }
}

/// Status of a job instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Pending,
    Success,
    Failure(FailureKind),
    Skipped,
}

impl InstanceStatus {
    /// Whether this status lets a dependency pass
    pub fn passes(&self) -> bool {
        matches!(self, InstanceStatus::Success | InstanceStatus::Skipped)
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, InstanceStatus::Pending)
    }

    pub fn label(&self) -> &'static str {
        match self {
            InstanceStatus::Pending => "pending",
            InstanceStatus::Success => "success",
            InstanceStatus::Failure(_) => "failure",
            InstanceStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstanceStatus::Failure(kind) => write!(f, "failure ({})", kind),
            other => f.write_str(other.label()),
        }
    }
}

/// Write-once status cell for one instance.
///
/// Reads before settlement observe `Pending`. The first terminal status
/// wins; later writes are rejected.
#[derive(Debug)]
pub struct InstanceSlot {
    instance: JobInstance,
    status: OnceLock<InstanceStatus>,
}

static PENDING: InstanceStatus = InstanceStatus::Pending;

impl InstanceSlot {
    pub fn new(instance: JobInstance) -> Self {
        Self {
            instance,
            status: OnceLock::new(),
        }
    }

    pub fn instance(&self) -> &JobInstance {
        &self.instance
    }

    pub fn status(&self) -> &InstanceStatus {
        self.status.get().unwrap_or(&PENDING)
    }

    pub fn is_pending(&self) -> bool {
        self.status.get().is_none()
    }

    /// Record the terminal status of this instance
    pub fn settle(&self, status: InstanceStatus) -> Result<(), StatusError> {
        if !status.is_terminal() {
            return Err(StatusError::NotTerminal {
                instance: self.instance.id.to_string(),
            });
        }

        self.status.set(status).map_err(|rejected| StatusError::AlreadySettled {
            instance: self.instance.id.to_string(),
            current: self.status().to_string(),
            rejected: rejected.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance(job: &str, values: &[&str]) -> JobInstance {
        JobInstance {
            id: InstanceId::new(job, values.iter().map(|v| v.to_string()).collect()),
            parameters: values
                .iter()
                .enumerate()
                .map(|(i, v)| (format!("axis{}", i), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn test_identity_display() {
        assert_eq!(instance("no_std", &[]).id.to_string(), "no_std");
        assert_eq!(
            instance("rstar", &["rust-1.63", "linux"]).id.to_string(),
            "rstar (rust-1.63, linux)"
        );
    }

    #[test]
    fn test_identity_is_structural() {
        // Same display text, different identities
        let joined = InstanceId::new("job", vec!["a, b".to_string()]);
        let split = InstanceId::new("job", vec!["a".to_string(), "b".to_string()]);
        assert_eq!(joined.to_string(), split.to_string());
        assert_ne!(joined, split);
    }

    #[test]
    fn test_matrix_env_name() {
        assert_eq!(matrix_env_name("container_image"), "MATRIX_CONTAINER_IMAGE");
        assert_eq!(matrix_env_name("rust-version"), "MATRIX_RUST_VERSION");
        let env = instance("rstar", &["img"]).matrix_env();
        assert_eq!(env, vec![("MATRIX_AXIS0".to_string(), "img".to_string())]);
    }

    #[test]
    fn test_status_predicates() {
        assert!(InstanceStatus::Success.passes());
        assert!(InstanceStatus::Skipped.passes());
        assert!(!InstanceStatus::Pending.passes());
        assert!(!InstanceStatus::Failure(FailureKind::TimedOut).passes());
        assert!(!InstanceStatus::Pending.is_terminal());
        assert!(InstanceStatus::Failure(FailureKind::Cancelled).is_terminal());
    }

    #[test]
    fn test_slot_is_write_once() {
        let slot = InstanceSlot::new(instance("rstar", &["img-a"]));
        assert!(slot.is_pending());
        assert_eq!(slot.status(), &InstanceStatus::Pending);

        slot.settle(InstanceStatus::Success).unwrap();
        assert_eq!(slot.status(), &InstanceStatus::Success);

        let err = slot
            .settle(InstanceStatus::Failure(FailureKind::Cancelled))
            .unwrap_err();
        assert_eq!(
            err,
            StatusError::AlreadySettled {
                instance: "rstar (img-a)".to_string(),
                current: "success".to_string(),
                rejected: "failure (cancelled)".to_string(),
            }
        );
        assert_eq!(slot.status(), &InstanceStatus::Success);
    }

    #[test]
    fn test_slot_rejects_pending() {
        let slot = InstanceSlot::new(instance("no_std", &[]));
        assert!(matches!(
            slot.settle(InstanceStatus::Pending),
            Err(StatusError::NotTerminal { .. })
        ));
        assert!(slot.is_pending());
    }

    #[test]
    fn test_failure_display() {
        let kind = FailureKind::StepFailed {
            step_index: 1,
            exit_code: Some(101),
        };
        assert_eq!(kind.to_string(), "step 2 exited with code 101");
        assert_eq!(
            InstanceStatus::Failure(FailureKind::DependencyFailed).to_string(),
            "failure (dependency failed)"
        );
    }
}
