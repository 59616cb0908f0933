use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

use std::collections::HashMap;

/// A pipeline definition: an ordered collection of named jobs.
///
/// This represents the top-level structure of a pipeline YAML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Pipeline {
    /// The name of the pipeline (used in progress output)
    #[serde(default)]
    pub name: Option<String>,

    /// Aggregator whose status is the run's exit code.
    ///
    /// May be omitted when the pipeline declares exactly one aggregator.
    #[serde(default)]
    pub gate: Option<String>,

    /// Pipeline-level environment variables
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// The jobs that make up this pipeline, in declaration order
    #[serde(default)]
    pub jobs: Vec<JobSpec>,
}

/// A job within a pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobSpec {
    /// Unique name of the job within the pipeline
    pub name: String,

    /// Human readable label for progress output
    #[serde(default, rename = "display-name")]
    pub display_name: Option<String>,

    /// Jobs that must reach a terminal state before this job runs
    #[serde(default)]
    pub needs: JobNeeds,

    /// Parameter axes; one instance runs per combination
    #[serde(default)]
    pub matrix: Matrix,

    /// Predicate over the run context; when true every instance is skipped
    #[serde(default, rename = "skip_if", alias = "skip-if")]
    pub skip_if: Option<String>,

    /// Job-level environment variables
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Per-instance deadline in minutes
    #[serde(default, rename = "timeout-minutes")]
    pub timeout_minutes: Option<u32>,

    /// Marks this job as an aggregator over its `needs`
    #[serde(default)]
    pub aggregate: bool,

    /// Whether an aggregator is expected to observe this job
    #[serde(default = "default_gating")]
    pub gating: bool,

    /// The steps that make up this job
    #[serde(default)]
    pub steps: Vec<Step>,
}

fn default_gating() -> bool {
    true
}

impl JobSpec {
    /// Create a plain job with the given steps.
    pub fn new(name: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            name: name.into(),
            display_name: None,
            needs: JobNeeds::None,
            matrix: Matrix::default(),
            skip_if: None,
            env: HashMap::new(),
            timeout_minutes: None,
            aggregate: false,
            gating: true,
            steps,
        }
    }

    /// Create an aggregator job over the given dependencies.
    pub fn aggregator(name: impl Into<String>, needs: &[&str]) -> Self {
        let mut job = Self::new(name, Vec::new());
        job.aggregate = true;
        job.needs = JobNeeds::Multiple(needs.iter().map(|n| n.to_string()).collect());
        job
    }

    pub fn with_axis(mut self, axis: impl Into<String>, values: &[&str]) -> Self {
        self.matrix.axes.push(MatrixAxis {
            name: axis.into(),
            values: values.iter().map(|v| v.to_string()).collect(),
        });
        self
    }

    pub fn with_needs(mut self, needs: &[&str]) -> Self {
        self.needs = JobNeeds::Multiple(needs.iter().map(|n| n.to_string()).collect());
        self
    }

    pub fn with_skip_if(mut self, predicate: impl Into<String>) -> Self {
        self.skip_if = Some(predicate.into());
        self
    }

    /// Label used in progress output.
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }
}

/// Job dependencies - can be a single string or a list.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(untagged)]
pub enum JobNeeds {
    #[default]
    None,
    Single(String),
    Multiple(Vec<String>),
}

impl JobNeeds {
    /// Convert to a vector of job names.
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            JobNeeds::None => vec![],
            JobNeeds::Single(s) => vec![s.clone()],
            JobNeeds::Multiple(v) => v.clone(),
        }
    }

    /// Check if there are any dependencies.
    pub fn is_empty(&self) -> bool {
        match self {
            JobNeeds::None => true,
            JobNeeds::Single(_) => false,
            JobNeeds::Multiple(v) => v.is_empty(),
        }
    }
}

/// Matrix configuration: named axes in declaration order.
///
/// Declared in YAML as a mapping from axis name to a list of scalar values:
/// `matrix: { container_image: [a, b], target: [thumbv7em-none-eabihf] }`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Mapping", into = "Mapping")]
pub struct Matrix {
    pub axes: Vec<MatrixAxis>,
}

/// One parameter axis of a matrix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixAxis {
    pub name: String,
    pub values: Vec<String>,
}

impl Matrix {
    pub fn is_empty(&self) -> bool {
        self.axes.is_empty()
    }
}

impl TryFrom<Mapping> for Matrix {
    type Error = String;

    fn try_from(mapping: Mapping) -> Result<Self, Self::Error> {
        let mut axes = Vec::with_capacity(mapping.len());

        for (key, value) in mapping {
            let Some(name) = key.as_str().map(str::to_string) else {
                return Err(format!("matrix axis names must be strings, got {:?}", key));
            };

            let Value::Sequence(items) = value else {
                return Err(format!("matrix axis '{}' must be a list of values", name));
            };

            let values = items
                .iter()
                .map(|item| {
                    scalar_to_string(item).ok_or_else(|| {
                        format!("matrix axis '{}' may only contain scalar values", name)
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;

            axes.push(MatrixAxis { name, values });
        }

        Ok(Matrix { axes })
    }
}

impl From<Matrix> for Mapping {
    fn from(matrix: Matrix) -> Self {
        matrix
            .axes
            .into_iter()
            .map(|axis| {
                (
                    Value::String(axis.name),
                    Value::Sequence(axis.values.into_iter().map(Value::String).collect()),
                )
            })
            .collect()
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// A step within a job. Steps are opaque to the gating model; only the
/// job runner interprets them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Step {
    /// Display name for the step
    #[serde(default)]
    pub name: Option<String>,

    /// Shell command to run
    #[serde(default)]
    pub run: Option<String>,

    /// Shell to use for the run command
    #[serde(default)]
    pub shell: Option<String>,

    /// Externally provisioned action (e.g. "actions/checkout@v4")
    #[serde(default)]
    pub uses: Option<String>,

    /// Inputs to pass to the action
    #[serde(default)]
    pub with: HashMap<String, Value>,

    /// Step-level environment variables
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Working directory for the step
    #[serde(default, rename = "working-directory")]
    pub working_directory: Option<String>,
}

impl Step {
    /// Create a run step.
    pub fn run(script: impl Into<String>) -> Self {
        Self {
            run: Some(script.into()),
            ..Default::default()
        }
    }

    /// Create a uses step.
    pub fn uses(action: impl Into<String>) -> Self {
        Self {
            uses: Some(action.into()),
            ..Default::default()
        }
    }

    /// Get a display name for the step.
    pub fn display_name(&self) -> String {
        if let Some(name) = &self.name {
            name.clone()
        } else if let Some(uses) = &self.uses {
            format!("Run {}", uses)
        } else if let Some(run) = &self.run {
            let first_line = run.lines().next().unwrap_or(run);
            if first_line.chars().count() > 50 {
                let truncated: String = first_line.chars().take(47).collect();
                format!("{}...", truncated)
            } else {
                format!("Run {}", first_line)
            }
        } else {
            "Unnamed step".to_string()
        }
    }
}
