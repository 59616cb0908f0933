// Pipeline Graph (DAG) Builder
// Resolves job names to ids, validates the pipeline and orders jobs for execution

use crate::error::ConfigError;
use crate::execution::instance::JobInstance;
use crate::execution::matrix::MatrixExpander;
use crate::expression::SkipPredicate;
use crate::workflow::models::{JobSpec, Pipeline};

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

/// Stable index of a job in the pipeline graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(pub usize);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A node representing a job in the pipeline graph
#[derive(Debug, Clone)]
pub struct JobNode {
    pub id: JobId,
    /// Job definition
    pub spec: JobSpec,
    /// Jobs this job needs, resolved and deduplicated
    pub needs: Vec<JobId>,
    /// Compiled skip condition
    pub skip_predicate: Option<SkipPredicate>,
    /// Matrix instances, at least one per job
    pub instances: Vec<JobInstance>,
}

impl JobNode {
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn is_aggregator(&self) -> bool {
        self.spec.aggregate
    }
}

/// Validated dependency graph of a pipeline
#[derive(Debug, Clone)]
pub struct PipelineGraph {
    name: String,
    env: HashMap<String, String>,
    nodes: Vec<JobNode>,
    indices: HashMap<String, JobId>,
    gate: JobId,
}

impl PipelineGraph {
    /// Build and validate the graph, reporting every configuration error found
    pub fn build(pipeline: &Pipeline) -> Result<Self, Vec<ConfigError>> {
        if pipeline.jobs.is_empty() {
            return Err(vec![ConfigError::EmptyPipeline]);
        }

        let mut errors = Vec::new();

        // Name resolution; the first definition of a name wins
        let mut indices = HashMap::new();
        for (i, job) in pipeline.jobs.iter().enumerate() {
            if indices.contains_key(&job.name) {
                errors.push(ConfigError::DuplicateJob {
                    name: job.name.clone(),
                });
            } else {
                indices.insert(job.name.clone(), JobId(i));
            }
        }

        let mut nodes = Vec::with_capacity(pipeline.jobs.len());
        for (i, job) in pipeline.jobs.iter().enumerate() {
            let needs = Self::resolve_needs(job, &indices, &mut errors);
            Self::validate_shape(job, &mut errors);

            let skip_predicate = match job.skip_if.as_deref() {
                Some(source) => match SkipPredicate::compile(source) {
                    Ok(predicate) => Some(predicate),
                    Err(source) => {
                        errors.push(ConfigError::InvalidPredicate {
                            job: job.name.clone(),
                            source,
                        });
                        None
                    }
                },
                None => None,
            };

            let instances = match MatrixExpander::expand(job) {
                Ok(instances) => instances,
                Err(matrix_errors) => {
                    errors.extend(matrix_errors);
                    Vec::new()
                }
            };

            nodes.push(JobNode {
                id: JobId(i),
                spec: job.clone(),
                needs,
                skip_predicate,
                instances,
            });
        }

        if let Some(cycle) = Self::detect_cycle(&nodes) {
            errors.push(ConfigError::CyclicDependency { cycle });
        }

        let gate = Self::select_gate(pipeline.gate.as_deref(), &nodes, &indices, &mut errors);

        match gate {
            Some(gate) if errors.is_empty() => Ok(Self {
                name: pipeline.name.clone().unwrap_or_else(|| "pipeline".to_string()),
                env: pipeline.env.clone(),
                nodes,
                indices,
                gate,
            }),
            _ => Err(errors),
        }
    }

    fn resolve_needs(
        job: &JobSpec,
        indices: &HashMap<String, JobId>,
        errors: &mut Vec<ConfigError>,
    ) -> Vec<JobId> {
        let mut needs = Vec::new();

        for dependency in job.needs.to_vec() {
            if dependency == job.name {
                errors.push(ConfigError::SelfDependency {
                    job: job.name.clone(),
                });
                continue;
            }

            match indices.get(&dependency) {
                Some(id) if !needs.contains(id) => needs.push(*id),
                Some(_) => {}
                None => errors.push(ConfigError::UnknownDependency {
                    job: job.name.clone(),
                    dependency,
                }),
            }
        }

        needs
    }

    fn validate_shape(job: &JobSpec, errors: &mut Vec<ConfigError>) {
        if job.aggregate {
            let reason = if !job.matrix.is_empty() {
                Some("must not declare a matrix")
            } else if !job.steps.is_empty() {
                Some("must not declare steps")
            } else if job.skip_if.is_some() {
                Some("must not declare skip_if")
            } else {
                None
            };

            if let Some(reason) = reason {
                errors.push(ConfigError::InvalidAggregator {
                    job: job.name.clone(),
                    reason: reason.to_string(),
                });
            }
            return;
        }

        if job.steps.is_empty() {
            errors.push(ConfigError::NoSteps {
                job: job.name.clone(),
            });
        }

        for (index, step) in job.steps.iter().enumerate() {
            let reason = match (&step.run, &step.uses) {
                (Some(_), Some(_)) => Some("sets both 'run' and 'uses'"),
                (None, None) => Some("sets neither 'run' nor 'uses'"),
                _ => None,
            };

            if let Some(reason) = reason {
                errors.push(ConfigError::InvalidStep {
                    job: job.name.clone(),
                    index,
                    reason: reason.to_string(),
                });
            }
        }
    }

    /// Detect cycles in job dependencies using DFS
    fn detect_cycle(nodes: &[JobNode]) -> Option<Vec<String>> {
        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();

        for node in nodes {
            if !visited.contains(&node.id) {
                if let Some(cycle) = Self::dfs_cycle(nodes, node.id, &mut visited, &mut rec_stack)
                {
                    return Some(cycle);
                }
            }
        }

        None
    }

    fn dfs_cycle(
        nodes: &[JobNode],
        id: JobId,
        visited: &mut HashSet<JobId>,
        rec_stack: &mut HashSet<JobId>,
    ) -> Option<Vec<String>> {
        let node = &nodes[id.0];
        visited.insert(id);
        rec_stack.insert(id);

        for &dep in &node.needs {
            if !visited.contains(&dep) {
                if let Some(mut cycle) = Self::dfs_cycle(nodes, dep, visited, rec_stack) {
                    cycle.insert(0, node.spec.name.clone());
                    return Some(cycle);
                }
            } else if rec_stack.contains(&dep) {
                return Some(vec![node.spec.name.clone(), nodes[dep.0].spec.name.clone()]);
            }
        }

        rec_stack.remove(&id);
        None
    }

    fn select_gate(
        explicit: Option<&str>,
        nodes: &[JobNode],
        indices: &HashMap<String, JobId>,
        errors: &mut Vec<ConfigError>,
    ) -> Option<JobId> {
        if let Some(name) = explicit {
            let Some(&id) = indices.get(name) else {
                errors.push(ConfigError::UnknownGate {
                    name: name.to_string(),
                });
                return None;
            };

            if !nodes[id.0].is_aggregator() {
                errors.push(ConfigError::GateNotAggregator {
                    name: name.to_string(),
                });
                return None;
            }

            return Some(id);
        }

        let aggregators: Vec<&JobNode> = nodes.iter().filter(|n| n.is_aggregator()).collect();
        match aggregators.as_slice() {
            [] => {
                errors.push(ConfigError::NoGate);
                None
            }
            [single] => Some(single.id),
            many => {
                errors.push(ConfigError::AmbiguousGate {
                    candidates: many.iter().map(|n| n.spec.name.clone()).collect(),
                });
                None
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pipeline-level environment variables
    pub fn env(&self) -> &HashMap<String, String> {
        &self.env
    }

    /// All jobs in declaration order
    pub fn nodes(&self) -> &[JobNode] {
        &self.nodes
    }

    pub fn node(&self, id: JobId) -> &JobNode {
        &self.nodes[id.0]
    }

    /// Get a job by name
    pub fn lookup(&self, name: &str) -> Option<&JobNode> {
        self.indices.get(name).map(|id| self.node(*id))
    }

    /// The aggregator whose status gates the run
    pub fn gate(&self) -> &JobNode {
        self.node(self.gate)
    }

    pub fn aggregators(&self) -> impl Iterator<Item = &JobNode> {
        self.nodes.iter().filter(|n| n.is_aggregator())
    }

    pub fn total_instances(&self) -> usize {
        self.nodes.iter().map(|n| n.instances.len()).sum()
    }

    /// Group jobs into dependency levels (Kahn's algorithm).
    ///
    /// Every job's needs lie in strictly earlier levels. Jobs within a level
    /// keep declaration order.
    pub fn levels(&self) -> Vec<Vec<JobId>> {
        let mut in_degree: Vec<usize> = self.nodes.iter().map(|n| n.needs.len()).collect();
        let mut dependents: Vec<Vec<JobId>> = vec![Vec::new(); self.nodes.len()];

        for node in &self.nodes {
            for dep in &node.needs {
                dependents[dep.0].push(node.id);
            }
        }

        let mut current: Vec<JobId> = self
            .nodes
            .iter()
            .filter(|n| n.needs.is_empty())
            .map(|n| n.id)
            .collect();
        let mut levels = Vec::new();

        while !current.is_empty() {
            let mut next = Vec::new();
            for id in &current {
                for &dependent in &dependents[id.0] {
                    in_degree[dependent.0] -= 1;
                    if in_degree[dependent.0] == 0 {
                        next.push(dependent);
                    }
                }
            }
            next.sort();
            levels.push(std::mem::take(&mut current));
            current = next;
        }

        levels
    }

    /// Gating jobs that no aggregator observes, directly or transitively.
    ///
    /// A failure in such a job could never block the gate.
    pub fn uncovered_jobs(&self) -> Vec<&JobNode> {
        let mut covered = HashSet::new();
        let mut queue: VecDeque<JobId> = self.aggregators().map(|n| n.id).collect();

        while let Some(id) = queue.pop_front() {
            for &dep in &self.node(id).needs {
                if covered.insert(dep) {
                    queue.push_back(dep);
                }
            }
        }

        self.nodes
            .iter()
            .filter(|n| !n.is_aggregator() && n.spec.gating && !covered.contains(&n.id))
            .collect()
    }

    /// Coverage problems as configuration errors, for strict validation
    pub fn coverage_errors(&self) -> Vec<ConfigError> {
        self.uncovered_jobs()
            .into_iter()
            .map(|n| ConfigError::UncoveredJob {
                job: n.spec.name.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::models::Step;

    fn job(name: &str) -> JobSpec {
        JobSpec::new(name, vec![Step::run("true")])
    }

    fn pipeline(jobs: Vec<JobSpec>) -> Pipeline {
        Pipeline {
            name: Some("CI".to_string()),
            jobs,
            ..Default::default()
        }
    }

    fn names(graph: &PipelineGraph, ids: &[JobId]) -> Vec<String> {
        ids.iter().map(|id| graph.node(*id).spec.name.clone()).collect()
    }

    #[test]
    fn test_build_rstar_pipeline() {
        let graph = PipelineGraph::build(&pipeline(vec![
            job("rstar").with_axis("container_image", &["a", "b", "c"]),
            job("no_std"),
            JobSpec::aggregator("ci-result", &["rstar", "no_std"]),
        ]))
        .unwrap();

        assert_eq!(graph.total_instances(), 6);
        assert_eq!(graph.gate().name(), "ci-result");
        assert_eq!(graph.gate().needs, vec![JobId(0), JobId(1)]);
        assert_eq!(graph.lookup("no_std").map(|n| n.id), Some(JobId(1)));
        assert!(graph.uncovered_jobs().is_empty());
    }

    #[test]
    fn test_levels() {
        let graph = PipelineGraph::build(&pipeline(vec![
            JobSpec::aggregator("gate", &["test", "lint"]),
            job("test").with_needs(&["build"]),
            job("build"),
            job("lint"),
        ]))
        .unwrap();

        let levels = graph.levels();
        assert_eq!(levels.len(), 3);
        assert_eq!(names(&graph, &levels[0]), vec!["build", "lint"]);
        assert_eq!(names(&graph, &levels[1]), vec!["test"]);
        assert_eq!(names(&graph, &levels[2]), vec!["gate"]);
    }

    #[test]
    fn test_collects_all_errors() {
        let mut broken_step = job("broken");
        broken_step.steps.push(Step::default());

        let errors = PipelineGraph::build(&pipeline(vec![
            job("a"),
            job("a"),
            job("b").with_needs(&["b", "ghost"]),
            broken_step,
            JobSpec::new("empty", Vec::new()),
            JobSpec::aggregator("gate", &["a"]).with_axis("os", &["linux"]),
        ]))
        .unwrap_err();

        assert_eq!(
            errors,
            vec![
                ConfigError::DuplicateJob {
                    name: "a".to_string()
                },
                ConfigError::SelfDependency {
                    job: "b".to_string()
                },
                ConfigError::UnknownDependency {
                    job: "b".to_string(),
                    dependency: "ghost".to_string(),
                },
                ConfigError::InvalidStep {
                    job: "broken".to_string(),
                    index: 1,
                    reason: "sets neither 'run' nor 'uses'".to_string(),
                },
                ConfigError::NoSteps {
                    job: "empty".to_string()
                },
                ConfigError::InvalidAggregator {
                    job: "gate".to_string(),
                    reason: "must not declare a matrix".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_cycle_detection() {
        let errors = PipelineGraph::build(&pipeline(vec![
            job("a").with_needs(&["b"]),
            job("b").with_needs(&["a"]),
            JobSpec::aggregator("gate", &["a"]),
        ]))
        .unwrap_err();

        assert_eq!(
            errors,
            vec![ConfigError::CyclicDependency {
                cycle: vec!["a".to_string(), "b".to_string(), "a".to_string()],
            }]
        );
    }

    #[test]
    fn test_invalid_predicate() {
        let errors = PipelineGraph::build(&pipeline(vec![
            job("a").with_skip_if("contains(commit.message"),
            JobSpec::aggregator("gate", &["a"]),
        ]))
        .unwrap_err();

        assert!(matches!(
            errors.as_slice(),
            [ConfigError::InvalidPredicate { job, .. }] if job == "a"
        ));
    }

    #[test]
    fn test_gate_selection() {
        let no_gate = PipelineGraph::build(&pipeline(vec![job("a")])).unwrap_err();
        assert_eq!(no_gate, vec![ConfigError::NoGate]);

        let ambiguous = PipelineGraph::build(&pipeline(vec![
            job("a"),
            JobSpec::aggregator("g1", &["a"]),
            JobSpec::aggregator("g2", &["a"]),
        ]))
        .unwrap_err();
        assert_eq!(
            ambiguous,
            vec![ConfigError::AmbiguousGate {
                candidates: vec!["g1".to_string(), "g2".to_string()],
            }]
        );

        let mut explicit = pipeline(vec![
            job("a"),
            JobSpec::aggregator("g1", &["a"]),
            JobSpec::aggregator("g2", &["g1"]),
        ]);
        explicit.gate = Some("g2".to_string());
        assert_eq!(PipelineGraph::build(&explicit).unwrap().gate().name(), "g2");

        explicit.gate = Some("a".to_string());
        assert_eq!(
            PipelineGraph::build(&explicit).unwrap_err(),
            vec![ConfigError::GateNotAggregator {
                name: "a".to_string()
            }]
        );

        explicit.gate = Some("missing".to_string());
        assert_eq!(
            PipelineGraph::build(&explicit).unwrap_err(),
            vec![ConfigError::UnknownGate {
                name: "missing".to_string()
            }]
        );
    }

    #[test]
    fn test_empty_pipeline() {
        assert_eq!(
            PipelineGraph::build(&pipeline(Vec::new())).unwrap_err(),
            vec![ConfigError::EmptyPipeline]
        );
    }

    #[test]
    fn test_uncovered_jobs() {
        let mut docs = job("docs");
        docs.gating = false;

        let graph = PipelineGraph::build(&pipeline(vec![
            job("build"),
            job("test").with_needs(&["build"]),
            job("bench"),
            docs,
            JobSpec::aggregator("gate", &["test"]),
        ]))
        .unwrap();

        let uncovered: Vec<&str> = graph.uncovered_jobs().iter().map(|n| n.name()).collect();
        assert_eq!(uncovered, vec!["bench"]);
        assert_eq!(
            graph.coverage_errors(),
            vec![ConfigError::UncoveredJob {
                job: "bench".to_string()
            }]
        );
    }

    #[test]
    fn test_duplicate_needs_are_collapsed() {
        let graph = PipelineGraph::build(&pipeline(vec![
            job("a"),
            JobSpec::aggregator("gate", &["a", "a"]),
        ]))
        .unwrap();
        assert_eq!(graph.gate().needs, vec![JobId(0)]);
    }
}
