// Skip Evaluation
// Decides, once per job and before anything runs, which jobs are skipped

use crate::execution::graph::{JobId, PipelineGraph};
use crate::expression::{RunContext, SkipPredicate};

use std::collections::HashSet;

pub struct SkipEvaluator;

impl SkipEvaluator {
    /// A job without a predicate never skips
    pub fn should_skip(predicate: Option<&SkipPredicate>, context: &RunContext) -> bool {
        predicate.is_some_and(|p| p.evaluate(context))
    }

    /// Evaluate every job's predicate exactly once for this run
    pub fn skipped_jobs(graph: &PipelineGraph, context: &RunContext) -> HashSet<JobId> {
        graph
            .nodes()
            .iter()
            .filter(|node| Self::should_skip(node.skip_predicate.as_ref(), context))
            .map(|node| node.id)
            .collect()
    }
}
