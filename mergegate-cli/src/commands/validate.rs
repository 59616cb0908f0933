use crate::commands::{load_graph, EXIT_CONFIG};
use crate::output;

use std::path::PathBuf;

use clap::Args;
use color_eyre::Result;

/// Validate a pipeline definition
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Path to the pipeline YAML file
    pub pipeline: PathBuf,

    /// Treat jobs that no aggregator observes as errors
    #[arg(long)]
    pub strict: bool,
}

pub fn execute(args: ValidateArgs) -> Result<i32> {
    let Some(graph) = load_graph(&args.pipeline) else {
        return Ok(EXIT_CONFIG);
    };

    output::check(&format!(
        "Structure: {} jobs, {} instances, {} dependency levels",
        graph.nodes().len(),
        graph.total_instances(),
        graph.levels().len()
    ));

    let predicates = graph
        .nodes()
        .iter()
        .filter(|n| n.skip_predicate.is_some())
        .count();
    if predicates > 0 {
        output::check(&format!("{} skip predicate(s) compiled", predicates));
    }

    let gate = graph.gate();
    output::check(&format!(
        "Gate: '{}' needs {}",
        gate.name(),
        gate.needs
            .iter()
            .map(|id| graph.node(*id).name())
            .collect::<Vec<_>>()
            .join(", ")
    ));

    let uncovered = graph.coverage_errors();
    if !uncovered.is_empty() {
        for problem in &uncovered {
            if args.strict {
                output::error(&problem.to_string());
            } else {
                output::warning(&problem.to_string());
            }
        }
        if args.strict {
            return Ok(EXIT_CONFIG);
        }
    }

    println!();
    output::success("Pipeline is valid");

    Ok(0)
}
