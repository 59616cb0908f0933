use crate::commands::{load_graph, ContextArgs, EXIT_CONFIG};
use crate::output;

use std::path::PathBuf;

use clap::Args;
use color_eyre::Result;
use serde_json::json;

use mergegate_core::{PipelineGraph, RunContext, SkipEvaluator};

/// Show how a pipeline would execute
#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Path to the pipeline YAML file
    pub pipeline: PathBuf,

    #[command(flatten)]
    pub context: ContextArgs,

    /// Print the plan as JSON on stdout
    #[arg(long)]
    pub json: bool,
}

pub fn execute(args: PlanArgs) -> Result<i32> {
    let context = args.context.to_context()?;
    let Some(graph) = load_graph(&args.pipeline) else {
        return Ok(EXIT_CONFIG);
    };

    if args.json {
        let plan = plan_json(&graph, &context);
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(0);
    }

    let skipped = SkipEvaluator::skipped_jobs(&graph, &context);

    println!();
    output::header(&format!(
        "Pipeline '{}': {} jobs, {} instances, gate '{}'",
        graph.name(),
        graph.nodes().len(),
        graph.total_instances(),
        graph.gate().name()
    ));

    for (i, level) in graph.levels().iter().enumerate() {
        output::level_header(i + 1, level.len());

        for id in level {
            let node = graph.node(*id);
            let needs: Vec<&str> = node.needs.iter().map(|n| graph.node(*n).name()).collect();

            if node.is_aggregator() {
                println!("    {} aggregates: {}", node.spec.label(), needs.join(", "));
                continue;
            }

            println!("    {} ({} instances)", node.spec.label(), node.instances.len());
            if !needs.is_empty() {
                output::dim(&format!("      needs: {}", needs.join(", ")));
            }
            if let Some(predicate) = &node.skip_predicate {
                if skipped.contains(id) {
                    output::warning(&format!("      skipped: {}", predicate));
                } else {
                    output::dim(&format!("      skip_if (not met): {}", predicate));
                }
            }
            if node.instances.len() > 1 {
                for instance in &node.instances {
                    output::dim(&format!("      - {}", instance.id));
                }
            }
        }
    }

    for node in graph.uncovered_jobs() {
        output::warning(&format!("'{}' is not observed by any aggregator", node.name()));
    }

    Ok(0)
}

fn plan_json(graph: &PipelineGraph, context: &RunContext) -> serde_json::Value {
    let skipped = SkipEvaluator::skipped_jobs(graph, context);

    let levels: Vec<serde_json::Value> = graph
        .levels()
        .iter()
        .map(|level| {
            level
                .iter()
                .map(|id| {
                    let node = graph.node(*id);
                    json!({
                        "job": node.name(),
                        "aggregate": node.is_aggregator(),
                        "needs": node.needs.iter().map(|n| graph.node(*n).name()).collect::<Vec<_>>(),
                        "instances": node.instances.iter().map(|i| i.id.to_string()).collect::<Vec<_>>(),
                        "skip_if": node.skip_predicate.as_ref().map(|p| p.source()),
                        "skipped": skipped.contains(id),
                    })
                })
                .collect()
        })
        .collect();

    json!({
        "pipeline": graph.name(),
        "gate": graph.gate().name(),
        "total_instances": graph.total_instances(),
        "levels": levels,
        "uncovered": graph.uncovered_jobs().iter().map(|n| n.name()).collect::<Vec<_>>(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mergegate_core::PipelineParser;

    const CI: &str = r#"
name: CI
jobs:
  - name: rstar
    skip_if: "contains(commit.message, '[ci skip]')"
    matrix:
      container_image: [img-a, img-b]
    steps:
      - run: cargo test
  - name: no_std
    steps:
      - run: cargo build
  - name: ci-result
    aggregate: true
    needs: [rstar, no_std]
"#;

    #[test]
    fn test_plan_json() {
        let graph = PipelineParser::parse_and_validate(CI).unwrap();
        let plan = plan_json(&graph, &RunContext::new("wip [ci skip]"));

        assert_eq!(plan["gate"], "ci-result");
        assert_eq!(plan["total_instances"], 4);
        assert_eq!(plan["levels"].as_array().map(Vec::len), Some(2));

        let rstar = &plan["levels"][0][0];
        assert_eq!(rstar["job"], "rstar");
        assert_eq!(rstar["skipped"], true);
        assert_eq!(rstar["instances"][1], "rstar (img-b)");

        let gate = &plan["levels"][1][0];
        assert_eq!(gate["aggregate"], true);
        assert_eq!(gate["needs"], json!(["rstar", "no_std"]));
    }
}
