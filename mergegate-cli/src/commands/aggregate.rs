use crate::commands::{load_graph, EXIT_CONFIG};
use crate::output;

use std::io::Read;
use std::path::{Path, PathBuf};

use clap::Args;
use color_eyre::eyre::WrapErr;
use color_eyre::Result;

use mergegate_core::{ConfigError, ResultAggregator, ResultSet};

/// Compute the gate from externally reported results
#[derive(Args, Debug)]
pub struct AggregateArgs {
    /// JSON result set: job name to a list of instance statuses ("-" reads stdin)
    pub results: PathBuf,

    /// Jobs the gate depends on, comma separated (`--needs ""` for none)
    #[arg(long, value_delimiter = ',', conflicts_with = "pipeline")]
    pub needs: Option<Vec<String>>,

    /// Take the dependencies from this pipeline's gate instead
    #[arg(long, value_name = "FILE")]
    pub pipeline: Option<PathBuf>,

    /// Print the report as JSON on stdout
    #[arg(long)]
    pub json: bool,
}

pub fn execute(args: AggregateArgs) -> Result<i32> {
    let (gate, needs) = if let Some(path) = &args.pipeline {
        let Some(graph) = load_graph(path) else {
            return Ok(EXIT_CONFIG);
        };
        let gate = graph.gate();
        let needs = gate
            .needs
            .iter()
            .map(|id| graph.node(*id).name().to_string())
            .collect();
        (Some(gate.name().to_string()), needs)
    } else if let Some(needs) = &args.needs {
        let needs: Vec<String> = needs
            .iter()
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .collect();
        (None, needs)
    } else {
        output::error("either --needs or --pipeline is required");
        return Ok(EXIT_CONFIG);
    };

    let content = match read_results(&args.results) {
        Ok(content) => content,
        Err(e) => {
            output::error(&format!("{:#}", e));
            return Ok(EXIT_CONFIG);
        }
    };
    let results = match ResultSet::from_json(&content) {
        Ok(results) => results,
        Err(e) => {
            output::error(&format!("{}: {}", args.results.display(), e));
            return Ok(EXIT_CONFIG);
        }
    };

    if let Err(errors) = results.require_jobs(&needs) {
        report_unreported(&errors);
        return Ok(EXIT_CONFIG);
    }

    let report = ResultAggregator::aggregate(&needs, &results);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        output::gate_report(gate.as_deref(), &report);
    }

    Ok(report.status.exit_code())
}

fn read_results(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut content = String::new();
        std::io::stdin()
            .read_to_string(&mut content)
            .wrap_err("failed to read results from stdin")?;
        return Ok(content);
    }

    std::fs::read_to_string(path)
        .wrap_err_with(|| format!("failed to read results from {}", path.display()))
}

fn report_unreported(errors: &[ConfigError]) {
    output::error(&format!("{} needed job(s) missing from the results:", errors.len()));
    for error in errors {
        output::error(&format!("  - {}", error));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write;

    fn results_file(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn args(results: &tempfile::NamedTempFile, needs: &[&str]) -> AggregateArgs {
        AggregateArgs {
            results: results.path().to_path_buf(),
            needs: Some(needs.iter().map(|n| n.to_string()).collect()),
            pipeline: None,
            json: true,
        }
    }

    #[test]
    fn test_gate_passes() {
        let file = results_file(r#"{"rstar": ["success", "skipped"], "no_std": ["success"]}"#);
        assert_eq!(execute(args(&file, &["rstar", "no_std"])).unwrap(), 0);
    }

    #[test]
    fn test_gate_fails() {
        let file = results_file(r#"{"rstar": ["success", "failure"], "no_std": ["success"]}"#);
        assert_eq!(execute(args(&file, &["rstar", "no_std"])).unwrap(), 1);
    }

    #[test]
    fn test_needs_from_pipeline() {
        let pipeline = results_file(
            "jobs:\n  - name: rstar\n    steps:\n      - run: cargo test\n  - name: ci-result\n    aggregate: true\n    needs: rstar\n",
        );
        let file = results_file(r#"{"rstar": ["timed_out"], "docs": ["failure"]}"#);

        let mut aggregate = args(&file, &[]);
        aggregate.needs = None;
        aggregate.pipeline = Some(pipeline.path().to_path_buf());
        assert_eq!(execute(aggregate).unwrap(), 1);
    }

    #[test]
    fn test_malformed_results_are_config_errors() {
        let file = results_file(r#"{"rstar": "success"}"#);
        assert_eq!(execute(args(&file, &["rstar"])).unwrap(), EXIT_CONFIG);
    }

    #[test]
    fn test_unreported_dependency_is_config_error() {
        let file = results_file(r#"{"rstar": ["success", "success", "success"]}"#);
        assert_eq!(execute(args(&file, &["rstar", "no_std"])).unwrap(), EXIT_CONFIG);
    }

    #[test]
    fn test_reported_without_instances_passes() {
        let file = results_file(r#"{"rstar": ["success"], "no_std": []}"#);
        assert_eq!(execute(args(&file, &["rstar", "no_std"])).unwrap(), 0);
    }

    #[test]
    fn test_missing_dependencies_are_config_errors() {
        let file = results_file("{}");
        let mut aggregate = args(&file, &[]);
        aggregate.needs = None;
        assert_eq!(execute(aggregate).unwrap(), EXIT_CONFIG);
    }

    #[test]
    fn test_unreadable_results_are_config_errors() {
        let dir = tempfile::tempdir().unwrap();
        let aggregate = AggregateArgs {
            results: dir.path().join("missing.json"),
            needs: Some(vec!["rstar".to_string()]),
            pipeline: None,
            json: true,
        };
        assert_eq!(execute(aggregate).unwrap(), EXIT_CONFIG);
    }

    #[test]
    fn test_empty_needs_succeeds() {
        let file = results_file(r#"{"rstar": ["failure"]}"#);
        assert_eq!(execute(args(&file, &[""])).unwrap(), 0);
    }
}
