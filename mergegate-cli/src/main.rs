mod commands;
mod output;

use clap::{ArgAction, Parser, Subcommand};
use color_eyre::Result;
use tracing_subscriber::EnvFilter;

use commands::aggregate::AggregateArgs;
use commands::plan::PlanArgs;
use commands::run::RunArgs;
use commands::validate::ValidateArgs;

#[derive(Parser, Debug)]
#[command(name = "mergegate")]
#[command(version, about = "Run a CI pipeline and report its merge gate as the exit code", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug); RUST_LOG applies otherwise
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate a pipeline definition without running anything
    Validate(ValidateArgs),

    /// Show the execution plan: levels, matrix instances and skip decisions
    Plan(PlanArgs),

    /// Run the pipeline; exit 0 when the gate passes, 1 when it fails
    Run(RunArgs),

    /// Compute the gate from results reported by an external CI platform
    Aggregate(AggregateArgs),
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        _ => EnvFilter::new("debug"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let code = match cli.command {
        Command::Validate(args) => commands::validate::execute(args)?,
        Command::Plan(args) => commands::plan::execute(args)?,
        Command::Run(args) => commands::run::execute(args).await?,
        Command::Aggregate(args) => commands::aggregate::execute(args)?,
    };

    std::process::exit(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run() {
        let cli = Cli::try_parse_from([
            "mergegate",
            "-vv",
            "run",
            "ci.yml",
            "--commit-message",
            "[ci skip]",
            "--max-parallel",
            "2",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        let Command::Run(args) = cli.command else {
            panic!("expected run command");
        };
        assert_eq!(args.pipeline.to_str(), Some("ci.yml"));
        assert_eq!(args.max_parallel, 2);
        assert_eq!(args.context.commit_message.as_deref(), Some("[ci skip]"));
    }

    #[test]
    fn test_parse_validate_strict() {
        let cli = Cli::try_parse_from(["mergegate", "validate", "--strict", "ci.yml"]).unwrap();
        assert!(matches!(cli.command, Command::Validate(ValidateArgs { strict: true, .. })));
    }

    #[test]
    fn test_parse_aggregate_needs() {
        let cli = Cli::try_parse_from([
            "mergegate",
            "aggregate",
            "results.json",
            "--needs",
            "rstar,no_std",
        ])
        .unwrap();
        let Command::Aggregate(args) = cli.command else {
            panic!("expected aggregate command");
        };
        assert_eq!(
            args.needs,
            Some(vec!["rstar".to_string(), "no_std".to_string()])
        );
    }

    #[test]
    fn test_parse_aggregate_empty_needs() {
        let cli = Cli::try_parse_from(["mergegate", "aggregate", "-", "--needs", ""]).unwrap();
        let Command::Aggregate(args) = cli.command else {
            panic!("expected aggregate command");
        };
        assert!(args.needs.is_some());
        assert!(args.pipeline.is_none());
    }

    #[test]
    fn test_missing_subcommand() {
        assert!(Cli::try_parse_from(["mergegate"]).is_err());
    }
}
