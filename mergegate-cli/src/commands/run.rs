use crate::commands::{load_graph, ContextArgs, EXIT_CONFIG};
use crate::output;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use color_eyre::Result;
use serde_json::json;
use tracing::warn;

use mergegate_core::{
    progress_channel, ExecutionEvent, ExecutionResult, ExecutorConfig, PipelineExecutor,
    ProgressReceiver, ShellRunner,
};

/// Run a pipeline locally
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to the pipeline YAML file
    pub pipeline: PathBuf,

    #[command(flatten)]
    pub context: ContextArgs,

    /// Maximum instances running at once (0 = unlimited)
    #[arg(long, env = "MERGEGATE_MAX_PARALLEL", default_value_t = 0)]
    pub max_parallel: usize,

    /// Default per-instance timeout in minutes (0 = none)
    #[arg(long, env = "MERGEGATE_JOB_TIMEOUT", value_name = "MINUTES", default_value_t = 60)]
    pub job_timeout: u64,

    /// Deadline for the whole run in minutes
    #[arg(long, env = "MERGEGATE_RUN_TIMEOUT", value_name = "MINUTES")]
    pub run_timeout: Option<u64>,

    /// Working directory for steps
    #[arg(long, short = 'w', value_name = "DIR")]
    pub working_dir: Option<PathBuf>,

    /// Print the result as JSON on stdout instead of progress output
    #[arg(long)]
    pub json: bool,
}

impl RunArgs {
    fn executor_config(&self) -> Result<ExecutorConfig> {
        let working_dir = match &self.working_dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir()?,
        };

        let minutes = |m: u64| Duration::from_secs(m * 60);

        Ok(ExecutorConfig::default()
            .with_max_parallel(self.max_parallel)
            .with_job_timeout((self.job_timeout > 0).then(|| minutes(self.job_timeout)))
            .with_run_timeout(self.run_timeout.map(minutes))
            .with_working_dir(working_dir))
    }
}

pub async fn execute(args: RunArgs) -> Result<i32> {
    let context = args.context.to_context()?;
    let config = args.executor_config()?;

    let Some(graph) = load_graph(&args.pipeline) else {
        return Ok(EXIT_CONFIG);
    };

    for node in graph.uncovered_jobs() {
        output::warning(&format!(
            "'{}' is not observed by any aggregator; its result cannot block the gate",
            node.name()
        ));
    }

    let (tx, rx) = progress_channel();
    let executor = PipelineExecutor::new(graph, Arc::new(ShellRunner::new()))
        .with_config(config)
        .with_progress(tx);

    let cancel = executor.cancel_handle();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted");
            cancel.cancel();
        }
    });

    // Render events in the background while the executor runs here
    let renderer = tokio::spawn(render_events(rx, !args.json));

    let result = executor.execute(&context).await;
    drop(executor);
    interrupt.abort();
    renderer.await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result_json(&result))?);
    } else {
        println!();
        output::gate_report(Some(&result.gate), &result.gate_report);
    }

    Ok(result.exit_code())
}

fn result_json(result: &ExecutionResult) -> serde_json::Value {
    json!({
        "pipeline": result.pipeline_name,
        "gate": result.gate,
        "status": result.status,
        "exit_code": result.exit_code(),
        "duration_ms": result.duration.as_millis() as u64,
        "report": result.gate_report,
        "results": result.results,
    })
}

async fn render_events(mut rx: ProgressReceiver, enabled: bool) {
    while let Some(event) = rx.recv().await {
        if enabled {
            render_event(&event);
        }
    }
}

fn render_event(event: &ExecutionEvent) {
    match event {
        ExecutionEvent::PipelineStarted {
            pipeline_name,
            total_jobs,
            total_instances,
        } => {
            println!();
            output::header(&format!(
                "Pipeline '{}' ({} jobs, {} instances)",
                pipeline_name, total_jobs, total_instances
            ));
        }

        ExecutionEvent::PipelineCompleted {
            status, duration, ..
        } => {
            println!();
            if status.is_success() {
                output::success(&format!(
                    "Pipeline completed successfully in {:.2}s",
                    duration.as_secs_f64()
                ));
            } else {
                output::failure(&format!(
                    "Pipeline failed after {:.2}s",
                    duration.as_secs_f64()
                ));
            }
        }

        ExecutionEvent::JobSkipped {
            job_name,
            predicate,
            instances,
        } => {
            output::warning(&format!(
                "  Job '{}' skipped ({} instances): {}",
                job_name, instances, predicate
            ));
        }

        ExecutionEvent::JobBlocked {
            job_name,
            failed_dependencies,
        } => {
            output::failure(&format!(
                "  Job '{}' not run, needed jobs failed: {}",
                job_name,
                failed_dependencies.join(", ")
            ));
        }

        ExecutionEvent::InstanceStarted {
            instance,
            total_steps,
        } => {
            println!("    {} ({} steps)", instance, total_steps);
        }

        ExecutionEvent::InstanceCompleted {
            instance,
            status,
            duration,
        } => {
            let line = format!("    {} {} ({:.2}s)", instance, status, duration.as_secs_f64());
            if status.passes() {
                output::dim_success(&line);
            } else {
                output::dim_failure(&line);
            }
        }

        ExecutionEvent::StepStarted {
            instance,
            step_index,
            display_name,
        } => {
            println!("      [{}] Step {}: {}", instance, step_index + 1, display_name);
        }

        ExecutionEvent::StepOutput {
            instance,
            output,
            is_error,
            ..
        } => {
            for line in output.lines() {
                if *is_error {
                    output::step_error(instance, line);
                } else {
                    output::step_output(instance, line);
                }
            }
        }

        ExecutionEvent::StepCompleted {
            instance,
            step_index,
            success,
            exit_code,
            duration,
        } => {
            let exit_info = match exit_code {
                Some(code) if *code != 0 => format!(" (exit code: {})", code),
                None => " (no exit code)".to_string(),
                _ => String::new(),
            };
            let line = format!(
                "      [{}] Step {} {} ({:.2}s){}",
                instance,
                step_index + 1,
                if *success { "OK" } else { "FAIL" },
                duration.as_secs_f64(),
                exit_info
            );
            if *success {
                output::dim_success(&line);
            } else {
                output::dim_failure(&line);
            }
        }

        ExecutionEvent::StepSkipped {
            instance,
            display_name,
            reason,
            ..
        } => {
            output::dim(&format!(
                "      [{}] {} skipped: {}",
                instance, display_name, reason
            ));
        }

        ExecutionEvent::AggregateComputed { job_name, report } => {
            output::info(&format!("Aggregator '{}': {}", job_name, report.status));
        }

        ExecutionEvent::Cancelled { reason } => {
            output::warning(&format!("Stopping: {}", reason));
        }
    }
}
