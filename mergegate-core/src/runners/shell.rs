// Shell Runner
// Executes `run` steps with sh or bash, streaming output as progress events

use crate::execution::events::{EventSender, ExecutionEvent};
use crate::runners::{JobRunner, RunOutcome, RunRequest};
use crate::workflow::models::Step;

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

/// Shell types supported by the runner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shell {
    /// Default shell (sh on Unix, cmd on Windows)
    Default,
    /// Bash shell
    Bash,
}

impl Shell {
    /// Parse the `shell:` field of a step
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "sh" => Some(Shell::Default),
            "bash" => Some(Shell::Bash),
            _ => None,
        }
    }

    /// Get the shell executable and arguments
    fn get_command(&self) -> (&'static str, &'static [&'static str]) {
        match self {
            Shell::Default => {
                if cfg!(target_os = "windows") {
                    ("cmd", &["/C"])
                } else {
                    ("sh", &["-c"])
                }
            }
            Shell::Bash => ("bash", &["-c"]),
        }
    }
}

/// Shell runner for executing job steps
pub struct ShellRunner {
    /// Shell used when a step does not name one
    default_shell: Shell,
}

impl ShellRunner {
    pub fn new() -> Self {
        Self {
            default_shell: Shell::Default,
        }
    }

    pub fn with_default_shell(shell: Shell) -> Self {
        Self {
            default_shell: shell,
        }
    }

    /// Run one script, streaming its output lines; returns the exit code
    async fn run_script(
        &self,
        shell: Shell,
        script: &str,
        env: &HashMap<String, String>,
        working_dir: &Path,
        on_output: impl Fn(String, bool) + Clone + Send + 'static,
    ) -> Option<i32> {
        let (shell_cmd, shell_args) = shell.get_command();

        let mut cmd = Command::new(shell_cmd);
        cmd.args(shell_args);
        cmd.arg(script);
        cmd.current_dir(working_dir);
        cmd.envs(env);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        // Dropping the future on cancel or timeout must not leave the step running
        cmd.kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(shell = shell_cmd, error = %e, "failed to spawn shell process");
                on_output(
                    format!("Failed to spawn shell process '{}': {}", shell_cmd, e),
                    true,
                );
                return None;
            }
        };

        let stdout_handle = child
            .stdout
            .take()
            .map(|stdout| tokio::spawn(forward_lines(stdout, false, on_output.clone())));
        let stderr_handle = child
            .stderr
            .take()
            .map(|stderr| tokio::spawn(forward_lines(stderr, true, on_output)));

        let status = child.wait().await;

        // Drain remaining output before reporting completion
        for handle in [stdout_handle, stderr_handle].into_iter().flatten() {
            let _ = handle.await;
        }

        status.ok().and_then(|s| s.code())
    }
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self::new()
    }
}

async fn forward_lines<R>(reader: R, is_error: bool, on_output: impl Fn(String, bool))
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        on_output(line, is_error);
    }
}

fn action_skip_reason(step: &Step) -> String {
    let reason = "actions are not executed by the shell runner";
    if step.with.is_empty() {
        return reason.to_string();
    }

    let mut inputs: Vec<&str> = step.with.keys().map(String::as_str).collect();
    inputs.sort_unstable();
    format!("{}; inputs ignored: {}", reason, inputs.join(", "))
}

fn step_env(base: &HashMap<String, String>, step: &Step) -> HashMap<String, String> {
    let mut env = base.clone();
    env.extend(step.env.iter().map(|(k, v)| (k.clone(), v.clone())));
    env
}

#[async_trait::async_trait]
impl JobRunner for ShellRunner {
    async fn run(&self, request: RunRequest<'_>) -> RunOutcome {
        let instance = request.instance.id.to_string();

        for (index, step) in request.steps.iter().enumerate() {
            let display_name = step.display_name();

            let Some(script) = step.run.as_deref() else {
                // `uses` actions are provisioned by the hosting CI platform
                request.events.send_event(ExecutionEvent::step_skipped(
                    &instance,
                    index,
                    display_name,
                    action_skip_reason(step),
                ));
                continue;
            };

            let shell = match step.shell.as_deref() {
                None => self.default_shell,
                Some(name) => match Shell::from_name(name) {
                    Some(shell) => shell,
                    None => {
                        request.events.send_event(ExecutionEvent::step_output(
                            &instance,
                            index,
                            format!("unsupported shell '{}'", name),
                            true,
                        ));
                        return RunOutcome::Failure {
                            step_index: index,
                            exit_code: None,
                        };
                    }
                },
            };

            let working_dir = match step.working_directory.as_deref() {
                Some(dir) => request.working_dir.join(dir),
                None => request.working_dir.to_path_buf(),
            };

            request
                .events
                .send_event(ExecutionEvent::step_started(&instance, index, display_name));
            debug!(instance = %instance, step = index, "running step");

            let started = Instant::now();
            let events = request.events.clone();
            let output_instance = instance.clone();
            let exit_code = self
                .run_script(
                    shell,
                    script,
                    &step_env(&request.env, step),
                    &working_dir,
                    move |line, is_error| {
                        events.send_event(ExecutionEvent::step_output(
                            output_instance.clone(),
                            index,
                            line,
                            is_error,
                        ))
                    },
                )
                .await;

            request.events.send_event(ExecutionEvent::step_completed(
                &instance,
                index,
                exit_code,
                started.elapsed(),
            ));

            if exit_code != Some(0) {
                return RunOutcome::Failure {
                    step_index: index,
                    exit_code,
                };
            }
        }

        RunOutcome::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::events::progress_channel;
    use crate::execution::instance::{InstanceId, JobInstance};

    fn instance() -> JobInstance {
        JobInstance {
            id: InstanceId::new("rstar", vec!["img-a".to_string()]),
            parameters: vec![("container_image".to_string(), "img-a".to_string())],
        }
    }

    fn request<'a>(
        instance: &'a JobInstance,
        steps: &'a [Step],
        working_dir: &'a Path,
    ) -> RunRequest<'a> {
        RunRequest {
            instance,
            steps,
            env: instance.matrix_env().into_iter().collect(),
            working_dir,
            events: None,
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_successful_steps() {
        let dir = tempfile::tempdir().unwrap();
        let instance = instance();
        let steps = vec![Step::run("echo hello"), Step::run("true")];

        let outcome = ShellRunner::new()
            .run(request(&instance, &steps, dir.path()))
            .await;
        assert_eq!(outcome, RunOutcome::Success);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stops_at_first_failure() {
        let dir = tempfile::tempdir().unwrap();
        let instance = instance();
        let steps = vec![
            Step::run("true"),
            Step::run("exit 3"),
            Step::run("touch should-not-exist"),
        ];

        let outcome = ShellRunner::new()
            .run(request(&instance, &steps, dir.path()))
            .await;
        assert_eq!(
            outcome,
            RunOutcome::Failure {
                step_index: 1,
                exit_code: Some(3),
            }
        );
        assert!(!dir.path().join("should-not-exist").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_matrix_env_and_output_events() {
        let dir = tempfile::tempdir().unwrap();
        let instance = instance();
        let steps = vec![
            Step::uses("actions/checkout@v2"),
            Step::run("echo image=$MATRIX_CONTAINER_IMAGE"),
        ];

        let (tx, mut rx) = progress_channel();
        let mut req = request(&instance, &steps, dir.path());
        req.events = Some(tx);

        let outcome = ShellRunner::new().run(req).await;
        assert_eq!(outcome, RunOutcome::Success);

        let mut skipped = false;
        let mut lines = Vec::new();
        while let Ok(event) = rx.try_recv() {
            match event {
                ExecutionEvent::StepSkipped { step_index: 0, .. } => skipped = true,
                ExecutionEvent::StepOutput { output, .. } => lines.push(output),
                _ => {}
            }
        }
        assert!(skipped);
        assert_eq!(lines, vec!["image=img-a"]);
    }

    #[test]
    fn test_action_skip_reason_lists_inputs() {
        let plain = Step::uses("actions/checkout@v2");
        assert_eq!(
            action_skip_reason(&plain),
            "actions are not executed by the shell runner"
        );

        let mut with_inputs = Step::uses("actions/checkout@v2");
        with_inputs
            .with
            .insert("submodules".to_string(), serde_yaml::Value::Bool(true));
        with_inputs.with.insert(
            "fetch-depth".to_string(),
            serde_yaml::Value::Number(0u64.into()),
        );
        assert_eq!(
            action_skip_reason(&with_inputs),
            "actions are not executed by the shell runner; inputs ignored: fetch-depth, submodules"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_bash_and_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let instance = instance();
        let steps = vec![Step {
            shell: Some("bash".to_string()),
            working_directory: Some("sub".to_string()),
            ..Step::run("[[ $(basename \"$PWD\") == sub ]]")
        }];

        let outcome = ShellRunner::new()
            .run(request(&instance, &steps, dir.path()))
            .await;
        assert_eq!(outcome, RunOutcome::Success);
    }

    #[tokio::test]
    async fn test_unsupported_shell_fails_step() {
        let dir = tempfile::tempdir().unwrap();
        let instance = instance();
        let steps = vec![Step {
            shell: Some("pwsh".to_string()),
            ..Step::run("Write-Host hi")
        }];

        let outcome = ShellRunner::new()
            .run(request(&instance, &steps, dir.path()))
            .await;
        assert_eq!(
            outcome,
            RunOutcome::Failure {
                step_index: 0,
                exit_code: None,
            }
        );
    }

    #[test]
    fn test_shell_from_name() {
        assert_eq!(Shell::from_name("bash"), Some(Shell::Bash));
        assert_eq!(Shell::from_name("sh"), Some(Shell::Default));
        assert_eq!(Shell::from_name("pwsh"), None);
    }
}
