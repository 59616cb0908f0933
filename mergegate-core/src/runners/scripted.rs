// Scripted Runner
// In-memory job runner with predetermined outcomes, for driving the executor in tests

use crate::execution::events::{EventSender, ExecutionEvent};
use crate::runners::{JobRunner, RunOutcome, RunRequest};

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone)]
enum Script {
    Fail { step_index: usize, exit_code: i32 },
    Hang,
}

/// Succeeds every instance unless told otherwise.
///
/// Instances are addressed by their display identity, e.g. `rstar (img-b)`.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    scripts: HashMap<String, Script>,
    delay: Option<Duration>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the instance at the given step
    pub fn fail(mut self, instance: impl Into<String>, step_index: usize, exit_code: i32) -> Self {
        self.scripts.insert(
            instance.into(),
            Script::Fail {
                step_index,
                exit_code,
            },
        );
        self
    }

    /// Never finish the instance; only a timeout or cancellation ends it
    pub fn hang(mut self, instance: impl Into<String>) -> Self {
        self.scripts.insert(instance.into(), Script::Hang);
        self
    }

    /// Sleep before finishing each instance
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Instances the runner was invoked for, in invocation order
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl JobRunner for ScriptedRunner {
    async fn run(&self, request: RunRequest<'_>) -> RunOutcome {
        let instance = request.instance.id.to_string();
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(instance.clone());
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match self.scripts.get(&instance) {
            Some(Script::Hang) => std::future::pending().await,
            Some(Script::Fail {
                step_index,
                exit_code,
            }) => {
                request.events.send_event(ExecutionEvent::step_completed(
                    &instance,
                    *step_index,
                    Some(*exit_code),
                    Duration::ZERO,
                ));
                RunOutcome::Failure {
                    step_index: *step_index,
                    exit_code: Some(*exit_code),
                }
            }
            None => RunOutcome::Success,
        }
    }
}
