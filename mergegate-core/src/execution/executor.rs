// Pipeline Executor
// Runs job instances level by level and settles every instance exactly once

use crate::execution::aggregate::{AggregateReport, AggregateStatus, ResultAggregator, ResultSet};
use crate::execution::events::{EventSender, ExecutionEvent, ProgressSender};
use crate::execution::graph::{JobId, PipelineGraph};
use crate::execution::instance::{FailureKind, InstanceSlot, InstanceStatus};
use crate::execution::skip::SkipEvaluator;
use crate::expression::RunContext;
use crate::runners::{JobRunner, RunOutcome, RunRequest};

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Result of pipeline execution
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub pipeline_name: String,
    /// Name of the gating aggregator
    pub gate: String,
    /// The gate signal
    pub status: AggregateStatus,
    /// Per-dependency detail behind the gate signal
    pub gate_report: AggregateReport,
    /// Terminal status of every instance of every job
    pub results: ResultSet,
    pub duration: Duration,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.status.is_success()
    }

    pub fn exit_code(&self) -> i32 {
        self.status.exit_code()
    }
}

/// Configuration for pipeline execution
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Maximum instances running at once (0 = unlimited)
    pub max_parallel: usize,
    /// Per-instance deadline for jobs without `timeout-minutes`
    pub default_job_timeout: Option<Duration>,
    /// Deadline for the whole run
    pub run_timeout: Option<Duration>,
    /// Directory steps run in
    pub working_dir: PathBuf,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_parallel: 0,
            default_job_timeout: Some(Duration::from_secs(60 * 60)),
            run_timeout: None,
            working_dir: PathBuf::from("."),
        }
    }
}

impl ExecutorConfig {
    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel;
        self
    }

    pub fn with_job_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_job_timeout = timeout;
        self
    }

    pub fn with_run_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.run_timeout = timeout;
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CancelReason {
    Cancelled,
    TimedOut,
}

impl CancelReason {
    fn failure(self) -> InstanceStatus {
        match self {
            CancelReason::Cancelled => InstanceStatus::Failure(FailureKind::Cancelled),
            CancelReason::TimedOut => InstanceStatus::Failure(FailureKind::TimedOut),
        }
    }

    fn describe(self) -> &'static str {
        match self {
            CancelReason::Cancelled => "run cancelled",
            CancelReason::TimedOut => "run deadline exceeded",
        }
    }
}

type CancelSender = watch::Sender<Option<CancelReason>>;
type CancelReceiver = watch::Receiver<Option<CancelReason>>;

/// The first reason wins; later requests are ignored
fn request_cancel(tx: &CancelSender, reason: CancelReason) -> bool {
    tx.send_if_modified(|current| {
        if current.is_none() {
            *current = Some(reason);
            true
        } else {
            false
        }
    })
}

async fn wait_for_cancel(rx: &mut CancelReceiver) -> CancelReason {
    loop {
        let current = *rx.borrow_and_update();
        if let Some(reason) = current {
            return reason;
        }
        if rx.changed().await.is_err() {
            return std::future::pending().await;
        }
    }
}

/// Cancels a running pipeline from another task
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<CancelSender>,
}

impl CancelHandle {
    /// Settle every unfinished instance as cancelled
    pub fn cancel(&self) {
        if request_cancel(&self.tx, CancelReason::Cancelled) {
            info!("cancellation requested");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.tx.borrow().is_some()
    }
}

/// Per-job, per-instance status slots for one run
type Slots = Vec<Vec<InstanceSlot>>;

/// Pipeline executor. Each executor drives a single run.
pub struct PipelineExecutor {
    graph: Arc<PipelineGraph>,
    runner: Arc<dyn JobRunner>,
    config: ExecutorConfig,
    event_tx: Option<ProgressSender>,
    cancel_tx: Arc<CancelSender>,
}

impl PipelineExecutor {
    pub fn new(graph: PipelineGraph, runner: Arc<dyn JobRunner>) -> Self {
        let (cancel_tx, _) = watch::channel(None);
        Self {
            graph: Arc::new(graph),
            runner,
            config: ExecutorConfig::default(),
            event_tx: None,
            cancel_tx: Arc::new(cancel_tx),
        }
    }

    /// Set executor configuration
    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    /// Set progress event sender
    pub fn with_progress(mut self, tx: ProgressSender) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            tx: Arc::clone(&self.cancel_tx),
        }
    }

    pub fn graph(&self) -> &PipelineGraph {
        &self.graph
    }

    fn cancel_reason(&self) -> Option<CancelReason> {
        *self.cancel_tx.borrow()
    }

    /// Execute the pipeline and compute the gate signal
    pub async fn execute(&self, context: &RunContext) -> ExecutionResult {
        let start = Instant::now();
        let graph = Arc::clone(&self.graph);

        let slots: Slots = graph
            .nodes()
            .iter()
            .map(|node| node.instances.iter().cloned().map(InstanceSlot::new).collect())
            .collect();
        let mut reports: HashMap<JobId, AggregateReport> = HashMap::new();

        info!(
            pipeline = %graph.name(),
            jobs = graph.nodes().len(),
            instances = graph.total_instances(),
            "starting pipeline"
        );
        self.event_tx.send_event(ExecutionEvent::pipeline_started(
            graph.name(),
            graph.nodes().len(),
            graph.total_instances(),
        ));

        // Predicates are evaluated once, before any step runs
        let skipped = SkipEvaluator::skipped_jobs(&graph, context);

        let deadline = self.config.run_timeout.map(|limit| {
            let cancel_tx = Arc::clone(&self.cancel_tx);
            tokio::spawn(async move {
                tokio::time::sleep(limit).await;
                if request_cancel(&cancel_tx, CancelReason::TimedOut) {
                    warn!(?limit, "run deadline exceeded");
                }
            })
        });

        let semaphore = (self.config.max_parallel > 0)
            .then(|| Arc::new(Semaphore::new(self.config.max_parallel)));

        for level in graph.levels() {
            if self.cancel_reason().is_some() {
                break;
            }

            let mut tasks = JoinSet::new();

            for &job_id in &level {
                let node = graph.node(job_id);
                let needs = self.dependency_report(&slots, job_id);

                if node.is_aggregator() {
                    let status = if needs.status.is_success() {
                        InstanceStatus::Success
                    } else {
                        InstanceStatus::Failure(FailureKind::DependencyFailed)
                    };
                    info!(job = %node.name(), status = %needs.status, "aggregate computed");
                    self.event_tx
                        .send_event(ExecutionEvent::aggregate_computed(node.name(), needs.clone()));
                    reports.insert(job_id, needs);
                    self.settle_job(&slots, job_id, status);
                    continue;
                }

                // A failed need wins over skip_if so a failure is never masked
                if !needs.status.is_success() {
                    let failed: Vec<String> = needs
                        .failed_dependencies()
                        .into_iter()
                        .map(String::from)
                        .collect();
                    warn!(job = %node.name(), dependencies = ?failed, "needed job failed, not running");
                    self.event_tx
                        .send_event(ExecutionEvent::job_blocked(node.name(), failed));
                    self.settle_job(
                        &slots,
                        job_id,
                        InstanceStatus::Failure(FailureKind::DependencyFailed),
                    );
                    continue;
                }

                if skipped.contains(&job_id) {
                    let predicate = node
                        .skip_predicate
                        .as_ref()
                        .map(|p| p.source().to_string())
                        .unwrap_or_default();
                    info!(job = %node.name(), %predicate, "skipping job");
                    self.event_tx.send_event(ExecutionEvent::job_skipped(
                        node.name(),
                        predicate,
                        node.instances.len(),
                    ));
                    self.settle_job(&slots, job_id, InstanceStatus::Skipped);
                    continue;
                }

                let timeout = node
                    .spec
                    .timeout_minutes
                    .map(|minutes| Duration::from_secs(u64::from(minutes) * 60))
                    .or(self.config.default_job_timeout);

                for index in 0..node.instances.len() {
                    let task = InstanceTask {
                        graph: Arc::clone(&graph),
                        runner: Arc::clone(&self.runner),
                        job_id,
                        index,
                        timeout,
                        working_dir: self.config.working_dir.clone(),
                        events: self.event_tx.clone(),
                        cancel_rx: self.cancel_tx.subscribe(),
                        semaphore: semaphore.clone(),
                    };
                    tasks.spawn(async move {
                        let (status, duration) = task.run().await;
                        (job_id, index, status, duration)
                    });
                }
            }

            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok((job_id, index, status, duration)) => {
                        self.settle(&slots, job_id, index, status, duration)
                    }
                    Err(e) => warn!(error = %e, "instance task ended abnormally"),
                }
            }

            // Instances whose task died without reporting back
            for &job_id in &level {
                for index in 0..slots[job_id.0].len() {
                    if slots[job_id.0][index].is_pending() {
                        self.settle(
                            &slots,
                            job_id,
                            index,
                            InstanceStatus::Failure(FailureKind::RunnerAborted),
                            Duration::ZERO,
                        );
                    }
                }
            }
        }

        if let Some(handle) = deadline {
            handle.abort();
        }

        // Nothing may stay pending, including aggregators never reached
        let leftover = match self.cancel_reason() {
            Some(reason) => {
                warn!(reason = reason.describe(), "run stopped early");
                self.event_tx
                    .send_event(ExecutionEvent::cancelled(reason.describe()));
                reason.failure()
            }
            None => InstanceStatus::Failure(FailureKind::RunnerAborted),
        };
        for node in graph.nodes() {
            for index in 0..slots[node.id.0].len() {
                if slots[node.id.0][index].is_pending() {
                    self.settle(&slots, node.id, index, leftover.clone(), Duration::ZERO);
                }
            }
        }

        let gate = graph.gate();
        let gate_report = reports
            .remove(&gate.id)
            .unwrap_or_else(|| self.dependency_report(&slots, gate.id));
        let status = if slots[gate.id.0].iter().all(|slot| slot.status().passes()) {
            AggregateStatus::Success
        } else {
            AggregateStatus::Failure
        };

        let results = self.results_for(&slots, graph.nodes().iter().map(|n| n.id));
        let duration = start.elapsed();

        info!(
            pipeline = %graph.name(),
            gate = %gate.name(),
            %status,
            ?duration,
            "pipeline finished"
        );
        self.event_tx.send_event(ExecutionEvent::pipeline_completed(
            graph.name(),
            status,
            duration,
        ));

        ExecutionResult {
            pipeline_name: graph.name().to_string(),
            gate: gate.name().to_string(),
            status,
            gate_report,
            results,
            duration,
        }
    }

    /// Reduce the current statuses of a job's needs
    fn dependency_report(&self, slots: &Slots, job_id: JobId) -> AggregateReport {
        let node = self.graph.node(job_id);
        let names: Vec<String> = node
            .needs
            .iter()
            .map(|id| self.graph.node(*id).name().to_string())
            .collect();
        let results = self.results_for(slots, node.needs.iter().copied());
        ResultAggregator::aggregate(&names, &results)
    }

    fn results_for(&self, slots: &Slots, jobs: impl IntoIterator<Item = JobId>) -> ResultSet {
        let mut results = ResultSet::new();
        for id in jobs {
            let name = self.graph.node(id).name();
            results.insert_job(name);
            for slot in &slots[id.0] {
                results.record(name, slot.instance().id.to_string(), slot.status().clone());
            }
        }
        results
    }

    fn settle_job(&self, slots: &Slots, job_id: JobId, status: InstanceStatus) {
        for index in 0..slots[job_id.0].len() {
            self.settle(slots, job_id, index, status.clone(), Duration::ZERO);
        }
    }

    fn settle(
        &self,
        slots: &Slots,
        job_id: JobId,
        index: usize,
        status: InstanceStatus,
        duration: Duration,
    ) {
        let slot = &slots[job_id.0][index];
        let instance = slot.instance().id.to_string();

        match slot.settle(status.clone()) {
            Ok(()) => {
                debug!(instance = %instance, %status, "instance settled");
                self.event_tx.send_event(ExecutionEvent::instance_completed(
                    instance, status, duration,
                ));
            }
            Err(e) => warn!(error = %e, "ignoring second status"),
        }
    }
}

/// Everything a spawned task needs to run one instance
struct InstanceTask {
    graph: Arc<PipelineGraph>,
    runner: Arc<dyn JobRunner>,
    job_id: JobId,
    index: usize,
    timeout: Option<Duration>,
    working_dir: PathBuf,
    events: Option<ProgressSender>,
    cancel_rx: CancelReceiver,
    semaphore: Option<Arc<Semaphore>>,
}

impl InstanceTask {
    async fn run(self) -> (InstanceStatus, Duration) {
        let InstanceTask {
            graph,
            runner,
            job_id,
            index,
            timeout,
            working_dir,
            events,
            mut cancel_rx,
            semaphore,
        } = self;

        let queued = Instant::now();

        let _permit = match semaphore {
            Some(semaphore) => tokio::select! {
                permit = semaphore.acquire_owned() => permit.ok(),
                reason = wait_for_cancel(&mut cancel_rx) => {
                    return (reason.failure(), queued.elapsed());
                }
            },
            None => None,
        };

        let current = *cancel_rx.borrow_and_update();
        if let Some(reason) = current {
            return (reason.failure(), queued.elapsed());
        }

        let node = graph.node(job_id);
        let instance = &node.instances[index];

        // Later layers override earlier ones: pipeline, job, matrix
        let mut env = graph.env().clone();
        env.extend(node.spec.env.iter().map(|(k, v)| (k.clone(), v.clone())));
        env.extend(instance.matrix_env());

        events.send_event(ExecutionEvent::instance_started(
            instance.id.to_string(),
            node.spec.steps.len(),
        ));
        debug!(instance = %instance.id, ?timeout, "dispatching instance");

        let started = Instant::now();
        let request = RunRequest {
            instance,
            steps: &node.spec.steps,
            env,
            working_dir: &working_dir,
            events: events.clone(),
        };
        let run = runner.run(request);
        let bounded = async move {
            match timeout {
                Some(limit) => tokio::time::timeout(limit, run).await.ok(),
                None => Some(run.await),
            }
        };

        let status = tokio::select! {
            outcome = bounded => match outcome {
                Some(RunOutcome::Success) => InstanceStatus::Success,
                Some(RunOutcome::Failure { step_index, exit_code }) => {
                    InstanceStatus::Failure(FailureKind::StepFailed { step_index, exit_code })
                }
                None => {
                    warn!(instance = %instance.id, ?timeout, "instance timed out");
                    InstanceStatus::Failure(FailureKind::TimedOut)
                }
            },
            reason = wait_for_cancel(&mut cancel_rx) => reason.failure(),
        };

        (status, started.elapsed())
    }
}
