// src/engine/scheduler.rs

//! The coordinator: single owner of a run's [`RunState`].
//!
//! Workers, retry timers and step events all flow back into one
//! `tokio::select!`, so state is only ever mutated from this loop.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::anyhow;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinSet};
use tokio::time::{Instant, sleep, sleep_until};
use tracing::{debug, info, warn};

use crate::config::SchedulerConfig;
use crate::engine::callbacks::RunCallbacks;
use crate::engine::discovery::Discovery;
use crate::engine::progress::{ProgressSnapshot, RunSummary};
use crate::engine::run_state::{FailureOutcome, RunState, StepProgress};
use crate::engine::worker::{WorkerDeps, WorkerEvent, WorkerJob, WorkerOutcome, WorkerReport, run_worker};
use crate::exec::ExecutionHints;
use crate::store::RecordStore;
use crate::types::{RunStatus, TaskId, TaskStatus};

/// Everything a coordinator needs, assembled during run initialization.
pub struct CoordinatorParts {
    pub state: RunState,
    pub config: SchedulerConfig,
    pub progress_log_lines: usize,
    pub summary_chars: usize,
    pub deps: WorkerDeps,
    pub events: mpsc::UnboundedReceiver<WorkerEvent>,
    pub store: Arc<dyn RecordStore>,
    pub discovery: Discovery,
    pub callbacks: Arc<dyn RunCallbacks>,
    pub progress: watch::Sender<ProgressSnapshot>,
}

pub struct Coordinator {
    state: RunState,
    config: SchedulerConfig,
    progress_log_lines: usize,
    summary_chars: usize,
    deps: WorkerDeps,
    events: mpsc::UnboundedReceiver<WorkerEvent>,
    store: Arc<dyn RecordStore>,
    discovery: Discovery,
    callbacks: Arc<dyn RunCallbacks>,
    progress: watch::Sender<ProgressSnapshot>,
    workers: JoinSet<WorkerReport>,
    in_flight: HashMap<tokio::task::Id, TaskId>,
    timers: JoinSet<TaskId>,
    breaker_until: Option<Instant>,
}

impl Coordinator {
    pub fn new(parts: CoordinatorParts) -> Self {
        Self {
            state: parts.state,
            config: parts.config,
            progress_log_lines: parts.progress_log_lines,
            summary_chars: parts.summary_chars,
            deps: parts.deps,
            events: parts.events,
            store: parts.store,
            discovery: parts.discovery,
            callbacks: parts.callbacks,
            progress: parts.progress,
            workers: JoinSet::new(),
            in_flight: HashMap::new(),
            timers: JoinSet::new(),
            breaker_until: None,
        }
    }

    /// Drive the run to a terminal state and report the summary.
    pub async fn run(mut self) -> RunSummary {
        self.state.status = RunStatus::Dispatching;
        self.state.promote_unblocked();
        let admitted = self.state.admitted();
        self.state
            .log
            .info(format!("run started with {admitted} task(s)"));
        self.publish();

        loop {
            if self.deps.cancel.is_cancelled() {
                self.state.cancelled = true;
                self.state
                    .log
                    .warn("cancellation requested; draining in-flight workers");
                break;
            }
            if self.state.counts().completed >= self.config.max_concepts_hard_stop {
                self.state.hard_stopped = true;
                self.state.log.warn(format!(
                    "hard stop: {} task(s) completed",
                    self.config.max_concepts_hard_stop
                ));
                break;
            }

            let paused = self.breaker_paused();
            if !paused {
                self.dispatch();
            }

            let in_flight = !self.workers.is_empty();
            let backing_off = !self.timers.is_empty();
            if !in_flight && !backing_off {
                if !paused && self.state.ready_len() > 0 {
                    self.state
                        .log
                        .error("ready tasks cannot be dispatched; stopping");
                }
                if !paused || self.state.ready_len() == 0 {
                    break;
                }
            }

            if in_flight {
                self.state.status = RunStatus::WaitingForWorker;
            }
            let deadline = self.breaker_until.unwrap_or_else(Instant::now);

            tokio::select! {
                biased;
                _ = self.deps.cancel.cancelled() => {}
                Some(event) = self.events.recv() => self.on_event(event),
                Some(joined) = self.workers.join_next_with_id(), if in_flight => {
                    self.on_settled(joined).await;
                }
                Some(joined) = self.timers.join_next(), if backing_off => self.on_timer(joined),
                _ = sleep_until(deadline), if paused => {}
            }
        }

        self.finish().await
    }

    /// Trip the breaker when consecutive failures reach the threshold, and
    /// report whether dispatch is currently paused.
    fn breaker_paused(&mut self) -> bool {
        if self.breaker_until.is_none()
            && self.state.consecutive_failures >= self.config.circuit_breaker_threshold
        {
            let cooldown = self.config.circuit_breaker_cooldown();
            self.breaker_until = Some(Instant::now() + cooldown);
            self.state.log.warn(format!(
                "circuit breaker tripped after {} consecutive failure(s); pausing dispatch for {}ms",
                self.state.consecutive_failures,
                cooldown.as_millis()
            ));
            self.publish();
        }

        match self.breaker_until {
            Some(until) if Instant::now() < until => true,
            Some(_) => {
                self.breaker_until = None;
                self.state.consecutive_failures = 0;
                self.state.log.info("circuit breaker reset; resuming dispatch");
                false
            }
            None => false,
        }
    }

    fn dispatch(&mut self) {
        let slots = self.state.effective_concurrency(&self.config);
        let launched = self
            .state
            .next_dispatch(slots, self.config.max_concepts_hard_stop);
        if launched.is_empty() {
            return;
        }

        let hints = ExecutionHints {
            research_batch_size: self.config.research_batch_size,
            research_turns: self.config.research_turns,
        };
        for task_id in launched {
            let Some(task) = self.state.task(&task_id) else {
                continue;
            };
            let job = WorkerJob {
                task_id: task_id.clone(),
                concept: task.concept.clone(),
                task_context: task.context.clone(),
                conversation_id: task.conversation_id.clone(),
                context: self.state.context.clone(),
                hints,
                summary_chars: self.summary_chars,
            };
            debug!(run_id = %self.state.run_id, task = %task_id, "spawning worker");
            let handle = self.workers.spawn(run_worker(job, self.deps.clone()));
            self.in_flight.insert(handle.id(), task_id);
        }
        self.publish();
    }

    fn on_event(&mut self, event: WorkerEvent) {
        match event {
            WorkerEvent::StepStarted {
                task_id,
                index,
                total,
                title,
            } => {
                self.state.record_step(
                    &task_id,
                    StepProgress {
                        index,
                        total,
                        title,
                    },
                );
                self.publish();
            }
            WorkerEvent::StepCompleted {
                concept,
                title,
                content,
                ..
            } => {
                self.state.context.push(&concept.id, &title, &content);
            }
        }
    }

    async fn on_settled(&mut self, joined: Result<(tokio::task::Id, WorkerReport), JoinError>) {
        let (task_id, outcome) = match joined {
            Ok((id, report)) => {
                self.in_flight.remove(&id);
                (report.task_id, report.outcome)
            }
            Err(err) => {
                let Some(task_id) = self.in_flight.remove(&err.id()) else {
                    warn!(run_id = %self.state.run_id, error = %err, "unknown worker failed");
                    return;
                };
                (task_id, WorkerOutcome::Failed(anyhow!("worker aborted: {err}")))
            }
        };

        self.state.status = RunStatus::Dispatching;
        match outcome {
            WorkerOutcome::Completed { output } => self.on_success(&task_id, &output).await,
            WorkerOutcome::Cancelled => self.state.on_cancelled(&task_id),
            WorkerOutcome::Failed(err) => self.on_failure(&task_id, err).await,
        }
        self.state.promote_unblocked();
        self.publish();
    }

    async fn on_success(&mut self, task_id: &TaskId, output: &str) {
        self.state.on_success(task_id);

        if let Err(err) = self
            .store
            .update_task_status(task_id, TaskStatus::Completed)
            .await
        {
            self.state
                .log
                .warn(format!("could not mark task {task_id} completed: {err:#}"));
        }

        if self.deps.cancel.is_cancelled() {
            return;
        }
        let Some(concept) = self.state.task(task_id).map(|t| t.concept.clone()) else {
            return;
        };
        self.discovery
            .discover(&mut self.state, &concept, output)
            .await;
    }

    async fn on_failure(&mut self, task_id: &TaskId, err: anyhow::Error) {
        let error = format!("{err:#}");
        match self
            .state
            .on_failure(task_id, &error, self.config.retry_attempts)
        {
            FailureOutcome::Retry { retries } => {
                let delay = self.config.retry_delay(retries);
                debug!(run_id = %self.state.run_id, task = %task_id, ?delay, "scheduling retry");
                let id = task_id.clone();
                self.timers.spawn(async move {
                    sleep(delay).await;
                    id
                });
            }
            FailureOutcome::Terminal => {
                if let Err(err) = self
                    .store
                    .update_task_status(task_id, TaskStatus::Failed)
                    .await
                {
                    self.state
                        .log
                        .warn(format!("could not mark task {task_id} failed: {err:#}"));
                }
            }
        }
    }

    fn on_timer(&mut self, joined: Result<TaskId, JoinError>) {
        match joined {
            Ok(task_id) => {
                if self.state.on_retry_due(&task_id) {
                    self.state.status = RunStatus::Dispatching;
                    self.publish();
                }
            }
            Err(err) => warn!(run_id = %self.state.run_id, error = %err, "retry timer failed"),
        }
    }

    /// Drain in-flight workers, drop pending retries and report.
    async fn finish(mut self) -> RunSummary {
        while let Some(joined) = self.workers.join_next_with_id().await {
            self.on_settled(joined).await;
        }
        self.timers.shutdown().await;
        self.state.abandon_backoffs();

        self.state.status = self.state.classify();
        let counts = self.state.counts();
        self.state.log.info(format!(
            "run {}: {} completed, {} failed, {} pending of {}",
            self.state.status,
            counts.completed,
            counts.failed,
            counts.pending + counts.ready,
            counts.total()
        ));

        let summary = self.state.summary();
        self.publish();
        info!(
            run_id = %summary.run_id,
            status = %summary.status,
            completed = summary.completed,
            failed = summary.failed,
            discovered = summary.discovered,
            deferred = summary.deferred,
            duration_ms = summary.duration_ms,
            "run finished"
        );
        self.callbacks.on_complete(&summary);
        summary
    }

    fn publish(&self) {
        let snapshot = self.state.snapshot(self.progress_log_lines);
        self.progress.send_replace(snapshot.clone());
        self.callbacks.on_progress(&snapshot);
    }
}
