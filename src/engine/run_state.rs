// src/engine/run_state.rs

//! Pure orchestration state for one run.
//!
//! `RunState` owns the task arena, the ready queue, the concept locks and
//! every counter. It performs no IO: the coordinator in
//! [`scheduler`](super::scheduler) feeds it worker outcomes and carries out
//! what it decides.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Instant;

use tracing::debug;

use crate::config::{EngineSection, SchedulerConfig};
use crate::engine::context::RollingContext;
use crate::engine::locks::{Acquire, ConceptLocks};
use crate::engine::progress::{ProgressSnapshot, RunSummary, RunningTask};
use crate::engine::run_log::RunLog;
use crate::store::{Concept, TaskContext};
use crate::types::{ConceptId, RunId, RunStatus, TaskId};

/// In-run lifecycle of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskPhase {
    /// Waiting on prerequisites (or returned after cancellation).
    Pending,
    Ready,
    Running,
    /// Failed with retries left; keeps its concept lock until re-queued.
    BackingOff,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepProgress {
    pub index: usize,
    pub total: usize,
    pub title: String,
}

#[derive(Debug, Clone)]
pub struct RunTask {
    pub id: TaskId,
    pub concept: Concept,
    pub name: String,
    pub context: TaskContext,
    /// Where this task's step outputs are saved.
    pub conversation_id: Option<String>,
    /// In-run prerequisite concepts.
    pub prerequisites: Vec<ConceptId>,
    pub phase: TaskPhase,
    /// Failures so far.
    pub retries: u32,
    /// Executions started so far.
    pub attempts: u32,
    pub step: Option<StepProgress>,
}

impl RunTask {
    pub fn new(id: TaskId, concept: Concept, name: String) -> Self {
        Self {
            id,
            concept,
            name,
            context: TaskContext::default(),
            conversation_id: None,
            prerequisites: Vec::new(),
            phase: TaskPhase::Pending,
            retries: 0,
            attempts: 0,
            step: None,
        }
    }
}

/// What to do with a task whose worker just failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Re-queue after a backoff; `retries` is the failure count so far.
    Retry { retries: u32 },
    Terminal,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhaseCounts {
    pub pending: usize,
    pub ready: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
}

impl PhaseCounts {
    pub fn total(&self) -> usize {
        self.pending + self.ready + self.running + self.completed + self.failed
    }
}

#[derive(Debug)]
pub struct RunState {
    pub run_id: RunId,
    pub status: RunStatus,
    tasks: HashMap<TaskId, RunTask>,
    /// Admission order; drives ready-queue promotion.
    order: Vec<TaskId>,
    ready: VecDeque<TaskId>,
    locks: ConceptLocks,
    completed_concepts: HashSet<ConceptId>,
    failed_concepts: HashSet<ConceptId>,
    known: HashSet<ConceptId>,
    pub discovered: usize,
    pub deferred: usize,
    pub considered: usize,
    pub consecutive_failures: u32,
    pub cancelled: bool,
    pub hard_stopped: bool,
    pub log: RunLog,
    pub context: RollingContext,
    started: Instant,
}

impl RunState {
    pub fn new(run_id: RunId, engine: &EngineSection) -> Self {
        Self {
            log: RunLog::new(run_id.clone(), engine.log_capacity),
            run_id,
            status: RunStatus::Initializing,
            tasks: HashMap::new(),
            order: Vec::new(),
            ready: VecDeque::new(),
            locks: ConceptLocks::new(engine.lock_ttl()),
            completed_concepts: HashSet::new(),
            failed_concepts: HashSet::new(),
            known: HashSet::new(),
            discovered: 0,
            deferred: 0,
            considered: 0,
            consecutive_failures: 0,
            cancelled: false,
            hard_stopped: false,
            context: RollingContext::new(engine.context_max_entries, engine.context_summary_chars),
            started: Instant::now(),
        }
    }

    // === Admission ===

    /// Add a task to the arena as `Pending`. Duplicate ids are ignored.
    pub fn admit(&mut self, task: RunTask) -> bool {
        if self.tasks.contains_key(&task.id) {
            return false;
        }
        self.known.insert(task.concept.id.clone());
        self.order.push(task.id.clone());
        self.tasks.insert(task.id.clone(), task);
        true
    }

    pub fn admitted(&self) -> usize {
        self.tasks.len()
    }

    /// Mark a concept as known. `false` if it already was.
    pub fn mark_known(&mut self, concept: &ConceptId) -> bool {
        self.known.insert(concept.clone())
    }

    /// Undo [`mark_known`](Self::mark_known) so a later discovery can retry.
    pub fn forget(&mut self, concept: &ConceptId) {
        self.known.remove(concept);
    }

    pub fn is_known(&self, concept: &ConceptId) -> bool {
        self.known.contains(concept)
    }

    /// Whether `concept` has an admitted task and has not completed yet.
    pub fn has_open_task(&self, concept: &ConceptId) -> bool {
        !self.completed_concepts.contains(concept)
            && self.tasks.values().any(|t| t.concept.id == *concept)
    }

    /// Make the pending and ready tasks of `dependent` wait on `prerequisite`.
    ///
    /// Ready tasks leave the queue again. Running, backing-off and finished
    /// tasks are left alone, and so is any link that would close a cycle.
    /// Returns how many tasks now wait.
    pub fn add_prerequisite(&mut self, dependent: &ConceptId, prerequisite: &ConceptId) -> usize {
        if dependent == prerequisite
            || self.completed_concepts.contains(prerequisite)
            || self.waits_on(prerequisite, dependent)
        {
            return 0;
        }

        let mut demoted = HashSet::new();
        let mut linked = 0;
        for task in self.tasks.values_mut() {
            if task.concept.id != *dependent
                || !matches!(task.phase, TaskPhase::Pending | TaskPhase::Ready)
                || task.prerequisites.contains(prerequisite)
            {
                continue;
            }
            task.prerequisites.push(prerequisite.clone());
            if task.phase == TaskPhase::Ready {
                task.phase = TaskPhase::Pending;
                demoted.insert(task.id.clone());
            }
            linked += 1;
        }
        if !demoted.is_empty() {
            self.ready.retain(|id| !demoted.contains(id));
        }
        linked
    }

    /// Whether `concept` waits on `target`, directly or through other
    /// unfinished in-run prerequisites.
    fn waits_on(&self, concept: &ConceptId, target: &ConceptId) -> bool {
        let mut stack = vec![concept.clone()];
        let mut seen = HashSet::new();
        while let Some(current) = stack.pop() {
            if self.completed_concepts.contains(&current) || !seen.insert(current.clone()) {
                continue;
            }
            for task in self.tasks.values().filter(|t| t.concept.id == current) {
                for prerequisite in &task.prerequisites {
                    if prerequisite == target {
                        return true;
                    }
                    stack.push(prerequisite.clone());
                }
            }
        }
        false
    }

    // === Queue ===

    /// Move every pending task whose prerequisites are all completed onto
    /// the back of the ready queue, in admission order.
    pub fn promote_unblocked(&mut self) -> usize {
        let mut promoted = 0;
        for id in &self.order {
            let Some(task) = self.tasks.get_mut(id) else {
                continue;
            };
            if task.phase != TaskPhase::Pending {
                continue;
            }
            if task
                .prerequisites
                .iter()
                .all(|p| self.completed_concepts.contains(p))
            {
                task.phase = TaskPhase::Ready;
                self.ready.push_back(id.clone());
                promoted += 1;
            }
        }
        promoted
    }

    pub fn ready_len(&self) -> usize {
        self.ready.len()
    }

    /// Pick tasks to launch, marking each `Running` under its concept lock.
    ///
    /// Stops at `slots` in-flight workers or at `ceiling` completed plus
    /// in-flight tasks. A task whose concept is locked by another task goes
    /// to the back of the queue and the scan moves on.
    pub fn next_dispatch(&mut self, slots: usize, ceiling: usize) -> Vec<TaskId> {
        let mut launched = Vec::new();
        // Each ready task is looked at once; lock-blocked ones keep their turn.
        let mut remaining = self.ready.len();
        while remaining > 0 {
            remaining -= 1;
            let counts = self.counts();
            if counts.running >= slots || counts.completed + counts.running >= ceiling {
                break;
            }
            let Some(id) = self.ready.pop_front() else {
                break;
            };
            let Some(task) = self.tasks.get(&id) else {
                continue;
            };
            let concept = task.concept.id.clone();

            match self.locks.acquire(&concept, &id) {
                Acquire::Held { holder } => {
                    debug!(task = %id, concept = %concept, holder = %holder, "concept locked; task waits");
                    self.ready.push_back(id);
                    continue;
                }
                Acquire::Stolen { previous } => {
                    self.log.warn(format!(
                        "stale lock on {concept} held by {previous} was released"
                    ));
                }
                Acquire::Acquired => {}
            }

            if let Some(task) = self.tasks.get_mut(&id) {
                task.phase = TaskPhase::Running;
                task.attempts += 1;
                task.step = None;
                let attempt = task.attempts;
                let name = task.name.clone();
                self.log.info(format!("dispatched {name} (attempt {attempt})"));
            }
            launched.push(id);
        }
        launched
    }

    // === Worker outcomes ===

    pub fn record_step(&mut self, id: &TaskId, progress: StepProgress) {
        if let Some(task) = self.tasks.get_mut(id).filter(|t| t.phase == TaskPhase::Running) {
            task.step = Some(progress);
        }
    }

    pub fn on_success(&mut self, id: &TaskId) {
        let Some(task) = self.tasks.get_mut(id) else {
            return;
        };
        task.phase = TaskPhase::Completed;
        task.step = None;
        let concept = task.concept.id.clone();
        let name = task.name.clone();

        self.consecutive_failures = 0;
        self.completed_concepts.insert(concept.clone());
        self.locks.release(&concept);
        self.log.info(format!("completed {name}"));
    }

    pub fn on_failure(&mut self, id: &TaskId, error: &str, retry_attempts: u32) -> FailureOutcome {
        self.consecutive_failures += 1;
        let Some(task) = self.tasks.get_mut(id) else {
            return FailureOutcome::Terminal;
        };
        task.retries += 1;
        task.step = None;
        let retries = task.retries;
        let name = task.name.clone();
        let concept = task.concept.id.clone();

        if retries <= retry_attempts {
            task.phase = TaskPhase::BackingOff;
            self.log.warn(format!(
                "{name} failed (attempt {retries}/{}): {error}; retrying",
                retry_attempts + 1
            ));
            return FailureOutcome::Retry { retries };
        }

        task.phase = TaskPhase::Failed;
        self.failed_concepts.insert(concept.clone());
        self.locks.release(&concept);
        self.log
            .error(format!("{name} failed permanently after {retries} attempt(s): {error}"));
        FailureOutcome::Terminal
    }

    /// A worker stopped by cancellation: the task returns to pending.
    pub fn on_cancelled(&mut self, id: &TaskId) {
        let Some(task) = self.tasks.get_mut(id) else {
            return;
        };
        task.phase = TaskPhase::Pending;
        task.step = None;
        let concept = task.concept.id.clone();
        let name = task.name.clone();
        self.locks.release(&concept);
        self.log.info(format!("{name} stopped by cancellation"));
    }

    /// Backoff elapsed: re-queue the task. Its lock is still held.
    pub fn on_retry_due(&mut self, id: &TaskId) -> bool {
        match self.tasks.get_mut(id) {
            Some(task) if task.phase == TaskPhase::BackingOff => {
                task.phase = TaskPhase::Ready;
                self.ready.push_back(id.clone());
                true
            }
            _ => false,
        }
    }

    /// Return backing-off tasks to pending and release their locks.
    pub fn abandon_backoffs(&mut self) {
        let ids: Vec<TaskId> = self
            .tasks
            .values()
            .filter(|t| t.phase == TaskPhase::BackingOff)
            .map(|t| t.id.clone())
            .collect();
        for id in ids {
            if let Some(task) = self.tasks.get_mut(&id) {
                task.phase = TaskPhase::Pending;
                let concept = task.concept.id.clone();
                self.locks.release(&concept);
            }
        }
    }

    pub fn task(&self, id: &TaskId) -> Option<&RunTask> {
        self.tasks.get(id)
    }

    pub fn lock_holder(&self, concept: &ConceptId) -> Option<&TaskId> {
        self.locks.holder(concept)
    }

    pub fn is_concept_completed(&self, concept: &ConceptId) -> bool {
        self.completed_concepts.contains(concept)
    }

    pub fn is_concept_failed(&self, concept: &ConceptId) -> bool {
        self.failed_concepts.contains(concept)
    }

    // === Reporting ===

    pub fn counts(&self) -> PhaseCounts {
        let mut counts = PhaseCounts::default();
        for task in self.tasks.values() {
            match task.phase {
                TaskPhase::Pending | TaskPhase::BackingOff => counts.pending += 1,
                TaskPhase::Ready => counts.ready += 1,
                TaskPhase::Running => counts.running += 1,
                TaskPhase::Completed => counts.completed += 1,
                TaskPhase::Failed => counts.failed += 1,
            }
        }
        counts
    }

    /// Effective concurrency: collapses to 1 under backpressure.
    pub fn effective_concurrency(&self, config: &SchedulerConfig) -> usize {
        if self.ready.len() > config.backpressure_queue_length {
            1
        } else {
            config.max_concurrency
        }
    }

    /// Terminal status for the run. Cancellation wins over hard stop, which
    /// wins over failure.
    pub fn classify(&self) -> RunStatus {
        let counts = self.counts();
        if self.cancelled {
            RunStatus::Cancelled
        } else if self.hard_stopped {
            RunStatus::HardStopped
        } else if counts.completed == 0 && counts.failed > 0 && counts.failed == counts.total() {
            RunStatus::Failed
        } else {
            RunStatus::Completed
        }
    }

    pub fn snapshot(&self, log_lines: usize) -> ProgressSnapshot {
        let counts = self.counts();
        let running_tasks = self
            .order
            .iter()
            .filter_map(|id| self.tasks.get(id))
            .filter(|t| t.phase == TaskPhase::Running)
            .map(|t| RunningTask {
                task_id: t.id.clone(),
                concept_id: t.concept.id.clone(),
                name: t.name.clone(),
                step_index: t.step.as_ref().map(|s| s.index),
                step_total: t.step.as_ref().map(|s| s.total),
                step_title: t.step.as_ref().map(|s| s.title.clone()),
            })
            .collect();

        ProgressSnapshot {
            run_id: self.run_id.clone(),
            status: self.status,
            total: counts.total(),
            completed: counts.completed,
            failed: counts.failed,
            running: counts.running,
            ready: counts.ready,
            pending: counts.pending,
            discovered: self.discovered,
            running_tasks,
            recent_log: self.log.tail(log_lines),
        }
    }

    pub fn summary(&self) -> RunSummary {
        let counts = self.counts();
        RunSummary {
            run_id: self.run_id.clone(),
            status: self.status,
            total: counts.total(),
            completed: counts.completed,
            failed: counts.failed,
            pending: counts.pending + counts.ready + counts.running,
            discovered: self.discovered,
            deferred: self.deferred,
            considered: self.considered,
            duration_ms: u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX),
            log: self.log.entries(),
        }
    }
}
