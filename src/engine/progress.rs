// src/engine/progress.rs

//! Snapshots and summaries reported to run observers.

use serde::Serialize;

use crate::engine::run_log::LogEntry;
use crate::types::{ConceptId, RunId, RunStatus, TaskId};

/// Step-level detail for a task that is currently running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunningTask {
    pub task_id: TaskId,
    pub concept_id: ConceptId,
    pub name: String,
    /// 0-based index of the step in progress, once the workflow is known.
    pub step_index: Option<usize>,
    pub step_total: Option<usize>,
    pub step_title: Option<String>,
}

/// Point-in-time view of a run.
///
/// `completed + failed + running + ready + pending == total` always holds;
/// `pending` includes tasks blocked on prerequisites and tasks waiting out a
/// retry backoff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    pub run_id: RunId,
    pub status: RunStatus,
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub running: usize,
    pub ready: usize,
    pub pending: usize,
    /// Tasks admitted into the run through discovery.
    pub discovered: usize,
    pub running_tasks: Vec<RunningTask>,
    pub recent_log: Vec<LogEntry>,
}

impl ProgressSnapshot {
    /// Snapshot of a run that has not loaded any tasks yet.
    pub fn initializing(run_id: RunId) -> Self {
        Self {
            run_id,
            status: RunStatus::Initializing,
            total: 0,
            completed: 0,
            failed: 0,
            running: 0,
            ready: 0,
            pending: 0,
            discovered: 0,
            running_tasks: Vec::new(),
            recent_log: Vec::new(),
        }
    }
}

/// Final report of a run, emitted exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub run_id: RunId,
    pub status: RunStatus,
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    /// Admitted tasks that never ran to a terminal state.
    pub pending: usize,
    pub discovered: usize,
    /// New tasks created but left for a future run (budget reached).
    pub deferred: usize,
    /// Candidates evaluated, both at admission ranking and by discovery.
    pub considered: usize,
    pub duration_ms: u64,
    pub log: Vec<LogEntry>,
}
