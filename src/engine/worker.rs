// src/engine/worker.rs

//! Execution of one task's workflow.

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::engine::callbacks::{MessageSink, OutboundMessage};
use crate::engine::context::{RollingContext, truncate_chars};
use crate::exec::{ExecutionHints, StepExecutor, StepRequest, WorkflowCache};
use crate::store::{Concept, TaskContext};
use crate::types::{MessageRole, TaskId};

/// Step-level events streamed to the coordinator while a worker runs.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    StepStarted {
        task_id: TaskId,
        index: usize,
        total: usize,
        title: String,
    },
    StepCompleted {
        task_id: TaskId,
        concept: Concept,
        title: String,
        content: String,
    },
}

#[derive(Debug)]
pub enum WorkerOutcome {
    /// All steps ran; `output` joins the step summaries.
    Completed { output: String },
    /// Stopped between steps by cancellation.
    Cancelled,
    Failed(anyhow::Error),
}

#[derive(Debug)]
pub struct WorkerReport {
    pub task_id: TaskId,
    pub outcome: WorkerOutcome,
}

/// Input for one worker, snapshotted by the coordinator at dispatch.
pub struct WorkerJob {
    pub task_id: TaskId,
    pub concept: Concept,
    pub task_context: TaskContext,
    pub conversation_id: Option<String>,
    pub context: RollingContext,
    pub hints: ExecutionHints,
    pub summary_chars: usize,
}

/// Shared collaborators for every worker of a run.
#[derive(Clone)]
pub struct WorkerDeps {
    pub executor: Arc<dyn StepExecutor>,
    pub workflows: Arc<WorkflowCache>,
    pub sink: Arc<dyn MessageSink>,
    pub events: mpsc::UnboundedSender<WorkerEvent>,
    pub cancel: CancellationToken,
}

impl WorkerDeps {
    /// Stream an event to the coordinator. Once the coordinator has stopped
    /// listening the event only matters to the trace log.
    fn report(&self, event: WorkerEvent) {
        if let Err(err) = self.events.send(event) {
            trace!(event = ?err.0, "coordinator gone; step event dropped");
        }
    }
}

pub async fn run_worker(job: WorkerJob, deps: WorkerDeps) -> WorkerReport {
    let task_id = job.task_id.clone();
    let outcome = match execute(job, &deps).await {
        Ok(Some(output)) => WorkerOutcome::Completed { output },
        Ok(None) => WorkerOutcome::Cancelled,
        Err(err) => WorkerOutcome::Failed(err),
    };
    WorkerReport { task_id, outcome }
}

/// `Ok(None)` when cancelled between steps.
async fn execute(mut job: WorkerJob, deps: &WorkerDeps) -> anyhow::Result<Option<String>> {
    let steps = deps
        .workflows
        .steps_for(&job.concept, Some(&job.task_context))
        .await
        .with_context(|| format!("loading workflow for {}", job.concept.id))?;
    let total = steps.len();
    let mut summaries = Vec::with_capacity(total);

    for (index, step) in steps.iter().enumerate() {
        if deps.cancel.is_cancelled() {
            debug!(task = %job.task_id, step = index, "cancelled before step");
            return Ok(None);
        }

        deps.report(WorkerEvent::StepStarted {
            task_id: job.task_id.clone(),
            index,
            total,
            title: step.title.clone(),
        });

        let request = StepRequest {
            concept: job.concept.clone(),
            step: step.clone(),
            index,
            total,
            task_context: Some(job.task_context.clone()),
            context: job.context.refs(),
            hints: job.hints,
        };
        let task_id = job.task_id.clone();
        let result = deps
            .executor
            .execute(&request, &move |chunk: &str| {
                trace!(task = %task_id, bytes = chunk.len(), "step output chunk");
            })
            .await
            .with_context(|| format!("step {} ({}) of {}", index + 1, step.title, job.concept.name))?;

        deps.sink
            .save_message(OutboundMessage {
                role: MessageRole::Assistant,
                content: result.content.clone(),
                concept_id: Some(job.concept.id.clone()),
                conversation_id: job.conversation_id.clone(),
            })
            .await
            .with_context(|| format!("saving output of step {}", index + 1))?;

        job.context.push(&job.concept.id, &step.title, &result.content);
        summaries.push(truncate_chars(&result.content, job.summary_chars));

        deps.report(WorkerEvent::StepCompleted {
            task_id: job.task_id.clone(),
            concept: job.concept.clone(),
            title: step.title.clone(),
            content: result.content,
        });
    }

    Ok(Some(summaries.join("\n\n")))
}
