// src/exec/offline.rs

//! Deterministic collaborators that need no external services.
//!
//! The CLI wires these in so plans and runs can be exercised against a seed
//! file: the executor echoes its inputs, workflows come from a fixed
//! template, every candidate scores the same and nothing is semantically
//! similar.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::engine::admission::NEUTRAL_SCORE;
use crate::engine::callbacks::{
    MessageSink, OutboundMessage, PlanEvent, PlanObserver, RunCallbacks,
};
use crate::engine::progress::{ProgressSnapshot, RunSummary};
use crate::exec::backend::{
    RelevanceScorer, ScoringContext, SemanticSearch, SimilarConcept, StepExecutor, StepRequest,
    StepResult, WorkflowGenerator,
};
use crate::exec::workflow::WorkflowStep;
use crate::store::{Concept, TaskContext};
use crate::types::MessageId;

/// Returns a structured echo of the step and its context.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoStepExecutor;

#[async_trait]
impl StepExecutor for EchoStepExecutor {
    async fn execute(
        &self,
        request: &StepRequest,
        on_chunk: &(dyn for<'c> Fn(&'c str) + Send + Sync),
    ) -> anyhow::Result<StepResult> {
        let mut content = String::new();
        writeln!(content, "# {}", request.step.title)?;
        writeln!(
            content,
            "concept: {} ({})",
            request.concept.name, request.concept.id
        )?;
        writeln!(content, "step: {}/{}", request.index + 1, request.total)?;
        if let Some(title) = request.task_context.as_ref().and_then(|c| c.title.as_deref()) {
            writeln!(content, "task: {title}")?;
        }
        writeln!(content, "context: {} earlier step(s)", request.context.len())?;
        if !request.step.description.is_empty() {
            writeln!(content)?;
            writeln!(content, "{}", request.step.description)?;
        }

        for line in content.lines() {
            on_chunk(line);
        }
        Ok(StepResult {
            content,
            citations: Vec::new(),
        })
    }
}

/// Fixed three-step breakdown for every concept.
#[derive(Debug, Default, Clone, Copy)]
pub struct TemplateWorkflowGenerator;

#[async_trait]
impl WorkflowGenerator for TemplateWorkflowGenerator {
    async fn generate(
        &self,
        concept: &Concept,
        context: Option<&TaskContext>,
    ) -> anyhow::Result<Vec<WorkflowStep>> {
        let focus = context
            .and_then(|c| c.title.as_deref())
            .map(|t| format!(" for \"{t}\""))
            .unwrap_or_default();
        let name = &concept.name;

        let template = [
            ("Understand", "Summarise the essentials of", 15),
            ("Apply", "Work out concrete actions for", 30),
            ("Review", "Check the outcome and open questions of", 15),
        ];
        Ok(template
            .iter()
            .zip(1u32..)
            .map(|((verb, what, minutes), step_number)| WorkflowStep {
                step_number,
                title: format!("{verb} {name}"),
                description: format!("{what} {name}{focus}."),
                prompt_template: format!("{}:{}", concept.id, verb.to_lowercase()),
                expected_outcome: format!("{verb} notes on {name}"),
                estimated_minutes: *minutes,
            })
            .collect())
    }
}

/// Every candidate is equally relevant and every threshold is zero.
#[derive(Debug, Default, Clone, Copy)]
pub struct NeutralScorer;

#[async_trait]
impl RelevanceScorer for NeutralScorer {
    async fn score(&self, _candidate: &Concept, _context: &ScoringContext) -> anyhow::Result<f64> {
        Ok(NEUTRAL_SCORE)
    }

    fn threshold(&self, _role: Option<&str>) -> f64 {
        0.0
    }
}

/// Similarity search with an empty index.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSemanticSearch;

#[async_trait]
impl SemanticSearch for NoSemanticSearch {
    async fn similar_concepts(
        &self,
        _text: &str,
        _threshold: f64,
        _limit: usize,
    ) -> anyhow::Result<Vec<SimilarConcept>> {
        Ok(Vec::new())
    }
}

/// How a run observed by [`ConsoleCallbacks`] ended.
#[derive(Debug, Clone)]
pub enum ConsoleOutcome {
    Finished(RunSummary),
    Failed(String),
}

/// Prints progress and the final summary to stdout.
#[derive(Debug, Default)]
pub struct ConsoleCallbacks {
    last_line: Mutex<String>,
    outcome: Mutex<Option<ConsoleOutcome>>,
    done: Notify,
    saved: AtomicUsize,
}

impl ConsoleCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages saved so far.
    pub fn saved_messages(&self) -> usize {
        self.saved.load(Ordering::SeqCst)
    }

    /// Wait for `on_complete` or `on_error`.
    pub async fn wait(&self) -> ConsoleOutcome {
        loop {
            if let Some(outcome) = self.take_outcome() {
                return outcome;
            }
            self.done.notified().await;
        }
    }

    fn take_outcome(&self) -> Option<ConsoleOutcome> {
        self.outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn finish(&self, outcome: ConsoleOutcome) {
        *self.outcome.lock().unwrap_or_else(PoisonError::into_inner) = Some(outcome);
        self.done.notify_one();
    }
}

#[async_trait]
impl MessageSink for ConsoleCallbacks {
    async fn save_message(&self, _message: OutboundMessage) -> anyhow::Result<MessageId> {
        self.saved.fetch_add(1, Ordering::SeqCst);
        Ok(MessageId::generate())
    }
}

#[async_trait]
impl RunCallbacks for ConsoleCallbacks {
    fn on_progress(&self, snapshot: &ProgressSnapshot) {
        let mut line = format!(
            "[{}] {}/{} completed, {} running, {} failed",
            snapshot.status, snapshot.completed, snapshot.total, snapshot.running, snapshot.failed
        );
        if snapshot.discovered > 0 {
            let _ = write!(line, ", {} discovered", snapshot.discovered);
        }

        let mut last = self.last_line.lock().unwrap_or_else(PoisonError::into_inner);
        if *last != line {
            println!("{line}");
            *last = line;
        }
    }

    fn on_complete(&self, summary: &RunSummary) {
        println!();
        println!("run {} {}", summary.run_id, summary.status);
        println!(
            "  completed: {}  failed: {}  pending: {}  total: {}",
            summary.completed, summary.failed, summary.pending, summary.total
        );
        println!(
            "  discovered: {}  deferred: {}  considered: {}",
            summary.discovered, summary.deferred, summary.considered
        );
        println!("  duration: {}ms", summary.duration_ms);
        println!();
        for entry in &summary.log {
            println!("  {entry}");
        }
        self.finish(ConsoleOutcome::Finished(summary.clone()));
    }

    fn on_error(&self, message: &str) {
        eprintln!("run could not start: {message}");
        self.finish(ConsoleOutcome::Failed(message.to_string()));
    }

    fn on_concept_discovered(&self, concept: &Concept, _conversation_id: Option<&str>) {
        println!("  + discovered {} ({})", concept.name, concept.id);
    }
}

impl PlanObserver for ConsoleCallbacks {
    fn on_plan_event(&self, event: PlanEvent) {
        match event {
            PlanEvent::AwaitingConfirmation {
                step_index, title, ..
            } => println!("step {}: {title} (awaiting confirmation)", step_index + 1),
            PlanEvent::StepStarted { step_index, .. } => println!("step {}: running", step_index + 1),
            PlanEvent::StepCompleted { step_index, .. } => {
                println!("step {}: completed", step_index + 1)
            }
            PlanEvent::StepFailed {
                step_index, error, ..
            } => println!("step {}: failed: {error}", step_index + 1),
            PlanEvent::Finished { plan_id, status } => println!("plan {plan_id} {status}"),
        }
    }
}
