// src/exec/backend.rs

//! Pluggable collaborator abstractions.
//!
//! Production deployments plug in a generative step executor, a relevance
//! scorer and a similarity index. Tests provide scripted implementations
//! (see the `yolo-test-utils` crate) and the CLI uses the ones in
//! [`offline`](super::offline).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::exec::workflow::WorkflowStep;
use crate::store::{Concept, TaskContext};
use crate::types::ConceptId;

/// Summary of an earlier completed step in the same run, handed to the
/// executor as context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextRef {
    pub concept_id: ConceptId,
    pub step_title: String,
    /// Truncated output of that step.
    pub summary: String,
}

/// Pass-through tuning knobs for the executor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionHints {
    pub research_batch_size: Option<u32>,
    pub research_turns: Option<u32>,
}

/// Everything the executor needs to run one step.
#[derive(Debug, Clone)]
pub struct StepRequest {
    pub concept: Concept,
    pub step: WorkflowStep,
    /// Position of `step` within its workflow (0-based) and workflow length.
    pub index: usize,
    pub total: usize,
    /// Originating task's title/content, for personalisation.
    pub task_context: Option<TaskContext>,
    pub context: Vec<ContextRef>,
    pub hints: ExecutionHints,
}

/// Final output of a step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResult {
    pub content: String,
    pub citations: Vec<String>,
}

/// Executes one concrete step, optionally streaming partial output through
/// `on_chunk`.
#[async_trait]
pub trait StepExecutor: Send + Sync {
    async fn execute(
        &self,
        request: &StepRequest,
        on_chunk: &(dyn for<'c> Fn(&'c str) + Send + Sync),
    ) -> anyhow::Result<StepResult>;
}

/// Tenant/user context a candidate concept is scored against.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScoringContext {
    pub tenant_id: String,
    pub user_id: String,
    pub role: Option<String>,
}

/// Scores candidate concepts for admission into a run.
#[async_trait]
pub trait RelevanceScorer: Send + Sync {
    /// Relevance in `[0, 1]`.
    async fn score(&self, candidate: &Concept, context: &ScoringContext) -> anyhow::Result<f64>;

    /// Minimum score a discovered candidate needs to be admitted.
    fn threshold(&self, role: Option<&str>) -> f64;
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimilarConcept {
    pub concept: Concept,
    pub similarity: f64,
}

/// Similarity search over concepts, keyed by free text.
#[async_trait]
pub trait SemanticSearch: Send + Sync {
    /// Concepts similar to `text` with similarity of at least `threshold`,
    /// best first, at most `limit`.
    async fn similar_concepts(
        &self,
        text: &str,
        threshold: f64,
        limit: usize,
    ) -> anyhow::Result<Vec<SimilarConcept>>;
}

/// Breaks a concept down into an ordered list of workflow steps.
#[async_trait]
pub trait WorkflowGenerator: Send + Sync {
    /// With `context == None` the result is a generic workflow that may be
    /// cached; otherwise it is specific to that task.
    async fn generate(
        &self,
        concept: &Concept,
        context: Option<&TaskContext>,
    ) -> anyhow::Result<Vec<WorkflowStep>>;
}
