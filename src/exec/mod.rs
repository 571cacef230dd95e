// src/exec/mod.rs

//! Collaborators that perform the actual work of a step.
//!
//! The scheduler treats step execution, relevance scoring, semantic search
//! and workflow generation as opaque async services.
//!
//! - [`backend`] defines the collaborator traits and their request/response
//!   types.
//! - [`workflow`] caches per-concept workflows produced by a
//!   [`WorkflowGenerator`].
//! - [`offline`] provides deterministic implementations used by the CLI.

pub mod backend;
pub mod offline;
pub mod workflow;

pub use backend::{
    ContextRef, ExecutionHints, RelevanceScorer, ScoringContext, SemanticSearch, SimilarConcept,
    StepExecutor, StepRequest, StepResult, WorkflowGenerator,
};
pub use offline::{
    ConsoleCallbacks, EchoStepExecutor, NeutralScorer, NoSemanticSearch, TemplateWorkflowGenerator,
};
pub use workflow::{WorkflowCache, WorkflowStep};
