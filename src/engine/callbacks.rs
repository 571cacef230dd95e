// src/engine/callbacks.rs

//! Outbound hooks supplied by the caller.

use async_trait::async_trait;

use crate::engine::progress::{ProgressSnapshot, RunSummary};
use crate::plan::PlanStatus;
use crate::store::Concept;
use crate::types::{ConceptId, MessageId, MessageRole, PlanId, StepId};

/// A step output to persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub role: MessageRole,
    pub content: String,
    pub concept_id: Option<ConceptId>,
    pub conversation_id: Option<String>,
}

/// Persists step outputs. Where and how is up to the implementor.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn save_message(&self, message: OutboundMessage) -> anyhow::Result<MessageId>;
}

/// Observer of one autonomous run.
#[async_trait]
pub trait RunCallbacks: MessageSink {
    /// Emitted after every state-changing event.
    fn on_progress(&self, snapshot: &ProgressSnapshot);

    /// Emitted exactly once, when the run terminates.
    fn on_complete(&self, summary: &RunSummary);

    /// Emitted instead of `on_complete` when the run cannot start.
    fn on_error(&self, message: &str);

    /// Provision a destination for a newly discovered concept's output.
    async fn create_conversation_for_concept(
        &self,
        _concept: &Concept,
    ) -> anyhow::Result<Option<String>> {
        Ok(None)
    }

    fn on_concept_discovered(&self, _concept: &Concept, _conversation_id: Option<&str>) {}
}

/// Lifecycle events of a manually executed plan.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanEvent {
    /// Execution is parked before `step_index` until resumed or cancelled.
    AwaitingConfirmation {
        plan_id: PlanId,
        step_id: StepId,
        step_index: usize,
        title: String,
    },
    StepStarted {
        plan_id: PlanId,
        step_id: StepId,
        step_index: usize,
    },
    StepCompleted {
        plan_id: PlanId,
        step_id: StepId,
        step_index: usize,
        message_id: Option<MessageId>,
    },
    StepFailed {
        plan_id: PlanId,
        step_id: StepId,
        step_index: usize,
        error: String,
    },
    Finished {
        plan_id: PlanId,
        status: PlanStatus,
    },
}

pub trait PlanObserver: Send + Sync {
    fn on_plan_event(&self, event: PlanEvent);
}

/// Adapts run callbacks to the [`MessageSink`] workers write through.
pub(crate) struct RunSink(pub(crate) std::sync::Arc<dyn RunCallbacks>);

#[async_trait]
impl MessageSink for RunSink {
    async fn save_message(&self, message: OutboundMessage) -> anyhow::Result<MessageId> {
        self.0.save_message(message).await
    }
}
