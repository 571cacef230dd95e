// src/plan/model.rs

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ConceptId, MessageId, PlanId, StepId, TaskId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    AwaitingApproval,
    Executing,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl PlanStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PlanStatus::Completed | PlanStatus::Failed | PlanStatus::Cancelled
        )
    }
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PlanStatus::AwaitingApproval => "awaiting_approval",
            PlanStatus::Executing => "executing",
            PlanStatus::Paused => "paused",
            PlanStatus::Completed => "completed",
            PlanStatus::Failed => "failed",
            PlanStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    AwaitingConfirmation,
    Running,
    Completed,
    Failed,
}

/// A workflow step bound to the task and plan it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPlanStep {
    pub id: StepId,
    pub task_id: TaskId,
    pub concept_id: ConceptId,
    pub concept_name: String,
    /// Position of the concept in the resolved order.
    pub concept_position: usize,
    pub step_number: u32,
    pub title: String,
    pub description: String,
    pub prompt_template: String,
    pub expected_outcome: String,
    pub estimated_minutes: u32,
    pub status: StepStatus,
    pub task_title: Option<String>,
    pub task_content: Option<String>,
    pub conversation_id: Option<String>,
    pub message_id: Option<MessageId>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanTask {
    pub task_id: TaskId,
    pub concept_id: ConceptId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub id: PlanId,
    pub user_id: String,
    pub tenant_id: String,
    pub status: PlanStatus,
    /// Concepts in resolved order.
    pub concepts: Vec<ConceptId>,
    /// Pending tasks the plan was built from.
    pub tasks: Vec<PlanTask>,
    pub steps: Vec<ExecutionPlanStep>,
    /// Index of the step being (or about to be) executed.
    pub current_step: usize,
    pub estimated_minutes: u32,
    pub created_at: DateTime<Utc>,
}

impl ExecutionPlan {
    /// Whether every step of `concept` has completed.
    pub fn concept_completed(&self, concept: &ConceptId) -> bool {
        self.steps
            .iter()
            .filter(|s| s.concept_id == *concept)
            .all(|s| s.status == StepStatus::Completed)
    }

    pub fn tasks_for_concept(&self, concept: &ConceptId) -> Vec<TaskId> {
        self.tasks
            .iter()
            .filter(|t| t.concept_id == *concept)
            .map(|t| t.task_id.clone())
            .collect()
    }
}
