// src/plan/builder.rs

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::dag::{DependencyResolver, GraphAccessor};
use crate::errors::{Result, YoloError};
use crate::exec::WorkflowCache;
use crate::plan::model::{ExecutionPlan, ExecutionPlanStep, PlanStatus, PlanTask, StepStatus};
use crate::store::{RecordStore, TaskContext, TaskRecord};
use crate::types::{ConceptId, PlanId, StepId, TaskId, TaskStatus};

/// Turns approved task ids into an ordered, deduplicated execution plan.
#[derive(Clone)]
pub struct ExecutionPlanBuilder {
    store: Arc<dyn RecordStore>,
    graph: GraphAccessor,
    resolver: DependencyResolver,
    workflows: Arc<WorkflowCache>,
}

impl ExecutionPlanBuilder {
    pub fn new(
        store: Arc<dyn RecordStore>,
        resolver: DependencyResolver,
        workflows: Arc<WorkflowCache>,
    ) -> Self {
        Self {
            graph: GraphAccessor::new(Arc::clone(&store)),
            store,
            resolver,
            workflows,
        }
    }

    /// Build a plan in `awaiting_approval` state.
    ///
    /// Fails with [`YoloError::NoPendingTasks`] when none of `task_ids` is
    /// still pending, and with [`YoloError::NoConcepts`] when none of their
    /// concepts can be loaded.
    pub async fn build_plan(
        &self,
        task_ids: &[TaskId],
        user_id: &str,
        tenant_id: &str,
    ) -> Result<ExecutionPlan> {
        let tasks: Vec<TaskRecord> = self
            .store
            .load_tasks(task_ids)
            .await?
            .into_iter()
            .filter(|t| t.status == TaskStatus::Pending)
            .collect();
        if tasks.is_empty() {
            return Err(YoloError::NoPendingTasks);
        }

        // First task per concept supplies the personalisation context.
        let mut concept_ids: Vec<ConceptId> = Vec::new();
        let mut origin: HashMap<ConceptId, &TaskRecord> = HashMap::new();
        for task in &tasks {
            if !origin.contains_key(&task.concept_id) {
                origin.insert(task.concept_id.clone(), task);
                concept_ids.push(task.concept_id.clone());
            }
        }

        let concepts: HashMap<ConceptId, _> = self
            .store
            .load_concepts(&concept_ids)
            .await?
            .into_iter()
            .map(|c| (c.id.clone(), c))
            .collect();
        concept_ids.retain(|id| {
            let known = concepts.contains_key(id);
            if !known {
                warn!(concept = %id, "task references unknown concept; skipping");
            }
            known
        });
        if concept_ids.is_empty() {
            return Err(YoloError::NoConcepts(format!(
                "none of the {} pending task(s) reference a known concept",
                tasks.len()
            )));
        }

        let resolved = self.resolver.resolve(&self.graph, &concept_ids).await;
        debug!(order = ?resolved.order, cycles_broken = resolved.cycles_broken, "resolved plan order");

        let mut steps = Vec::new();
        for (position, concept_id) in resolved.order.iter().enumerate() {
            let (Some(concept), Some(task)) = (concepts.get(concept_id), origin.get(concept_id))
            else {
                continue;
            };
            let context: TaskContext = task.context();
            let workflow = self.workflows.steps_for(concept, Some(&context)).await?;

            steps.extend(workflow.iter().map(|w| ExecutionPlanStep {
                id: StepId::generate(),
                task_id: task.id.clone(),
                concept_id: concept.id.clone(),
                concept_name: concept.name.clone(),
                concept_position: position,
                step_number: w.step_number,
                title: w.title.clone(),
                description: w.description.clone(),
                prompt_template: w.prompt_template.clone(),
                expected_outcome: w.expected_outcome.clone(),
                estimated_minutes: w.estimated_minutes,
                status: StepStatus::Pending,
                task_title: context.title.clone(),
                task_content: context.content.clone(),
                conversation_id: context.conversation_id.clone(),
                message_id: None,
                error: None,
            }));
        }

        let steps = dedup_steps(steps);
        let estimated_minutes = steps.iter().map(|s| s.estimated_minutes).sum();

        let plan = ExecutionPlan {
            id: PlanId::generate(),
            user_id: user_id.to_string(),
            tenant_id: tenant_id.to_string(),
            status: PlanStatus::AwaitingApproval,
            concepts: resolved.order,
            tasks: tasks
                .iter()
                .filter(|t| concepts.contains_key(&t.concept_id))
                .map(|t| PlanTask {
                    task_id: t.id.clone(),
                    concept_id: t.concept_id.clone(),
                })
                .collect(),
            steps,
            current_step: 0,
            estimated_minutes,
            created_at: Utc::now(),
        };

        info!(
            plan = %plan.id,
            concepts = plan.concepts.len(),
            steps = plan.steps.len(),
            estimated_minutes = plan.estimated_minutes,
            "execution plan built"
        );
        Ok(plan)
    }
}

/// Keep the first step for each `(concept, step_number)`.
pub fn dedup_steps(steps: Vec<ExecutionPlanStep>) -> Vec<ExecutionPlanStep> {
    let mut seen: HashSet<(ConceptId, u32)> = HashSet::new();
    steps
        .into_iter()
        .filter(|s| seen.insert((s.concept_id.clone(), s.step_number)))
        .collect()
}
