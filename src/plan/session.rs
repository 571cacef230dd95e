// src/plan/session.rs

//! Step-by-step execution of an approved plan with a confirmation gate
//! before every step.

use std::sync::Arc;

use anyhow::anyhow;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::engine::callbacks::{MessageSink, OutboundMessage, PlanEvent, PlanObserver};
use crate::engine::context::RollingContext;
use crate::engine::detached::spawn_detached;
use crate::exec::{ExecutionHints, StepExecutor, StepRequest, StepResult, WorkflowStep};
use crate::plan::model::{ExecutionPlanStep, PlanStatus, StepStatus};
use crate::plan::registry::{GateSignal, PlanRegistry};
use crate::store::{RecordStore, TaskContext};
use crate::types::{MessageRole, PlanId, TaskStatus};

/// Collaborators for one manual execution.
pub struct ManualSession {
    pub executor: Arc<dyn StepExecutor>,
    pub store: Arc<dyn RecordStore>,
    pub sink: Arc<dyn MessageSink>,
    pub observer: Arc<dyn PlanObserver>,
    pub hints: ExecutionHints,
    pub context: RollingContext,
}

impl ManualSession {
    pub(crate) async fn run(
        mut self,
        registry: Arc<PlanRegistry>,
        plan_id: PlanId,
        mut gate: mpsc::Receiver<GateSignal>,
    ) -> PlanStatus {
        let status = self.drive(&registry, &plan_id, &mut gate).await;
        registry.finish(&plan_id, status).await;
        self.observer
            .on_plan_event(PlanEvent::Finished { plan_id, status });
        status
    }

    async fn drive(
        &mut self,
        registry: &PlanRegistry,
        plan_id: &PlanId,
        gate: &mut mpsc::Receiver<GateSignal>,
    ) -> PlanStatus {
        let Some(plan) = registry.get(plan_id).await else {
            return PlanStatus::Cancelled;
        };

        for (index, step) in plan.steps.iter().enumerate() {
            let parked = registry
                .update(plan_id, |p| {
                    p.current_step = index;
                    p.status = PlanStatus::Paused;
                    p.steps[index].status = StepStatus::AwaitingConfirmation;
                })
                .await;
            if parked.is_none() {
                return PlanStatus::Cancelled;
            }
            self.observer.on_plan_event(PlanEvent::AwaitingConfirmation {
                plan_id: plan_id.clone(),
                step_id: step.id.clone(),
                step_index: index,
                title: step.title.clone(),
            });

            match gate.recv().await {
                Some(GateSignal::Resume) => {}
                Some(GateSignal::Cancel) | None => {
                    registry
                        .update(plan_id, |p| p.steps[index].status = StepStatus::Pending)
                        .await;
                    return PlanStatus::Cancelled;
                }
            }

            registry
                .update(plan_id, |p| {
                    p.status = PlanStatus::Executing;
                    p.steps[index].status = StepStatus::Running;
                })
                .await;
            self.observer.on_plan_event(PlanEvent::StepStarted {
                plan_id: plan_id.clone(),
                step_id: step.id.clone(),
                step_index: index,
            });

            let result = match self.execute_step(step, index, plan.steps.len()).await {
                Ok(result) => result,
                Err(err) => {
                    let error = format!("{err:#}");
                    warn!(plan = %plan_id, step = index, error = %error, "plan step failed");
                    registry
                        .update(plan_id, |p| {
                            p.steps[index].status = StepStatus::Failed;
                            p.steps[index].error = Some(error.clone());
                        })
                        .await;
                    self.observer.on_plan_event(PlanEvent::StepFailed {
                        plan_id: plan_id.clone(),
                        step_id: step.id.clone(),
                        step_index: index,
                        error,
                    });
                    return PlanStatus::Failed;
                }
            };

            let message_id = match self
                .sink
                .save_message(OutboundMessage {
                    role: MessageRole::Assistant,
                    content: result.content.clone(),
                    concept_id: Some(step.concept_id.clone()),
                    conversation_id: step.conversation_id.clone(),
                })
                .await
            {
                Ok(id) => Some(id),
                Err(err) => {
                    warn!(plan = %plan_id, step = index, error = %err, "failed to save step output");
                    None
                }
            };
            self.context
                .push(&step.concept_id, &step.title, &result.content);

            let finished_tasks = registry
                .update(plan_id, |p| {
                    p.steps[index].status = StepStatus::Completed;
                    p.steps[index].message_id = message_id.clone();
                    if p.concept_completed(&step.concept_id) {
                        p.tasks_for_concept(&step.concept_id)
                    } else {
                        Vec::new()
                    }
                })
                .await
                .unwrap_or_default();

            for task_id in finished_tasks {
                let store = Arc::clone(&self.store);
                spawn_detached("mark-plan-task-completed", async move {
                    store.update_task_status(&task_id, TaskStatus::Completed).await
                });
            }

            self.observer.on_plan_event(PlanEvent::StepCompleted {
                plan_id: plan_id.clone(),
                step_id: step.id.clone(),
                step_index: index,
                message_id,
            });
        }

        PlanStatus::Completed
    }

    async fn execute_step(
        &self,
        step: &ExecutionPlanStep,
        index: usize,
        total: usize,
    ) -> anyhow::Result<StepResult> {
        let concept = self
            .store
            .load_concept(&step.concept_id)
            .await?
            .ok_or_else(|| anyhow!("step {} references unknown concept {}", step.id, step.concept_id))?;

        let request = StepRequest {
            concept,
            step: WorkflowStep {
                step_number: step.step_number,
                title: step.title.clone(),
                description: step.description.clone(),
                prompt_template: step.prompt_template.clone(),
                expected_outcome: step.expected_outcome.clone(),
                estimated_minutes: step.estimated_minutes,
            },
            index,
            total,
            task_context: Some(TaskContext {
                title: step.task_title.clone(),
                content: step.task_content.clone(),
                conversation_id: step.conversation_id.clone(),
            }),
            context: self.context.refs(),
            hints: self.hints,
        };

        let step_id = step.id.clone();
        self.executor
            .execute(&request, &move |chunk: &str| {
                debug!(step = %step_id, bytes = chunk.len(), "step output chunk");
            })
            .await
    }
}
