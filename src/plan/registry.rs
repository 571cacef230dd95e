// src/plan/registry.rs

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::errors::{Result, YoloError};
use crate::plan::model::{ExecutionPlan, PlanStatus};
use crate::plan::session::ManualSession;
use crate::types::PlanId;

/// Signal delivered to a plan parked before its next step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateSignal {
    Resume,
    Cancel,
}

struct PlanEntry {
    plan: ExecutionPlan,
    /// Present while a session is executing the plan.
    gate: Option<mpsc::Sender<GateSignal>>,
}

/// In-memory registry of execution plans.
///
/// Plans are dropped `cleanup_delay` after reaching a terminal state.
pub struct PlanRegistry {
    plans: RwLock<HashMap<PlanId, PlanEntry>>,
    cleanup_delay: Duration,
}

impl PlanRegistry {
    pub fn new(cleanup_delay: Duration) -> Self {
        Self {
            plans: RwLock::new(HashMap::new()),
            cleanup_delay,
        }
    }

    pub async fn insert(&self, plan: ExecutionPlan) -> PlanId {
        let id = plan.id.clone();
        self.plans
            .write()
            .await
            .insert(id.clone(), PlanEntry { plan, gate: None });
        id
    }

    pub async fn get(&self, id: &PlanId) -> Option<ExecutionPlan> {
        self.plans.read().await.get(id).map(|e| e.plan.clone())
    }

    pub async fn len(&self) -> usize {
        self.plans.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.plans.read().await.is_empty()
    }

    /// `awaiting_approval -> executing`.
    pub async fn approve(&self, id: &PlanId) -> Result<()> {
        let mut plans = self.plans.write().await;
        let entry = plans
            .get_mut(id)
            .ok_or_else(|| YoloError::PlanNotFound(id.to_string()))?;
        if entry.plan.status != PlanStatus::AwaitingApproval {
            return Err(invalid(id, "approve", entry.plan.status));
        }
        entry.plan.status = PlanStatus::Executing;
        info!(plan = %id, "plan approved");
        Ok(())
    }

    /// Start executing an approved plan. Execution parks before every step
    /// until [`resume`](Self::resume) or [`cancel`](Self::cancel) is called.
    pub async fn execute(
        self: &Arc<Self>,
        id: &PlanId,
        session: ManualSession,
    ) -> Result<JoinHandle<PlanStatus>> {
        let (tx, rx) = mpsc::channel(4);
        {
            let mut plans = self.plans.write().await;
            let entry = plans
                .get_mut(id)
                .ok_or_else(|| YoloError::PlanNotFound(id.to_string()))?;
            if entry.plan.status != PlanStatus::Executing || entry.gate.is_some() {
                return Err(invalid(id, "execute", entry.plan.status));
            }
            entry.gate = Some(tx);
        }

        let registry = Arc::clone(self);
        let plan_id = id.clone();
        Ok(tokio::spawn(async move {
            session.run(registry, plan_id, rx).await
        }))
    }

    /// Let a paused plan run its next step.
    pub async fn resume(&self, id: &PlanId) -> Result<()> {
        let mut plans = self.plans.write().await;
        let entry = plans
            .get_mut(id)
            .ok_or_else(|| YoloError::PlanNotFound(id.to_string()))?;
        if entry.plan.status != PlanStatus::Paused {
            return Err(invalid(id, "resume", entry.plan.status));
        }
        let Some(gate) = entry.gate.as_ref() else {
            return Err(invalid(id, "resume", entry.plan.status));
        };
        gate.try_send(GateSignal::Resume)
            .map_err(|e| YoloError::Other(anyhow::anyhow!("plan {id} gate closed: {e}")))?;
        entry.plan.status = PlanStatus::Executing;
        debug!(plan = %id, "plan resumed");
        Ok(())
    }

    /// Cancel a plan.
    ///
    /// A plan that has not started is cancelled at once; a running plan is
    /// cancelled at its next gate, after the current step finishes.
    pub async fn cancel(self: &Arc<Self>, id: &PlanId) -> Result<()> {
        let mut plans = self.plans.write().await;
        let entry = plans
            .get_mut(id)
            .ok_or_else(|| YoloError::PlanNotFound(id.to_string()))?;
        if entry.plan.status.is_terminal() {
            return Err(invalid(id, "cancel", entry.plan.status));
        }

        if let Some(gate) = entry.gate.as_ref() {
            gate.try_send(GateSignal::Cancel)
                .map_err(|e| YoloError::Other(anyhow::anyhow!("plan {id} gate closed: {e}")))?;
            info!(plan = %id, "cancellation requested");
            return Ok(());
        }

        entry.plan.status = PlanStatus::Cancelled;
        info!(plan = %id, "plan cancelled before execution");
        drop(plans);
        self.schedule_cleanup(id.clone());
        Ok(())
    }

    /// Apply `f` to a stored plan. `None` if the plan is gone.
    pub(crate) async fn update<R>(
        &self,
        id: &PlanId,
        f: impl FnOnce(&mut ExecutionPlan) -> R,
    ) -> Option<R> {
        self.plans.write().await.get_mut(id).map(|e| f(&mut e.plan))
    }

    /// Record a terminal status, close the gate and schedule removal.
    pub(crate) async fn finish(self: &Arc<Self>, id: &PlanId, status: PlanStatus) {
        if let Some(entry) = self.plans.write().await.get_mut(id) {
            entry.plan.status = status;
            entry.gate = None;
        }
        info!(plan = %id, %status, "plan finished");
        self.schedule_cleanup(id.clone());
    }

    fn schedule_cleanup(self: &Arc<Self>, id: PlanId) {
        let registry = Arc::clone(self);
        let delay = self.cleanup_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let mut plans = registry.plans.write().await;
            if plans.get(&id).is_some_and(|e| e.plan.status.is_terminal()) {
                plans.remove(&id);
                debug!(plan = %id, "terminal plan removed");
            }
        });
    }
}

fn invalid(id: &PlanId, action: &'static str, status: PlanStatus) -> YoloError {
    YoloError::InvalidPlanState {
        plan: id.to_string(),
        action,
        status: status.to_string(),
    }
}
