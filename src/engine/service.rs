// src/engine/service.rs

//! Service façade: plan building, manual execution and autonomous runs.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{ConfigFile, SchedulerConfig, validate::validate_scheduler_config};
use crate::dag::{DependencyResolver, GraphAccessor};
use crate::engine::admission::{Candidate, rank_for_budget};
use crate::engine::callbacks::{MessageSink, PlanObserver, RunCallbacks, RunSink};
use crate::engine::context::RollingContext;
use crate::engine::discovery::Discovery;
use crate::engine::progress::ProgressSnapshot;
use crate::engine::run_state::{RunState, RunTask};
use crate::engine::scheduler::{Coordinator, CoordinatorParts};
use crate::engine::worker::WorkerDeps;
use crate::errors::{Result, YoloError};
use crate::exec::{
    ExecutionHints, RelevanceScorer, ScoringContext, SemanticSearch, StepExecutor, WorkflowCache,
    WorkflowGenerator,
};
use crate::plan::{ExecutionPlan, ExecutionPlanBuilder, ManualSession, PlanRegistry, PlanStatus};
use crate::store::{RecordStore, TaskFilter};
use crate::types::{ConceptId, PlanId, RunId, TaskId};

/// External services the engine drives.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn RecordStore>,
    pub executor: Arc<dyn StepExecutor>,
    pub generator: Arc<dyn WorkflowGenerator>,
    pub scorer: Arc<dyn RelevanceScorer>,
    pub semantic: Arc<dyn SemanticSearch>,
}

/// Parameters of one autonomous run.
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    pub tenant_id: String,
    pub user_id: String,
    /// Role used to pick the relevance threshold for discovered concepts.
    pub role: Option<String>,
    /// Fallback destination for step outputs.
    pub root_conversation_id: Option<String>,
    pub config: SchedulerConfig,
    /// Per-concept output destinations; take precedence over the task's own.
    pub concept_conversations: HashMap<ConceptId, String>,
    /// Only run tasks whose concept is in this category.
    pub category: Option<String>,
}

impl RunRequest {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }
}

struct RunHandle {
    cancel: CancellationToken,
    progress: watch::Receiver<ProgressSnapshot>,
}

/// Entry point for callers. Cheap to clone; clones share the run and plan
/// registries.
#[derive(Clone)]
pub struct YoloService {
    inner: Arc<Inner>,
}

struct Inner {
    collaborators: Collaborators,
    graph: GraphAccessor,
    resolver: DependencyResolver,
    workflows: Arc<WorkflowCache>,
    plans: Arc<PlanRegistry>,
    runs: RwLock<HashMap<RunId, RunHandle>>,
    config: ConfigFile,
}

impl YoloService {
    pub fn new(collaborators: Collaborators, config: ConfigFile) -> Self {
        let workflows = Arc::new(WorkflowCache::new(
            Arc::clone(&collaborators.generator),
            config.plan.rich_context_chars,
        ));
        let inner = Inner {
            graph: GraphAccessor::new(Arc::clone(&collaborators.store)),
            resolver: DependencyResolver::new(config.engine.max_resolution_depth),
            workflows,
            plans: Arc::new(PlanRegistry::new(config.plan.cleanup_delay())),
            runs: RwLock::new(HashMap::new()),
            collaborators,
            config,
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn config(&self) -> &ConfigFile {
        &self.inner.config
    }

    pub fn plans(&self) -> &Arc<PlanRegistry> {
        &self.inner.plans
    }

    // === Manual mode ===

    /// Build an execution plan for `task_ids` and register it.
    pub async fn build_execution_plan(
        &self,
        task_ids: &[TaskId],
        user_id: &str,
        tenant_id: &str,
    ) -> Result<ExecutionPlan> {
        let builder = ExecutionPlanBuilder::new(
            Arc::clone(&self.inner.collaborators.store),
            self.inner.resolver,
            Arc::clone(&self.inner.workflows),
        );
        let plan = builder.build_plan(task_ids, user_id, tenant_id).await?;
        self.inner.plans.insert(plan.clone()).await;
        Ok(plan)
    }

    /// Approve a plan and start executing it. The session parks before
    /// each step until [`resume_plan`](Self::resume_plan).
    pub async fn execute_plan(
        &self,
        plan_id: &PlanId,
        sink: Arc<dyn MessageSink>,
        observer: Arc<dyn PlanObserver>,
    ) -> Result<JoinHandle<PlanStatus>> {
        let plans = &self.inner.plans;
        if plans.get(plan_id).await.map(|p| p.status) == Some(PlanStatus::AwaitingApproval) {
            plans.approve(plan_id).await?;
        }

        let engine = &self.inner.config.engine;
        let session = ManualSession {
            executor: Arc::clone(&self.inner.collaborators.executor),
            store: Arc::clone(&self.inner.collaborators.store),
            sink,
            observer,
            hints: ExecutionHints::default(),
            context: RollingContext::new(engine.context_max_entries, engine.context_summary_chars),
        };
        plans.execute(plan_id, session).await
    }

    pub async fn resume_plan(&self, plan_id: &PlanId) -> Result<()> {
        self.inner.plans.resume(plan_id).await
    }

    pub async fn cancel_plan(&self, plan_id: &PlanId) -> Result<()> {
        self.inner.plans.cancel(plan_id).await
    }

    // === Autonomous mode ===

    /// Start a run in the background and return its id immediately.
    ///
    /// An invalid `request.config` is rejected here. Problems found while
    /// loading tasks are reported through `callbacks.on_error` instead, and
    /// no `on_complete` follows.
    pub async fn start_autonomous_run(
        &self,
        request: RunRequest,
        callbacks: Arc<dyn RunCallbacks>,
    ) -> Result<RunId> {
        validate_scheduler_config(&request.config)?;

        let run_id = RunId::generate();
        let cancel = CancellationToken::new();
        let (progress_tx, progress_rx) = watch::channel(ProgressSnapshot::initializing(run_id.clone()));
        self.inner.runs.write().await.insert(
            run_id.clone(),
            RunHandle {
                cancel: cancel.clone(),
                progress: progress_rx,
            },
        );
        info!(run_id = %run_id, category = ?request.category, "autonomous run requested");

        let inner = Arc::clone(&self.inner);
        let id = run_id.clone();
        tokio::spawn(async move {
            match inner
                .prepare(&id, &request, Arc::clone(&callbacks), cancel, progress_tx)
                .await
            {
                Ok(coordinator) => {
                    coordinator.run().await;
                    inner.schedule_removal(id);
                }
                Err(err) => {
                    warn!(run_id = %id, error = %err, "autonomous run could not start");
                    inner.runs.write().await.remove(&id);
                    callbacks.on_error(&err.to_string());
                }
            }
        });

        Ok(run_id)
    }

    /// Request cooperative cancellation. `false` if the run is unknown or
    /// already finished.
    pub async fn cancel_run(&self, run_id: &RunId) -> bool {
        let runs = self.inner.runs.read().await;
        let Some(handle) = runs.get(run_id) else {
            return false;
        };
        if handle.cancel.is_cancelled() || handle.progress.borrow().status.is_terminal() {
            return false;
        }
        handle.cancel.cancel();
        info!(run_id = %run_id, "run cancellation requested");
        true
    }

    /// Latest snapshot of a run, while it is registered.
    pub async fn get_run_state(&self, run_id: &RunId) -> Option<ProgressSnapshot> {
        let runs = self.inner.runs.read().await;
        runs.get(run_id).map(|h| h.progress.borrow().clone())
    }

    /// Ids of every registered run, finished ones included until their grace
    /// period ends.
    pub async fn runs(&self) -> Vec<RunId> {
        self.inner.runs.read().await.keys().cloned().collect()
    }
}

impl Inner {
    /// Load, rank and order the run's tasks.
    async fn prepare(
        &self,
        run_id: &RunId,
        request: &RunRequest,
        callbacks: Arc<dyn RunCallbacks>,
        cancel: CancellationToken,
        progress: watch::Sender<ProgressSnapshot>,
    ) -> Result<Coordinator> {
        let store = &self.collaborators.store;
        let filter = TaskFilter {
            category: request.category.clone(),
        };

        let pending = store.list_pending_tasks(&filter).await?;
        if pending.is_empty() {
            return Err(match &request.category {
                Some(category) => YoloError::NoConcepts(format!(
                    "no pending tasks in category '{category}'"
                )),
                None => YoloError::NoPendingTasks,
            });
        }

        let mut seen = HashSet::new();
        let concept_ids: Vec<ConceptId> = pending
            .iter()
            .filter(|t| seen.insert(t.concept_id.clone()))
            .map(|t| t.concept_id.clone())
            .collect();
        let concepts: HashMap<ConceptId, _> = store
            .load_concepts(&concept_ids)
            .await?
            .into_iter()
            .map(|c| (c.id.clone(), c))
            .collect();

        let pool_size = pending.len();
        let candidates: Vec<Candidate> = pending
            .into_iter()
            .filter_map(|task| match concepts.get(&task.concept_id) {
                Some(concept) => Some(Candidate {
                    concept: concept.clone(),
                    task,
                }),
                None => {
                    warn!(task = %task.id, concept = %task.concept_id, "task references unknown concept; skipping");
                    None
                }
            })
            .collect();
        if candidates.is_empty() {
            return Err(YoloError::NoConcepts(format!(
                "none of the {pool_size} pending task(s) reference a known concept"
            )));
        }

        let engine = &self.config.engine;
        let mut state = RunState::new(run_id.clone(), engine);
        for candidate in &candidates {
            state.mark_known(&candidate.concept.id);
        }
        state.considered = candidates.len();

        let scoring = ScoringContext {
            tenant_id: request.tenant_id.clone(),
            user_id: request.user_id.clone(),
            role: request.role.clone(),
        };
        let budget = request.config.execution_budget;
        let admission = rank_for_budget(
            self.collaborators.scorer.as_ref(),
            &scoring,
            candidates,
            budget,
        )
        .await;
        if !admission.held_back.is_empty() {
            state.deferred += admission.held_back.len();
            state.log.info(format!(
                "{} task(s) over the budget of {budget} left for a future run",
                admission.held_back.len()
            ));
        }

        let mut seen = HashSet::new();
        let admitted_concepts: Vec<ConceptId> = admission
            .admitted
            .iter()
            .filter(|c| seen.insert(c.concept.id.clone()))
            .map(|c| c.concept.id.clone())
            .collect();
        let resolved = self.resolver.resolve(&self.graph, &admitted_concepts).await;
        if resolved.cycles_broken > 0 {
            state.log.warn(format!(
                "broke {} prerequisite cycle(s) while ordering tasks",
                resolved.cycles_broken
            ));
        }

        let positions: HashMap<&ConceptId, usize> =
            resolved.order.iter().enumerate().map(|(i, c)| (c, i)).collect();
        let mut admitted = admission.admitted;
        admitted.sort_by_key(|c| positions.get(&c.concept.id).copied().unwrap_or(usize::MAX));

        for Candidate { task, concept } in admitted {
            let conversation_id = request
                .concept_conversations
                .get(&concept.id)
                .cloned()
                .or_else(|| task.conversation_id.clone())
                .or_else(|| request.root_conversation_id.clone());
            let mut run_task = RunTask::new(task.id.clone(), concept, task.name.clone());
            run_task.prerequisites = resolved.prerequisites_of(&run_task.concept.id).to_vec();
            run_task.context = task.context();
            run_task.conversation_id = conversation_id;
            state.admit(run_task);
        }
        debug!(run_id = %run_id, admitted = state.admitted(), "run initialized");

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let deps = WorkerDeps {
            executor: Arc::clone(&self.collaborators.executor),
            workflows: Arc::clone(&self.workflows),
            sink: Arc::new(RunSink(Arc::clone(&callbacks))),
            events: events_tx,
            cancel,
        };
        let discovery = Discovery {
            graph: self.graph.clone(),
            store: Arc::clone(store),
            semantic: Arc::clone(&self.collaborators.semantic),
            scorer: Arc::clone(&self.collaborators.scorer),
            callbacks: Arc::clone(&callbacks),
            settings: self.config.discovery.clone(),
            scoring,
            execution_budget: budget,
            root_conversation_id: request.root_conversation_id.clone(),
        };

        Ok(Coordinator::new(CoordinatorParts {
            state,
            config: request.config.clone(),
            progress_log_lines: engine.progress_log_lines,
            summary_chars: engine.context_summary_chars,
            deps,
            events: events_rx,
            store: Arc::clone(store),
            discovery,
            callbacks,
            progress,
        }))
    }

    /// Forget a finished run once its grace period has passed.
    fn schedule_removal(self: Arc<Self>, run_id: RunId) {
        let grace = self.config.engine.run_grace_period();
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            self.runs.write().await.remove(&run_id);
            debug!(run_id = %run_id, "run state dropped");
        });
    }
}
