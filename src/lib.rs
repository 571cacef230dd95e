// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod plan;
pub mod store;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use tracing::{debug, info, warn};

use crate::cli::{CliArgs, Command};
use crate::config::{ConfigFile, load_or_default};
use crate::engine::{Collaborators, RunRequest, YoloService};
use crate::exec::offline::ConsoleOutcome;
use crate::exec::{
    ConsoleCallbacks, EchoStepExecutor, NeutralScorer, NoSemanticSearch, TemplateWorkflowGenerator,
};
use crate::plan::{ExecutionPlan, PlanStatus};
use crate::store::{RecordStore, load_seed};
use crate::types::{PlanId, RunStatus, TaskId};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - the seeded in-memory store
/// - the offline collaborators
/// - Ctrl-C handling for runs
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = load_or_default(&args.config)?;
    debug!(config = %args.config, "configuration loaded");

    match args.command {
        Command::Plan {
            store,
            tasks,
            json,
            execute,
        } => {
            let service = offline_service(&store, cfg).await?;
            let ids: Vec<TaskId> = tasks.into_iter().map(TaskId::from).collect();
            let plan = service
                .build_execution_plan(&ids, "cli", "local")
                .await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&plan)?);
            } else {
                print_plan(&plan);
            }
            if !execute {
                return Ok(());
            }

            let console = Arc::new(ConsoleCallbacks::new());
            let status = execute_confirmed(&service, &plan.id, console).await?;
            match status {
                PlanStatus::Completed => Ok(()),
                other => Err(anyhow!("plan {} {other}", plan.id)),
            }
        }
        Command::Run {
            store,
            category,
            budget,
            concurrency,
        } => {
            let mut config = cfg.scheduler.clone();
            if let Some(budget) = budget {
                config.execution_budget = budget;
            }
            if let Some(concurrency) = concurrency {
                config.max_concurrency = concurrency;
            }

            let service = offline_service(&store, cfg).await?;
            let callbacks = Arc::new(ConsoleCallbacks::new());
            let request = RunRequest {
                tenant_id: "local".to_string(),
                user_id: "cli".to_string(),
                category,
                ..RunRequest::new(config)
            };
            let run_id = service
                .start_autonomous_run(request, callbacks.clone())
                .await?;
            info!(run_id = %run_id, "run started; press Ctrl-C to cancel");

            // Ctrl-C → cooperative cancellation; the run still reports a summary.
            {
                let service = service.clone();
                let run_id = run_id.clone();
                tokio::spawn(async move {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        warn!(error = %e, "failed to listen for Ctrl+C");
                        return;
                    }
                    if service.cancel_run(&run_id).await {
                        eprintln!("cancelling run {run_id}; waiting for in-flight steps");
                    }
                });
            }

            match callbacks.wait().await {
                ConsoleOutcome::Finished(summary) if summary.status == RunStatus::Failed => Err(
                    anyhow!("run {} failed: every task failed", summary.run_id),
                ),
                ConsoleOutcome::Finished(_) => Ok(()),
                ConsoleOutcome::Failed(message) => Err(anyhow!(message)),
            }
        }
    }
}

async fn offline_service(seed_path: &str, cfg: ConfigFile) -> Result<YoloService> {
    let store: Arc<dyn RecordStore> = Arc::new(load_seed(seed_path).await?);
    let collaborators = Collaborators {
        store,
        executor: Arc::new(EchoStepExecutor),
        generator: Arc::new(TemplateWorkflowGenerator),
        scorer: Arc::new(NeutralScorer),
        semantic: Arc::new(NoSemanticSearch),
    };
    Ok(YoloService::new(collaborators, cfg))
}

/// Execute a plan, confirming each step as soon as it parks.
async fn execute_confirmed(
    service: &YoloService,
    plan_id: &PlanId,
    console: Arc<ConsoleCallbacks>,
) -> Result<PlanStatus> {
    let mut handle = service
        .execute_plan(plan_id, console.clone(), console)
        .await?;
    let mut ticker = tokio::time::interval(Duration::from_millis(20));

    loop {
        tokio::select! {
            joined = &mut handle => return Ok(joined?),
            _ = ticker.tick() => {
                let paused = service
                    .plans()
                    .get(plan_id)
                    .await
                    .is_some_and(|p| p.status == PlanStatus::Paused);
                if paused {
                    service.resume_plan(plan_id).await?;
                }
            }
        }
    }
}

/// Human-readable plan listing.
fn print_plan(plan: &ExecutionPlan) {
    println!("plan {} ({})", plan.id, plan.status);
    println!(
        "  concepts: {}  steps: {}  estimated: {} min",
        plan.concepts.len(),
        plan.steps.len(),
        plan.estimated_minutes
    );
    println!();

    let mut current = None;
    for step in &plan.steps {
        if current != Some(&step.concept_id) {
            println!("{}. {} ({})", step.concept_position + 1, step.concept_name, step.concept_id);
            current = Some(&step.concept_id);
        }
        println!(
            "    {}. {} [{} min]",
            step.step_number, step.title, step.estimated_minutes
        );
    }
}
