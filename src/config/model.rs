// src/config/model.rs

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [scheduler]
/// max_concurrency = 3
/// execution_budget = 20
///
/// [engine]
/// lock_ttl_secs = 300
///
/// [plan]
/// cleanup_delay_secs = 30
///
/// [discovery]
/// semantic_threshold = 0.75
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub engine: EngineSection,

    #[serde(default)]
    pub plan: PlanSection,

    #[serde(default)]
    pub discovery: DiscoverySection,
}

/// Validated configuration. Only constructible through
/// `ConfigFile::try_from(RawConfigFile)` (see `validate.rs`).
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub scheduler: SchedulerConfig,
    pub engine: EngineSection,
    pub plan: PlanSection,
    pub discovery: DiscoverySection,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        Self {
            scheduler: raw.scheduler,
            engine: raw.engine,
            plan: raw.plan,
            discovery: raw.discovery,
        }
    }
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self::new_unchecked(RawConfigFile::default())
    }
}

/// `[scheduler]` section: the per-run knobs a caller passes to
/// `start_autonomous_run`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Upper bound on workers in flight at once.
    pub max_concurrency: usize,

    /// Hard ceiling on completed tasks per run, independent of the budget.
    pub max_concepts_hard_stop: usize,

    /// Extra attempts after the first failure of a task.
    pub retry_attempts: u32,

    /// Base of the exponential backoff: `base * 3^(retries - 1)`.
    pub retry_base_delay_ms: u64,

    /// How long dispatch pauses once the circuit breaker trips.
    pub circuit_breaker_cooldown_ms: u64,

    /// Consecutive failures (across any tasks) that trip the breaker.
    pub circuit_breaker_threshold: u32,

    /// Maximum number of tasks admitted into one run.
    pub execution_budget: usize,

    /// Ready-queue length above which concurrency collapses to 1.
    pub backpressure_queue_length: usize,

    /// Passed through to the step executor as a hint.
    pub research_batch_size: Option<u32>,

    /// Passed through to the step executor as a hint.
    pub research_turns: Option<u32>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 3,
            max_concepts_hard_stop: 50,
            retry_attempts: 2,
            retry_base_delay_ms: 2_000,
            circuit_breaker_cooldown_ms: 30_000,
            circuit_breaker_threshold: 3,
            execution_budget: 20,
            backpressure_queue_length: 50,
            research_batch_size: None,
            research_turns: None,
        }
    }
}

impl SchedulerConfig {
    /// Backoff before re-enqueueing a task that has failed `retries` times.
    pub fn retry_delay(&self, retries: u32) -> Duration {
        let exponent = retries.saturating_sub(1).min(16);
        let factor = 3u64.saturating_pow(exponent);
        Duration::from_millis(self.retry_base_delay_ms.saturating_mul(factor))
    }

    pub fn circuit_breaker_cooldown(&self) -> Duration {
        Duration::from_millis(self.circuit_breaker_cooldown_ms)
    }
}

/// `[engine]` section: service-wide settings shared by every run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    /// Age after which a concept lock is considered stale and may be stolen.
    pub lock_ttl_secs: u64,

    /// Capacity of the per-run ring-buffer log.
    pub log_capacity: usize,

    /// Number of trailing log lines included in each progress snapshot.
    pub progress_log_lines: usize,

    /// How long a finished run stays inspectable before it is dropped.
    pub run_grace_period_secs: u64,

    /// Entries kept in the rolling context handed to the step executor.
    pub context_max_entries: usize,

    /// Characters kept per rolling-context summary.
    pub context_summary_chars: usize,

    /// Recursion bound for the dependency resolver.
    pub max_resolution_depth: usize,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            lock_ttl_secs: 300,
            log_capacity: 200,
            progress_log_lines: 20,
            run_grace_period_secs: 60,
            context_max_entries: 5,
            context_summary_chars: 400,
            max_resolution_depth: 10,
        }
    }
}

impl EngineSection {
    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl_secs)
    }

    pub fn run_grace_period(&self) -> Duration {
        Duration::from_secs(self.run_grace_period_secs)
    }
}

/// `[plan]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanSection {
    /// Delay between a plan reaching a terminal state and its removal.
    pub cleanup_delay_secs: u64,

    /// Task content longer than this counts as rich context and gets a
    /// task-specific workflow.
    pub rich_context_chars: usize,
}

impl Default for PlanSection {
    fn default() -> Self {
        Self {
            cleanup_delay_secs: 30,
            rich_context_chars: 200,
        }
    }
}

impl PlanSection {
    pub fn cleanup_delay(&self) -> Duration {
        Duration::from_secs(self.cleanup_delay_secs)
    }
}

/// `[discovery]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoverySection {
    /// Minimum similarity for a semantic match to become a candidate.
    pub semantic_threshold: f64,

    /// Maximum semantic candidates considered per completed task.
    pub semantic_limit: usize,
}

impl Default for DiscoverySection {
    fn default() -> Self {
        Self {
            semantic_threshold: 0.75,
            semantic_limit: 5,
        }
    }
}
