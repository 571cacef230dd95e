// src/engine/mod.rs

//! The autonomous scheduler.
//!
//! - [`service`] is the public entry point and owns the run registry.
//! - [`scheduler`] is the per-run coordinator loop.
//! - [`run_state`] is the pure state it mutates.
//! - [`worker`] executes one task's workflow.
//! - [`discovery`] and [`admission`] decide which new work enters a run.
//! - [`locks`], [`run_log`] and [`context`] are the small pieces of state
//!   the coordinator keeps per run.
//! - [`callbacks`] and [`progress`] define what observers see.

pub mod admission;
pub mod callbacks;
pub mod context;
pub mod detached;
pub mod discovery;
pub mod locks;
pub mod progress;
pub mod run_log;
pub mod run_state;
pub mod scheduler;
pub mod service;
pub mod worker;

pub use callbacks::{MessageSink, OutboundMessage, PlanEvent, PlanObserver, RunCallbacks};
pub use detached::spawn_detached;
pub use progress::{ProgressSnapshot, RunSummary, RunningTask};
pub use run_log::{LogEntry, LogLevel};
pub use service::{Collaborators, RunRequest, YoloService};
