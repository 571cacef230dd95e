// src/plan/mod.rs

//! Execution plans for manually approved tasks.
//!
//! - [`model`] holds plan and step types.
//! - [`builder`] turns task ids into an ordered, deduplicated step list.
//! - [`registry`] keeps plans in memory and drops them after they finish.
//! - [`session`] executes an approved plan one confirmed step at a time.

pub mod builder;
pub mod model;
pub mod registry;
pub mod session;

pub use builder::ExecutionPlanBuilder;
pub use model::{ExecutionPlan, ExecutionPlanStep, PlanStatus, PlanTask, StepStatus};
pub use registry::{GateSignal, PlanRegistry};
pub use session::ManualSession;
