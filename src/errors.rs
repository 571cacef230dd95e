// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum YoloError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("No pending tasks found")]
    NoPendingTasks,

    #[error("No concepts available: {0}")]
    NoConcepts(String),

    #[error("Plan not found: {0}")]
    PlanNotFound(String),

    #[error("Plan {plan} cannot {action} while {status}")]
    InvalidPlanState {
        plan: String,
        action: &'static str,
        status: String,
    },

    #[error("Workflow for concept '{0}' has no steps")]
    EmptyWorkflow(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, YoloError>;
