// src/config/validate.rs

use crate::config::model::{ConfigFile, RawConfigFile, SchedulerConfig};
use crate::errors::{Result, YoloError};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = YoloError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_scheduler_config(&cfg.scheduler)?;
    validate_engine(cfg)?;
    validate_discovery(cfg)?;
    Ok(())
}

/// Validate a run configuration on its own.
///
/// Callers that build a [`SchedulerConfig`] in code (rather than from TOML)
/// go through this before a run starts.
pub fn validate_scheduler_config(cfg: &SchedulerConfig) -> Result<()> {
    if cfg.max_concurrency == 0 {
        return Err(YoloError::ConfigError(
            "[scheduler].max_concurrency must be >= 1 (got 0)".to_string(),
        ));
    }
    if cfg.max_concepts_hard_stop == 0 {
        return Err(YoloError::ConfigError(
            "[scheduler].max_concepts_hard_stop must be >= 1 (got 0)".to_string(),
        ));
    }
    if cfg.execution_budget == 0 {
        return Err(YoloError::ConfigError(
            "[scheduler].execution_budget must be >= 1 (got 0)".to_string(),
        ));
    }
    if cfg.circuit_breaker_threshold == 0 {
        return Err(YoloError::ConfigError(
            "[scheduler].circuit_breaker_threshold must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_engine(cfg: &RawConfigFile) -> Result<()> {
    if cfg.engine.log_capacity == 0 {
        return Err(YoloError::ConfigError(
            "[engine].log_capacity must be >= 1 (got 0)".to_string(),
        ));
    }
    if cfg.engine.max_resolution_depth == 0 {
        return Err(YoloError::ConfigError(
            "[engine].max_resolution_depth must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_discovery(cfg: &RawConfigFile) -> Result<()> {
    let threshold = cfg.discovery.semantic_threshold;
    if !(0.0..=1.0).contains(&threshold) {
        return Err(YoloError::ConfigError(format!(
            "[discovery].semantic_threshold must be within [0, 1] (got {threshold})"
        )));
    }
    Ok(())
}
