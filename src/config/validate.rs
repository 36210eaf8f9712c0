// src/config/validate.rs

use std::collections::HashSet;
use std::time::Duration;

use crate::config::model::{
    ConfigFile, JobConfig, JobsValue, LimitsSection, RawConfigFile, RawJobConfig,
};
use crate::engine::Concurrency;
use crate::errors::{ForgeloopError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::ForgeloopError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let limits = validate_limits(&raw)?;
        let jobs = validate_jobs(&raw)?;
        Ok(ConfigFile::new_unchecked(limits, raw.output, jobs))
    }
}

fn validate_limits(cfg: &RawConfigFile) -> Result<LimitsSection> {
    let jobs = match &cfg.limits.jobs {
        JobsValue::Count(n) if *n >= 1 => Concurrency::Limited(*n as usize),
        JobsValue::Count(n) => {
            return Err(ForgeloopError::ConfigError(format!(
                "[limits].jobs must be >= 1 or \"unlimited\" (got {n})"
            )));
        }
        JobsValue::Keyword(s) if s == "unlimited" => Concurrency::Unlimited,
        JobsValue::Keyword(s) => {
            return Err(ForgeloopError::ConfigError(format!(
                "[limits].jobs must be >= 1 or \"unlimited\" (got \"{s}\")"
            )));
        }
    };

    if let Some(load) = cfg.limits.load_average {
        if !load.is_finite() || load <= 0.0 {
            return Err(ForgeloopError::ConfigError(format!(
                "[limits].load_average must be a positive number (got {load})"
            )));
        }
    }

    if cfg.limits.load_check_interval_ms == 0 {
        return Err(ForgeloopError::ConfigError(
            "[limits].load_check_interval_ms must be >= 1 (got 0)".to_string(),
        ));
    }

    Ok(LimitsSection {
        jobs,
        load_average: cfg.limits.load_average,
        load_check_interval: Duration::from_millis(cfg.limits.load_check_interval_ms),
    })
}

fn validate_jobs(cfg: &RawConfigFile) -> Result<Vec<JobConfig>> {
    if cfg.job.is_empty() {
        return Err(ForgeloopError::ConfigError(
            "config must contain at least one [[job]] entry".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    cfg.job.iter().map(|job| validate_job(job, &mut seen)).collect()
}

fn validate_job(job: &RawJobConfig, seen: &mut HashSet<String>) -> Result<JobConfig> {
    if job.name.trim().is_empty() {
        return Err(ForgeloopError::ConfigError(
            "[[job]].name must not be empty".to_string(),
        ));
    }
    if !seen.insert(job.name.clone()) {
        return Err(ForgeloopError::ConfigError(format!(
            "duplicate job name '{}'",
            job.name
        )));
    }

    let steps = match (&job.cmd, job.steps.as_slice()) {
        (Some(cmd), []) => vec![cmd.clone()],
        (None, steps @ [_, ..]) => steps.to_vec(),
        (Some(_), _) => {
            return Err(ForgeloopError::ConfigError(format!(
                "job '{}' sets both `cmd` and `steps`; use one",
                job.name
            )));
        }
        (None, []) => {
            return Err(ForgeloopError::ConfigError(format!(
                "job '{}' needs either `cmd` or a non-empty `steps` list",
                job.name
            )));
        }
    };

    for step in &steps {
        if step.trim().is_empty() {
            return Err(ForgeloopError::ConfigError(format!(
                "job '{}' has an empty command",
                job.name
            )));
        }
    }

    Ok(JobConfig {
        name: job.name.clone(),
        steps,
        log: job.log.clone(),
        background: job.background,
    })
}
