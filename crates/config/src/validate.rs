//! Configuration validation.
//!
//! Checks durations, schedules and job definitions and reports every problem
//! at once instead of failing on the first.

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use cadence_jobs::{Schedule, parse::parse_duration};

use crate::{loader::parse_config, schema::CadenceConfig};

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Category: "syntax", "duration", "schedule", "job"
    pub category: &'static str,
    /// Dotted path, e.g. "jobs[2].schedule"
    pub path: String,
    pub message: String,
}

/// Result of validating a configuration.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
    pub config_path: Option<PathBuf>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Count diagnostics by severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }

    fn push(
        &mut self,
        severity: Severity,
        category: &'static str,
        path: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.diagnostics.push(Diagnostic {
            severity,
            category,
            path: path.into(),
            message: message.into(),
        });
    }
}

/// Read, substitute and parse `path`, then validate the result.
pub fn validate_file(path: &Path) -> ValidationResult {
    let mut result = ValidationResult {
        config_path: Some(path.to_path_buf()),
        ..Default::default()
    };

    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => crate::env_subst::substitute_env(&raw),
        Err(e) => {
            result.push(Severity::Error, "syntax", "", format!("cannot read file: {e}"));
            return result;
        },
    };

    match parse_config(&raw, path) {
        Ok(config) => {
            result.diagnostics = validate(&config).diagnostics;
        },
        Err(e) => result.push(Severity::Error, "syntax", "", e.to_string()),
    }
    result
}

/// Validate an already-parsed config.
pub fn validate(config: &CadenceConfig) -> ValidationResult {
    let mut result = ValidationResult::default();

    check_duration(&mut result, "runner.retry_delay", &config.runner.retry_delay);
    check_duration(&mut result, "runner.idle_poll", &config.runner.idle_poll);
    if config.runner.max_retries == 0 {
        result.push(
            Severity::Warning,
            "job",
            "runner.max_retries",
            "0 is treated as a single attempt",
        );
    }
    if config.runner.history_limit == 0 {
        result.push(
            Severity::Warning,
            "job",
            "runner.history_limit",
            "0 is raised to 1 record per job",
        );
    }

    let mut seen = HashSet::new();
    for (i, job) in config.jobs.iter().enumerate() {
        let path = format!("jobs[{i}]");

        if job.name.trim().is_empty() {
            result.push(Severity::Error, "job", format!("{path}.name"), "job name is empty");
        } else if !seen.insert(job.name.as_str()) {
            result.push(
                Severity::Warning,
                "job",
                format!("{path}.name"),
                format!("duplicate job name '{}', this entry replaces the earlier one", job.name),
            );
        }

        if let Err(e) = Schedule::parse(&job.schedule) {
            result.push(Severity::Error, "schedule", format!("{path}.schedule"), e.to_string());
        }

        if job.command.trim().is_empty() {
            result.push(Severity::Error, "job", format!("{path}.command"), "command is empty");
        }

        if let Some(delay) = &job.retry_delay {
            check_duration(&mut result, &format!("{path}.retry_delay"), delay);
        }
        if let Some(timeout) = &job.timeout {
            check_duration(&mut result, &format!("{path}.timeout"), timeout);
        }
        if job.max_retries == Some(0) {
            result.push(
                Severity::Warning,
                "job",
                format!("{path}.max_retries"),
                "0 is treated as a single attempt",
            );
        }

        if !job.enabled {
            result.push(
                Severity::Info,
                "job",
                format!("{path}.enabled"),
                format!("job '{}' is disabled and will not be registered", job.name),
            );
        }
    }

    result
}

fn check_duration(result: &mut ValidationResult, path: &str, raw: &str) {
    if let Err(e) = parse_duration(raw) {
        result.push(Severity::Error, "duration", path, e.to_string());
    }
}
