//! Config schema types (runner defaults, metrics, job definitions).

use std::{collections::BTreeMap, path::PathBuf, time::Duration};

use {
    cadence_jobs::{
        RetryPolicy, RunnerConfig,
        parse::parse_duration,
        retry::{DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY},
    },
    serde::{Deserialize, Serialize},
};

/// Root of a `cadence.{toml,yaml,json}` file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CadenceConfig {
    pub runner: RunnerSection,
    pub metrics: MetricsConfig,
    pub jobs: Vec<JobConfig>,
}

/// Defaults applied to every job that does not override them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerSection {
    /// Attempts per firing. Defaults to 3.
    pub max_retries: u32,
    /// Wait between attempts (e.g. "60s", "5m"). Defaults to "60s".
    pub retry_delay: String,
    /// Attempt records kept per job. Defaults to 50.
    pub history_limit: usize,
    /// Timer poll interval when no job is scheduled. Defaults to "60s".
    pub idle_poll: String,
}

impl Default for RunnerSection {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: format!("{}s", DEFAULT_RETRY_DELAY.as_secs()),
            history_limit: cadence_jobs::history::DEFAULT_HISTORY_LIMIT,
            idle_poll: "60s".into(),
        }
    }
}

impl RunnerSection {
    pub fn retry_policy(&self) -> anyhow::Result<RetryPolicy> {
        Ok(RetryPolicy::new(
            self.max_retries,
            parse_duration(&self.retry_delay)?,
        ))
    }

    pub fn idle_poll(&self) -> anyhow::Result<Duration> {
        parse_duration(&self.idle_poll)
    }

    pub fn runner_config(&self) -> anyhow::Result<RunnerConfig> {
        Ok(RunnerConfig {
            default_retry: self.retry_policy()?,
            history_limit: self.history_limit,
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    /// Labels attached to every exported metric.
    pub labels: BTreeMap<String, String>,
}

/// A shell command run on a schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    pub name: String,
    pub schedule: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
    /// Overrides `runner.max_retries`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    /// Overrides `runner.retry_delay`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_delay: Option<String>,
    /// Kill an attempt that runs longer than this.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl JobConfig {
    /// This job's policy, falling back to the runner defaults.
    pub fn retry_policy(&self, defaults: &RetryPolicy) -> anyhow::Result<RetryPolicy> {
        let delay = match &self.retry_delay {
            Some(raw) => parse_duration(raw)?,
            None => defaults.delay,
        };
        Ok(RetryPolicy::new(
            self.max_retries.unwrap_or(defaults.max_retries),
            delay,
        ))
    }

    pub fn timeout(&self) -> anyhow::Result<Option<Duration>> {
        self.timeout.as_deref().map(parse_duration).transpose()
    }
}
