//! Core data types for job state, run history and runner notifications.

use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
};

/// Outcome of the most recent execution of a job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum RunStatus {
    #[default]
    NeverRun,
    Success,
    Failed,
}

/// Mutable run state of a job. Only the runner writes it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct JobState {
    pub last_run: Option<DateTime<Utc>>,
    pub last_status: RunStatus,
    /// Consecutive failures. Only a success resets it.
    pub failure_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_duration_ms: Option<u64>,
}

/// Read-only snapshot of one registered job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub name: String,
    pub schedule: String,
    pub max_retries: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_run: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub state: JobState,
}

/// Record of a single attempt, stored in run history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    pub job_name: String,
    /// Shared by every attempt of the same firing.
    pub firing_id: String,
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

/// How a firing ended.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RunOutcome {
    Succeeded { attempts: u32 },
    /// Every attempt of the firing failed.
    Exhausted { attempts: u32 },
    /// Another firing of the same job was still in flight.
    Skipped,
    /// The job was replaced under the same name before the firing finished.
    Superseded { attempts: u32 },
}

/// Summary status of the runner.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RunnerSummary {
    pub running: bool,
    pub job_count: usize,
    pub next_run_at: Option<DateTime<Utc>>,
}

/// Notification emitted by the runner as jobs are registered and fired.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RunnerEvent {
    Registered {
        name: String,
        schedule: String,
    },
    Replaced {
        name: String,
        schedule: String,
    },
    Started {
        name: String,
        attempt: u32,
    },
    Succeeded {
        name: String,
        attempt: u32,
        duration_ms: u64,
    },
    Failed {
        name: String,
        attempt: u32,
        error: String,
    },
    Retrying {
        name: String,
        next_attempt: u32,
        delay_ms: u64,
    },
    Exhausted {
        name: String,
        attempts: u32,
    },
    Skipped {
        name: String,
    },
}

impl RunnerEvent {
    /// Name of the job the event concerns.
    #[must_use]
    pub fn job_name(&self) -> &str {
        match self {
            Self::Registered { name, .. }
            | Self::Replaced { name, .. }
            | Self::Started { name, .. }
            | Self::Succeeded { name, .. }
            | Self::Failed { name, .. }
            | Self::Retrying { name, .. }
            | Self::Exhausted { name, .. }
            | Self::Skipped { name } => name,
        }
    }
}
