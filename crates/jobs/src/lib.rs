//! Named jobs fired on recurring schedules, with bounded retry on failure.
//!
//! A [`JobRunner`] owns the jobs and registers one trigger per job with a
//! [`Scheduler`]. When a trigger fires, the job runs; a failed attempt is
//! retried after a fixed delay until the job's [`RetryPolicy`] is spent.
//! Failures never leave the firing; they show up in [`JobRunner::get_status`],
//! the run history and the `tracing` output.

pub mod error;
pub mod history;
pub mod job;
pub mod parse;
pub mod retry;
pub mod runner;
pub mod schedule;
pub mod scheduler;
pub mod types;

pub use {
    error::{Error, Result},
    job::{Job, JobFn, job_fn},
    retry::RetryPolicy,
    runner::{EventFn, JobRunner, RunnerConfig},
    schedule::Schedule,
    scheduler::{Scheduler, TimerScheduler, TriggerFn, TriggerHandle},
    types::{JobState, JobStatus, RunOutcome, RunRecord, RunStatus, RunnerEvent, RunnerSummary},
};
