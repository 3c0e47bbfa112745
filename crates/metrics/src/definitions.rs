//! Metric name and label definitions.

/// Job runner metrics
pub mod jobs {
    /// Number of registered jobs
    pub const JOBS_REGISTERED: &str = "cadence_jobs_registered";
    /// Total job attempts, retries included
    pub const EXECUTIONS_TOTAL: &str = "cadence_job_executions_total";
    /// Failed attempts
    pub const FAILURES_TOTAL: &str = "cadence_job_failures_total";
    /// Retries scheduled after a failed attempt
    pub const RETRIES_TOTAL: &str = "cadence_job_retries_total";
    /// Firings that failed every attempt
    pub const EXHAUSTED_TOTAL: &str = "cadence_job_exhausted_total";
    /// Firings dropped because the previous one was still running
    pub const SKIPPED_TOTAL: &str = "cadence_job_skipped_total";
    /// Attempt duration in seconds
    pub const EXECUTION_DURATION_SECONDS: &str = "cadence_job_execution_duration_seconds";
}

/// Common label keys
pub mod labels {
    pub const JOB: &str = "job";
}

/// Histogram buckets
pub mod buckets {
    /// Job attempt duration buckets (in seconds)
    /// Covers 10ms to 1 hour
    pub const JOB_DURATION: &[f64] = &[
        0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0, 900.0, 1800.0, 3600.0,
    ];
}
