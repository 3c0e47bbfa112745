//! A named unit of schedulable work and its execution history.

use std::{
    any::Any,
    fmt,
    future::Future,
    panic::AssertUnwindSafe,
    pin::Pin,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Instant,
};

use {
    chrono::{DateTime, Utc},
    futures::FutureExt,
    tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard},
};

use crate::types::{JobState, RunStatus};

/// The work a job performs: a zero-argument async callable.
///
/// `Ok` carries the job's output, `Err` signals a failed attempt.
pub type JobFn =
    Arc<dyn Fn() -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send>> + Send + Sync>;

/// Wrap an async closure as a [`JobFn`].
pub fn job_fn<F, Fut>(f: F) -> JobFn
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<String>> + Send + 'static,
{
    Arc::new(move || Box::pin(f()))
}

/// A registered job.
pub struct Job {
    name: String,
    work: JobFn,
    state: Mutex<JobState>,
    /// Shared with every job that later takes this one's name.
    in_flight: Arc<AsyncMutex<()>>,
    retired: AtomicBool,
}

impl Job {
    pub fn new(name: impl Into<String>, work: JobFn) -> Self {
        Self {
            name: name.into(),
            work,
            state: Mutex::new(JobState::default()),
            in_flight: Arc::new(AsyncMutex::new(())),
            retired: AtomicBool::new(false),
        }
    }

    /// A job taking over `previous`'s name. Both share one firing guard, so
    /// a firing of the new job waits out one still running for the old.
    pub(crate) fn replacing(previous: &Job, work: JobFn) -> Self {
        Self {
            in_flight: Arc::clone(&previous.in_flight),
            ..Self::new(previous.name.clone(), work)
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the work once and record the outcome.
    ///
    /// A failure bumps the consecutive-failure counter and is handed back
    /// unchanged; retrying is the caller's business.
    pub async fn execute(&self) -> anyhow::Result<String> {
        let started = Instant::now();
        let result = AssertUnwindSafe(async { (self.work)().await })
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(anyhow::anyhow!(
                    "job panicked: {}",
                    panic_message(&*panic)
                ))
            });
        let duration_ms = started.elapsed().as_millis() as u64;

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.last_run = Some(Utc::now());
        state.last_duration_ms = Some(duration_ms);
        match &result {
            Ok(_) => {
                state.last_status = RunStatus::Success;
                state.failure_count = 0;
                state.last_error = None;
            },
            Err(e) => {
                state.last_status = RunStatus::Failed;
                state.failure_count = state.failure_count.saturating_add(1);
                state.last_error = Some(format!("{e:#}"));
            },
        }
        result
    }

    /// Copy of the current run state.
    #[must_use]
    pub fn state(&self) -> JobState {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    #[must_use]
    pub fn last_run(&self) -> Option<DateTime<Utc>> {
        self.state().last_run
    }

    #[must_use]
    pub fn last_status(&self) -> RunStatus {
        self.state().last_status
    }

    #[must_use]
    pub fn failure_count(&self) -> u32 {
        self.state().failure_count
    }

    /// Claim the job for one firing. `None` while another firing holds it.
    pub(crate) fn try_begin(&self) -> Option<OwnedMutexGuard<()>> {
        Arc::clone(&self.in_flight).try_lock_owned().ok()
    }

    /// Whether another job has since been registered under this name.
    #[must_use]
    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    pub(crate) fn retire(&self) {
        self.retired.store(true, Ordering::Release);
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
