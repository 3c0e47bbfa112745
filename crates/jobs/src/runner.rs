//! Job registry, trigger wiring and the bounded-retry firing protocol.

use std::sync::Arc;

use {
    chrono::{DateTime, Utc},
    tokio::sync::RwLock,
    tracing::{error, info, warn},
};

#[cfg(feature = "metrics")]
use cadence_metrics::{counter, gauge, histogram, jobs as job_metrics, labels};

use crate::{
    Error, Result,
    history::{DEFAULT_HISTORY_LIMIT, RunHistory},
    job::{Job, JobFn},
    parse::format_duration,
    retry::RetryPolicy,
    schedule::Schedule,
    scheduler::{Scheduler, TriggerFn, TriggerHandle},
    types::{JobStatus, RunOutcome, RunRecord, RunStatus, RunnerEvent, RunnerSummary},
};

/// Callback receiving every [`RunnerEvent`].
pub type EventFn = Arc<dyn Fn(RunnerEvent) + Send + Sync>;

/// Runner-wide defaults.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Policy for jobs added without an explicit one.
    pub default_retry: RetryPolicy,
    /// Attempt records kept per job.
    pub history_limit: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            default_retry: RetryPolicy::default(),
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

struct Entry {
    job: Arc<Job>,
    schedule: Schedule,
    policy: RetryPolicy,
    trigger: TriggerHandle,
}

/// Owns the named jobs and fires them through a [`Scheduler`].
pub struct JobRunner {
    scheduler: Arc<dyn Scheduler>,
    jobs: RwLock<Vec<Entry>>,
    dispatch: Dispatch,
    config: RunnerConfig,
}

impl JobRunner {
    pub fn new(scheduler: Arc<dyn Scheduler>) -> Arc<Self> {
        Self::with_config(scheduler, RunnerConfig::default(), None)
    }

    /// Create a runner with explicit defaults and an optional event callback.
    pub fn with_config(
        scheduler: Arc<dyn Scheduler>,
        config: RunnerConfig,
        on_event: Option<EventFn>,
    ) -> Arc<Self> {
        Arc::new(Self {
            scheduler,
            jobs: RwLock::new(Vec::new()),
            dispatch: Dispatch {
                history: Arc::new(RunHistory::new(config.history_limit)),
                on_event,
            },
            config,
        })
    }

    /// Register `work` under `name` with the default retry policy.
    pub async fn add_job(
        &self,
        name: impl Into<String>,
        work: JobFn,
        schedule: &str,
    ) -> Result<()> {
        self.add_job_with_retry(name, work, schedule, self.config.default_retry)
            .await
    }

    /// Register `work` under `name`.
    ///
    /// An existing job with the same name is replaced in place: it keeps its
    /// position in [`get_status`](Self::get_status) and its trigger is removed.
    /// A firing of the old job still under way finishes its current attempt,
    /// then stops without retrying or recording history.
    pub async fn add_job_with_retry(
        &self,
        name: impl Into<String>,
        work: JobFn,
        schedule: &str,
        policy: RetryPolicy,
    ) -> Result<()> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::message("job name must not be empty"));
        }
        let schedule = Schedule::parse(schedule)?;

        let mut jobs = self.jobs.write().await;
        let slot = jobs.iter().position(|e| e.job.name() == name);
        let job = Arc::new(match slot {
            Some(i) => Job::replacing(&jobs[i].job, work),
            None => Job::new(name.clone(), work),
        });
        let callback = self.dispatch.trigger_fn(Arc::clone(&job), policy);
        let trigger = self
            .scheduler
            .register_trigger(schedule.clone(), callback)
            .await?;

        let entry = Entry {
            job,
            schedule: schedule.clone(),
            policy,
            trigger,
        };
        let replaced = match slot {
            Some(i) => {
                jobs[i].job.retire();
                Some(std::mem::replace(&mut jobs[i], entry))
            },
            None => {
                jobs.push(entry);
                None
            },
        };
        #[cfg(feature = "metrics")]
        gauge!(job_metrics::JOBS_REGISTERED).set(jobs.len() as f64);
        drop(jobs);

        let event = match replaced {
            Some(old) => {
                self.scheduler.remove_trigger(old.trigger).await;
                self.dispatch.history.clear(&name);
                info!(job = %name, schedule = %schedule, "job replaced");
                RunnerEvent::Replaced {
                    name,
                    schedule: schedule.to_string(),
                }
            },
            None => {
                info!(
                    job = %name,
                    schedule = %schedule,
                    max_retries = policy.max_retries,
                    retry_delay = %format_duration(policy.delay),
                    "job registered"
                );
                RunnerEvent::Registered {
                    name,
                    schedule: schedule.to_string(),
                }
            },
        };
        self.dispatch.emit(event);
        Ok(())
    }

    /// Activate the scheduler so triggers begin firing.
    pub async fn start(&self) -> Result<()> {
        if let Err(e) = self.scheduler.start().await {
            error!(error = %e, "failed to start job runner");
            return Err(e);
        }
        info!(jobs = self.jobs.read().await.len(), "job runner started");
        Ok(())
    }

    /// Stop new firings. Attempts and retry waits already under way finish.
    pub async fn stop(&self) {
        self.scheduler.shutdown().await;
        info!("job runner stopped");
    }

    /// Snapshot of every job in registration order.
    pub async fn get_status(&self) -> Vec<JobStatus> {
        let jobs = self.jobs.read().await;
        let mut out = Vec::with_capacity(jobs.len());
        for entry in jobs.iter() {
            out.push(JobStatus {
                name: entry.job.name().to_string(),
                schedule: entry.schedule.to_string(),
                max_retries: entry.policy.max_retries,
                next_run: self.scheduler.next_fire(entry.trigger).await,
                state: entry.job.state(),
            });
        }
        out
    }

    /// Fire a job right away, retries included, and wait for the outcome.
    ///
    /// Job failures are reported through the outcome, never as `Err`.
    pub async fn run_now(&self, name: &str) -> Result<RunOutcome> {
        let (job, policy) = {
            let jobs = self.jobs.read().await;
            let entry = jobs
                .iter()
                .find(|e| e.job.name() == name)
                .ok_or_else(|| Error::job_not_found(name))?;
            (Arc::clone(&entry.job), entry.policy)
        };
        Ok(self.dispatch.fire(&job, policy).await)
    }

    /// Most recent attempt records for a job, oldest first.
    pub async fn runs(&self, name: &str, limit: usize) -> Result<Vec<RunRecord>> {
        if !self.jobs.read().await.iter().any(|e| e.job.name() == name) {
            return Err(Error::job_not_found(name));
        }
        Ok(self.dispatch.history.recent(name, limit))
    }

    pub async fn summary(&self) -> RunnerSummary {
        let jobs = self.jobs.read().await;
        let mut next_run_at: Option<DateTime<Utc>> = None;
        for entry in jobs.iter() {
            let next = self.scheduler.next_fire(entry.trigger).await;
            next_run_at = match (next_run_at, next) {
                (Some(cur), Some(next)) => Some(cur.min(next)),
                (cur, next) => cur.or(next),
            };
        }
        RunnerSummary {
            running: self.scheduler.is_running().await,
            job_count: jobs.len(),
            next_run_at,
        }
    }
}

/// State shared by the runner and every trigger callback it hands out.
#[derive(Clone)]
struct Dispatch {
    history: Arc<RunHistory>,
    on_event: Option<EventFn>,
}

impl Dispatch {
    fn emit(&self, event: RunnerEvent) {
        if let Some(ref on_event) = self.on_event {
            on_event(event);
        }
    }

    fn trigger_fn(&self, job: Arc<Job>, policy: RetryPolicy) -> TriggerFn {
        let dispatch = self.clone();
        Arc::new(move || {
            let dispatch = dispatch.clone();
            let job = Arc::clone(&job);
            Box::pin(async move {
                dispatch.fire(&job, policy).await;
            })
        })
    }

    /// One firing: attempt, and on failure wait and attempt again until the
    /// policy's budget is spent. Nothing escapes to the caller.
    async fn fire(&self, job: &Job, policy: RetryPolicy) -> RunOutcome {
        let Some(_in_flight) = job.try_begin() else {
            warn!(job = %job.name(), "previous firing still in flight, skipping");
            #[cfg(feature = "metrics")]
            counter!(
                job_metrics::SKIPPED_TOTAL,
                labels::JOB => job.name().to_string()
            )
            .increment(1);
            self.emit(RunnerEvent::Skipped {
                name: job.name().to_string(),
            });
            return RunOutcome::Skipped;
        };

        let firing_id = uuid::Uuid::new_v4().to_string();
        let mut attempt = 0;
        loop {
            attempt += 1;
            info!(job = %job.name(), attempt, "starting job");
            self.emit(RunnerEvent::Started {
                name: job.name().to_string(),
                attempt,
            });
            #[cfg(feature = "metrics")]
            counter!(
                job_metrics::EXECUTIONS_TOTAL,
                labels::JOB => job.name().to_string()
            )
            .increment(1);

            let started_at = Utc::now();
            let result = job.execute().await;
            let finished_at = Utc::now();
            let duration_ms = job.state().last_duration_ms.unwrap_or_default();

            #[cfg(feature = "metrics")]
            histogram!(
                job_metrics::EXECUTION_DURATION_SECONDS,
                labels::JOB => job.name().to_string()
            )
            .record(duration_ms as f64 / 1000.0);

            let (status, error_msg, output) = match &result {
                Ok(output) => (RunStatus::Success, None, Some(output.clone())),
                Err(e) => (RunStatus::Failed, Some(format!("{e:#}")), None),
            };
            if job.is_retired() {
                info!(
                    job = %job.name(),
                    attempt,
                    "job replaced mid-firing, dropping the rest"
                );
                return RunOutcome::Superseded { attempts: attempt };
            }
            self.history.append(RunRecord {
                job_name: job.name().to_string(),
                firing_id: firing_id.clone(),
                attempt,
                started_at,
                finished_at,
                status,
                error: error_msg.clone(),
                duration_ms,
                output,
            });

            let Some(error_msg) = error_msg else {
                info!(job = %job.name(), attempt, duration_ms, "job completed successfully");
                self.emit(RunnerEvent::Succeeded {
                    name: job.name().to_string(),
                    attempt,
                    duration_ms,
                });
                return RunOutcome::Succeeded { attempts: attempt };
            };

            error!(job = %job.name(), attempt, error = %error_msg, "job failed");
            #[cfg(feature = "metrics")]
            counter!(
                job_metrics::FAILURES_TOTAL,
                labels::JOB => job.name().to_string()
            )
            .increment(1);
            self.emit(RunnerEvent::Failed {
                name: job.name().to_string(),
                attempt,
                error: error_msg,
            });

            if !policy.should_retry(attempt) {
                error!(
                    job = %job.name(),
                    attempts = attempt,
                    failure_count = job.failure_count(),
                    "job exhausted its retries, waiting for next scheduled firing"
                );
                #[cfg(feature = "metrics")]
                counter!(
                    job_metrics::EXHAUSTED_TOTAL,
                    labels::JOB => job.name().to_string()
                )
                .increment(1);
                self.emit(RunnerEvent::Exhausted {
                    name: job.name().to_string(),
                    attempts: attempt,
                });
                return RunOutcome::Exhausted { attempts: attempt };
            }

            info!(
                job = %job.name(),
                next_attempt = attempt + 1,
                delay = %format_duration(policy.delay),
                "retrying job"
            );
            #[cfg(feature = "metrics")]
            counter!(
                job_metrics::RETRIES_TOTAL,
                labels::JOB => job.name().to_string()
            )
            .increment(1);
            self.emit(RunnerEvent::Retrying {
                name: job.name().to_string(),
                next_attempt: attempt + 1,
                delay_ms: policy.delay.as_millis() as u64,
            });
            tokio::time::sleep(policy.delay).await;
            if job.is_retired() {
                info!(
                    job = %job.name(),
                    attempt,
                    "job replaced during retry wait, dropping the rest"
                );
                return RunOutcome::Superseded { attempts: attempt };
            }
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Mutex,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };

    use {
        super::*,
        crate::{job::job_fn, scheduler::TimerScheduler},
    };

    fn counting_ok(counter: Arc<AtomicUsize>) -> JobFn {
        job_fn(move || {
            let c = Arc::clone(&counter);
            async move {
                let n = c.fetch_add(1, Ordering::SeqCst) + 1;
                Ok(format!("run {n}"))
            }
        })
    }

    fn always_fails(counter: Arc<AtomicUsize>) -> JobFn {
        job_fn(move || {
            let c = Arc::clone(&counter);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                anyhow::bail!("disk full")
            }
        })
    }

    fn fails_first(failures: usize, counter: Arc<AtomicUsize>) -> JobFn {
        job_fn(move || {
            let c = Arc::clone(&counter);
            async move {
                let n = c.fetch_add(1, Ordering::SeqCst);
                if n < failures {
                    anyhow::bail!("transient failure {n}");
                }
                Ok("recovered".to_string())
            }
        })
    }

    fn panics_first(panics: usize, counter: Arc<AtomicUsize>) -> JobFn {
        job_fn(move || {
            let c = Arc::clone(&counter);
            async move {
                if c.fetch_add(1, Ordering::SeqCst) < panics {
                    panic!("boom");
                }
                Ok("recovered".to_string())
            }
        })
    }

    fn quick_retry(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(max_retries, Duration::from_millis(5))
    }

    fn make_runner() -> (Arc<JobRunner>, TimerScheduler) {
        let scheduler = TimerScheduler::new();
        let runner = JobRunner::new(Arc::new(scheduler.clone()));
        (runner, scheduler)
    }

    fn recording_runner() -> (Arc<JobRunner>, Arc<Mutex<Vec<RunnerEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let runner = JobRunner::with_config(
            Arc::new(TimerScheduler::new()),
            RunnerConfig::default(),
            Some(Arc::new(move |event: RunnerEvent| {
                sink.lock().unwrap().push(event)
            })),
        );
        (runner, events)
    }

    #[tokio::test]
    async fn successful_firing_records_success() {
        let (runner, _) = make_runner();
        let counter = Arc::new(AtomicUsize::new(0));
        runner
            .add_job("ok", counting_ok(Arc::clone(&counter)), "hourly")
            .await
            .unwrap();

        let outcome = runner.run_now("ok").await.unwrap();
        assert_eq!(outcome, RunOutcome::Succeeded { attempts: 1 });

        let status = &runner.get_status().await[0];
        assert_eq!(status.state.last_status, RunStatus::Success);
        assert_eq!(status.state.failure_count, 0);
        assert!(status.state.last_run.is_some());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn always_failing_job_runs_exactly_max_retries_times() {
        for max_retries in [1, 2, 3, 5] {
            let (runner, _) = make_runner();
            let counter = Arc::new(AtomicUsize::new(0));
            runner
                .add_job_with_retry(
                    "broken",
                    always_fails(Arc::clone(&counter)),
                    "daily",
                    RetryPolicy::new(max_retries, Duration::from_secs(60)),
                )
                .await
                .unwrap();

            let outcome = runner.run_now("broken").await.unwrap();
            assert_eq!(outcome, RunOutcome::Exhausted {
                attempts: max_retries
            });
            assert_eq!(counter.load(Ordering::SeqCst), max_retries as usize);

            let status = &runner.get_status().await[0];
            assert_eq!(status.state.last_status, RunStatus::Failed);
            assert_eq!(status.state.failure_count, max_retries);
            assert_eq!(status.state.last_error.as_deref(), Some("disk full"));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retry_waits_the_configured_delay() {
        let (runner, _) = make_runner();
        let counter = Arc::new(AtomicUsize::new(0));
        runner
            .add_job_with_retry(
                "slow-retry",
                always_fails(Arc::clone(&counter)),
                "daily",
                RetryPolicy::new(3, Duration::from_secs(60)),
            )
            .await
            .unwrap();

        let started = tokio::time::Instant::now();
        runner.run_now("slow-retry").await.unwrap();
        // Two waits between three attempts.
        assert!(started.elapsed() >= Duration::from_secs(120));
        assert!(started.elapsed() < Duration::from_secs(180));
    }

    #[tokio::test]
    async fn fails_once_then_succeeds_resets_counter() {
        let (runner, _) = make_runner();
        let counter = Arc::new(AtomicUsize::new(0));
        runner
            .add_job_with_retry(
                "flaky",
                fails_first(1, Arc::clone(&counter)),
                "daily",
                quick_retry(2),
            )
            .await
            .unwrap();

        let outcome = runner.run_now("flaky").await.unwrap();
        assert_eq!(outcome, RunOutcome::Succeeded { attempts: 2 });

        let status = &runner.get_status().await[0];
        assert_eq!(status.state.last_status, RunStatus::Success);
        assert_eq!(status.state.failure_count, 0);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failure_count_carries_across_firings_until_success() {
        let (runner, _) = make_runner();
        let counter = Arc::new(AtomicUsize::new(0));
        runner
            .add_job_with_retry(
                "stubborn",
                fails_first(3, Arc::clone(&counter)),
                "daily",
                quick_retry(2),
            )
            .await
            .unwrap();

        assert_eq!(
            runner.run_now("stubborn").await.unwrap(),
            RunOutcome::Exhausted { attempts: 2 }
        );
        assert_eq!(runner.get_status().await[0].state.failure_count, 2);

        // Next firing gets a fresh budget; the counter keeps climbing.
        assert_eq!(
            runner.run_now("stubborn").await.unwrap(),
            RunOutcome::Succeeded { attempts: 2 }
        );
        let state = &runner.get_status().await[0].state;
        assert_eq!(state.failure_count, 0);
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn duplicate_name_replaces_job_in_place() {
        let (runner, scheduler) = make_runner();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        runner
            .add_job("report", counting_ok(Arc::clone(&first)), "daily")
            .await
            .unwrap();
        runner
            .add_job("cleanup", counting_ok(Arc::default()), "hourly")
            .await
            .unwrap();
        runner.run_now("report").await.unwrap();

        runner
            .add_job("report", counting_ok(Arc::clone(&second)), "weekly")
            .await
            .unwrap();

        let status = runner.get_status().await;
        assert_eq!(status.len(), 2);
        assert_eq!(status[0].name, "report");
        assert_eq!(status[0].schedule, "weekly");
        assert_eq!(status[0].state.last_status, RunStatus::NeverRun);
        assert_eq!(status[1].name, "cleanup");
        assert_eq!(scheduler.trigger_count().await, 2);
        assert!(runner.runs("report", 10).await.unwrap().is_empty());

        runner.run_now("report").await.unwrap();
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalid_schedule_registers_nothing() {
        let (runner, scheduler) = make_runner();
        let err = runner
            .add_job("bad", counting_ok(Arc::default()), "not-a-cron")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidSchedule { .. }));
        assert!(runner.get_status().await.is_empty());
        assert_eq!(scheduler.trigger_count().await, 0);
    }

    #[tokio::test]
    async fn invalid_schedule_keeps_existing_job() {
        let (runner, scheduler) = make_runner();
        runner
            .add_job("keep", counting_ok(Arc::default()), "daily")
            .await
            .unwrap();
        assert!(
            runner
                .add_job("keep", counting_ok(Arc::default()), "every fortnight")
                .await
                .is_err()
        );
        let status = runner.get_status().await;
        assert_eq!(status.len(), 1);
        assert_eq!(status[0].schedule, "daily");
        assert_eq!(scheduler.trigger_count().await, 1);
    }

    #[tokio::test]
    async fn empty_name_is_rejected() {
        let (runner, _) = make_runner();
        assert!(
            runner
                .add_job("  ", counting_ok(Arc::default()), "daily")
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn nightly_report_scenario() {
        let (runner, _) = make_runner();
        let counter = Arc::new(AtomicUsize::new(0));
        runner
            .add_job_with_retry(
                "nightly-report",
                counting_ok(Arc::clone(&counter)),
                "daily",
                RetryPolicy::default().with_max_retries(3),
            )
            .await
            .unwrap();

        let mut last_runs = Vec::new();
        for _ in 0..3 {
            runner.run_now("nightly-report").await.unwrap();
            let status = runner.get_status().await;
            let report = &status[0];
            assert_eq!(report.state.failure_count, 0);
            assert_eq!(report.state.last_status, RunStatus::Success);
            last_runs.push(report.state.last_run.unwrap());
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        assert!(last_runs.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn run_now_unknown_job() {
        let (runner, _) = make_runner();
        let err = runner.run_now("ghost").await.unwrap_err();
        assert!(matches!(err, Error::JobNotFound { .. }));
        assert!(runner.runs("ghost", 5).await.is_err());
    }

    #[tokio::test]
    async fn overlapping_firing_is_skipped() {
        let (runner, _) = make_runner();
        let entered = Arc::new(tokio::sync::Notify::new());
        let release = Arc::new(tokio::sync::Notify::new());
        let work = {
            let entered = Arc::clone(&entered);
            let release = Arc::clone(&release);
            job_fn(move || {
                let entered = Arc::clone(&entered);
                let release = Arc::clone(&release);
                async move {
                    entered.notify_one();
                    release.notified().await;
                    Ok("done".to_string())
                }
            })
        };
        runner.add_job("long", work, "daily").await.unwrap();

        let first = {
            let runner = Arc::clone(&runner);
            tokio::spawn(async move { runner.run_now("long").await })
        };
        tokio::time::timeout(Duration::from_secs(2), entered.notified())
            .await
            .expect("first firing never started");

        assert_eq!(runner.run_now("long").await.unwrap(), RunOutcome::Skipped);

        release.notify_one();
        assert_eq!(first.await.unwrap().unwrap(), RunOutcome::Succeeded {
            attempts: 1
        });
    }

    #[tokio::test]
    async fn events_follow_the_retry_protocol() {
        let (runner, events) = recording_runner();
        runner
            .add_job_with_retry(
                "flaky",
                fails_first(1, Arc::default()),
                "daily",
                quick_retry(3),
            )
            .await
            .unwrap();
        runner.run_now("flaky").await.unwrap();

        let kinds: Vec<String> = events
            .lock()
            .unwrap()
            .iter()
            .map(|e| serde_json::to_value(e).unwrap()["kind"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(kinds, [
            "registered",
            "started",
            "failed",
            "retrying",
            "started",
            "succeeded"
        ]);
        assert!(events.lock().unwrap().iter().all(|e| e.job_name() == "flaky"));
    }

    #[tokio::test]
    async fn history_records_every_attempt() {
        let (runner, _) = make_runner();
        runner
            .add_job_with_retry(
                "flaky",
                fails_first(2, Arc::default()),
                "daily",
                quick_retry(3),
            )
            .await
            .unwrap();
        runner.run_now("flaky").await.unwrap();

        let runs = runner.runs("flaky", 10).await.unwrap();
        assert_eq!(runs.len(), 3);
        assert_eq!(runs[0].status, RunStatus::Failed);
        assert_eq!(runs[0].error.as_deref(), Some("transient failure 0"));
        assert_eq!(runs[2].status, RunStatus::Success);
        assert_eq!(runs[2].output.as_deref(), Some("recovered"));
        assert!(runs.iter().all(|r| r.firing_id == runs[0].firing_id));
        assert_eq!(
            runs.iter().map(|r| r.attempt).collect::<Vec<_>>(),
            [1, 2, 3]
        );
    }

    #[tokio::test]
    async fn start_twice_fails_and_stop_is_reported() {
        let (runner, _) = make_runner();
        runner.start().await.unwrap();
        assert!(runner.summary().await.running);

        let err = runner.start().await.unwrap_err();
        assert!(matches!(err, Error::SchedulerStart { .. }));

        runner.stop().await;
        assert!(!runner.summary().await.running);
    }

    #[tokio::test]
    async fn summary_reports_earliest_next_run() {
        let (runner, _) = make_runner();
        runner
            .add_job("a", counting_ok(Arc::default()), "yearly")
            .await
            .unwrap();
        runner
            .add_job("b", counting_ok(Arc::default()), "every 1m")
            .await
            .unwrap();

        let summary = runner.summary().await;
        assert_eq!(summary.job_count, 2);
        let status = runner.get_status().await;
        assert_eq!(summary.next_run_at, status[1].next_run);
    }

    #[tokio::test]
    async fn scheduled_firings_retry_in_the_background() {
        let (runner, _) = make_runner();
        let counter = Arc::new(AtomicUsize::new(0));
        runner
            .add_job_with_retry(
                "ticker",
                fails_first(1, Arc::clone(&counter)),
                "every 30ms",
                quick_retry(2),
            )
            .await
            .unwrap();
        runner.start().await.unwrap();

        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let status = runner.get_status().await;
                if status[0].state.last_status == RunStatus::Success {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("scheduled job never succeeded");

        runner.stop().await;
        assert!(counter.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_job_is_a_failed_attempt() {
        let (runner, _) = make_runner();
        let counter = Arc::new(AtomicUsize::new(0));
        runner
            .add_job_with_retry(
                "explodes",
                panics_first(usize::MAX, Arc::clone(&counter)),
                "daily",
                RetryPolicy::new(3, Duration::from_millis(1)),
            )
            .await
            .unwrap();

        let outcome = runner.run_now("explodes").await.unwrap();
        assert_eq!(outcome, RunOutcome::Exhausted { attempts: 3 });
        assert_eq!(counter.load(Ordering::SeqCst), 3);

        let status = &runner.get_status().await[0];
        assert_eq!(status.state.last_status, RunStatus::Failed);
        assert_eq!(status.state.failure_count, 3);
        assert_eq!(
            status.state.last_error.as_deref(),
            Some("job panicked: boom")
        );
        assert_eq!(runner.runs("explodes", 10).await.unwrap().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn panic_then_success_recovers_within_the_firing() {
        let (runner, _) = make_runner();
        runner
            .add_job_with_retry(
                "shaky",
                panics_first(1, Arc::default()),
                "daily",
                quick_retry(2),
            )
            .await
            .unwrap();

        let outcome = runner.run_now("shaky").await.unwrap();
        assert_eq!(outcome, RunOutcome::Succeeded { attempts: 2 });
        assert_eq!(runner.get_status().await[0].state.failure_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_does_not_cancel_pending_retries() {
        let (runner, _) = make_runner();
        let counter = Arc::new(AtomicUsize::new(0));
        runner
            .add_job_with_retry(
                "nightly",
                always_fails(Arc::clone(&counter)),
                "daily",
                RetryPolicy::new(3, Duration::from_secs(60)),
            )
            .await
            .unwrap();
        runner.start().await.unwrap();

        let firing = {
            let runner = Arc::clone(&runner);
            tokio::spawn(async move { runner.run_now("nightly").await })
        };
        while counter.load(Ordering::SeqCst) < 1 {
            tokio::task::yield_now().await;
        }

        runner.stop().await;
        assert!(!runner.summary().await.running);

        // Still inside the first 60s wait.
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        let outcome = firing.await.unwrap().unwrap();
        assert_eq!(outcome, RunOutcome::Exhausted { attempts: 3 });
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert_eq!(runner.get_status().await[0].state.failure_count, 3);
    }

    #[tokio::test]
    async fn replacing_a_job_mid_firing_drops_the_old_firing() {
        let (runner, _) = make_runner();
        let entered = Arc::new(tokio::sync::Notify::new());
        let release = Arc::new(tokio::sync::Notify::new());
        let old_calls = Arc::new(AtomicUsize::new(0));
        let old_work = {
            let entered = Arc::clone(&entered);
            let release = Arc::clone(&release);
            let calls = Arc::clone(&old_calls);
            job_fn(move || {
                let entered = Arc::clone(&entered);
                let release = Arc::clone(&release);
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    entered.notify_one();
                    release.notified().await;
                    anyhow::bail!("old version failed")
                }
            })
        };
        runner
            .add_job_with_retry("sync", old_work, "daily", quick_retry(3))
            .await
            .unwrap();

        let first = {
            let runner = Arc::clone(&runner);
            tokio::spawn(async move { runner.run_now("sync").await })
        };
        tokio::time::timeout(Duration::from_secs(2), entered.notified())
            .await
            .expect("old firing never started");

        let new_calls = Arc::new(AtomicUsize::new(0));
        runner
            .add_job("sync", counting_ok(Arc::clone(&new_calls)), "hourly")
            .await
            .unwrap();

        // The name stays busy until the old firing lets go.
        assert_eq!(runner.run_now("sync").await.unwrap(), RunOutcome::Skipped);
        assert_eq!(new_calls.load(Ordering::SeqCst), 0);

        release.notify_one();
        assert_eq!(first.await.unwrap().unwrap(), RunOutcome::Superseded {
            attempts: 1
        });
        assert_eq!(old_calls.load(Ordering::SeqCst), 1);
        assert!(runner.runs("sync", 10).await.unwrap().is_empty());

        assert_eq!(runner.run_now("sync").await.unwrap(), RunOutcome::Succeeded {
            attempts: 1
        });
        let runs = runner.runs("sync", 10).await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].output.as_deref(), Some("run 1"));
        assert_eq!(
            runner.get_status().await[0].state.last_status,
            RunStatus::Success
        );
    }
}
