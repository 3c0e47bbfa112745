//! Trigger registration and the timer loop that fires them.

use std::{
    fmt,
    future::Future,
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use {
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    tokio::{
        sync::{Mutex, Notify, RwLock},
        task::JoinHandle,
    },
    tracing::{debug, info, warn},
};

use crate::{Error, Result, schedule::Schedule};

/// Callback fired by a trigger. It cannot fail.
pub type TriggerFn = Arc<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Opaque id of a registered trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TriggerHandle(u64);

impl fmt::Display for TriggerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "trigger-{}", self.0)
    }
}

/// Timer service the runner registers its callbacks with.
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Bind `callback` to `schedule`. Fails with [`Error::InvalidSchedule`]
    /// when the schedule has no future firing.
    async fn register_trigger(
        &self,
        schedule: Schedule,
        callback: TriggerFn,
    ) -> Result<TriggerHandle>;
    /// Returns `false` if the handle was unknown.
    async fn remove_trigger(&self, handle: TriggerHandle) -> bool;
    /// Begin firing triggers. Fails with [`Error::SchedulerStart`] if already running.
    async fn start(&self) -> Result<()>;
    /// Stop firing triggers. Callbacks already running are left alone.
    async fn shutdown(&self);
    async fn is_running(&self) -> bool;
    async fn next_fire(&self, handle: TriggerHandle) -> Option<DateTime<Utc>>;
}

/// How long the loop sleeps when nothing is scheduled.
const DEFAULT_IDLE_POLL: Duration = Duration::from_secs(60);

struct Trigger {
    handle: TriggerHandle,
    schedule: Schedule,
    callback: TriggerFn,
    next_fire: Option<DateTime<Utc>>,
}

struct Inner {
    triggers: RwLock<Vec<Trigger>>,
    running: RwLock<bool>,
    wake_notify: Notify,
    timer_handle: Mutex<Option<JoinHandle<()>>>,
    next_handle: AtomicU64,
    idle_poll: Duration,
}

/// In-process scheduler driven by a single tokio timer task.
///
/// Due callbacks are spawned on their own tasks, so a slow callback never
/// delays other triggers.
#[derive(Clone)]
pub struct TimerScheduler {
    inner: Arc<Inner>,
}

impl TimerScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::with_idle_poll(DEFAULT_IDLE_POLL)
    }

    #[must_use]
    pub fn with_idle_poll(idle_poll: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                triggers: RwLock::new(Vec::new()),
                running: RwLock::new(false),
                wake_notify: Notify::new(),
                timer_handle: Mutex::new(None),
                next_handle: AtomicU64::new(1),
                idle_poll,
            }),
        }
    }

    /// Number of live triggers.
    pub async fn trigger_count(&self) -> usize {
        self.inner.triggers.read().await.len()
    }
}

impl Default for TimerScheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Scheduler for TimerScheduler {
    async fn register_trigger(
        &self,
        schedule: Schedule,
        callback: TriggerFn,
    ) -> Result<TriggerHandle> {
        let next_fire = schedule.next_after(Utc::now());
        if next_fire.is_none() {
            return Err(Error::invalid_schedule(
                schedule.as_str(),
                "schedule has no future firing",
            ));
        }

        let handle = TriggerHandle(self.inner.next_handle.fetch_add(1, Ordering::Relaxed));
        debug!(%handle, schedule = %schedule, next_fire = ?next_fire, "trigger registered");
        self.inner.triggers.write().await.push(Trigger {
            handle,
            schedule,
            callback,
            next_fire,
        });
        self.inner.wake_notify.notify_one();
        Ok(handle)
    }

    async fn remove_trigger(&self, handle: TriggerHandle) -> bool {
        let mut triggers = self.inner.triggers.write().await;
        let before = triggers.len();
        triggers.retain(|t| t.handle != handle);
        let removed = triggers.len() != before;
        drop(triggers);
        if removed {
            debug!(%handle, "trigger removed");
            self.inner.wake_notify.notify_one();
        }
        removed
    }

    async fn start(&self) -> Result<()> {
        {
            let mut running = self.inner.running.write().await;
            if *running {
                return Err(Error::scheduler_start("scheduler is already running"));
            }
            *running = true;
        }

        // Firings missed while stopped are not replayed.
        self.inner.recompute_all_next_fires().await;

        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            inner.timer_loop().await;
        });
        *self.inner.timer_handle.lock().await = Some(handle);
        info!("scheduler started");
        Ok(())
    }

    async fn shutdown(&self) {
        *self.inner.running.write().await = false;
        self.inner.wake_notify.notify_one();

        let mut handle = self.inner.timer_handle.lock().await;
        if let Some(h) = handle.take() {
            h.abort();
        }
        info!("scheduler stopped");
    }

    async fn is_running(&self) -> bool {
        *self.inner.running.read().await
    }

    async fn next_fire(&self, handle: TriggerHandle) -> Option<DateTime<Utc>> {
        self.inner
            .triggers
            .read()
            .await
            .iter()
            .find(|t| t.handle == handle)
            .and_then(|t| t.next_fire)
    }
}

impl Inner {
    async fn timer_loop(&self) {
        loop {
            if !*self.running.read().await {
                break;
            }

            let sleep_for = self.time_until_next_wake().await;

            if !sleep_for.is_zero() {
                tokio::select! {
                    () = tokio::time::sleep(sleep_for) => {},
                    () = self.wake_notify.notified() => {
                        debug!("timer loop woken by notify");
                        continue;
                    },
                }
            }

            if !*self.running.read().await {
                break;
            }

            self.fire_due_triggers().await;
        }
    }

    async fn time_until_next_wake(&self) -> Duration {
        let now = Utc::now();
        self.triggers
            .read()
            .await
            .iter()
            .filter_map(|t| t.next_fire)
            .map(|at| (at - now).to_std().unwrap_or(Duration::ZERO))
            .min()
            .unwrap_or(self.idle_poll)
    }

    async fn fire_due_triggers(&self) {
        let now = Utc::now();
        let mut due = Vec::new();
        {
            let mut triggers = self.triggers.write().await;
            for trigger in triggers.iter_mut() {
                if trigger.next_fire.is_some_and(|at| at <= now) {
                    due.push((trigger.handle, Arc::clone(&trigger.callback)));
                    trigger.next_fire = trigger.schedule.next_after(now);
                }
            }
            triggers.retain(|t| {
                let live = t.next_fire.is_some();
                if !live {
                    debug!(handle = %t.handle, "trigger retired, no further firings");
                }
                live
            });
        }

        for (handle, callback) in due {
            debug!(%handle, "firing trigger");
            let task = tokio::spawn(callback());
            tokio::spawn(async move {
                if let Err(e) = task.await
                    && e.is_panic()
                {
                    warn!(%handle, "trigger callback panicked");
                }
            });
        }
    }

    async fn recompute_all_next_fires(&self) {
        let now = Utc::now();
        let mut triggers = self.triggers.write().await;
        for trigger in triggers.iter_mut() {
            trigger.next_fire = trigger.schedule.next_after(now);
        }
        triggers.retain(|t| t.next_fire.is_some());
    }
}
