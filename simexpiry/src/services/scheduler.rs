//! Reminder scheduler
//!
//! Owns the single pending wake-up of the daily expiry check and computes
//! when it should fire next. The wake-up itself is delivered by a
//! [`WakeTimer`]; production uses one-shot `tokio-cron-scheduler` jobs.

use super::settings::AlarmTime;
use super::Capability;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_cron_scheduler::{Job, JobScheduler};
use uuid::Uuid;

/// Source of wall-clock time in the device timezone
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

/// Clock backed by the operating system
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerPrecision {
    Exact,
    /// May be delivered somewhat after the requested instant
    Approximate,
}

/// Delivered by the timer once the armed instant has passed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WakeSignal {
    pub scheduled_for: DateTime<Utc>,
    pub precision: TimerPrecision,
}

/// The one outstanding wake-up
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingWakeUp {
    pub fire_at: DateTime<Local>,
    pub alarm: AlarmTime,
    pub precision: TimerPrecision,
}

impl PendingWakeUp {
    fn matches(&self, signal: &WakeSignal) -> bool {
        self.fire_at.with_timezone(&Utc) == signal.scheduled_for
    }
}

/// Non-fatal problems found while arming
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ScheduleWarning {
    /// Exact timing was not available; fell back to approximate timing
    ExactTimingUnavailable(Capability),
}

impl std::fmt::Display for ScheduleWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScheduleWarning::ExactTimingUnavailable(cap) => write!(
                f,
                "exact reminder timing unavailable ({:?}); reminders may arrive late",
                cap
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleOutcome {
    pub wake_up: PendingWakeUp,
    pub warning: Option<ScheduleWarning>,
}

/// Host service that delivers a wake signal at or after an instant
#[async_trait]
pub trait WakeTimer: Send + Sync {
    /// Whether exact delivery may be requested
    fn exact_capability(&self) -> Capability;

    /// Arm the timer, replacing whatever was armed before
    async fn arm(&self, at: DateTime<Utc>, precision: TimerPrecision) -> Result<()>;

    async fn disarm(&self) -> Result<()>;
}

/// Map a local wall-clock time onto the timezone, stepping past DST gaps
fn resolve_local<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime) -> DateTime<Tz> {
    (0..=8)
        .find_map(|step| {
            tz.from_local_datetime(&(naive + Duration::minutes(15 * step)))
                .earliest()
        })
        .unwrap_or_else(|| tz.from_utc_datetime(&naive))
}

/// First `hour:minute:00` at or after `now`
pub fn next_daily_fire<Tz: TimeZone>(now: &DateTime<Tz>, alarm: AlarmTime) -> DateTime<Tz> {
    let tz = now.timezone();
    let today = now.date_naive();

    let candidate = resolve_local(&tz, today.and_time(alarm.as_naive_time()));
    if candidate >= *now {
        candidate
    } else {
        resolve_local(&tz, (today + Duration::days(1)).and_time(alarm.as_naive_time()))
    }
}

/// `hour:minute:00` on the calendar day after `fired_at`
pub fn next_fire_after<Tz: TimeZone>(fired_at: &DateTime<Tz>, alarm: AlarmTime) -> DateTime<Tz> {
    let tomorrow = fired_at.date_naive() + Duration::days(1);
    resolve_local(&fired_at.timezone(), tomorrow.and_time(alarm.as_naive_time()))
}

/// Scheduler state: at most one pending wake-up, replaced atomically
pub struct ReminderScheduler {
    timer: Arc<dyn WakeTimer>,
    clock: Arc<dyn Clock>,
    pending: Mutex<Option<PendingWakeUp>>,
}

impl ReminderScheduler {
    pub fn new(timer: Arc<dyn WakeTimer>, clock: Arc<dyn Clock>) -> Self {
        Self {
            timer,
            clock,
            pending: Mutex::new(None),
        }
    }

    /// Arm the next daily wake-up at or after `now`
    pub async fn schedule_daily(
        &self,
        now: DateTime<Local>,
        alarm: AlarmTime,
    ) -> Result<ScheduleOutcome> {
        self.replace_pending(next_daily_fire(&now, alarm), alarm)
            .await
    }

    /// Arm tomorrow's wake-up after a firing, never the same day
    pub async fn rearm_after_fire(
        &self,
        fired_at: DateTime<Local>,
        alarm: AlarmTime,
    ) -> Result<ScheduleOutcome> {
        self.replace_pending(next_fire_after(&fired_at, alarm), alarm)
            .await
    }

    /// Drop the pending wake-up; nothing fires until rescheduled
    pub async fn cancel(&self) -> Result<()> {
        let mut pending = self.pending.lock().await;
        self.timer.disarm().await?;

        if let Some(previous) = pending.take() {
            tracing::info!("Cancelled pending wake-up at {}", previous.fire_at);
        }
        Ok(())
    }

    /// Re-arm from the clock's now after the trigger time changed
    pub async fn reschedule_on_config_change(&self, alarm: AlarmTime) -> Result<ScheduleOutcome> {
        tracing::info!("Trigger time changed to {}, re-arming", alarm);
        self.schedule_daily(self.clock.now(), alarm).await
    }

    /// Restore the wake-up after the host process started again.
    ///
    /// A missed wake-up is not replayed; the next one is armed exactly as
    /// `schedule_daily` would.
    pub async fn reschedule_on_restart(
        &self,
        now: DateTime<Local>,
        alarm: AlarmTime,
    ) -> Result<ScheduleOutcome> {
        tracing::info!("Host restarted at {}, restoring daily wake-up", now);
        self.schedule_daily(now, alarm).await
    }

    pub async fn pending(&self) -> Option<PendingWakeUp> {
        self.pending.lock().await.clone()
    }

    /// Consume the pending wake-up a signal belongs to.
    ///
    /// Returns `None` for stale signals, e.g. one that raced a cancel or a
    /// reschedule.
    pub async fn claim(&self, signal: &WakeSignal) -> Option<PendingWakeUp> {
        let mut pending = self.pending.lock().await;

        let is_current = pending
            .as_ref()
            .is_some_and(|current| current.matches(signal));
        if is_current {
            pending.take()
        } else {
            tracing::debug!("Ignoring stale wake signal for {}", signal.scheduled_for);
            None
        }
    }

    async fn replace_pending(
        &self,
        fire_at: DateTime<Local>,
        alarm: AlarmTime,
    ) -> Result<ScheduleOutcome> {
        let mut pending = self.pending.lock().await;

        // Cancel-then-set under the lock so two wake-ups never coexist
        self.timer.disarm().await?;
        *pending = None;

        let at = fire_at.with_timezone(&Utc);
        let mut warning = None;

        let capability = self.timer.exact_capability();
        let precision = if capability.is_granted() {
            match self.timer.arm(at, TimerPrecision::Exact).await {
                Ok(()) => TimerPrecision::Exact,
                Err(AppError::PermissionDenied(reason)) => {
                    tracing::warn!("Exact wake-up refused ({}), using approximate timing", reason);
                    warning = Some(ScheduleWarning::ExactTimingUnavailable(Capability::Denied));
                    self.timer.arm(at, TimerPrecision::Approximate).await?;
                    TimerPrecision::Approximate
                }
                Err(e) => return Err(e),
            }
        } else {
            tracing::warn!(
                "Exact wake-up capability is {:?}, using approximate timing",
                capability
            );
            warning = Some(ScheduleWarning::ExactTimingUnavailable(capability));
            self.timer.arm(at, TimerPrecision::Approximate).await?;
            TimerPrecision::Approximate
        };

        let wake_up = PendingWakeUp {
            fire_at,
            alarm,
            precision,
        };
        *pending = Some(wake_up.clone());

        tracing::info!("Next expiry check armed for {} ({:?})", fire_at, precision);
        Ok(ScheduleOutcome { wake_up, warning })
    }
}

/// Delay until `at`; approximate timers round up to a whole minute
fn delay_until(now: DateTime<Utc>, at: DateTime<Utc>, precision: TimerPrecision) -> std::time::Duration {
    let delay = (at - now).to_std().unwrap_or(std::time::Duration::ZERO);

    match precision {
        TimerPrecision::Exact => delay,
        TimerPrecision::Approximate => {
            let secs = delay.as_secs() + u64::from(delay.subsec_nanos() > 0);
            std::time::Duration::from_secs(secs.div_ceil(60) * 60)
        }
    }
}

/// Wake timer built on one-shot cron jobs
pub struct CronWakeTimer {
    scheduler: Arc<RwLock<JobScheduler>>,
    current_job_id: Arc<RwLock<Option<Uuid>>>,
    signals: mpsc::UnboundedSender<WakeSignal>,
    exact: Capability,
}

impl CronWakeTimer {
    /// Create the timer; fired wake-ups are pushed into `signals`
    pub async fn new(signals: mpsc::UnboundedSender<WakeSignal>, exact: Capability) -> Result<Self> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| AppError::Scheduler(format!("Failed to create scheduler: {}", e)))?;

        Ok(Self {
            scheduler: Arc::new(RwLock::new(scheduler)),
            current_job_id: Arc::new(RwLock::new(None)),
            signals,
            exact,
        })
    }

    pub async fn start(&self) -> Result<()> {
        let scheduler = self.scheduler.read().await;
        scheduler
            .start()
            .await
            .map_err(|e| AppError::Scheduler(format!("Failed to start scheduler: {}", e)))?;
        tracing::info!("Wake-up timer started");
        Ok(())
    }

    /// Shutdown scheduler gracefully
    pub async fn shutdown(&self) -> Result<()> {
        let mut scheduler = self.scheduler.write().await;
        scheduler
            .shutdown()
            .await
            .map_err(|e| AppError::Scheduler(format!("Failed to shutdown scheduler: {}", e)))?;
        tracing::info!("Wake-up timer shutdown");
        Ok(())
    }
}

#[async_trait]
impl WakeTimer for CronWakeTimer {
    fn exact_capability(&self) -> Capability {
        self.exact
    }

    async fn arm(&self, at: DateTime<Utc>, precision: TimerPrecision) -> Result<()> {
        if precision == TimerPrecision::Exact && !self.exact.is_granted() {
            return Err(AppError::PermissionDenied(
                "exact wake-up timing".to_string(),
            ));
        }

        self.disarm().await?;

        let delay = delay_until(Utc::now(), at, precision);
        let signals = self.signals.clone();

        let job = Job::new_one_shot_async(delay, move |_uuid, _l| {
            let signals = signals.clone();
            Box::pin(async move {
                tracing::debug!("Wake-up timer fired for {}", at);
                if signals
                    .send(WakeSignal {
                        scheduled_for: at,
                        precision,
                    })
                    .is_err()
                {
                    tracing::warn!("Wake-up fired but nobody is listening");
                }
            })
        })
        .map_err(|e| AppError::Scheduler(format!("Failed to create wake-up job: {}", e)))?;

        let job_id = job.guid();

        let scheduler = self.scheduler.write().await;
        scheduler
            .add(job)
            .await
            .map_err(|e| AppError::Scheduler(format!("Failed to schedule wake-up: {}", e)))?;

        let mut current_job = self.current_job_id.write().await;
        *current_job = Some(job_id);

        tracing::debug!("Wake-up job {} armed in {:?}", job_id, delay);
        Ok(())
    }

    async fn disarm(&self) -> Result<()> {
        let mut current_job = self.current_job_id.write().await;

        if let Some(job_id) = current_job.take() {
            let scheduler = self.scheduler.write().await;
            // A one-shot job that already fired is gone; nothing left to remove
            if let Err(e) = scheduler.remove(&job_id).await {
                tracing::debug!("Wake-up job {} not removed: {}", job_id, e);
            }
        }

        Ok(())
    }
}
