//! Reminders service
//!
//! Runs the daily expiry check: snapshot the records, classify them against
//! the reminder window, dispatch notifications, then arm tomorrow's wake-up.

use super::evaluator::{classify, Classification};
use super::notifications::{DispatchReport, NotificationDispatcher, NotificationKey};
use super::scheduler::{Clock, ReminderScheduler, ScheduleOutcome, WakeSignal};
use super::settings::ReminderSettingsService;
use crate::database::RecordStore;
use crate::error::{AppError, Result};
use chrono::NaiveDate;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Outcome of one check cycle
#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    pub today: NaiveDate,
    pub window_days: u32,
    pub classification: Classification,
    pub dispatch: DispatchReport,
}

/// Reminders service wiring store, settings, scheduler and dispatcher
#[derive(Clone)]
pub struct RemindersService {
    store: Arc<dyn RecordStore>,
    settings: ReminderSettingsService,
    scheduler: Arc<ReminderScheduler>,
    dispatcher: Arc<NotificationDispatcher>,
    clock: Arc<dyn Clock>,
}

impl RemindersService {
    pub fn new(
        store: Arc<dyn RecordStore>,
        settings: ReminderSettingsService,
        scheduler: Arc<ReminderScheduler>,
        dispatcher: Arc<NotificationDispatcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            settings,
            scheduler,
            dispatcher,
            clock,
        }
    }

    pub fn scheduler(&self) -> &Arc<ReminderScheduler> {
        &self.scheduler
    }

    pub fn settings(&self) -> &ReminderSettingsService {
        &self.settings
    }

    /// Classify the current records for `today` and notify accordingly.
    ///
    /// A store failure abandons the cycle with `StoreIo`; nothing is posted
    /// or cancelled.
    pub async fn run_check(&self, today: NaiveDate) -> Result<CheckReport> {
        let records = self
            .store
            .list_all()
            .await
            .map_err(|e| AppError::StoreIo(e.to_string()))?;
        let window_days = self.settings.get_reminder_window_days().await?;

        tracing::info!(
            "Checking {} SIM record(s) for {} with a {}-day window",
            records.len(),
            today,
            window_days
        );

        let classification = classify(today, &records, window_days);
        let dispatch = self.dispatcher.dispatch(&classification, window_days).await;

        Ok(CheckReport {
            today,
            window_days,
            classification,
            dispatch,
        })
    }

    /// Run the check for the clock's current date
    pub async fn check_now(&self) -> Result<CheckReport> {
        self.run_check(self.clock.today()).await
    }

    /// React to a fired wake-up.
    ///
    /// Stale signals are ignored. A failed check is logged and not retried;
    /// tomorrow's wake-up is armed either way.
    pub async fn handle_wake(&self, signal: WakeSignal) -> Result<Option<ScheduleOutcome>> {
        let Some(wake_up) = self.scheduler.claim(&signal).await else {
            return Ok(None);
        };

        let now = self.clock.now();
        tracing::info!(
            "Daily expiry check fired at {} (scheduled for {})",
            now,
            wake_up.fire_at
        );

        if let Err(e) = self.run_check(now.date_naive()).await {
            tracing::error!("Expiry check abandoned until the next wake-up: {}", e);
        }

        let alarm = match self.settings.get_alarm_time().await {
            Ok(alarm) => alarm,
            Err(e) => {
                tracing::warn!("Could not read alarm time, keeping {}: {}", wake_up.alarm, e);
                wake_up.alarm
            }
        };

        let outcome = self.scheduler.rearm_after_fire(now, alarm).await?;
        Ok(Some(outcome))
    }

    /// Restore the daily wake-up once the host process has started
    pub async fn on_host_restart(&self) -> Result<ScheduleOutcome> {
        let alarm = self.settings.get_alarm_time().await?;
        let outcome = self
            .scheduler
            .reschedule_on_restart(self.clock.now(), alarm)
            .await?;

        if let Some(warning) = outcome.warning {
            tracing::warn!("Reminder scheduling degraded: {}", warning);
        }
        Ok(outcome)
    }

    /// Persist a new trigger time and re-arm from now
    pub async fn set_alarm_time(&self, hour: i64, minute: i64) -> Result<ScheduleOutcome> {
        let alarm = self.settings.set_alarm_time(hour, minute).await?;
        self.scheduler.reschedule_on_config_change(alarm).await
    }

    /// Persist a new reminder window (clamped) and re-arm from now
    pub async fn set_reminder_window_days(&self, days: i64) -> Result<(u32, ScheduleOutcome)> {
        let window_days = self.settings.set_reminder_window_days(days).await?;
        let alarm = self.settings.get_alarm_time().await?;
        let outcome = self.scheduler.reschedule_on_config_change(alarm).await?;
        Ok((window_days, outcome))
    }

    /// Drop the notification of a record that no longer exists
    pub async fn forget_record(&self, id: i64) -> Result<()> {
        self.dispatcher.retract(&NotificationKey::Record(id)).await
    }

    /// Start consuming wake signals in the background
    pub fn start(self, mut signals: mpsc::UnboundedReceiver<WakeSignal>) -> JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!("Starting reminders loop");

            while let Some(signal) = signals.recv().await {
                if let Err(e) = self.handle_wake(signal).await {
                    tracing::error!("Failed to re-arm daily expiry check: {}", e);
                }
            }

            tracing::info!("Reminders loop stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{initialize_database, NewSimRecord, Repository, SimRecord};
    use crate::services::notifications::LogNotificationSurface;
    use crate::services::scheduler::tests::{local, FixedClock, RecordingTimer};
    use crate::services::scheduler::TimerPrecision;
    use crate::services::settings::SettingsFile;
    use crate::services::Capability;
    use async_trait::async_trait;
    use chrono::Utc;
    use sqlx::sqlite::SqlitePoolOptions;
    use tempfile::TempDir;

    struct FailingStore;

    #[async_trait]
    impl RecordStore for FailingStore {
        async fn insert(&self, _record: NewSimRecord) -> Result<i64> {
            Err(AppError::Generic("read-only".to_string()))
        }

        async fn update(&self, _record: &SimRecord) -> Result<()> {
            Err(AppError::Generic("read-only".to_string()))
        }

        async fn delete(&self, _id: i64) -> Result<()> {
            Err(AppError::Generic("read-only".to_string()))
        }

        async fn list_all(&self) -> Result<Vec<SimRecord>> {
            Err(AppError::Io(std::io::Error::other("disk unplugged")))
        }

        async fn get_by_id(&self, _id: i64) -> Result<Option<SimRecord>> {
            Ok(None)
        }
    }

    struct Harness {
        service: RemindersService,
        surface: Arc<LogNotificationSurface>,
        timer: Arc<RecordingTimer>,
        clock: Arc<FixedClock>,
        _temp: TempDir,
    }

    async fn repository() -> Repository {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        initialize_database(&pool).await.unwrap();
        Repository::new(pool)
    }

    fn harness(store: Arc<dyn RecordStore>) -> Harness {
        let temp = TempDir::new().unwrap();
        let settings =
            ReminderSettingsService::new(Arc::new(SettingsFile::new(temp.path().to_path_buf())));
        let clock = Arc::new(FixedClock::at(local(2024, 1, 1, 6, 0)));
        let timer = Arc::new(RecordingTimer::new(Capability::Granted));
        let surface = Arc::new(LogNotificationSurface::new());

        let scheduler = Arc::new(ReminderScheduler::new(timer.clone(), clock.clone()));
        let dispatcher = Arc::new(NotificationDispatcher::new(surface.clone()));
        let service = RemindersService::new(store, settings, scheduler, dispatcher, clock.clone());

        Harness {
            service,
            surface,
            timer,
            clock,
            _temp: temp,
        }
    }

    async fn add(repo: &Repository, name: &str, number: &str, date: &str) -> i64 {
        repo.insert(NewSimRecord {
            name: name.to_string(),
            sim_card_number: number.to_string(),
            expired_date: date.to_string(),
        })
        .await
        .unwrap()
    }

    fn signal_for(outcome: &ScheduleOutcome) -> WakeSignal {
        WakeSignal {
            scheduled_for: outcome.wake_up.fire_at.with_timezone(&Utc),
            precision: TimerPrecision::Exact,
        }
    }

    #[tokio::test]
    async fn test_run_check_notifies_expiring_record() {
        let repo = repository().await;
        let id = add(&repo, "Telkomsel", "0811", "2024-01-05").await;
        add(&repo, "XL", "0817", "2024-03-01").await;
        let h = harness(Arc::new(repo));

        let report = h
            .service
            .run_check(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
            .await
            .unwrap();

        assert_eq!(report.window_days, 7);
        assert_eq!(report.classification.expiring_soon.len(), 1);
        assert_eq!(report.classification.ok.len(), 1);
        assert_eq!(report.dispatch.posted.len(), 1);
        assert_eq!(h.surface.active()[0].key, NotificationKey::Record(id));
    }

    #[tokio::test]
    async fn test_store_failure_aborts_cycle_without_notifications() {
        let h = harness(Arc::new(FailingStore));

        let err = h.service.check_now().await.unwrap_err();

        assert!(matches!(err, AppError::StoreIo(_)));
        assert!(err.is_recoverable());
        assert!(h.surface.active().is_empty());
    }

    #[tokio::test]
    async fn test_wake_with_failing_store_still_rearms() {
        let h = harness(Arc::new(FailingStore));

        let armed = h.service.on_host_restart().await.unwrap();
        h.clock.set(local(2024, 1, 1, 7, 0));

        let next = h
            .service
            .handle_wake(signal_for(&armed))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(next.wake_up.fire_at, local(2024, 1, 2, 7, 0));
        assert!(h.surface.active().is_empty());
    }

    #[tokio::test]
    async fn test_restart_uses_persisted_alarm_time() {
        let h = harness(Arc::new(repository().await));
        h.service.settings().set_alarm_time(5, 30).await.unwrap();

        // 06:00 is past 05:30, so the next check is tomorrow
        let outcome = h.service.on_host_restart().await.unwrap();
        assert_eq!(outcome.wake_up.fire_at, local(2024, 1, 2, 5, 30));
        assert_eq!(
            h.timer.armed().map(|(at, _)| at),
            Some(local(2024, 1, 2, 5, 30).with_timezone(&Utc))
        );
    }

    #[tokio::test]
    async fn test_wake_runs_check_and_arms_tomorrow() {
        let repo = repository().await;
        add(&repo, "A", "1", "2023-12-20").await;
        add(&repo, "B", "2", "2023-12-25").await;
        let h = harness(Arc::new(repo));

        let armed = h.service.on_host_restart().await.unwrap();
        assert_eq!(armed.wake_up.fire_at, local(2024, 1, 1, 7, 0));

        h.clock.set(local(2024, 1, 1, 7, 0));
        let next = h
            .service
            .handle_wake(signal_for(&armed))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(next.wake_up.fire_at, local(2024, 1, 2, 7, 0));
        let active = h.surface.active();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].key, NotificationKey::ExpiredSummary);
        assert_eq!(active[0].body, "2 SIM cards have already expired.");
    }

    #[tokio::test]
    async fn test_stale_signal_is_ignored() {
        let h = harness(Arc::new(repository().await));

        let first = h.service.on_host_restart().await.unwrap();
        h.service.set_alarm_time(9, 0).await.unwrap();

        assert!(h
            .service
            .handle_wake(signal_for(&first))
            .await
            .unwrap()
            .is_none());
        assert_eq!(
            h.service.scheduler().pending().await.unwrap().fire_at,
            local(2024, 1, 1, 9, 0)
        );
    }

    #[tokio::test]
    async fn test_cancelled_schedule_never_fires() {
        let h = harness(Arc::new(repository().await));

        let armed = h.service.on_host_restart().await.unwrap();
        h.service.scheduler().cancel().await.unwrap();

        assert!(h
            .service
            .handle_wake(signal_for(&armed))
            .await
            .unwrap()
            .is_none());
        assert!(h.timer.armed().is_none());
    }

    #[tokio::test]
    async fn test_invalid_alarm_time_keeps_schedule() {
        let h = harness(Arc::new(repository().await));
        let armed = h.service.on_host_restart().await.unwrap();

        let err = h.service.set_alarm_time(25, 0).await.unwrap_err();

        assert!(matches!(err, AppError::InvalidConfig(_)));
        assert_eq!(h.service.scheduler().pending().await, Some(armed.wake_up));
    }

    #[tokio::test]
    async fn test_window_change_clamps_and_rearms() {
        let h = harness(Arc::new(repository().await));

        let (window, outcome) = h.service.set_reminder_window_days(500).await.unwrap();

        assert_eq!(window, 365);
        assert_eq!(outcome.wake_up.fire_at, local(2024, 1, 1, 7, 0));
        assert_eq!(h.service.settings().get_reminder_window_days().await.unwrap(), 365);
    }

    #[tokio::test]
    async fn test_forget_record_cancels_its_notification() {
        let repo = repository().await;
        let id = add(&repo, "A", "1", "2024-01-02").await;
        let h = harness(Arc::new(repo));

        h.service.check_now().await.unwrap();
        assert_eq!(h.surface.active().len(), 1);

        h.service.forget_record(id).await.unwrap();
        assert!(h.surface.active().is_empty());
    }

    #[tokio::test]
    async fn test_loop_consumes_signals_until_closed() {
        let h = harness(Arc::new(repository().await));
        let armed = h.service.on_host_restart().await.unwrap();
        h.clock.set(local(2024, 1, 1, 7, 0));

        let (tx, rx) = mpsc::unbounded_channel();
        let handle = h.service.clone().start(rx);

        tx.send(signal_for(&armed)).unwrap();
        drop(tx);
        handle.await.unwrap();

        assert_eq!(
            h.service.scheduler().pending().await.unwrap().fire_at,
            local(2024, 1, 2, 7, 0)
        );
    }
}
