//! Application state and initialization
//!
//! This module manages the central application state and lifecycle.
//! All services are initialized here and made available through AppState.

use crate::config::{DATABASE_FILE_NAME, DATA_DIR_ENV, DEFAULT_DATA_DIR};
use crate::database::{create_pool, Repository};
use crate::error::Result;
use crate::services::{
    Capability, CronWakeTimer, LogNotificationSurface, NotificationDispatcher, ReminderScheduler,
    ReminderSettingsService, RemindersService, SettingsFile, SimCardsService, SystemClock,
    WakeSignal,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Central application state holding all services
#[derive(Clone)]
pub struct AppState {
    pub app_data_dir: PathBuf,
    pub records: SimCardsService,
    pub reminders: RemindersService,
    pub surface: Arc<LogNotificationSurface>,
    pub timer: Arc<CronWakeTimer>,
}

/// Data directory from `SIMEXPIRY_DATA_DIR`, or the local default
pub fn data_dir_from_env() -> PathBuf {
    std::env::var_os(DATA_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
}

/// Application setup - called once on startup.
///
/// Returns the state together with the receiving end of the wake signal
/// channel, which the caller hands to [`RemindersService::start`].
pub async fn setup(
    app_data_dir: PathBuf,
) -> Result<(AppState, mpsc::UnboundedReceiver<WakeSignal>)> {
    tracing::info!("Initializing application");
    tracing::info!("App data directory: {:?}", app_data_dir);

    tokio::fs::create_dir_all(&app_data_dir).await?;

    let pool = create_pool(&app_data_dir.join(DATABASE_FILE_NAME)).await?;
    let store = Arc::new(Repository::new(pool));

    let settings = ReminderSettingsService::new(Arc::new(SettingsFile::new(app_data_dir.clone())));

    let (signals_tx, signals_rx) = mpsc::unbounded_channel();
    let timer = Arc::new(CronWakeTimer::new(signals_tx, Capability::Granted).await?);
    timer.start().await?;

    let clock = Arc::new(SystemClock);
    let surface = Arc::new(LogNotificationSurface::new());

    let scheduler = Arc::new(ReminderScheduler::new(timer.clone(), clock.clone()));
    let dispatcher = Arc::new(NotificationDispatcher::new(surface.clone()));

    let records = SimCardsService::new(store.clone());
    let reminders = RemindersService::new(store, settings, scheduler, dispatcher, clock);

    let state = AppState {
        app_data_dir,
        records,
        reminders,
        surface,
        timer,
    };

    tracing::info!("Application initialized successfully");

    Ok((state, signals_rx))
}

impl AppState {
    /// Delete a record and withdraw any notification naming it
    pub async fn delete_record(&self, id: i64) -> Result<()> {
        self.records.delete(id).await?;
        self.reminders.forget_record(id).await
    }

    /// Stop the wake-up timer; pending wake-ups are dropped
    pub async fn shutdown(&self) -> Result<()> {
        self.timer.shutdown().await
    }
}
