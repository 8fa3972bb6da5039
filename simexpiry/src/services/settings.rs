//! Settings service
//!
//! Typed, validated access to the reminder settings, persisted as a JSON
//! key-value file that survives restarts.

use crate::config::*;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use chrono::NaiveTime;
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;

/// Time of day the daily expiry check fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct AlarmTime {
    hour: u32,
    minute: u32,
}

impl AlarmTime {
    /// Build a validated time of day; out-of-range parts are rejected
    pub fn new(hour: i64, minute: i64) -> Result<Self> {
        let hour = u32::try_from(hour)
            .ok()
            .filter(|h| *h <= MAX_ALARM_HOUR)
            .ok_or_else(|| AppError::InvalidConfig(format!("alarm hour {} not in 0..=23", hour)))?;
        let minute = u32::try_from(minute)
            .ok()
            .filter(|m| *m <= MAX_ALARM_MINUTE)
            .ok_or_else(|| {
                AppError::InvalidConfig(format!("alarm minute {} not in 0..=59", minute))
            })?;

        Ok(Self { hour, minute })
    }

    pub fn hour(&self) -> u32 {
        self.hour
    }

    pub fn minute(&self) -> u32 {
        self.minute
    }

    pub fn as_naive_time(&self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.hour, self.minute, 0).unwrap_or(NaiveTime::MIN)
    }
}

impl Default for AlarmTime {
    fn default() -> Self {
        Self {
            hour: DEFAULT_ALARM_HOUR,
            minute: DEFAULT_ALARM_MINUTE,
        }
    }
}

impl std::fmt::Display for AlarmTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// Snapshot of every reminder setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReminderConfig {
    pub alarm: AlarmTime,
    pub window_days: u32,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            alarm: AlarmTime::default(),
            window_days: DEFAULT_REMINDER_WINDOW_DAYS,
        }
    }
}

/// Clamp any requested window into the accepted range
pub fn clamp_window_days(days: i64) -> u32 {
    let clamped = days.clamp(
        i64::from(MIN_REMINDER_WINDOW_DAYS),
        i64::from(MAX_REMINDER_WINDOW_DAYS),
    );
    u32::try_from(clamped).unwrap_or(DEFAULT_REMINDER_WINDOW_DAYS)
}

/// Persisted scalar settings addressed by string key
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Write several keys in one step; readers never see a partial update
    async fn set_many(&self, entries: Vec<(&'static str, Value)>) -> Result<()>;
}

/// Key-value settings kept in `settings.json`
pub struct SettingsFile {
    settings_path: PathBuf,
    write_lock: Mutex<()>,
}

impl SettingsFile {
    pub fn new(app_data_dir: PathBuf) -> Self {
        Self {
            settings_path: app_data_dir.join(SETTINGS_FILE_NAME),
            write_lock: Mutex::new(()),
        }
    }

    /// Load every stored key; a missing or unreadable file reads as empty
    pub async fn load(&self) -> Result<Map<String, Value>> {
        if !fs::try_exists(&self.settings_path).await? {
            tracing::info!("Settings file not found, using defaults");
            return Ok(Map::new());
        }

        let content = fs::read_to_string(&self.settings_path).await?;
        match serde_json::from_str::<Map<String, Value>>(&content) {
            Ok(settings) => Ok(settings),
            Err(e) => {
                tracing::warn!("Failed to parse settings, using defaults: {}", e);
                Ok(Map::new())
            }
        }
    }

    /// Replace the file in one rename so readers never see a partial write
    async fn save(&self, settings: &Map<String, Value>) -> Result<()> {
        let content = serde_json::to_string_pretty(settings)?;

        let tmp_path = self.settings_path.with_extension("json.tmp");
        fs::write(&tmp_path, content).await?;
        fs::rename(&tmp_path, &self.settings_path).await?;
        tracing::debug!("Settings saved to {:?}", self.settings_path);

        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for SettingsFile {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let settings = self.load().await?;
        Ok(settings.get(key).cloned())
    }

    async fn set_many(&self, entries: Vec<(&'static str, Value)>) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut settings = self.load().await?;
        for (key, value) in entries {
            settings.insert(key.to_string(), value);
        }
        self.save(&settings).await
    }
}

/// Typed accessor for the reminder settings
#[derive(Clone)]
pub struct ReminderSettingsService {
    store: Arc<dyn KeyValueStore>,
}

impl ReminderSettingsService {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    async fn get_i64(&self, key: &str) -> Result<Option<i64>> {
        let value = self.store.get(key).await?;
        Ok(value.as_ref().and_then(Value::as_i64))
    }

    /// Read the daily trigger time, falling back to 07:00
    pub async fn get_alarm_time(&self) -> Result<AlarmTime> {
        let hour = self.get_i64(KEY_ALARM_HOUR).await?;
        let minute = self.get_i64(KEY_ALARM_MINUTE).await?;

        match (hour, minute) {
            (Some(h), Some(m)) => Ok(AlarmTime::new(h, m).unwrap_or_else(|e| {
                tracing::warn!("Stored alarm time ignored: {}", e);
                AlarmTime::default()
            })),
            _ => Ok(AlarmTime::default()),
        }
    }

    /// Persist a new trigger time; invalid input keeps the previous value
    pub async fn set_alarm_time(&self, hour: i64, minute: i64) -> Result<AlarmTime> {
        let alarm = AlarmTime::new(hour, minute)?;

        self.store
            .set_many(vec![
                (KEY_ALARM_HOUR, Value::from(alarm.hour())),
                (KEY_ALARM_MINUTE, Value::from(alarm.minute())),
            ])
            .await?;

        tracing::info!("Alarm time set to {}", alarm);
        Ok(alarm)
    }

    /// Read the reminder window, falling back to 7 days
    pub async fn get_reminder_window_days(&self) -> Result<u32> {
        Ok(self
            .get_i64(KEY_REMINDER_DAYS)
            .await?
            .map(clamp_window_days)
            .unwrap_or(DEFAULT_REMINDER_WINDOW_DAYS))
    }

    /// Persist a new reminder window, silently clamped into 1..=365
    pub async fn set_reminder_window_days(&self, days: i64) -> Result<u32> {
        let safe = clamp_window_days(days);

        self.store
            .set_many(vec![(KEY_REMINDER_DAYS, Value::from(safe))])
            .await?;

        tracing::info!("Reminder window set to {} day(s)", safe);
        Ok(safe)
    }

    pub async fn load(&self) -> Result<ReminderConfig> {
        Ok(ReminderConfig {
            alarm: self.get_alarm_time().await?,
            window_days: self.get_reminder_window_days().await?,
        })
    }
}
