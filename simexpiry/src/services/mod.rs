//! Services module
//!
//! Business logic services that sit between the host and the record store.

pub mod evaluator;
pub mod notifications;
pub mod records;
pub mod reminders;
pub mod scheduler;
pub mod settings;

pub use evaluator::{classify, normalize_date, Classification, ClassifiedRecord, ExpiryStatus};
pub use notifications::{
    LogNotificationSurface, NotificationDispatcher, NotificationEvent, NotificationKey,
    NotificationSurface,
};
pub use records::SimCardsService;
pub use reminders::RemindersService;
pub use scheduler::{
    Clock, CronWakeTimer, PendingWakeUp, ReminderScheduler, SystemClock, TimerPrecision,
    WakeSignal, WakeTimer,
};
pub use settings::{AlarmTime, KeyValueStore, ReminderConfig, ReminderSettingsService, SettingsFile};

use serde::Serialize;

/// Host-granted capability state, polled before use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Granted,
    Denied,
    NotYetAsked,
}

impl Capability {
    pub fn is_granted(self) -> bool {
        self == Capability::Granted
    }
}
