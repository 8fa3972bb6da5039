//! Application configuration constants
//!
//! Central location for defaults, validation boundaries, persisted
//! settings keys and notification identifiers.

// ===== Reminder Defaults =====

/// Default hour of the daily expiry check
pub const DEFAULT_ALARM_HOUR: u32 = 7;
/// Default minute of the daily expiry check
pub const DEFAULT_ALARM_MINUTE: u32 = 0;
/// Default number of days before expiry a SIM counts as expiring soon
pub const DEFAULT_REMINDER_WINDOW_DAYS: u32 = 7;

// ===== Reminder Settings Limits =====

/// Smallest accepted reminder window in days
pub const MIN_REMINDER_WINDOW_DAYS: u32 = 1;

/// Largest accepted reminder window in days (one year)
pub const MAX_REMINDER_WINDOW_DAYS: u32 = 365;

/// Last valid hour of day
pub const MAX_ALARM_HOUR: u32 = 23;

/// Last valid minute of hour
pub const MAX_ALARM_MINUTE: u32 = 59;

// ===== Settings Keys =====

pub const KEY_ALARM_HOUR: &str = "alarm_hour";
pub const KEY_ALARM_MINUTE: &str = "alarm_minute";
pub const KEY_REMINDER_DAYS: &str = "reminder_days";

/// File name of the persisted settings inside the data directory
pub const SETTINGS_FILE_NAME: &str = "settings.json";

/// File name of the SIM record database inside the data directory
pub const DATABASE_FILE_NAME: &str = "sim_cards.db";

/// Environment variable overriding the data directory
pub const DATA_DIR_ENV: &str = "SIMEXPIRY_DATA_DIR";

/// Data directory used when the environment does not name one
pub const DEFAULT_DATA_DIR: &str = "./simexpiry-data";

// ===== Dates =====

/// Canonical storage form of an expiry date
pub const CANONICAL_DATE_FORMAT: &str = "%Y-%m-%d";

// ===== Notifications =====

pub const EXPIRED_TITLE: &str = "Expired SIM Alert";
pub const EXPIRING_SOON_TITLE: &str = "SIM Expiry Warning";

/// Stable key of the aggregate "already expired" notification
pub const EXPIRED_CHANNEL_ID: &str = "sim-expired";

/// Stable key of the aggregate "expiring soon" notification
pub const EXPIRING_SOON_CHANNEL_ID: &str = "sim-expiring-soon";

/// Prefix of per-record notification keys
pub const RECORD_NOTIFICATION_PREFIX: &str = "sim-record-";
