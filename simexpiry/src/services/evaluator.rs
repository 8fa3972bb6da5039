//! Expiry evaluator
//!
//! Pure classification of SIM records against a reference date and a
//! reminder window. Nothing here reads the clock or touches storage.

use crate::config::CANONICAL_DATE_FORMAT;
use crate::database::SimRecord;
use crate::error::{AppError, Result};
use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;

/// Where a single record stands relative to today
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExpiryStatus {
    Expired { days_ago: i64 },
    ExpiringSoon { days_left: i64 },
    Ok { days_left: i64 },
}

impl ExpiryStatus {
    /// Classify a signed day distance; both window edges are inclusive
    pub fn from_days_until(days_until: i64, window_days: u32) -> Self {
        if days_until < 0 {
            ExpiryStatus::Expired {
                days_ago: -days_until,
            }
        } else if days_until <= i64::from(window_days) {
            ExpiryStatus::ExpiringSoon {
                days_left: days_until,
            }
        } else {
            ExpiryStatus::Ok {
                days_left: days_until,
            }
        }
    }
}

impl fmt::Display for ExpiryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpiryStatus::Expired { .. } => write!(f, "expired"),
            ExpiryStatus::ExpiringSoon { days_left: 0 } => write!(f, "expires today"),
            ExpiryStatus::ExpiringSoon { days_left } => {
                write!(f, "expiring in {} days", days_left)
            }
            ExpiryStatus::Ok { days_left } => write!(f, "valid for {} days", days_left),
        }
    }
}

/// A record paired with its distance to expiry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassifiedRecord {
    pub record: SimRecord,
    /// Whole days from today to the expiry date, negative once expired
    pub days_until: i64,
}

/// Result of one classification pass. Buckets keep input order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub expired: Vec<ClassifiedRecord>,
    pub expiring_soon: Vec<ClassifiedRecord>,
    pub ok: Vec<ClassifiedRecord>,
    /// Records whose date could not be read; in none of the buckets above
    pub unparseable: Vec<SimRecord>,
}

impl Classification {
    /// Number of records that warrant a reminder
    pub fn attention_count(&self) -> usize {
        self.expired.len() + self.expiring_soon.len()
    }

    pub fn needs_attention(&self) -> bool {
        self.attention_count() > 0
    }
}

/// Rewrite a loose `YYYY-M-D` date into canonical `YYYY-MM-DD`.
///
/// Input that is not a real calendar date comes back trimmed but otherwise
/// untouched, so normalizing twice equals normalizing once.
pub fn normalize_date(raw: &str) -> String {
    let trimmed = raw.trim();
    let parts: Vec<&str> = trimmed.split('-').collect();

    let &[year, month, day] = parts.as_slice() else {
        return trimmed.to_string();
    };

    let numeric = |s: &str, max_len: usize| {
        !s.is_empty() && s.len() <= max_len && s.bytes().all(|b| b.is_ascii_digit())
    };
    if !(numeric(year, 4) && numeric(month, 2) && numeric(day, 2)) {
        return trimmed.to_string();
    }

    let parsed = match (year.parse::<i32>(), month.parse::<u32>(), day.parse::<u32>()) {
        (Ok(y), Ok(m), Ok(d)) => NaiveDate::from_ymd_opt(y, m, d),
        _ => None,
    };

    match parsed {
        Some(date) => date.format(CANONICAL_DATE_FORMAT).to_string(),
        None => trimmed.to_string(),
    }
}

/// Parse a stored expiry date, accepting the loose unpadded form
pub fn parse_expiry_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(&normalize_date(raw), CANONICAL_DATE_FORMAT)
        .map_err(|_| AppError::DateParse(raw.to_string()))
}

/// Whole days from `today` to `expiry`
pub fn days_until(today: NaiveDate, expiry: NaiveDate) -> i64 {
    (expiry - today).num_days()
}

/// Status of one record, or `DateParse` when its date is unreadable
pub fn status_of(today: NaiveDate, record: &SimRecord, window_days: u32) -> Result<ExpiryStatus> {
    let expiry = parse_expiry_date(&record.expired_date)?;
    Ok(ExpiryStatus::from_days_until(
        days_until(today, expiry),
        window_days,
    ))
}

/// Sort records into expired / expiring-soon / ok buckets.
///
/// A record with an unreadable date is skipped with a warning; the rest of
/// the batch is still classified.
pub fn classify(today: NaiveDate, records: &[SimRecord], window_days: u32) -> Classification {
    let mut result = Classification::default();

    for record in records {
        let expiry = match parse_expiry_date(&record.expired_date) {
            Ok(date) => date,
            Err(e) => {
                tracing::warn!("Skipping SIM record {} ({}): {}", record.id, record.name, e);
                result.unparseable.push(record.clone());
                continue;
            }
        };

        let days = days_until(today, expiry);
        let entry = ClassifiedRecord {
            record: record.clone(),
            days_until: days,
        };

        match ExpiryStatus::from_days_until(days, window_days) {
            ExpiryStatus::Expired { .. } => result.expired.push(entry),
            ExpiryStatus::ExpiringSoon { .. } => result.expiring_soon.push(entry),
            ExpiryStatus::Ok { .. } => result.ok.push(entry),
        }
    }

    tracing::debug!(
        "Classified {} SIM record(s): {} expired, {} expiring soon, {} ok, {} unreadable",
        records.len(),
        result.expired.len(),
        result.expiring_soon.len(),
        result.ok.len(),
        result.unparseable.len()
    );

    result
}
