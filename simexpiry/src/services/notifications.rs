//! Notification dispatcher
//!
//! Turns a classification into keyed notification events and keeps the
//! set of shown notifications in sync with it: one active notification per
//! key, replaced on re-dispatch, cancelled once its reason is gone.

use super::evaluator::{normalize_date, Classification, ClassifiedRecord};
use super::Capability;
use crate::config::*;
use crate::error::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;

/// Stable identity of a shown notification
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum NotificationKey {
    /// About one specific SIM record
    Record(i64),
    /// Count of already expired records
    ExpiredSummary,
    /// Count of records expiring within the window
    ExpiringSoonSummary,
}

impl NotificationKey {
    pub fn id(&self) -> String {
        match self {
            NotificationKey::Record(id) => format!("{}{}", RECORD_NOTIFICATION_PREFIX, id),
            NotificationKey::ExpiredSummary => EXPIRED_CHANNEL_ID.to_string(),
            NotificationKey::ExpiringSoonSummary => EXPIRING_SOON_CHANNEL_ID.to_string(),
        }
    }
}

impl fmt::Display for NotificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationEvent {
    pub key: NotificationKey,
    pub title: String,
    pub body: String,
    /// Expanded view, one line per SIM; empty for single-record events
    pub details: Vec<String>,
}

/// Host surface that displays local notifications
#[async_trait]
pub trait NotificationSurface: Send + Sync {
    /// Whether posting is currently allowed
    fn permission(&self) -> Capability;

    /// Show an event, replacing any notification with the same key
    async fn show(&self, event: &NotificationEvent) -> Result<()>;

    /// Withdraw a notification by key; absent keys are not an error
    async fn cancel(&self, key: &NotificationKey) -> Result<()>;
}

/// Surface that logs notifications and remembers which are showing
pub struct LogNotificationSurface {
    permission: StdMutex<Capability>,
    active: StdMutex<BTreeMap<NotificationKey, NotificationEvent>>,
}

impl LogNotificationSurface {
    pub fn new() -> Self {
        Self::with_permission(Capability::Granted)
    }

    pub fn with_permission(permission: Capability) -> Self {
        Self {
            permission: StdMutex::new(permission),
            active: StdMutex::new(BTreeMap::new()),
        }
    }

    pub fn set_permission(&self, permission: Capability) {
        if let Ok(mut current) = self.permission.lock() {
            *current = permission;
        }
    }

    /// Currently showing notifications, ordered by key
    pub fn active(&self) -> Vec<NotificationEvent> {
        self.active
            .lock()
            .map(|active| active.values().cloned().collect())
            .unwrap_or_default()
    }
}

impl Default for LogNotificationSurface {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationSurface for LogNotificationSurface {
    fn permission(&self) -> Capability {
        self.permission
            .lock()
            .map(|p| *p)
            .unwrap_or(Capability::Denied)
    }

    async fn show(&self, event: &NotificationEvent) -> Result<()> {
        tracing::info!("Notification [{}] {}: {}", event.key, event.title, event.body);
        if let Ok(mut active) = self.active.lock() {
            active.insert(event.key.clone(), event.clone());
        }
        Ok(())
    }

    async fn cancel(&self, key: &NotificationKey) -> Result<()> {
        let removed = self
            .active
            .lock()
            .map(|mut active| active.remove(key).is_some())
            .unwrap_or(false);
        if removed {
            tracing::info!("Notification [{}] cancelled", key);
        }
        Ok(())
    }
}

fn record_label(entry: &ClassifiedRecord) -> String {
    format!(
        "SIM {} ({})",
        entry.record.name, entry.record.sim_card_number
    )
}

fn detail_line(entry: &ClassifiedRecord, verb: &str) -> String {
    format!(
        "{} ({}) {} {}",
        entry.record.name,
        entry.record.sim_card_number,
        verb,
        normalize_date(&entry.record.expired_date)
    )
}

fn expired_event(entry: &ClassifiedRecord) -> NotificationEvent {
    NotificationEvent {
        key: NotificationKey::Record(entry.record.id),
        title: EXPIRED_TITLE.to_string(),
        body: format!(
            "{} expired on {}.",
            record_label(entry),
            normalize_date(&entry.record.expired_date)
        ),
        details: Vec::new(),
    }
}

fn expiring_event(entry: &ClassifiedRecord) -> NotificationEvent {
    let date = normalize_date(&entry.record.expired_date);
    let body = if entry.days_until == 0 {
        format!("{} expires today ({}).", record_label(entry), date)
    } else {
        format!(
            "{} will expire in {} day(s) on {}.",
            record_label(entry),
            entry.days_until,
            date
        )
    };

    NotificationEvent {
        key: NotificationKey::Record(entry.record.id),
        title: EXPIRING_SOON_TITLE.to_string(),
        body,
        details: Vec::new(),
    }
}

/// Decide which notifications a classification calls for.
///
/// A single record gets a notification naming it; more than one gets one
/// summary per non-empty bucket.
pub fn plan_notifications(
    expired: &[ClassifiedRecord],
    expiring_soon: &[ClassifiedRecord],
    window_days: u32,
) -> Vec<NotificationEvent> {
    match (expired, expiring_soon) {
        ([], []) => Vec::new(),
        ([only], []) => vec![expired_event(only)],
        ([], [only]) => vec![expiring_event(only)],
        _ => {
            let mut events = Vec::new();
            if !expired.is_empty() {
                events.push(NotificationEvent {
                    key: NotificationKey::ExpiredSummary,
                    title: EXPIRED_TITLE.to_string(),
                    body: format!("{} SIM cards have already expired.", expired.len()),
                    details: expired.iter().map(|e| detail_line(e, "expired on")).collect(),
                });
            }
            if !expiring_soon.is_empty() {
                events.push(NotificationEvent {
                    key: NotificationKey::ExpiringSoonSummary,
                    title: EXPIRING_SOON_TITLE.to_string(),
                    body: format!(
                        "{} SIM cards are expiring within {} days.",
                        expiring_soon.len(),
                        window_days
                    ),
                    details: expiring_soon
                        .iter()
                        .map(|e| detail_line(e, "expires on"))
                        .collect(),
                });
            }
            events
        }
    }
}

/// What one dispatch changed on the surface
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub posted: Vec<NotificationEvent>,
    /// Keys the surface accepted a cancel for, shown or not
    pub cancelled: Vec<NotificationKey>,
    /// Posting was skipped because the surface lacks permission
    pub suppressed: bool,
}

/// Every key the classification could have produced a notification under
fn known_keys(classification: &Classification) -> BTreeSet<NotificationKey> {
    let buckets = [
        &classification.expired,
        &classification.expiring_soon,
        &classification.ok,
    ];
    buckets
        .into_iter()
        .flatten()
        .map(|entry| entry.record.id)
        .chain(classification.unparseable.iter().map(|record| record.id))
        .map(NotificationKey::Record)
        .chain([
            NotificationKey::ExpiredSummary,
            NotificationKey::ExpiringSoonSummary,
        ])
        .collect()
}

/// Keeps shown notifications in step with the latest classification.
///
/// Notifications outlive the process, so every key the classification no
/// longer calls for is cancelled on the surface, not only the ones this
/// dispatcher posted. Keys whose cancel failed stay tracked and are retried.
pub struct NotificationDispatcher {
    surface: Arc<dyn NotificationSurface>,
    active: Mutex<BTreeSet<NotificationKey>>,
}

impl NotificationDispatcher {
    pub fn new(surface: Arc<dyn NotificationSurface>) -> Self {
        Self {
            surface,
            active: Mutex::new(BTreeSet::new()),
        }
    }

    /// Keys posted, or still awaiting a successful cancel
    pub async fn active_keys(&self) -> Vec<NotificationKey> {
        self.active.lock().await.iter().cloned().collect()
    }

    /// Post what the classification calls for and cancel what it no longer does
    pub async fn dispatch(&self, classification: &Classification, window_days: u32) -> DispatchReport {
        let planned = plan_notifications(
            &classification.expired,
            &classification.expiring_soon,
            window_days,
        );
        let wanted: BTreeSet<NotificationKey> = planned.iter().map(|e| e.key.clone()).collect();

        let mut active = self.active.lock().await;
        let mut report = DispatchReport::default();

        let mut stale = known_keys(classification);
        stale.extend(active.iter().cloned());
        for key in stale.difference(&wanted) {
            match self.surface.cancel(key).await {
                Ok(()) => {
                    active.remove(key);
                    report.cancelled.push(key.clone());
                }
                Err(e) => {
                    tracing::error!("Failed to cancel notification {}: {}", key, e);
                    active.insert(key.clone());
                }
            }
        }

        if planned.is_empty() {
            tracing::info!("No SIM cards expiring or expired within {} days", window_days);
            return report;
        }

        let permission = self.surface.permission();
        if !permission.is_granted() {
            tracing::warn!(
                "Notification permission is {:?}, skipping {} reminder(s)",
                permission,
                planned.len()
            );
            report.suppressed = true;
            return report;
        }

        for event in planned {
            match self.surface.show(&event).await {
                Ok(()) => {
                    active.insert(event.key.clone());
                    report.posted.push(event);
                }
                Err(e) => tracing::error!("Failed to show notification {}: {}", event.key, e),
            }
        }

        tracing::info!(
            "Dispatched {} notification(s), cancel sent for {}",
            report.posted.len(),
            report.cancelled.len()
        );
        report
    }

    /// Cancel one notification regardless of classification
    pub async fn retract(&self, key: &NotificationKey) -> Result<()> {
        let mut active = self.active.lock().await;
        self.surface.cancel(key).await?;
        active.remove(key);
        Ok(())
    }
}
