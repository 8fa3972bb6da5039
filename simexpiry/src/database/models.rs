//! Database models
//!
//! Rust structs representing stored SIM card records.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A tracked SIM card
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct SimRecord {
    /// Assigned by the store on insert, never changed afterwards
    pub id: i64,
    /// Provider or alias
    pub name: String,
    pub sim_card_number: String,
    /// Canonical form is `YYYY-MM-DD`
    pub expired_date: String,
}

/// Create SIM record request
#[derive(Debug, Clone, Deserialize)]
pub struct NewSimRecord {
    pub name: String,
    pub sim_card_number: String,
    pub expired_date: String,
}

impl SimRecord {
    /// Attach a store-assigned id to a new record
    pub fn from_new(id: i64, new: NewSimRecord) -> Self {
        Self {
            id,
            name: new.name,
            sim_card_number: new.sim_card_number,
            expired_date: new.expired_date,
        }
    }
}
