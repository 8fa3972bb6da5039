//! Database module
//!
//! This module provides all persistence for SIM records:
//! - Schema and migrations
//! - Model definitions
//! - The [`RecordStore`] seam and its SQLite repository

pub mod models;
pub mod repository;
pub mod schema;

pub use models::*;
pub use repository::Repository;
pub use schema::initialize_database;

use crate::error::Result;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Durable store of SIM records.
///
/// Uniqueness of `sim_card_number` is enforced here, not by callers.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert a record and return its assigned id
    async fn insert(&self, record: NewSimRecord) -> Result<i64>;

    /// Replace every field of an existing record
    async fn update(&self, record: &SimRecord) -> Result<()>;

    /// Permanently remove a record
    async fn delete(&self, id: i64) -> Result<()>;

    /// Snapshot of every record, ordered by id ascending
    async fn list_all(&self) -> Result<Vec<SimRecord>>;

    async fn get_by_id(&self, id: i64) -> Result<Option<SimRecord>>;
}

fn connect_options(db_path: &Path) -> std::result::Result<SqliteConnectOptions, sqlx::Error> {
    SqliteConnectOptions::from_str(&format!("sqlite://{}?mode=rwc", db_path.display())).map(
        |opts| {
            opts.create_if_missing(true)
                .busy_timeout(Duration::from_secs(5))
                .journal_mode(SqliteJournalMode::Wal)
        },
    )
}

/// Create and initialize a database connection pool.
///
/// Migrations run on a dedicated single-connection pool that is closed
/// before the application pool is opened, so every pooled connection sees
/// the final schema.
pub async fn create_pool(db_path: &Path) -> Result<SqlitePool> {
    tracing::info!("Creating database connection pool at: {:?}", db_path);

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let migration_pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(connect_options(db_path)?)
        .await?;

    initialize_database(&migration_pool).await?;
    migration_pool.close().await;

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(connect_options(db_path)?)
        .await?;

    tracing::info!("Database pool created successfully");

    Ok(pool)
}
