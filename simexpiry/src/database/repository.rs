//! Repository layer for database operations
//!
//! sqlx-backed implementation of [`RecordStore`].

use super::models::*;
use super::RecordStore;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use sqlx::SqlitePool;

/// Repository for SIM card records
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    #[cfg(test)]
    pub async fn clear_all(&self) -> Result<()> {
        sqlx::query("DELETE FROM sim_cards")
            .execute(&self.pool)
            .await?;

        tracing::debug!("Cleared all SIM records");
        Ok(())
    }
}

/// Translate a unique-index violation on the SIM number into a domain error
fn map_write_error(err: sqlx::Error, sim_card_number: &str) -> AppError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return AppError::DuplicateSimNumber(sim_card_number.to_string());
        }
    }
    AppError::Database(err)
}

#[async_trait]
impl RecordStore for Repository {
    async fn insert(&self, record: NewSimRecord) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO sim_cards (name, sim_card_number, expired_date)
            VALUES (?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(&record.name)
        .bind(&record.sim_card_number)
        .bind(&record.expired_date)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_write_error(e, &record.sim_card_number))?;

        tracing::debug!("Created SIM record: {}", id);
        Ok(id)
    }

    async fn update(&self, record: &SimRecord) -> Result<()> {
        let rows = sqlx::query(
            r#"
            UPDATE sim_cards
            SET name = ?, sim_card_number = ?, expired_date = ?
            WHERE id = ?
            "#,
        )
        .bind(&record.name)
        .bind(&record.sim_card_number)
        .bind(&record.expired_date)
        .bind(record.id)
        .execute(&self.pool)
        .await
        .map_err(|e| map_write_error(e, &record.sim_card_number))?
        .rows_affected();

        if rows == 0 {
            return Err(AppError::RecordNotFound(record.id));
        }

        tracing::debug!("Updated SIM record: {}", record.id);
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<()> {
        let rows = sqlx::query("DELETE FROM sim_cards WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if rows == 0 {
            return Err(AppError::RecordNotFound(id));
        }

        tracing::debug!("Deleted SIM record: {}", id);
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<SimRecord>> {
        let records = sqlx::query_as::<_, SimRecord>(
            r#"
            SELECT id, name, sim_card_number, expired_date
            FROM sim_cards
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<SimRecord>> {
        let record = sqlx::query_as::<_, SimRecord>(
            r#"
            SELECT id, name, sim_card_number, expired_date
            FROM sim_cards WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }
}
