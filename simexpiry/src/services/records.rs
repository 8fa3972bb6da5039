//! SIM records service
//!
//! Validated entry path for SIM records. Every stored expiry date is
//! normalized to `YYYY-MM-DD` and known to parse.

use super::evaluator::{normalize_date, parse_expiry_date};
use crate::database::{NewSimRecord, RecordStore, SimRecord};
use crate::error::{AppError, Result};
use std::sync::Arc;

/// Service for managing SIM records
#[derive(Clone)]
pub struct SimCardsService {
    store: Arc<dyn RecordStore>,
}

fn required(field: &str, value: String) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation(format!("{} must not be empty", field)));
    }
    Ok(trimmed.to_string())
}

fn validated(name: String, sim_card_number: String, expired_date: String) -> Result<NewSimRecord> {
    let name = required("name", name)?;
    let sim_card_number = required("SIM card number", sim_card_number)?;
    let expired_date = normalize_date(&required("expiry date", expired_date)?);
    parse_expiry_date(&expired_date)?;

    Ok(NewSimRecord {
        name,
        sim_card_number,
        expired_date,
    })
}

impl SimCardsService {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Create a new SIM record
    pub async fn create(
        &self,
        name: String,
        sim_card_number: String,
        expired_date: String,
    ) -> Result<SimRecord> {
        let new = validated(name, sim_card_number, expired_date)?;
        tracing::info!("Creating SIM record: {}", new.name);

        let id = self.store.insert(new.clone()).await?;

        tracing::info!("SIM record created successfully: {}", id);
        Ok(SimRecord::from_new(id, new))
    }

    /// Replace all fields of an existing record
    pub async fn update(
        &self,
        id: i64,
        name: String,
        sim_card_number: String,
        expired_date: String,
    ) -> Result<SimRecord> {
        tracing::debug!("Updating SIM record: {}", id);

        let record = SimRecord::from_new(id, validated(name, sim_card_number, expired_date)?);
        self.store.update(&record).await?;

        tracing::debug!("SIM record updated successfully: {}", id);
        Ok(record)
    }

    /// Delete a record permanently
    pub async fn delete(&self, id: i64) -> Result<()> {
        tracing::info!("Deleting SIM record: {}", id);

        self.store.delete(id).await?;

        tracing::info!("SIM record deleted successfully: {}", id);
        Ok(())
    }

    pub async fn get(&self, id: i64) -> Result<SimRecord> {
        self.store
            .get_by_id(id)
            .await?
            .ok_or(AppError::RecordNotFound(id))
    }

    /// All records ordered by id
    pub async fn list(&self) -> Result<Vec<SimRecord>> {
        self.store.list_all().await
    }
}
