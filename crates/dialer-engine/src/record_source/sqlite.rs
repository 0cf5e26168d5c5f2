//! SQLite-backed record source over the `crm_records` table

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use super::{RecordSource, SourceRecord};
use crate::error::{DialerError, Result};
use crate::filter::{sql, ResolvedFilter};
use crate::types::TargetObject;

/// Records stored as JSON documents, filtered by compiled SQL
#[derive(Clone)]
pub struct SqliteRecordSource {
    pool: SqlitePool,
}

impl SqliteRecordSource {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or replace a record document
    pub async fn upsert_record(&self, record: &SourceRecord) -> Result<()> {
        let now = Utc::now();
        let data = serde_json::to_string(&record.fields)?;

        sqlx::query(
            "INSERT INTO crm_records (id, object_type, data, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                object_type = excluded.object_type,
                data = excluded.data,
                updated_at = excluded.updated_at",
        )
        .bind(&record.id)
        .bind(record.object.as_str())
        .bind(data)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        debug!("Record {} upserted ({})", record.id, record.object);
        Ok(())
    }

    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<SourceRecord> {
        let object: String = row.try_get("object_type")?;
        let data: String = row.try_get("data")?;
        let value: Value = serde_json::from_str(&data)?;
        Ok(SourceRecord::new(
            row.try_get::<String, _>("id")?,
            TargetObject::parse(&object)?,
            value,
        ))
    }
}

#[async_trait]
impl RecordSource for SqliteRecordSource {
    async fn query_records(&self, object: TargetObject, filter: &ResolvedFilter) -> Result<Vec<SourceRecord>> {
        let compiled = sql::compile(filter, "data");
        let statement = format!(
            "SELECT id, object_type, data FROM crm_records
             WHERE object_type = ? AND {}
             ORDER BY created_at ASC, id ASC",
            compiled.sql
        );

        let query = sqlx::query(&statement).bind(object.as_str());
        let rows = compiled
            .bind_all(query)
            .fetch_all(&self.pool)
            .await?;

        let records = rows.iter().map(Self::from_row).collect::<Result<Vec<_>>>()?;
        debug!("Filter matched {} {} records", records.len(), object);
        Ok(records)
    }

    async fn get_record(&self, object: TargetObject, id: &str) -> Result<Option<SourceRecord>> {
        let row = sqlx::query("SELECT id, object_type, data FROM crm_records WHERE id = ? AND object_type = ?")
            .bind(id)
            .bind(object.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::from_row).transpose()
    }

    async fn update_field(&self, object: TargetObject, id: &str, field: &str, value: Value) -> Result<()> {
        let result = sqlx::query(
            "UPDATE crm_records SET data = json_set(data, ?, json(?)), updated_at = ?
             WHERE id = ? AND object_type = ?",
        )
        .bind(format!("$.{}", field))
        .bind(serde_json::to_string(&value)?)
        .bind(Utc::now())
        .bind(id)
        .bind(object.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| DialerError::external(format!("record update failed: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(DialerError::not_found(format!("{} record {}", object, id)));
        }

        debug!("Record {} field {} updated", id, field);
        Ok(())
    }
}
