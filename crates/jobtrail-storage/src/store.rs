use std::path::Path;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use sqlx::{Sqlite, SqlitePool, Transaction};

use crate::db;
use crate::StoreError;

/// Handle to the job database. Cloning shares the pool.
#[derive(Debug, Clone)]
pub struct JobStore {
    pub(crate) pool: SqlitePool,
}

impl JobStore {
    /// Opens (creating if needed) the database at `path` and brings the schema
    /// up to date.
    pub async fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let pool = db::connect(path.as_ref()).await?;
        db::migrate(&pool).await?;
        Ok(Self { pool })
    }

    /// Wraps an existing pool. The schema must already be migrated.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub(crate) async fn begin_write(&self) -> Result<Transaction<'static, Sqlite>, StoreError> {
        Ok(db::begin_write(&self.pool).await?)
    }
}

// Fixed-width UTC text so lexical order matches chronological order.
pub(crate) fn encode_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn decode_ts(column: &'static str, text: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(text)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|_| StoreError::corrupt(column, text))
}

pub(crate) fn encode_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub(crate) fn decode_date(column: &'static str, text: &str) -> Result<NaiveDate, StoreError> {
    NaiveDate::parse_from_str(text, "%Y-%m-%d").map_err(|_| StoreError::corrupt(column, text))
}

pub(crate) fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}
