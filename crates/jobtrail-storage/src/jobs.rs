//! Job rows: keyed reads and writes, reconciled ingestion, user mutations and
//! filtered queries.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use jobtrail_core::{
    reconcile, validate_score, CandidateJob, JobFilter, JobRecord, JobStatus, OrderField,
    UserFields, ValidationError,
};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection};
use tracing::{debug, warn};

use crate::feeds::{resolve_feed, resolve_source};
use crate::store::{decode_date, decode_ts, encode_date, encode_ts};
use crate::{JobStore, StoreError};

const SELECT_JOBS: &str = "SELECT j.url, j.title, j.description, j.posted_date, \
     COALESCE(s.name, '') AS source, COALESCE(f.name, '') AS feed, \
     j.score, j.score_rationale, j.status, j.resume_md, j.resume_pdf_path, \
     j.cover_letter_md, j.cover_letter_pdf_path, j.created_at, j.updated_at \
     FROM jobs j \
     LEFT JOIN sources s ON j.source_id = s.id \
     LEFT JOIN feeds f ON j.feed_id = f.id";

/// Whether an ingested candidate created a row or refreshed an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestOutcome {
    Created,
    Refreshed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestFailure {
    pub url: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub created: usize,
    pub refreshed: usize,
    pub failures: Vec<IngestFailure>,
}

impl IngestReport {
    pub fn processed(&self) -> usize {
        self.created + self.refreshed + self.failures.len()
    }

    pub fn merge(&mut self, other: IngestReport) {
        self.created += other.created;
        self.refreshed += other.refreshed;
        self.failures.extend(other.failures);
    }
}

/// Generated application documents. `None` leaves the stored value alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplicationDocuments {
    pub resume_markdown: Option<String>,
    pub resume_pdf_path: Option<String>,
    pub cover_letter_markdown: Option<String>,
    pub cover_letter_pdf_path: Option<String>,
}

fn order_column(field: OrderField) -> &'static str {
    match field {
        OrderField::CreatedAt => "j.created_at",
        OrderField::UpdatedAt => "j.updated_at",
        OrderField::PostedDate => "j.posted_date",
        OrderField::Score => "j.score",
        OrderField::Status => "j.status",
        OrderField::Title => "j.title",
        OrderField::Url => "j.url",
    }
}

fn record_from_row(row: &SqliteRow) -> Result<JobRecord, StoreError> {
    let posted_date: Option<String> = row.try_get("posted_date")?;
    let status: String = row.try_get("status")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(JobRecord {
        url: row.try_get("url")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        posted_date: posted_date
            .as_deref()
            .map(|d| decode_date("posted_date", d))
            .transpose()?,
        source: row.try_get("source")?,
        feed: row.try_get("feed")?,
        user: UserFields {
            score: row.try_get("score")?,
            score_rationale: row.try_get("score_rationale")?,
            status: status
                .parse()
                .map_err(|_| StoreError::corrupt("status", status.clone()))?,
            resume_markdown: row.try_get("resume_md")?,
            resume_pdf_path: row.try_get("resume_pdf_path")?,
            cover_letter_markdown: row.try_get("cover_letter_md")?,
            cover_letter_pdf_path: row.try_get("cover_letter_pdf_path")?,
        },
        created_at: decode_ts("created_at", &created_at)?,
        updated_at: decode_ts("updated_at", &updated_at)?,
    })
}

async fn fetch_record(
    conn: &mut SqliteConnection,
    url: &str,
) -> Result<Option<JobRecord>, StoreError> {
    let row = sqlx::query(&format!("{SELECT_JOBS} WHERE j.url = ?"))
        .bind(url)
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(record_from_row).transpose()
}

async fn write_record(conn: &mut SqliteConnection, record: &JobRecord) -> Result<(), StoreError> {
    let source_id = resolve_source(&mut *conn, &record.source).await?;
    let feed_id = resolve_feed(&mut *conn, &record.feed, None, source_id).await?;
    let user = &record.user;

    sqlx::query(
        "INSERT INTO jobs (url, title, description, posted_date, source_id, feed_id, \
             score, score_rationale, status, resume_md, resume_pdf_path, \
             cover_letter_md, cover_letter_pdf_path, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT(url) DO UPDATE SET \
             title = excluded.title, description = excluded.description, \
             posted_date = excluded.posted_date, source_id = excluded.source_id, \
             feed_id = excluded.feed_id, score = excluded.score, \
             score_rationale = excluded.score_rationale, status = excluded.status, \
             resume_md = excluded.resume_md, resume_pdf_path = excluded.resume_pdf_path, \
             cover_letter_md = excluded.cover_letter_md, \
             cover_letter_pdf_path = excluded.cover_letter_pdf_path, \
             created_at = excluded.created_at, updated_at = excluded.updated_at",
    )
    .bind(&record.url)
    .bind(&record.title)
    .bind(&record.description)
    .bind(record.posted_date.map(encode_date))
    .bind(source_id)
    .bind(feed_id)
    .bind(user.score)
    .bind(&user.score_rationale)
    .bind(user.status.as_str())
    .bind(&user.resume_markdown)
    .bind(&user.resume_pdf_path)
    .bind(&user.cover_letter_markdown)
    .bind(&user.cover_letter_pdf_path)
    .bind(encode_ts(record.created_at))
    .bind(encode_ts(record.updated_at))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

impl JobStore {
    pub async fn get(&self, url: &str) -> Result<Option<JobRecord>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        fetch_record(&mut conn, url).await
    }

    /// Creates or fully replaces the row for `record.url` in one transaction.
    /// Invalid records are rejected before anything is written.
    pub async fn put(&self, record: &JobRecord) -> Result<(), StoreError> {
        record.validate()?;
        let mut tx = self.begin_write().await?;
        write_record(&mut tx, record).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Returns whether a row was removed.
    pub async fn delete(&self, url: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM jobs WHERE url = ?")
            .bind(url)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Merges one candidate into the store as of `now`.
    pub async fn ingest(
        &self,
        candidate: &CandidateJob,
        now: DateTime<Utc>,
    ) -> Result<IngestOutcome, StoreError> {
        candidate.validate()?;
        let mut tx = self.begin_write().await?;
        let existing = fetch_record(&mut tx, &candidate.url).await?;
        let record = reconcile(existing.as_ref(), candidate, now);
        record.validate()?;
        write_record(&mut tx, &record).await?;
        tx.commit().await?;

        Ok(match existing {
            Some(_) => IngestOutcome::Refreshed,
            None => IngestOutcome::Created,
        })
    }

    /// Ingests candidates in order. A failing candidate is recorded in the
    /// report and does not stop the rest; earlier writes stay committed.
    pub async fn ingest_batch(
        &self,
        candidates: &[CandidateJob],
        now: DateTime<Utc>,
    ) -> Result<IngestReport, StoreError> {
        let mut report = IngestReport::default();
        for candidate in candidates {
            match self.ingest(candidate, now).await {
                Ok(IngestOutcome::Created) => report.created += 1,
                Ok(IngestOutcome::Refreshed) => report.refreshed += 1,
                Err(err) => {
                    warn!(url = %candidate.url, error = %err, "skipping candidate");
                    report.failures.push(IngestFailure {
                        url: candidate.url.clone(),
                        error: err.to_string(),
                    });
                }
            }
        }
        debug!(
            created = report.created,
            refreshed = report.refreshed,
            failed = report.failures.len(),
            "batch ingested"
        );
        Ok(report)
    }

    pub async fn query(&self, filter: &JobFilter) -> Result<Vec<JobRecord>, StoreError> {
        let mut qb = QueryBuilder::<Sqlite>::new(SELECT_JOBS);
        let mut joiner = " WHERE ";
        if let Some(status) = filter.status {
            qb.push(joiner).push("j.status = ").push_bind(status.as_str());
            joiner = " AND ";
        }
        if let Some(min_score) = filter.min_score {
            qb.push(joiner).push("j.score >= ").push_bind(min_score);
            joiner = " AND ";
        }
        if let Some(source) = &filter.source {
            qb.push(joiner).push("s.name = ").push_bind(source.clone());
        }
        qb.push(" ORDER BY ")
            .push(order_column(filter.order_by.field))
            .push(" ")
            .push(filter.order_by.direction.as_sql())
            .push(", j.id ASC");
        if let Some(limit) = filter.limit {
            qb.push(" LIMIT ").push_bind(i64::from(limit));
        }

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(record_from_row).collect()
    }

    pub async fn count(&self) -> Result<i64, StoreError> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM jobs")
            .fetch_one(&self.pool)
            .await?)
    }

    pub async fn status_counts(&self) -> Result<BTreeMap<JobStatus, i64>, StoreError> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM jobs GROUP BY status")
            .fetch_all(&self.pool)
            .await?;
        let mut counts: BTreeMap<JobStatus, i64> =
            JobStatus::ALL.iter().map(|s| (*s, 0)).collect();
        for row in rows {
            let status: String = row.try_get("status")?;
            let status = status
                .parse()
                .map_err(|_| StoreError::corrupt("status", status.clone()))?;
            counts.insert(status, row.try_get("n")?);
        }
        Ok(counts)
    }

    /// Reads, edits and writes back one record in a single transaction,
    /// moving `updated_at` to now.
    async fn modify<F>(&self, url: &str, edit: F) -> Result<JobRecord, StoreError>
    where
        F: FnOnce(&mut JobRecord) -> Result<(), ValidationError>,
    {
        let mut tx = self.begin_write().await?;
        let mut record = fetch_record(&mut tx, url)
            .await?
            .ok_or_else(|| StoreError::NotFound(url.to_string()))?;
        edit(&mut record)?;
        record.updated_at = Utc::now();
        record.validate()?;
        write_record(&mut tx, &record).await?;
        tx.commit().await?;
        Ok(record)
    }

    pub async fn set_status(&self, url: &str, status: JobStatus) -> Result<JobRecord, StoreError> {
        self.modify(url, |record| {
            record.user.status = status;
            Ok(())
        })
        .await
    }

    pub async fn set_score(
        &self,
        url: &str,
        score: f64,
        rationale: Option<String>,
    ) -> Result<JobRecord, StoreError> {
        // Checked up front so a missing url and a bad score report the score.
        let score = validate_score(score)?;
        self.modify(url, |record| {
            record.user.score = Some(score);
            if rationale.is_some() {
                record.user.score_rationale = rationale;
            }
            Ok(())
        })
        .await
    }

    /// Appends `text` as a new paragraph unless the description already
    /// contains it.
    pub async fn append_description(&self, url: &str, text: &str) -> Result<JobRecord, StoreError> {
        let text = text.trim();
        self.modify(url, |record| {
            if text.is_empty() || record.description.contains(text) {
                return Ok(());
            }
            if record.description.is_empty() {
                record.description = text.to_string();
            } else {
                record.description = format!("{}\n\n{}", record.description.trim_end(), text);
            }
            Ok(())
        })
        .await
    }

    pub async fn retitle(&self, url: &str, title: &str) -> Result<JobRecord, StoreError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(ValidationError::new("title", title, "must not be empty").into());
        }
        self.modify(url, |record| {
            record.title = title.to_string();
            Ok(())
        })
        .await
    }

    pub async fn attach_documents(
        &self,
        url: &str,
        documents: ApplicationDocuments,
    ) -> Result<JobRecord, StoreError> {
        self.modify(url, |record| {
            let user = &mut record.user;
            if documents.resume_markdown.is_some() {
                user.resume_markdown = documents.resume_markdown;
            }
            if documents.resume_pdf_path.is_some() {
                user.resume_pdf_path = documents.resume_pdf_path;
            }
            if documents.cover_letter_markdown.is_some() {
                user.cover_letter_markdown = documents.cover_letter_markdown;
            }
            if documents.cover_letter_pdf_path.is_some() {
                user.cover_letter_pdf_path = documents.cover_letter_pdf_path;
            }
            Ok(())
        })
        .await
    }
}
