//! Job records and the reconciliation rule.
//!
//! A [`JobRecord`] is keyed by its posting URL. Fields fall in two groups:
//! descriptive fields that every ingestion overwrites, and [`UserFields`] that
//! only explicit user or analyzer actions change. [`reconcile`] is the single
//! place that decides how a fetched [`CandidateJob`] merges into stored state.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::ValidationError;

pub const SCORE_MIN: f64 = 0.0;
pub const SCORE_MAX: f64 = 10.0;

string_enum! {
    /// Review lifecycle of a posting.
    pub enum JobStatus for "status" {
        New => "new",
        Reviewed => "reviewed",
        Applied => "applied",
        Rejected => "rejected",
        Offer => "offer",
    }
}

impl Default for JobStatus {
    fn default() -> Self {
        JobStatus::New
    }
}

/// Checks that a score lies in `[SCORE_MIN, SCORE_MAX]`.
pub fn validate_score(score: f64) -> Result<f64, ValidationError> {
    if score.is_nan() {
        return Err(ValidationError::new("score", score, "must be a number"));
    }
    if !(SCORE_MIN..=SCORE_MAX).contains(&score) {
        return Err(ValidationError::new(
            "score",
            score,
            format!("must be between {SCORE_MIN} and {SCORE_MAX}"),
        ));
    }
    Ok(score)
}

fn validate_url(url: &str) -> Result<(), ValidationError> {
    if url.trim().is_empty() {
        return Err(ValidationError::new("url", url, "must not be empty"));
    }
    Ok(())
}

/// A freshly fetched posting, not yet merged into storage.
///
/// Candidates never carry user-owned fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateJob {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub posted_date: Option<NaiveDate>,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub feed: String,
}

impl CandidateJob {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            description: String::new(),
            posted_date: None,
            source: String::new(),
            feed: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_posted_date(mut self, posted_date: Option<NaiveDate>) -> Self {
        self.posted_date = posted_date;
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_feed(mut self, feed: impl Into<String>) -> Self {
        self.feed = feed.into();
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_url(&self.url)
    }
}

/// Fields owned by the user or the analyzer. Ingestion carries them over
/// untouched.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UserFields {
    pub score: Option<f64>,
    pub score_rationale: Option<String>,
    pub status: JobStatus,
    pub resume_markdown: Option<String>,
    pub resume_pdf_path: Option<String>,
    pub cover_letter_markdown: Option<String>,
    pub cover_letter_pdf_path: Option<String>,
}

impl UserFields {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(score) = self.score {
            validate_score(score)?;
        }
        Ok(())
    }
}

/// One stored posting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub url: String,
    pub title: String,
    pub description: String,
    pub posted_date: Option<NaiveDate>,
    pub source: String,
    pub feed: String,
    #[serde(flatten)]
    pub user: UserFields,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_url(&self.url)?;
        self.user.validate()
    }

    pub fn status(&self) -> JobStatus {
        self.user.status
    }

    pub fn score(&self) -> Option<f64> {
        self.user.score
    }
}

/// Merges `incoming` into `existing` (if any) as of `now`.
///
/// With no existing record the result is a fresh record with default user
/// fields and `created_at == updated_at == now`. Otherwise the result equals
/// `existing` with the descriptive fields taken from `incoming` and
/// `updated_at` moved to `now`.
pub fn reconcile(
    existing: Option<&JobRecord>,
    incoming: &CandidateJob,
    now: DateTime<Utc>,
) -> JobRecord {
    match existing {
        None => JobRecord {
            url: incoming.url.clone(),
            title: incoming.title.clone(),
            description: incoming.description.clone(),
            posted_date: incoming.posted_date,
            source: incoming.source.clone(),
            feed: incoming.feed.clone(),
            user: UserFields::default(),
            created_at: now,
            updated_at: now,
        },
        Some(existing) => {
            debug_assert_eq!(existing.url, incoming.url, "reconcile across different urls");
            JobRecord {
                url: existing.url.clone(),
                title: incoming.title.clone(),
                description: incoming.description.clone(),
                posted_date: incoming.posted_date,
                source: incoming.source.clone(),
                feed: incoming.feed.clone(),
                user: existing.user.clone(),
                created_at: existing.created_at,
                updated_at: now,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, hour, 0, 0).single().unwrap()
    }

    fn writer(title: &str) -> CandidateJob {
        CandidateJob::new(title, "https://x/1")
            .with_description("Write docs")
            .with_source("RSS")
            .with_feed("Tech Writers")
    }

    #[test]
    fn first_ingestion_creates_new_record() {
        let record = reconcile(None, &writer("Writer A"), at(9));
        assert_eq!(record.url, "https://x/1");
        assert_eq!(record.title, "Writer A");
        assert_eq!(record.status(), JobStatus::New);
        assert_eq!(record.score(), None);
        assert_eq!(record.user, UserFields::default());
        assert_eq!(record.created_at, at(9));
        assert_eq!(record.updated_at, at(9));
    }

    #[test]
    fn refetch_replaces_descriptive_fields_and_keeps_user_fields() {
        let mut existing = reconcile(None, &writer("Writer A"), at(9));
        existing.user.status = JobStatus::Applied;
        existing.user.score = Some(9.0);
        existing.user.score_rationale = Some("strong match".into());
        existing.user.resume_markdown = Some("# Resume".into());

        let incoming = writer("Writer A v2").with_description("Write better docs");
        let merged = reconcile(Some(&existing), &incoming, at(10));

        assert_eq!(merged.title, "Writer A v2");
        assert_eq!(merged.description, "Write better docs");
        assert_eq!(merged.user, existing.user);
        assert_eq!(merged.created_at, at(9));
        assert_eq!(merged.updated_at, at(10));
    }

    #[test]
    fn reconciling_twice_is_idempotent_apart_from_updated_at() {
        let candidate = writer("Writer A");
        let first = reconcile(None, &candidate, at(9));
        let second = reconcile(Some(&first), &candidate, at(11));

        assert_eq!(second.title, candidate.title);
        assert_eq!(second.description, candidate.description);
        assert_eq!(second.source, candidate.source);
        assert_eq!(second.feed, candidate.feed);
        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at > first.updated_at);
    }

    #[test]
    fn reconcile_is_deterministic() {
        let existing = reconcile(None, &writer("Writer A"), at(9));
        let incoming = writer("Writer B");
        assert_eq!(
            reconcile(Some(&existing), &incoming, at(12)),
            reconcile(Some(&existing), &incoming, at(12))
        );
    }

    #[test]
    fn later_duplicate_in_a_batch_wins() {
        let batch = [writer("first"), writer("second")];
        let mut state: Option<JobRecord> = None;
        for (i, candidate) in batch.iter().enumerate() {
            state = Some(reconcile(state.as_ref(), candidate, at(9 + i as u32)));
        }
        let state = state.unwrap();
        assert_eq!(state.title, "second");
        assert_eq!(state.created_at, at(9));
    }

    #[test]
    fn status_rejects_unknown_values() {
        let err = "bogus".parse::<JobStatus>().unwrap_err();
        assert_eq!(err.field, "status");
        assert_eq!(err.value, "bogus");
        assert_eq!("Applied".parse::<JobStatus>().unwrap(), JobStatus::Applied);
    }

    #[test]
    fn score_bounds_are_inclusive() {
        assert!(validate_score(0.0).is_ok());
        assert!(validate_score(10.0).is_ok());
        assert_eq!(validate_score(10.5).unwrap_err().field, "score");
        assert_eq!(validate_score(-1.0).unwrap_err().field, "score");
        assert!(validate_score(f64::NAN).is_err());
    }

    #[test]
    fn record_validation_covers_url_and_score() {
        let mut record = reconcile(None, &writer("Writer A"), at(9));
        assert!(record.validate().is_ok());
        record.user.score = Some(11.0);
        assert_eq!(record.validate().unwrap_err().field, "score");
        record.user.score = None;
        record.url = "  ".into();
        assert_eq!(record.validate().unwrap_err().field, "url");
    }

    #[test]
    fn record_serializes_user_fields_inline() {
        let record = reconcile(None, &writer("Writer A"), at(9));
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["status"], "new");
        assert!(value.get("user").is_none());
    }
}
