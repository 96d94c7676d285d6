//! Connection pool and schema.
//!
//! The database runs in WAL mode so the web server can read while a sync run
//! writes. Every job write is its own transaction, opened with
//! `BEGIN IMMEDIATE` so a read-then-write never has to upgrade its lock.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, Transaction};

/// How long a connection waits on another writer before reporting busy.
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

pub async fn connect(path: &Path) -> anyhow::Result<SqlitePool> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating database directory {}", parent.display()))?;
    }

    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT)
        .foreign_keys(true);

    SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .with_context(|| format!("opening database {}", path.display()))
}

const SCHEMA: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS sources (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE
    )"#,
    r#"CREATE TABLE IF NOT EXISTS feeds (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        url TEXT UNIQUE,
        source_id INTEGER REFERENCES sources(id),
        last_fetch TEXT
    )"#,
    r#"CREATE TABLE IF NOT EXISTS jobs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        url TEXT NOT NULL UNIQUE,
        title TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        posted_date TEXT,
        source_id INTEGER REFERENCES sources(id),
        feed_id INTEGER REFERENCES feeds(id),
        score REAL CHECK (score IS NULL OR (score >= 0 AND score <= 10)),
        score_rationale TEXT,
        status TEXT NOT NULL DEFAULT 'new'
            CHECK (status IN ('new', 'reviewed', 'applied', 'rejected', 'offer')),
        resume_md TEXT,
        resume_pdf_path TEXT,
        cover_letter_md TEXT,
        cover_letter_pdf_path TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status)",
    "CREATE INDEX IF NOT EXISTS idx_jobs_score ON jobs(score)",
    "CREATE INDEX IF NOT EXISTS idx_jobs_source ON jobs(source_id)",
    r#"CREATE TABLE IF NOT EXISTS profile_meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS job_history (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        company TEXT NOT NULL,
        title TEXT NOT NULL,
        start_date TEXT,
        end_date TEXT,
        location TEXT,
        description TEXT,
        sort_order INTEGER
    )"#,
    r#"CREATE TABLE IF NOT EXISTS education (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        institution TEXT NOT NULL,
        degree TEXT,
        field TEXT,
        start_date TEXT,
        end_date TEXT,
        description TEXT,
        sort_order INTEGER
    )"#,
    r#"CREATE TABLE IF NOT EXISTS certifications (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        issuer TEXT,
        date_earned TEXT,
        sort_order INTEGER
    )"#,
    r#"CREATE TABLE IF NOT EXISTS honors (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        issuer TEXT,
        description TEXT,
        sort_order INTEGER
    )"#,
    r#"CREATE TABLE IF NOT EXISTS skills (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        category TEXT NOT NULL,
        proficiency TEXT,
        sort_order INTEGER
    )"#,
];

/// Starts a transaction that takes the write lock up front. Deferred
/// transactions that read first fail with `SQLITE_BUSY` instead of waiting
/// when another connection committed in between.
pub async fn begin_write(
    pool: &SqlitePool,
) -> Result<Transaction<'static, Sqlite>, sqlx::Error> {
    pool.begin_with("BEGIN IMMEDIATE").await
}

/// Creates missing tables and indexes. Safe to run on every start.
pub async fn migrate(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let mut tx = begin_write(pool).await?;
    for statement in SCHEMA {
        sqlx::query(statement).execute(&mut *tx).await?;
    }
    tx.commit().await
}
