//! Source and feed lookup tables, and per-feed fetch watermarks.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Row, SqliteConnection};

use crate::store::{decode_ts, encode_ts, non_empty};
use crate::{JobStore, StoreError};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedRow {
    pub id: i64,
    pub name: String,
    pub url: Option<String>,
    pub source: Option<String>,
    pub last_fetch: Option<DateTime<Utc>>,
}

pub(crate) async fn resolve_source(
    conn: &mut SqliteConnection,
    name: &str,
) -> Result<Option<i64>, sqlx::Error> {
    let Some(name) = non_empty(name) else {
        return Ok(None);
    };
    let existing: Option<i64> = sqlx::query_scalar("SELECT id FROM sources WHERE name = ?")
        .bind(name)
        .fetch_optional(&mut *conn)
        .await?;
    if let Some(id) = existing {
        return Ok(Some(id));
    }
    let id = sqlx::query_scalar("INSERT INTO sources (name) VALUES (?) RETURNING id")
        .bind(name)
        .fetch_one(&mut *conn)
        .await?;
    Ok(Some(id))
}

/// Finds a feed by url, then by name (filling in a missing url), creating it
/// when neither matches.
pub(crate) async fn resolve_feed(
    conn: &mut SqliteConnection,
    name: &str,
    url: Option<&str>,
    source_id: Option<i64>,
) -> Result<Option<i64>, sqlx::Error> {
    let url = url.and_then(non_empty);
    let name = match (non_empty(name), url) {
        (Some(name), _) => name,
        (None, Some(url)) => url,
        (None, None) => return Ok(None),
    };

    if let Some(url) = url {
        let by_url: Option<i64> = sqlx::query_scalar("SELECT id FROM feeds WHERE url = ?")
            .bind(url)
            .fetch_optional(&mut *conn)
            .await?;
        if by_url.is_some() {
            return Ok(by_url);
        }
    }

    let by_name = sqlx::query("SELECT id, url FROM feeds WHERE name = ?")
        .bind(name)
        .fetch_optional(&mut *conn)
        .await?;
    if let Some(row) = by_name {
        let id: i64 = row.try_get("id")?;
        let known_url: Option<String> = row.try_get("url")?;
        if let (None, Some(url)) = (known_url, url) {
            sqlx::query("UPDATE feeds SET url = ? WHERE id = ?")
                .bind(url)
                .bind(id)
                .execute(&mut *conn)
                .await?;
        }
        return Ok(Some(id));
    }

    let id = sqlx::query_scalar(
        "INSERT INTO feeds (name, url, source_id) VALUES (?, ?, ?) RETURNING id",
    )
    .bind(name)
    .bind(url)
    .bind(source_id)
    .fetch_one(&mut *conn)
    .await?;
    Ok(Some(id))
}

impl JobStore {
    pub async fn get_or_create_source(&self, name: &str) -> Result<Option<i64>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(resolve_source(&mut *conn, name).await?)
    }

    pub async fn get_or_create_feed(
        &self,
        name: &str,
        url: Option<&str>,
        source: Option<&str>,
    ) -> Result<Option<i64>, StoreError> {
        let mut tx = self.begin_write().await?;
        let source_id = match source {
            Some(source) => resolve_source(&mut *tx, source).await?,
            None => None,
        };
        let id = resolve_feed(&mut *tx, name, url, source_id).await?;
        tx.commit().await?;
        Ok(id)
    }

    pub async fn sources(&self) -> Result<Vec<String>, StoreError> {
        Ok(sqlx::query_scalar("SELECT name FROM sources ORDER BY name")
            .fetch_all(&self.pool)
            .await?)
    }

    pub async fn feeds(&self) -> Result<Vec<FeedRow>, StoreError> {
        let rows = sqlx::query(
            "SELECT f.id, f.name, f.url, s.name AS source, f.last_fetch \
             FROM feeds f LEFT JOIN sources s ON f.source_id = s.id \
             ORDER BY f.name",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<FeedRow, StoreError> {
                let last_fetch: Option<String> = row.try_get("last_fetch")?;
                Ok(FeedRow {
                    id: row.try_get("id")?,
                    name: row.try_get("name")?,
                    url: row.try_get("url")?,
                    source: row.try_get("source")?,
                    last_fetch: last_fetch
                        .map(|ts| decode_ts("last_fetch", &ts))
                        .transpose()?,
                })
            })
            .collect()
    }

    pub async fn last_fetch(&self, feed_url: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        let stored: Option<Option<String>> =
            sqlx::query_scalar("SELECT last_fetch FROM feeds WHERE url = ?")
                .bind(feed_url)
                .fetch_optional(&self.pool)
                .await?;
        stored
            .flatten()
            .map(|ts| decode_ts("last_fetch", &ts))
            .transpose()
    }

    /// Watermarks keyed by feed url, for feeds that have one.
    pub async fn all_last_fetches(&self) -> Result<BTreeMap<String, DateTime<Utc>>, StoreError> {
        let rows = sqlx::query(
            "SELECT url, last_fetch FROM feeds WHERE url IS NOT NULL AND last_fetch IS NOT NULL",
        )
        .fetch_all(&self.pool)
        .await?;
        let mut out = BTreeMap::new();
        for row in rows {
            let url: String = row.try_get("url")?;
            let ts: String = row.try_get("last_fetch")?;
            out.insert(url, decode_ts("last_fetch", &ts)?);
        }
        Ok(out)
    }

    /// Records the newest entry seen for a feed. Unknown feeds get a row named
    /// after their url.
    pub async fn set_last_fetch(&self, feed_url: &str, ts: DateTime<Utc>) -> Result<(), StoreError> {
        let mut tx = self.begin_write().await?;
        let id = resolve_feed(&mut *tx, "", Some(feed_url), None).await?;
        sqlx::query("UPDATE feeds SET last_fetch = ? WHERE id = ?")
            .bind(encode_ts(ts))
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::store::testing::temp_store;
    use chrono::TimeZone;

    use super::*;

    #[tokio::test]
    async fn sources_are_created_once() {
        let (_dir, store) = temp_store().await;
        let first = store.get_or_create_source("builtin.com").await.unwrap();
        let again = store.get_or_create_source("builtin.com").await.unwrap();
        assert!(first.is_some());
        assert_eq!(first, again);
        assert_eq!(store.get_or_create_source("  ").await.unwrap(), None);
        assert_eq!(store.sources().await.unwrap(), vec!["builtin.com".to_string()]);
    }

    #[tokio::test]
    async fn feed_lookup_backfills_url_by_name() {
        let (_dir, store) = temp_store().await;
        let by_name = store
            .get_or_create_feed("Tech Writers", None, Some("RSS"))
            .await
            .unwrap();
        let with_url = store
            .get_or_create_feed("Tech Writers", Some("https://feeds.example/tw"), None)
            .await
            .unwrap();
        assert_eq!(by_name, with_url);

        let feeds = store.feeds().await.unwrap();
        assert_eq!(feeds.len(), 1);
        assert_eq!(feeds[0].url.as_deref(), Some("https://feeds.example/tw"));
        assert_eq!(feeds[0].source.as_deref(), Some("RSS"));
    }

    #[tokio::test]
    async fn last_fetch_round_trips_and_creates_unknown_feeds() {
        let (_dir, store) = temp_store().await;
        let url = "https://feeds.example/new";
        assert_eq!(store.last_fetch(url).await.unwrap(), None);

        let ts = Utc.with_ymd_and_hms(2026, 3, 2, 8, 30, 0).unwrap();
        store.set_last_fetch(url, ts).await.unwrap();
        assert_eq!(store.last_fetch(url).await.unwrap(), Some(ts));

        let all = store.all_last_fetches().await.unwrap();
        assert_eq!(all.get(url), Some(&ts));
        assert_eq!(store.feeds().await.unwrap()[0].name, url);
    }
}
