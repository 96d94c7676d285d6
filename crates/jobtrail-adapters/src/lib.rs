//! Candidate producers: each adapter fetches one source and turns it into
//! [`CandidateJob`]s for the store to reconcile.

use std::path::PathBuf;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jobtrail_core::CandidateJob;
use jobtrail_storage::HttpFetcher;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

pub mod feed;
pub mod html;
pub mod search;

pub use feed::{harvest_feed, parse_feed, parse_timestamp, FeedEntry, FeedSpec, ParsedFeed};
pub use html::strip_html;
pub use search::{extract_json_array, parse_search_results, WEB_SEARCH};

pub const CRATE_NAME: &str = "jobtrail-adapters";

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("parse error: {0}")]
    Parse(String),
    #[error(transparent)]
    Fetch(#[from] jobtrail_storage::FetchError),
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl AdapterError {
    pub(crate) fn xml(err: impl std::fmt::Display) -> Self {
        AdapterError::Parse(format!("xml: {err}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdapterContext {
    pub run_id: Uuid,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    pub url: String,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
    pub fetched_at: DateTime<Utc>,
}

/// What one source produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Harvest {
    pub candidates: Vec<CandidateJob>,
    /// Latest posting date among `candidates`, used as the next fetch cutoff.
    pub newest: Option<DateTime<Utc>>,
    /// Entries at or before the previous cutoff.
    pub stale: usize,
    /// Entries that could not become candidates (no link, malformed, repeated).
    pub skipped: usize,
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn name(&self) -> &str;

    /// Extension used when archiving the raw body.
    fn raw_extension(&self) -> &'static str;

    async fn fetch(&self, http: &HttpFetcher, ctx: &AdapterContext)
        -> Result<FetchedPage, AdapterError>;

    fn parse(&self, page: &FetchedPage) -> Result<Harvest, AdapterError>;
}

/// An RSS or Atom feed fetched over HTTP.
#[derive(Debug, Clone)]
pub struct RssFeedAdapter {
    spec: FeedSpec,
    since: Option<DateTime<Utc>>,
}

impl RssFeedAdapter {
    pub fn new(spec: FeedSpec) -> Self {
        Self { spec, since: None }
    }

    /// Only entries newer than `cutoff` will be harvested.
    pub fn since(mut self, cutoff: Option<DateTime<Utc>>) -> Self {
        self.since = cutoff;
        self
    }

    pub fn spec(&self) -> &FeedSpec {
        &self.spec
    }
}

#[async_trait]
impl SourceAdapter for RssFeedAdapter {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn raw_extension(&self) -> &'static str {
        "xml"
    }

    async fn fetch(
        &self,
        http: &HttpFetcher,
        ctx: &AdapterContext,
    ) -> Result<FetchedPage, AdapterError> {
        let response = http.get(ctx.run_id, &self.spec.name, &self.spec.url).await?;
        Ok(FetchedPage {
            url: response.final_url,
            content_type: response.content_type,
            body: response.body,
            fetched_at: ctx.fetched_at,
        })
    }

    fn parse(&self, page: &FetchedPage) -> Result<Harvest, AdapterError> {
        let parsed = parse_feed(&page.body)?;
        Ok(harvest_feed(&parsed, &self.spec, self.since, page.fetched_at))
    }
}

/// A saved search-result or hand-written JSON file on disk.
#[derive(Debug, Clone)]
pub struct ImportFileAdapter {
    path: PathBuf,
    name: String,
}

impl ImportFileAdapter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self { path, name }
    }
}

#[async_trait]
impl SourceAdapter for ImportFileAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn raw_extension(&self) -> &'static str {
        "json"
    }

    async fn fetch(
        &self,
        _http: &HttpFetcher,
        ctx: &AdapterContext,
    ) -> Result<FetchedPage, AdapterError> {
        let body = tokio::fs::read(&self.path)
            .await
            .with_context(|| format!("reading import file {}", self.path.display()))?;
        Ok(FetchedPage {
            url: self.path.display().to_string(),
            content_type: Some("application/json".into()),
            body,
            fetched_at: ctx.fetched_at,
        })
    }

    fn parse(&self, page: &FetchedPage) -> Result<Harvest, AdapterError> {
        let text = std::str::from_utf8(&page.body)
            .map_err(|e| AdapterError::Parse(format!("{}: {e}", self.name)))?;
        parse_search_results(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobtrail_storage::HttpClientConfig;

    fn fixtures() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../fixtures")
    }

    fn ctx() -> AdapterContext {
        AdapterContext {
            run_id: Uuid::new_v4(),
            fetched_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn import_adapter_reads_and_parses_a_file() {
        let adapter = ImportFileAdapter::new(fixtures().join("search/sample_results.json"));
        assert_eq!(adapter.name(), "sample_results.json");

        let http = HttpFetcher::new(HttpClientConfig::default()).unwrap();
        let page = adapter.fetch(&http, &ctx()).await.unwrap();
        let harvest = adapter.parse(&page).unwrap();

        assert_eq!(harvest.candidates.len(), 3);
        assert!(harvest
            .candidates
            .iter()
            .all(|c| c.url.starts_with("https://")));
    }

    #[tokio::test]
    async fn missing_import_file_is_an_error() {
        let adapter = ImportFileAdapter::new(fixtures().join("search/does_not_exist.json"));
        let http = HttpFetcher::new(HttpClientConfig::default()).unwrap();
        assert!(matches!(
            adapter.fetch(&http, &ctx()).await,
            Err(AdapterError::Anyhow(_))
        ));
    }

    #[test]
    fn rss_adapter_parses_a_page_with_its_cutoff() {
        let body = std::fs::read(fixtures().join("feeds/sample_rss.xml")).unwrap();
        let fetched_at = Utc::now();
        let page = FetchedPage {
            url: "https://feeds.example/writers.xml".into(),
            content_type: None,
            body,
            fetched_at,
        };
        let adapter = RssFeedAdapter::new(FeedSpec {
            name: "Writers".into(),
            url: page.url.clone(),
            source: None,
        });
        let all = adapter.parse(&page).unwrap();

        let recent = adapter.clone().since(all.newest).parse(&page).unwrap();
        assert!(all.candidates.len() > recent.candidates.len());
        assert!(recent.candidates.is_empty());
    }
}
