use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use jobtrail_adapters::{
    AdapterContext, FeedSpec, ImportFileAdapter, RssFeedAdapter, SourceAdapter,
};
use jobtrail_storage::{ArtifactStore, HttpClientConfig, HttpFetcher, IngestReport, JobStore};
use serde::Serialize;
use tokio::fs;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::analyzer::{apply_analysis, AnalysisStats, JobAnalyzer, RuleAnalyzer};
use crate::config::{FeedConfig, FeedRegistry, SyncConfig};
use crate::location::LocationRules;
use crate::report;

/// Feed name raw import files are archived under.
const IMPORTS_ARCHIVE: &str = "imports";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunScope {
    #[default]
    All,
    FeedsOnly,
    ImportsOnly,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    pub scope: RunScope,
    pub skip_analyzer: bool,
}

impl RunOptions {
    fn runs_feeds(&self) -> bool {
        self.scope != RunScope::ImportsOnly
    }

    fn runs_imports(&self) -> bool {
        self.scope != RunScope::FeedsOnly
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FeedRunResult {
    pub name: String,
    pub url: String,
    pub harvested: usize,
    pub stale: usize,
    pub skipped: usize,
    pub ingest: IngestReport,
    pub snapshot: Option<PathBuf>,
    pub error: Option<String>,
}

impl FeedRunResult {
    fn failed(feed: &FeedConfig, err: &anyhow::Error) -> Self {
        Self {
            name: feed.name.clone(),
            url: feed.url.clone(),
            harvested: 0,
            stale: 0,
            skipped: 0,
            ingest: IngestReport::default(),
            snapshot: None,
            error: Some(format!("{err:#}")),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportRunResult {
    pub file: PathBuf,
    pub harvested: usize,
    pub skipped: usize,
    pub ingest: IngestReport,
    /// Where the file went after a successful import.
    pub moved_to: Option<PathBuf>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncRunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub feeds: Vec<FeedRunResult>,
    pub imports: Vec<ImportRunResult>,
    /// Ingestion counts across feeds and imports.
    pub totals: IngestReport,
    pub analysis: Option<AnalysisStats>,
    pub reports_dir: PathBuf,
}

impl SyncRunSummary {
    pub fn failed_feeds(&self) -> usize {
        self.feeds.iter().filter(|f| f.error.is_some()).count()
    }

    pub fn failed_imports(&self) -> usize {
        self.imports.iter().filter(|i| i.error.is_some()).count()
    }
}

pub struct SyncPipeline {
    config: SyncConfig,
    store: JobStore,
    artifact_store: ArtifactStore,
    http: HttpFetcher,
    analyzer: Box<dyn JobAnalyzer>,
}

impl SyncPipeline {
    /// Uses the rule analyzer with the workspace's location rules.
    pub fn new(config: SyncConfig, store: JobStore) -> Result<Self> {
        let artifact_store = ArtifactStore::new(config.artifacts_dir.clone());
        let http = HttpFetcher::new(HttpClientConfig {
            timeout: Duration::from_secs(config.http_timeout_secs),
            user_agent: Some(config.user_agent.clone()),
            ..Default::default()
        })?;
        let rules = LocationRules::from_workspace_root(&config.workspace_root)?;
        Ok(Self {
            config,
            store,
            artifact_store,
            http,
            analyzer: Box::new(RuleAnalyzer::new(rules)),
        })
    }

    pub fn with_analyzer(mut self, analyzer: Box<dyn JobAnalyzer>) -> Self {
        self.analyzer = analyzer;
        self
    }

    pub fn with_http_client(mut self, http: HttpFetcher) -> Self {
        self.http = http;
        self
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    pub async fn run_once(&self, options: RunOptions) -> Result<SyncRunSummary> {
        let run_id = Uuid::new_v4();
        let span = info_span!("sync_run", %run_id);
        self.run_inner(run_id, options).instrument(span).await
    }

    async fn run_inner(&self, run_id: Uuid, options: RunOptions) -> Result<SyncRunSummary> {
        let started_at = Utc::now();
        let ctx = AdapterContext {
            run_id,
            fetched_at: started_at,
        };
        let mut totals = IngestReport::default();

        let mut feeds = Vec::new();
        if options.runs_feeds() {
            let registry = FeedRegistry::load(&self.config.feeds_path()).await?;
            for feed in registry.enabled() {
                let result = match self.sync_feed(feed, &ctx).await {
                    Ok(result) => result,
                    Err(err) => {
                        warn!(feed = %feed.name, url = %feed.url, error = ?err, "feed failed");
                        FeedRunResult::failed(feed, &err)
                    }
                };
                totals.merge(result.ingest.clone());
                feeds.push(result);
            }
        }

        let mut imports = Vec::new();
        if options.runs_imports() {
            for path in self.pending_imports().await? {
                let result = self.import_pending(&path, &ctx).await;
                totals.merge(result.ingest.clone());
                imports.push(result);
            }
        }

        let analysis = if options.skip_analyzer {
            None
        } else {
            Some(apply_analysis(&self.store, self.analyzer.as_ref(), false).await?)
        };

        let summary = SyncRunSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            feeds,
            imports,
            totals,
            analysis,
            reports_dir: self.config.reports_dir().join(run_id.to_string()),
        };
        report::write_run_reports(&self.store, &summary).await?;

        info!(
            feeds = summary.feeds.len(),
            failed_feeds = summary.failed_feeds(),
            imports = summary.imports.len(),
            created = summary.totals.created,
            refreshed = summary.totals.refreshed,
            "sync run finished"
        );
        Ok(summary)
    }

    async fn sync_feed(&self, feed: &FeedConfig, ctx: &AdapterContext) -> Result<FeedRunResult> {
        self.store
            .get_or_create_feed(&feed.name, Some(&feed.url), feed.source.as_deref())
            .await?;
        let since = self.store.last_fetch(&feed.url).await?;
        let adapter = RssFeedAdapter::new(FeedSpec {
            name: feed.name.clone(),
            url: feed.url.clone(),
            source: feed.source.clone(),
        })
        .since(since);

        let page = adapter.fetch(&self.http, ctx).await?;
        let stored = self
            .artifact_store
            .store_snapshot(ctx.fetched_at, adapter.name(), adapter.raw_extension(), &page.body)
            .await?;
        let harvest = adapter
            .parse(&page)
            .with_context(|| format!("parsing feed {}", feed.name))?;
        let ingest = self
            .store
            .ingest_batch(&harvest.candidates, ctx.fetched_at)
            .await?;

        // Failed entries are retried next run by leaving the cutoff where it was.
        if ingest.failures.is_empty() {
            if let Some(newest) = harvest.newest {
                self.store.set_last_fetch(&feed.url, newest).await?;
            }
        }

        info!(
            feed = %feed.name,
            harvested = harvest.candidates.len(),
            stale = harvest.stale,
            created = ingest.created,
            refreshed = ingest.refreshed,
            "feed synced"
        );
        Ok(FeedRunResult {
            name: feed.name.clone(),
            url: feed.url.clone(),
            harvested: harvest.candidates.len(),
            stale: harvest.stale,
            skipped: harvest.skipped,
            ingest,
            snapshot: Some(stored.relative_path),
            error: None,
        })
    }

    /// `*.json` files directly under the imports directory, by name.
    async fn pending_imports(&self) -> Result<Vec<PathBuf>> {
        let dir = self.config.imports_dir();
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err).with_context(|| format!("reading {}", dir.display())),
        };
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_file()
                && path.extension().is_some_and(|ext| ext == "json")
            {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Imports one file from the imports directory and moves it to
    /// `processed/` on success. A failing file stays put for the next run.
    async fn import_pending(&self, path: &Path, ctx: &AdapterContext) -> ImportRunResult {
        let mut result = match self.import_with(path, ctx).await {
            Ok(result) => result,
            Err(err) => {
                warn!(file = %path.display(), error = ?err, "import failed");
                return ImportRunResult {
                    file: path.to_path_buf(),
                    harvested: 0,
                    skipped: 0,
                    ingest: IngestReport::default(),
                    moved_to: None,
                    error: Some(format!("{err:#}")),
                };
            }
        };
        match self.move_to_processed(path).await {
            Ok(dest) => result.moved_to = Some(dest),
            Err(err) => {
                warn!(file = %path.display(), error = ?err, "could not move imported file");
            }
        }
        result
    }

    async fn move_to_processed(&self, path: &Path) -> Result<PathBuf> {
        let processed = self.config.imports_dir().join("processed");
        fs::create_dir_all(&processed)
            .await
            .with_context(|| format!("creating {}", processed.display()))?;
        let file_name = path
            .file_name()
            .with_context(|| format!("{} has no file name", path.display()))?;
        let dest = processed.join(file_name);
        fs::rename(path, &dest)
            .await
            .with_context(|| format!("moving {} to {}", path.display(), dest.display()))?;
        Ok(dest)
    }

    /// Imports a single file in place, without moving it.
    pub async fn import_file(&self, path: &Path) -> Result<ImportRunResult> {
        let ctx = AdapterContext {
            run_id: Uuid::new_v4(),
            fetched_at: Utc::now(),
        };
        self.import_with(path, &ctx).await
    }

    async fn import_with(&self, path: &Path, ctx: &AdapterContext) -> Result<ImportRunResult> {
        let adapter = ImportFileAdapter::new(path);
        let page = adapter.fetch(&self.http, ctx).await?;
        self.artifact_store
            .store_snapshot(ctx.fetched_at, IMPORTS_ARCHIVE, adapter.raw_extension(), &page.body)
            .await?;
        let harvest = adapter
            .parse(&page)
            .with_context(|| format!("parsing {}", path.display()))?;
        let ingest = self
            .store
            .ingest_batch(&harvest.candidates, ctx.fetched_at)
            .await?;
        info!(
            file = %path.display(),
            created = ingest.created,
            refreshed = ingest.refreshed,
            failed = ingest.failures.len(),
            "import ingested"
        );
        Ok(ImportRunResult {
            file: path.to_path_buf(),
            harvested: harvest.candidates.len(),
            skipped: harvest.skipped,
            ingest,
            moved_to: None,
            error: None,
        })
    }
}
