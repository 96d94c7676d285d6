//! Sync orchestration: pull feeds and import files into the job store, then
//! run the review pass and write run reports.

pub mod analyzer;
pub mod config;
pub mod location;
pub mod pipeline;
pub mod report;

use anyhow::Result;
use jobtrail_storage::JobStore;

pub use analyzer::{
    apply_analysis, clean_title, extract_pay_range, pay_marker, Analysis, AnalysisStats, Decision,
    JobAnalyzer, RuleAnalyzer,
};
pub use config::{FeedConfig, FeedRegistry, SyncConfig, STARTER_FEEDS};
pub use location::{
    filter_by_location, LocationRules, LocationRulesFile, LocationSweep, LocationVerdict, SweptJob,
};
pub use pipeline::{
    FeedRunResult, ImportRunResult, RunOptions, RunScope, SyncPipeline, SyncRunSummary,
};
pub use report::{recent_runs_markdown, render_daily_brief, write_run_reports};

pub const CRATE_NAME: &str = "jobtrail-sync";

pub async fn run_sync_once_from_env(options: RunOptions) -> Result<SyncRunSummary> {
    let config = SyncConfig::from_env();
    let store = JobStore::open(&config.db_path).await?;
    let pipeline = SyncPipeline::new(config, store)?;
    let summary = pipeline.run_once(options).await;
    pipeline.store().close().await;
    summary
}
