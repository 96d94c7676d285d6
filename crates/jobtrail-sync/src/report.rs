//! Per-run report files under `reports/<run_id>/`.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use jobtrail_core::{JobFilter, JobRecord, JobStatus, OrderBy, OrderField};
use jobtrail_storage::JobStore;
use tokio::fs;

use crate::pipeline::SyncRunSummary;

pub const SUMMARY_FILE: &str = "run_summary.json";
pub const BRIEF_FILE: &str = "daily_brief.md";

/// How many unreviewed postings the brief lists.
const BRIEF_LISTING: u32 = 20;

pub async fn write_run_reports(store: &JobStore, summary: &SyncRunSummary) -> Result<PathBuf> {
    let dir = &summary.reports_dir;
    fs::create_dir_all(dir)
        .await
        .with_context(|| format!("creating {}", dir.display()))?;

    let json = serde_json::to_vec_pretty(summary).context("serializing run summary")?;
    fs::write(dir.join(SUMMARY_FILE), json)
        .await
        .with_context(|| format!("writing {SUMMARY_FILE}"))?;

    let status_counts = store.status_counts().await?;
    let newest = store
        .query(
            &JobFilter::default()
                .with_status(JobStatus::New)
                .ordered_by(OrderBy::desc(OrderField::CreatedAt))
                .with_limit(BRIEF_LISTING),
        )
        .await?;
    let brief = render_daily_brief(summary, &status_counts, &newest);
    fs::write(dir.join(BRIEF_FILE), brief)
        .await
        .with_context(|| format!("writing {BRIEF_FILE}"))?;

    Ok(dir.clone())
}

pub fn render_daily_brief(
    summary: &SyncRunSummary,
    status_counts: &BTreeMap<JobStatus, i64>,
    newest: &[JobRecord],
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Job Trail Daily Brief\n");
    let _ = writeln!(out, "- Run ID: `{}`", summary.run_id);
    let _ = writeln!(out, "- Started: {}", summary.started_at.to_rfc3339());
    let _ = writeln!(out, "- Finished: {}", summary.finished_at.to_rfc3339());
    let _ = writeln!(
        out,
        "- Created: {}, refreshed: {}, failed: {}",
        summary.totals.created,
        summary.totals.refreshed,
        summary.totals.failures.len()
    );

    if !summary.feeds.is_empty() {
        let _ = writeln!(out, "\n## Feeds");
        for feed in &summary.feeds {
            match &feed.error {
                Some(error) => {
                    let _ = writeln!(out, "- {}: FAILED ({error})", feed.name);
                }
                None => {
                    let _ = writeln!(
                        out,
                        "- {}: {} new, {} refreshed, {} already seen",
                        feed.name, feed.ingest.created, feed.ingest.refreshed, feed.stale
                    );
                }
            }
        }
    }

    if !summary.imports.is_empty() {
        let _ = writeln!(out, "\n## Imports");
        for import in &summary.imports {
            let name = import
                .file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            match &import.error {
                Some(error) => {
                    let _ = writeln!(out, "- {name}: FAILED ({error})");
                }
                None => {
                    let _ = writeln!(
                        out,
                        "- {name}: {} new, {} refreshed",
                        import.ingest.created, import.ingest.refreshed
                    );
                }
            }
        }
    }

    if let Some(stats) = &summary.analysis {
        let _ = writeln!(out, "\n## Review");
        let _ = writeln!(
            out,
            "- Analyzed {}: kept {}, deleted {}, left for review {}",
            stats.analyzed, stats.kept, stats.deleted, stats.uncertain
        );
        if stats.errors > 0 {
            let _ = writeln!(out, "- Analyzer errors: {}", stats.errors);
        }
    }

    let _ = writeln!(out, "\n## Pipeline");
    for status in JobStatus::ALL {
        let count = status_counts.get(status).copied().unwrap_or(0);
        let _ = writeln!(out, "- {}: {count}", status.as_str());
    }

    let _ = writeln!(out, "\n## Newest unreviewed");
    if newest.is_empty() {
        let _ = writeln!(out, "Nothing waiting.");
    }
    for job in newest {
        let posted = job
            .posted_date
            .map(|d| d.to_string())
            .unwrap_or_else(|| "undated".to_string());
        let source = if job.source.is_empty() { "unknown source" } else { job.source.as_str() };
        let _ = writeln!(out, "- [{}]({}) ({source}, {posted})", job.title, job.url);
    }
    out
}

/// Markdown index of the latest `runs` run summaries under `reports_root`,
/// newest first.
pub fn recent_runs_markdown(reports_root: &Path, runs: usize) -> Result<String> {
    let mut summaries = Vec::new();
    let entries = match std::fs::read_dir(reports_root) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Ok("# Job Trail Runs\n\nNo runs yet.\n".to_string());
        }
        Err(err) => {
            return Err(err).with_context(|| format!("reading {}", reports_root.display()));
        }
    };
    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path().join(SUMMARY_FILE);
        if !path.is_file() {
            continue;
        }
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        let value: serde_json::Value =
            serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
        summaries.push((entry.path(), value));
    }
    // RFC 3339 strings in UTC sort chronologically.
    summaries.sort_by(|a, b| {
        let started = |v: &serde_json::Value| v["started_at"].as_str().unwrap_or("").to_string();
        started(&b.1).cmp(&started(&a.1))
    });

    let mut lines = vec!["# Job Trail Runs".to_string(), String::new()];
    for (dir, value) in summaries.into_iter().take(runs.max(1)) {
        let count = |key: &str| value["totals"][key].as_u64().unwrap_or(0);
        let failed_feeds = value["feeds"]
            .as_array()
            .map(|feeds| feeds.iter().filter(|f| !f["error"].is_null()).count())
            .unwrap_or(0);
        lines.push(format!(
            "## Run `{}`",
            value["run_id"].as_str().unwrap_or("unknown")
        ));
        lines.push(format!(
            "- started: {}",
            value["started_at"].as_str().unwrap_or("unknown")
        ));
        lines.push(format!(
            "- created: {}, refreshed: {}",
            count("created"),
            count("refreshed")
        ));
        lines.push(format!("- failed feeds: {failed_feeds}"));
        let brief = dir.join(BRIEF_FILE);
        if brief.exists() {
            lines.push(format!("- daily brief: `{}`", brief.display()));
        }
        lines.push(String::new());
    }
    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use jobtrail_core::CandidateJob;
    use jobtrail_storage::{IngestFailure, IngestReport};
    use uuid::Uuid;

    use super::*;
    use crate::analyzer::AnalysisStats;
    use crate::pipeline::FeedRunResult;

    fn summary(reports_dir: PathBuf) -> SyncRunSummary {
        let started_at = Utc.with_ymd_and_hms(2026, 3, 5, 7, 0, 0).unwrap();
        SyncRunSummary {
            run_id: Uuid::new_v4(),
            started_at,
            finished_at: started_at,
            feeds: vec![
                FeedRunResult {
                    name: "Writers".into(),
                    url: "https://feeds.example/writers.xml".into(),
                    harvested: 2,
                    stale: 1,
                    skipped: 0,
                    ingest: IngestReport {
                        created: 2,
                        refreshed: 0,
                        failures: Vec::new(),
                    },
                    snapshot: None,
                    error: None,
                },
                FeedRunResult {
                    name: "Broken".into(),
                    url: "https://feeds.example/broken.xml".into(),
                    harvested: 0,
                    stale: 0,
                    skipped: 0,
                    ingest: IngestReport::default(),
                    snapshot: None,
                    error: Some("connection refused".into()),
                },
            ],
            imports: Vec::new(),
            totals: IngestReport {
                created: 2,
                refreshed: 0,
                failures: vec![IngestFailure {
                    url: "ftp://bad".into(),
                    error: "invalid url".into(),
                }],
            },
            analysis: Some(AnalysisStats {
                analyzed: 2,
                kept: 2,
                ..AnalysisStats::default()
            }),
            reports_dir,
        }
    }

    #[test]
    fn brief_lists_feeds_counts_and_postings() {
        let now = Utc::now();
        let job = jobtrail_core::reconcile(
            None,
            &CandidateJob::new("Acme hiring Writer in Seattle, WA", "https://x/1")
                .with_source("builtin.com"),
            now,
        );
        let counts = BTreeMap::from([(JobStatus::New, 2)]);
        let brief = render_daily_brief(&summary(PathBuf::from("unused")), &counts, &[job]);

        assert!(brief.contains("- Writers: 2 new, 0 refreshed, 1 already seen"));
        assert!(brief.contains("- Broken: FAILED (connection refused)"));
        assert!(brief.contains("failed: 1"));
        assert!(brief.contains("- new: 2"));
        assert!(brief.contains("- reviewed: 0"));
        assert!(brief.contains("[Acme hiring Writer in Seattle, WA](https://x/1) (builtin.com, undated)"));
    }

    #[tokio::test]
    async fn reports_are_written_and_indexed() {
        let dir = tempfile::tempdir().unwrap();
        let store = JobStore::open(dir.path().join("jobs.db")).await.unwrap();
        let reports_root = dir.path().join("reports");
        let summary = summary(reports_root.join("run-1"));

        let written = write_run_reports(&store, &summary).await.unwrap();
        assert!(written.join(SUMMARY_FILE).is_file());
        let brief = std::fs::read_to_string(written.join(BRIEF_FILE)).unwrap();
        assert!(brief.contains("Nothing waiting."));

        let index = recent_runs_markdown(&reports_root, 5).unwrap();
        assert!(index.contains(&summary.run_id.to_string()));
        assert!(index.contains("- created: 2, refreshed: 0"));
        assert!(index.contains("- failed feeds: 1"));
    }

    #[test]
    fn missing_reports_directory_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let index = recent_runs_markdown(&dir.path().join("reports"), 3).unwrap();
        assert!(index.contains("No runs yet."));
    }
}
