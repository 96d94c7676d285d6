//! Post-ingestion review: decide whether each new posting stays, pull out a
//! pay range, and tidy the title.

use std::sync::OnceLock;

use anyhow::Result;
use async_trait::async_trait;
use jobtrail_core::{JobFilter, JobRecord, JobStatus};
use jobtrail_storage::{JobStore, StoreError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::location::{LocationRules, LocationVerdict};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Keep,
    Delete,
    /// Not enough information; leave it for a person.
    Uncertain,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Analysis {
    pub decision: Decision,
    pub reasoning: String,
    pub pay_range: Option<String>,
    pub title_cleaned: Option<String>,
}

impl Analysis {
    pub fn uncertain(reasoning: impl Into<String>) -> Self {
        Self {
            decision: Decision::Uncertain,
            reasoning: reasoning.into(),
            pay_range: None,
            title_cleaned: None,
        }
    }
}

#[async_trait]
pub trait JobAnalyzer: Send + Sync {
    async fn analyze(&self, job: &JobRecord) -> Result<Analysis>;
}

fn pay_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?i)\$\s?\d[\d,]*(?:\.\d+)?\s?k?(?:\s*(?:-|–|—|to)\s*\$?\s?\d[\d,]*(?:\.\d+)?\s?k?)?(?:\s*(?:/|per\s+)(?:hour|hr|year|yr|annum))?",
        )
        .expect("pay pattern compiles")
    })
}

fn glued_digit_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(\d)([A-Z])").expect("title pattern compiles")
    })
}

/// First dollar amount or range in `text`, whitespace-normalised.
pub fn extract_pay_range(text: &str) -> Option<String> {
    pay_pattern()
        .find(text)
        .map(|m| m.as_str().split_whitespace().collect::<Vec<_>>().join(" "))
}

/// Separates a digit glued to a following capital ("Level2Writer" becomes
/// "Level2 Writer") and collapses whitespace.
pub fn clean_title(title: &str) -> String {
    let spaced = glued_digit_pattern().replace_all(title, "$1 $2");
    spaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Rules-only analyzer: location from [`LocationRules`], pay from `$`
/// amounts in the description, mechanical title cleanup.
#[derive(Debug, Clone, Default)]
pub struct RuleAnalyzer {
    rules: LocationRules,
}

impl RuleAnalyzer {
    pub fn new(rules: LocationRules) -> Self {
        Self { rules }
    }
}

#[async_trait]
impl JobAnalyzer for RuleAnalyzer {
    async fn analyze(&self, job: &JobRecord) -> Result<Analysis> {
        let verdict = self.rules.classify(&job.title, &job.description);
        let (decision, reasoning) = match &verdict {
            LocationVerdict::Metro(city) => (Decision::Keep, format!("located in {city}")),
            LocationVerdict::UsWide => (Decision::Keep, "listed as United States".to_string()),
            LocationVerdict::Remote => (Decision::Keep, "description says remote".to_string()),
            LocationVerdict::Outside if job.description.trim().is_empty() => (
                Decision::Uncertain,
                "no description to judge location from".to_string(),
            ),
            LocationVerdict::Outside => (
                Decision::Delete,
                "outside the metro area and not remote".to_string(),
            ),
        };
        let cleaned = clean_title(&job.title);
        Ok(Analysis {
            decision,
            reasoning,
            pay_range: extract_pay_range(&job.description),
            title_cleaned: (cleaned != job.title).then_some(cleaned),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AnalysisStats {
    pub analyzed: usize,
    pub kept: usize,
    pub deleted: usize,
    pub uncertain: usize,
    pub errors: usize,
    pub pay_found: usize,
    pub titles_cleaned: usize,
    pub dry_run: bool,
}

pub fn pay_marker(pay_range: &str) -> String {
    format!("[Pay Range: {pay_range}]")
}

async fn apply_keep(
    store: &JobStore,
    job: &JobRecord,
    new_title: Option<&str>,
    pay_range: Option<&str>,
) -> Result<(), StoreError> {
    if let Some(title) = new_title {
        store.retitle(&job.url, title).await?;
    }
    if let Some(pay) = pay_range {
        let marker = pay_marker(pay);
        if !job.description.contains(&marker) {
            store.append_description(&job.url, &marker).await?;
        }
    }
    Ok(())
}

/// Runs `analyzer` over every job with status `new` and applies the outcome:
/// Delete removes the job, Keep applies the cleaned title and appends the pay
/// marker when the description lacks it, Uncertain leaves the job alone.
/// An analyzer failure counts as Uncertain.
pub async fn apply_analysis(
    store: &JobStore,
    analyzer: &dyn JobAnalyzer,
    dry_run: bool,
) -> Result<AnalysisStats> {
    let jobs = store
        .query(&JobFilter::default().with_status(JobStatus::New))
        .await?;
    let mut stats = AnalysisStats {
        dry_run,
        ..AnalysisStats::default()
    };

    for job in jobs {
        stats.analyzed += 1;
        let analysis = match analyzer.analyze(&job).await {
            Ok(analysis) => analysis,
            Err(err) => {
                warn!(url = %job.url, error = %err, "analysis failed; leaving job for review");
                stats.errors += 1;
                Analysis::uncertain(err.to_string())
            }
        };
        debug!(url = %job.url, decision = ?analysis.decision, reasoning = %analysis.reasoning, "analyzed");

        if analysis.pay_range.is_some() {
            stats.pay_found += 1;
        }
        let new_title = analysis
            .title_cleaned
            .as_deref()
            .filter(|t| !t.trim().is_empty() && *t != job.title);
        if new_title.is_some() {
            stats.titles_cleaned += 1;
        }

        let applied = match analysis.decision {
            Decision::Delete => {
                stats.deleted += 1;
                if dry_run {
                    Ok(())
                } else {
                    store.delete(&job.url).await.map(|_| ())
                }
            }
            Decision::Keep => {
                stats.kept += 1;
                if dry_run {
                    Ok(())
                } else {
                    apply_keep(store, &job, new_title, analysis.pay_range.as_deref()).await
                }
            }
            Decision::Uncertain => {
                stats.uncertain += 1;
                Ok(())
            }
        };
        if let Err(err) = applied {
            warn!(url = %job.url, error = %err, "could not apply analysis; moving on");
            stats.errors += 1;
        }
    }

    info!(
        analyzed = stats.analyzed,
        kept = stats.kept,
        deleted = stats.deleted,
        uncertain = stats.uncertain,
        dry_run,
        "analysis finished"
    );
    Ok(stats)
}
