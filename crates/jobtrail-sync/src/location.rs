//! Location rules: keep postings in the home metro area, US-wide listings and
//! genuinely remote roles; everything else is out of scope.

use std::path::Path;

use anyhow::{Context, Result};
use jobtrail_core::{JobFilter, OrderBy, OrderField};
use jobtrail_storage::JobStore;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationRulesFile {
    pub metro_cities: Vec<String>,
    pub us_wide_suffix: String,
    pub remote_positive: Vec<String>,
    pub remote_negative: Vec<String>,
}

impl Default for LocationRulesFile {
    fn default() -> Self {
        let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
        Self {
            metro_cities: strings(&["Seattle", "Bellevue", "Redmond", "Kirkland", "Bothell"]),
            us_wide_suffix: "in United States".to_string(),
            remote_positive: strings(&[
                r"fully\s+remote",
                r"location\s*:\s*remote",
                r"role\s+(?:type|is)\s*:\s*remote",
                r"remote\s+(?:position|role|work|opportunity|\()",
                r"\bremote\b.*\bUSA\b",
                r"\bUSA\b.*\bremote\b",
                r"(?:100%|completely|entirely)\s+remote",
                r"listed\s+as\s+remote",
                r"\bremote\s+if\s+located",
            ]),
            remote_negative: strings(&[
                r"not\s+(?:a\s+)?remote",
                r"not\s+offer\s+remote",
                r"remote\s+(?:operations?|assistance|sensing)",
            ]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "kebab-case")]
pub enum LocationVerdict {
    Metro(String),
    UsWide,
    Remote,
    Outside,
}

impl LocationVerdict {
    pub fn keeps(&self) -> bool {
        !matches!(self, LocationVerdict::Outside)
    }

    pub fn label(&self) -> &'static str {
        match self {
            LocationVerdict::Metro(_) => "metro",
            LocationVerdict::UsWide => "us-wide",
            LocationVerdict::Remote => "remote",
            LocationVerdict::Outside => "outside",
        }
    }
}

#[derive(Debug, Clone)]
pub struct LocationRules {
    metro_cities: Vec<String>,
    us_wide_suffix: String,
    remote_positive: Option<Regex>,
    remote_negative: Option<Regex>,
}

fn compile_any(patterns: &[String]) -> Result<Option<Regex>> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let joined = patterns
        .iter()
        .map(|p| format!("(?:{p})"))
        .collect::<Vec<_>>()
        .join("|");
    RegexBuilder::new(&joined)
        .case_insensitive(true)
        .build()
        .map(Some)
        .with_context(|| format!("compiling location pattern {joined:?}"))
}

impl Default for LocationRules {
    fn default() -> Self {
        // The built-in patterns are fixed and known to compile.
        Self::from_file(LocationRulesFile::default()).unwrap_or_else(|_| Self {
            metro_cities: Vec::new(),
            us_wide_suffix: String::new(),
            remote_positive: None,
            remote_negative: None,
        })
    }
}

impl LocationRules {
    pub fn from_file(file: LocationRulesFile) -> Result<Self> {
        Ok(Self {
            remote_positive: compile_any(&file.remote_positive)?,
            remote_negative: compile_any(&file.remote_negative)?,
            metro_cities: file.metro_cities,
            us_wide_suffix: file.us_wide_suffix,
        })
    }

    /// Reads `rules/location.yaml` under `root`, or the built-in rules when
    /// the file does not exist.
    pub fn from_workspace_root(root: &Path) -> Result<Self> {
        let path = root.join("rules").join("location.yaml");
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        let file: LocationRulesFile =
            serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
        Self::from_file(file)
    }

    pub fn in_metro(&self, title: &str) -> Option<&str> {
        self.metro_cities
            .iter()
            .find(|city| title.contains(&format!("in {city},")))
            .map(String::as_str)
    }

    pub fn is_us_wide(&self, title: &str) -> bool {
        !self.us_wide_suffix.is_empty() && title.trim_end().ends_with(&self.us_wide_suffix)
    }

    pub fn is_remote(&self, description: &str) -> bool {
        let positive = self
            .remote_positive
            .as_ref()
            .is_some_and(|re| re.is_match(description));
        let negative = self
            .remote_negative
            .as_ref()
            .is_some_and(|re| re.is_match(description));
        positive && !negative
    }

    /// Title checks win over the description.
    pub fn classify(&self, title: &str, description: &str) -> LocationVerdict {
        if let Some(city) = self.in_metro(title) {
            LocationVerdict::Metro(city.to_string())
        } else if self.is_us_wide(title) {
            LocationVerdict::UsWide
        } else if self.is_remote(description) {
            LocationVerdict::Remote
        } else {
            LocationVerdict::Outside
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweptJob {
    pub url: String,
    pub title: String,
    pub verdict: LocationVerdict,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LocationSweep {
    pub kept: Vec<SweptJob>,
    pub removed: Vec<SweptJob>,
    pub dry_run: bool,
}

/// Classifies every stored job and, unless `dry_run`, deletes the ones
/// outside the rules. Must not run alongside an ingestion batch.
pub async fn filter_by_location(
    store: &JobStore,
    rules: &LocationRules,
    dry_run: bool,
) -> Result<LocationSweep> {
    let jobs = store
        .query(&JobFilter::default().ordered_by(OrderBy::asc(OrderField::Title)))
        .await
        .context("listing jobs for location sweep")?;

    let mut sweep = LocationSweep {
        dry_run,
        ..LocationSweep::default()
    };
    for job in jobs {
        let verdict = rules.classify(&job.title, &job.description);
        let swept = SweptJob {
            url: job.url,
            title: job.title,
            verdict,
        };
        if swept.verdict.keeps() {
            sweep.kept.push(swept);
            continue;
        }
        if !dry_run && !store.delete(&swept.url).await? {
            warn!(url = %swept.url, "job vanished during location sweep");
        }
        sweep.removed.push(swept);
    }

    info!(
        kept = sweep.kept.len(),
        removed = sweep.removed.len(),
        dry_run,
        "location sweep finished"
    );
    Ok(sweep)
}
