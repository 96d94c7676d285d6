use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub db_path: PathBuf,
    pub artifacts_dir: PathBuf,
    pub user_agent: String,
    pub http_timeout_secs: u64,
    pub workspace_root: PathBuf,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

impl SyncConfig {
    pub fn from_env() -> Self {
        Self {
            db_path: PathBuf::from(env_or("JOBTRAIL_DB_PATH", "./job_search.db")),
            artifacts_dir: PathBuf::from(env_or("JOBTRAIL_ARTIFACTS_DIR", "./artifacts")),
            user_agent: env_or("JOBTRAIL_USER_AGENT", "jobtrail/0.1"),
            http_timeout_secs: std::env::var("JOBTRAIL_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(20),
            workspace_root: PathBuf::from(env_or("JOBTRAIL_WORKSPACE", ".")),
        }
    }

    /// Everything under one directory, for tests and throwaway runs.
    pub fn in_workspace(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            db_path: root.join("job_search.db"),
            artifacts_dir: root.join("artifacts"),
            user_agent: "jobtrail/0.1".to_string(),
            http_timeout_secs: 20,
            workspace_root: root,
        }
    }

    pub fn feeds_path(&self) -> PathBuf {
        self.workspace_root.join("feeds.yaml")
    }

    pub fn imports_dir(&self) -> PathBuf {
        self.workspace_root.join("imports")
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.workspace_root.join("reports")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedConfig {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

/// `feeds.yaml`: the RSS/Atom feeds a sync run pulls.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedRegistry {
    #[serde(default)]
    pub feeds: Vec<FeedConfig>,
}

impl FeedRegistry {
    pub fn parse(text: &str) -> Result<Self> {
        let registry: FeedRegistry = serde_yaml::from_str(text).context("parsing feed registry")?;
        for feed in &registry.feeds {
            if feed.url.trim().is_empty() {
                anyhow::bail!("feed {:?} has no url", feed.name);
            }
        }
        Ok(registry)
    }

    /// A missing file is an empty registry.
    pub async fn load(path: &Path) -> Result<Self> {
        match tokio::fs::read_to_string(path).await {
            Ok(text) => Self::parse(&text).with_context(|| format!("in {}", path.display())),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "no feed registry; skipping feeds");
                Ok(Self::default())
            }
            Err(err) => Err(err).with_context(|| format!("reading {}", path.display())),
        }
    }

    pub fn enabled(&self) -> impl Iterator<Item = &FeedConfig> {
        self.feeds.iter().filter(|f| f.enabled)
    }
}

pub const STARTER_FEEDS: &str = r#"# Feeds pulled by `jobtrail sync`.
feeds:
  - name: Technical Writer Jobs
    url: https://rss.app/feeds/51cgVZegdBeT9hKP.xml
    source: RSS
    enabled: false
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_defaults_enabled_and_rejects_missing_urls() {
        let registry = FeedRegistry::parse(
            "feeds:\n  - name: A\n    url: https://a.example/rss\n  - name: B\n    url: https://b.example/rss\n    enabled: false\n",
        )
        .unwrap();
        let enabled: Vec<_> = registry.enabled().map(|f| f.name.as_str()).collect();
        assert_eq!(enabled, ["A"]);

        assert!(FeedRegistry::parse("feeds:\n  - name: C\n    url: ''\n").is_err());
    }

    #[test]
    fn starter_registry_parses() {
        let registry = FeedRegistry::parse(STARTER_FEEDS).unwrap();
        assert_eq!(registry.feeds.len(), 1);
        assert_eq!(registry.enabled().count(), 0);

        let shipped = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../feeds.yaml");
        let shipped = FeedRegistry::parse(&std::fs::read_to_string(shipped).unwrap()).unwrap();
        assert_eq!(shipped, registry);
    }

    #[tokio::test]
    async fn missing_registry_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let registry = FeedRegistry::load(&dir.path().join("feeds.yaml")).await.unwrap();
        assert!(registry.feeds.is_empty());
    }
}
