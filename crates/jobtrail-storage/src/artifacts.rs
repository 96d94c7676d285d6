//! Raw feed snapshots, stored once per distinct body.

use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct StoredArtifact {
    pub content_hash: String,
    pub relative_path: PathBuf,
    pub absolute_path: PathBuf,
    pub byte_size: usize,
    /// The same bytes were already on disk for this feed and day.
    pub deduplicated: bool,
}

/// Writes fetched feed bodies under `<root>/<feed>/<YYYYMMDD>/<sha256>.<ext>`.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn sha256_hex(bytes: &[u8]) -> String {
        hex::encode(Sha256::digest(bytes))
    }

    /// Directory-safe form of a feed name.
    pub fn feed_slug(feed_name: &str) -> String {
        let mut slug = String::with_capacity(feed_name.len());
        for ch in feed_name.trim().chars() {
            if ch.is_ascii_alphanumeric() {
                slug.push(ch.to_ascii_lowercase());
            } else if !slug.ends_with('-') {
                slug.push('-');
            }
        }
        let slug = slug.trim_matches('-');
        if slug.is_empty() {
            "feed".to_string()
        } else {
            slug.to_string()
        }
    }

    pub fn snapshot_path(
        &self,
        fetched_at: DateTime<Utc>,
        feed_name: &str,
        content_hash: &str,
        extension: &str,
    ) -> PathBuf {
        let ext = match extension.trim().trim_start_matches('.') {
            "" => "bin",
            ext => ext,
        };
        PathBuf::from(Self::feed_slug(feed_name))
            .join(fetched_at.format("%Y%m%d").to_string())
            .join(format!("{content_hash}.{ext}"))
    }

    /// Stores `bytes` via a temp file and rename, so readers never observe a
    /// partially written snapshot.
    pub async fn store_snapshot(
        &self,
        fetched_at: DateTime<Utc>,
        feed_name: &str,
        extension: &str,
        bytes: &[u8],
    ) -> anyhow::Result<StoredArtifact> {
        let content_hash = Self::sha256_hex(bytes);
        let relative_path = self.snapshot_path(fetched_at, feed_name, &content_hash, extension);
        let absolute_path = self.root.join(&relative_path);
        let dir = absolute_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());

        let artifact = |deduplicated| StoredArtifact {
            content_hash: content_hash.clone(),
            relative_path: relative_path.clone(),
            absolute_path: absolute_path.clone(),
            byte_size: bytes.len(),
            deduplicated,
        };

        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("creating snapshot directory {}", dir.display()))?;

        if fs::try_exists(&absolute_path)
            .await
            .with_context(|| format!("checking snapshot path {}", absolute_path.display()))?
        {
            return Ok(artifact(true));
        }

        let temp_path = dir.join(format!(".{}.tmp", Uuid::new_v4()));
        if let Err(err) = write_file(&temp_path, bytes).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(err);
        }

        match fs::rename(&temp_path, &absolute_path).await {
            Ok(()) => Ok(artifact(false)),
            Err(err) => {
                let _ = fs::remove_file(&temp_path).await;
                if err.kind() == std::io::ErrorKind::AlreadyExists {
                    return Ok(artifact(true));
                }
                Err(err).with_context(|| {
                    format!(
                        "renaming snapshot {} -> {}",
                        temp_path.display(),
                        absolute_path.display()
                    )
                })
            }
        }
    }
}

async fn write_file(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    let mut file = fs::OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(path)
        .await
        .with_context(|| format!("opening {}", path.display()))?;
    file.write_all(bytes)
        .await
        .with_context(|| format!("writing {}", path.display()))?;
    file.flush()
        .await
        .with_context(|| format!("flushing {}", path.display()))?;
    Ok(())
}
