//! Artifact store.
//!
//! Maps a `(BatchKey, Stage)` pair to a fixed path under the output root and
//! performs every artifact read and write. Stages never build artifact paths
//! themselves.
//!
//! # Layout
//!
//! ```text
//! output/
//! ├── news_items/news_2026_06.json      # collector
//! ├── news_summaries/news_2026_06.md    # analyzer
//! ├── news_summaries/news_2026_06.json  # analyzer's per-item summary cache
//! └── blog_posts/blog_2026_06.md        # blogger
//! ```
//!
//! Writes go to a hidden temp file next to the destination and are renamed
//! into place, so a reader never observes a half-written artifact.

use crate::batch::BatchKey;
use crate::error::PipelineError;
use crate::models::{ItemSet, SummaryCache};
use crate::stage::Stage;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Canonical path of the artifact `stage` produces for `batch`. Pure.
    pub fn resolve(&self, batch: &BatchKey, stage: Stage) -> PathBuf {
        let (dir, prefix, ext) = match stage {
            Stage::Collector => ("news_items", "news", "json"),
            Stage::Analyzer => ("news_summaries", "news", "md"),
            Stage::Blogger => ("blog_posts", "blog", "md"),
        };
        self.root
            .join(dir)
            .join(format!("{prefix}_{}.{ext}", batch.file_stem()))
    }

    /// Path of the per-item summary cache kept beside the batch's summary
    /// document.
    pub fn summary_cache_path(&self, batch: &BatchKey) -> PathBuf {
        self.resolve(batch, Stage::Analyzer).with_extension("json")
    }

    pub fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    /// Atomically replace `path` with `content`, creating parent directories
    /// as needed.
    #[instrument(level = "info", skip_all, fields(path = %path.display(), bytes = content.len()))]
    pub async fn write(&self, path: &Path, content: &str) -> Result<(), PipelineError> {
        let write_error = |source| PipelineError::ArtifactWrite {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(write_error)?;
        }

        let tmp_path = temp_path_for(path);
        let result: std::io::Result<()> = async {
            let mut file = fs::File::create(&tmp_path).await?;
            file.write_all(content.as_bytes()).await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&tmp_path, path).await
        }
        .await;

        if let Err(e) = result {
            if let Err(cleanup) = fs::remove_file(&tmp_path).await {
                debug!(tmp = %tmp_path.display(), error = %cleanup, "No temp file to clean up");
            }
            warn!(error = %e, "Artifact write failed; destination left untouched");
            return Err(write_error(e));
        }

        info!("Wrote artifact");
        Ok(())
    }

    /// Read an artifact produced by `stage`.
    pub async fn read(&self, stage: Stage, path: &Path) -> Result<String, PipelineError> {
        match fs::read_to_string(path).await {
            Ok(content) => {
                debug!(path = %path.display(), bytes = content.len(), "Read artifact");
                Ok(content)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(PipelineError::MissingArtifact {
                stage,
                path: path.to_path_buf(),
            }),
            Err(source) => Err(PipelineError::ArtifactRead {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub async fn write_items(&self, path: &Path, items: &ItemSet) -> Result<(), PipelineError> {
        let json = serde_json::to_string_pretty(items).map_err(|e| PipelineError::ArtifactWrite {
            path: path.to_path_buf(),
            source: std::io::Error::new(ErrorKind::InvalidData, e),
        })?;
        self.write(path, &json).await
    }

    pub async fn read_items(&self, path: &Path) -> Result<ItemSet, PipelineError> {
        let json = self.read(Stage::Collector, path).await?;
        serde_json::from_str(&json).map_err(|source| PipelineError::ArtifactDecode {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Summaries cached for `batch`. A missing or unreadable cache is empty.
    pub async fn read_summary_cache(&self, batch: &BatchKey) -> SummaryCache {
        let path = self.summary_cache_path(batch);
        let json = match fs::read_to_string(&path).await {
            Ok(json) => json,
            Err(e) if e.kind() == ErrorKind::NotFound => return SummaryCache::default(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cannot read summary cache; starting empty");
                return SummaryCache::default();
            }
        };
        match serde_json::from_str::<SummaryCache>(&json) {
            Ok(cache) => {
                debug!(path = %path.display(), entries = cache.len(), "Read summary cache");
                cache
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Corrupt summary cache; starting empty");
                SummaryCache::default()
            }
        }
    }

    pub async fn write_summary_cache(
        &self,
        batch: &BatchKey,
        cache: &SummaryCache,
    ) -> Result<(), PipelineError> {
        let path = self.summary_cache_path(batch);
        let json = serde_json::to_string_pretty(cache).map_err(|e| PipelineError::ArtifactWrite {
            path: path.clone(),
            source: std::io::Error::new(ErrorKind::InvalidData, e),
        })?;
        self.write(&path, &json).await
    }
}

/// Hidden sibling used as the write target before the rename.
fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "artifact".to_string());
    path.with_file_name(format!(".{name}.tmp"))
}
