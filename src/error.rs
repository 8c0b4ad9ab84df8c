//! Error taxonomy for the pipeline.
//!
//! Every fatal condition an invocation can hit is a [`PipelineError`]
//! variant. Per-source fetch failures are deliberately a separate type,
//! [`SourceFetchError`]: the collector absorbs them and keeps going, so they
//! never abort a run.
//!
//! Validation failures (bad stage list, missing configuration, missing
//! upstream artifact) map to exit code 2; anything that goes wrong while a
//! stage is executing maps to exit code 1.

use crate::batch::BatchKey;
use crate::stage::Stage;
use std::path::PathBuf;
use thiserror::Error;

/// Exit code used for validation failures detected before any stage runs.
pub const EXIT_VALIDATION: u8 = 2;
/// Exit code used when a stage fails while executing.
pub const EXIT_STAGE_FAILURE: u8 = 1;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("missing {stage} artifact: {} does not exist", .path.display())]
    MissingArtifact { stage: Stage, path: PathBuf },

    #[error("analysis failed for batch {batch}: {reason}")]
    Analysis { batch: BatchKey, reason: String },

    #[error("article generation failed for batch {batch}: {reason}")]
    Generation { batch: BatchKey, reason: String },

    #[error("failed to write artifact {}: {source}", .path.display())]
    ArtifactWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read artifact {}: {source}", .path.display())]
    ArtifactRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("artifact {} is not a valid item set: {source}", .path.display())]
    ArtifactDecode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to inspect source {url}: {reason}")]
    Inspection { url: String, reason: String },

    #[error(
        "{stage} stage failed for batch {batch}; {} was not produced: {source}",
        .expected.display()
    )]
    StageFailed {
        stage: Stage,
        batch: BatchKey,
        expected: PathBuf,
        produced: Vec<PathBuf>,
        #[source]
        source: Box<PipelineError>,
    },
}

impl PipelineError {
    /// True for failures detected before any stage executes.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            PipelineError::Configuration(_) | PipelineError::MissingArtifact { .. }
        )
    }

    pub fn exit_code(&self) -> u8 {
        if self.is_validation() {
            EXIT_VALIDATION
        } else {
            EXIT_STAGE_FAILURE
        }
    }
}

/// A single source that could not be fetched. Recorded and skipped.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("failed to fetch source {source_name} ({url}): {reason}")]
pub struct SourceFetchError {
    pub source_name: String,
    pub url: String,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_errors_use_validation_exit_code() {
        let config = PipelineError::Configuration("bad stage".to_string());
        let missing = PipelineError::MissingArtifact {
            stage: Stage::Analyzer,
            path: PathBuf::from("output/news_summaries/news_2026_06.md"),
        };
        assert_eq!(config.exit_code(), EXIT_VALIDATION);
        assert_eq!(missing.exit_code(), EXIT_VALIDATION);
    }

    #[test]
    fn test_stage_errors_use_stage_exit_code() {
        let batch: BatchKey = "2026-06".parse().unwrap();
        let analysis = PipelineError::Analysis {
            batch,
            reason: "rate limited".to_string(),
        };
        let wrapped = PipelineError::StageFailed {
            stage: Stage::Analyzer,
            batch,
            expected: PathBuf::from("output/news_summaries/news_2026_06.md"),
            produced: vec![PathBuf::from("output/news_items/news_2026_06.json")],
            source: Box::new(analysis),
        };
        assert_eq!(wrapped.exit_code(), EXIT_STAGE_FAILURE);
        assert!(!wrapped.is_validation());
    }

    #[test]
    fn test_missing_artifact_message_names_path() {
        let err = PipelineError::MissingArtifact {
            stage: Stage::Collector,
            path: PathBuf::from("output/news_items/news_2026_06.json"),
        };
        let msg = err.to_string();
        assert!(msg.contains("collector"));
        assert!(msg.contains("output/news_items/news_2026_06.json"));
    }

    #[test]
    fn test_stage_failed_message_names_stage_batch_and_path() {
        let batch: BatchKey = "2026-06".parse().unwrap();
        let err = PipelineError::StageFailed {
            stage: Stage::Blogger,
            batch,
            expected: PathBuf::from("output/blog_posts/blog_2026_06.md"),
            produced: vec![],
            source: Box::new(PipelineError::Generation {
                batch,
                reason: "timeout".to_string(),
            }),
        };
        let msg = err.to_string();
        assert!(msg.contains("blogger"));
        assert!(msg.contains("2026-06"));
        assert!(msg.contains("blog_2026_06.md"));
        assert!(msg.contains("timeout"));
    }
}
