//! Utility functions for string handling, URL comparison and file system checks.
//!
//! - String truncation for log previews
//! - Whitespace normalization of scraped text
//! - URL normalization so a source's own link can be recognized and skipped
//! - Output directory validation before any stage runs

use crate::error::PipelineError;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};
use url::Url;

/// Truncate a string for logging purposes.
///
/// Long strings are cut to at most `max` bytes (on a character boundary)
/// with an ellipsis and byte count appended.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log(&"a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Collapse every run of whitespace into a single space and trim the ends.
pub fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalize a URL for equality checks.
///
/// Scheme and host are lower-cased, the fragment dropped, and a trailing
/// slash removed from any non-root path. The query is kept. Strings that do not parse
/// as URLs are returned trimmed.
pub fn normalize_url(raw: &str) -> String {
    let Ok(mut url) = Url::parse(raw.trim()) else {
        return raw.trim().to_string();
    };
    url.set_fragment(None);
    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        url.set_path(path.trim_end_matches('/'));
    }
    url.to_string()
}

/// Whether `candidate` points at the same page as the already-normalized
/// `source_norm`.
pub fn is_same_url(candidate: &str, source_norm: &str) -> bool {
    normalize_url(candidate) == source_norm
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if needed, then writes and removes a probe file.
/// Failures are configuration errors: they are detected before any stage
/// does network work.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> Result<(), PipelineError> {
    fs::create_dir_all(path).await.map_err(|e| {
        PipelineError::Configuration(format!(
            "output directory {} cannot be created: {e}",
            path.display()
        ))
    })?;
    let probe_path = path.join("..__probe_write__");
    fs::write(&probe_path, b"").await.map_err(|e| {
        PipelineError::Configuration(format!(
            "output directory {} is not writable: {e}",
            path.display()
        ))
    })?;
    let _ = fs::remove_file(&probe_path).await;
    info!("Output directory is writable");
    Ok(())
}
