//! Deterministic collaborators for tests.

use crate::api::{AskAsync, LlmError};
use crate::batch::BatchKey;
use crate::collector::FetchPage;
use crate::models::{CollectedItem, ItemSet};
use chrono::{TimeZone, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Serves canned pages by exact URL; anything else is a 404.
#[derive(Debug, Clone, Default)]
pub struct FakeFetcher {
    pages: HashMap<String, String>,
    calls: Arc<AtomicUsize>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: &str, body: &str) -> Self {
        self.pages.insert(url.to_string(), body.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl FetchPage for FakeFetcher {
    async fn fetch_page(&self, url: &str) -> Result<String, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| format!("HTTP 404 for {url}"))
    }
}

/// Answers from its input alone, so equal inputs give equal outputs.
#[derive(Debug, Clone, Default)]
pub struct FakeLlm {
    calls: Arc<AtomicUsize>,
    fail: bool,
    fail_on: Option<String>,
}

impl FakeLlm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call fails with a non-retryable error.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Fails only when the input contains `needle`.
    pub fn failing_on(needle: &str) -> Self {
        Self {
            fail_on: Some(needle.to_string()),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl AskAsync for FakeLlm {
    async fn ask(&self, instructions: &str, input: &str) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let rejected = self.fail_on.as_deref().is_some_and(|needle| input.contains(needle));
        if self.fail || rejected {
            return Err(LlmError::Status {
                status: 400,
                body: "rejected".to_string(),
            });
        }
        if instructions.starts_with("Summarize") {
            let first = input.lines().next().unwrap_or_default();
            return Ok(format!("summary: {first}"));
        }
        let headings: Vec<&str> = input
            .lines()
            .filter_map(|l| l.strip_prefix("#### "))
            .collect();
        Ok(format!(
            "# Monthly roundup\n\n## Highlights\n\n- {} stories\n\n## Detailed Coverage\n\n{}\n",
            headings.len(),
            headings.iter().map(|h| format!("- {h}")).collect::<Vec<_>>().join("\n")
        ))
    }
}

/// `n` distinct items titled `Story 0`, `Story 1`, ...
pub fn sample_items(batch: BatchKey, n: usize) -> ItemSet {
    let mut items = ItemSet::new(batch);
    for i in 0..n {
        items.insert(CollectedItem::new(
            "Example",
            format!("https://example.com/story-{i}"),
            format!("Story {i}"),
            format!("Body of story {i}."),
            None,
            Utc.with_ymd_and_hms(2026, 6, 2, 8, 0, 0).unwrap(),
        ));
    }
    items
}
