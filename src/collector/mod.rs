//! Content collection from configured sources.
//!
//! Each source kind has its own submodule, all following the same two-phase
//! pattern:
//!
//! 1. **Listing**: discover entry URLs (feed entries, listing page anchors,
//!    API items)
//! 2. **Fetching**: turn each entry into a [`CollectedItem`]
//!
//! # Source kinds
//!
//! | Kind | Module | Method |
//! |------|--------|--------|
//! | `rss` | [`rss`] | RSS/Atom via `feed-rs`, optional full-text fetch |
//! | `html` | [`html`] | Listing page anchors, one page per article |
//! | `api` | [`json_api`] | JSON document mapped by configured field names |
//!
//! Sources are fetched concurrently up to `fetch_concurrency`, but results
//! are merged in configuration order, so the resulting [`ItemSet`] is
//! deterministic for a given set of responses. A failing source is logged
//! and skipped.

pub mod html;
pub mod inspector;
pub mod json_api;
pub mod rss;

use crate::batch::BatchKey;
use crate::config::{CollectorConfig, SourceConfig, SourceKind};
use crate::error::SourceFetchError;
use crate::models::{CollectedItem, ItemSet};
use chrono::{DateTime, TimeDelta, Utc};
use futures::stream::{self, StreamExt};
use itertools::Itertools;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Per-source bounds applied while fetching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchLimits {
    pub max_items: usize,
    pub lookback_days: i64,
}

impl FetchLimits {
    pub fn from_config(config: &CollectorConfig) -> Self {
        Self {
            max_items: config.max_items_per_source,
            lookback_days: config.lookback_days,
        }
    }

    /// Entries published before this instant are dropped.
    pub fn cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        TimeDelta::try_days(self.lookback_days).and_then(|d| now.checked_sub_signed(d))
    }
}

/// Retrieves the body of one URL.
pub trait FetchPage {
    async fn fetch_page(&self, url: &str) -> Result<String, String>;
}

/// One entry as extracted from a source, before it becomes a
/// [`CollectedItem`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    pub url: String,
    pub title: String,
    pub body: String,
    pub published: Option<String>,
}

impl SourceEntry {
    pub fn into_item(self, source: &SourceConfig, retrieved_at: DateTime<Utc>) -> CollectedItem {
        CollectedItem::new(
            source.display_name(),
            self.url,
            self.title,
            self.body,
            self.published,
            retrieved_at,
        )
    }
}

pub(crate) fn source_error(source: &SourceConfig, reason: impl Into<String>) -> SourceFetchError {
    SourceFetchError {
        source_name: source.display_name().to_string(),
        url: source.url.clone(),
        reason: reason.into(),
    }
}

/// Fetch every item of one source.
#[instrument(level = "info", skip_all, fields(source = %source.display_name(), kind = ?source.kind))]
pub async fn fetch_source<F: FetchPage>(
    fetcher: &F,
    source: &SourceConfig,
    limits: &FetchLimits,
    now: DateTime<Utc>,
) -> Result<Vec<CollectedItem>, SourceFetchError> {
    let entries = match source.kind {
        SourceKind::Rss => rss::fetch(fetcher, source, limits, now).await?,
        SourceKind::Html => html::fetch(fetcher, source, limits).await?,
        SourceKind::Api => json_api::fetch(fetcher, source, limits).await?,
    };
    info!(count = entries.len(), "Fetched source entries");
    Ok(entries
        .into_iter()
        .map(|entry| entry.into_item(source, now))
        .collect())
}

/// List the entry URLs a source would yield, without fetching article pages.
#[instrument(level = "info", skip_all, fields(source = %source.display_name()))]
pub async fn list_source_urls<F: FetchPage>(
    fetcher: &F,
    source: &SourceConfig,
    limits: &FetchLimits,
    now: DateTime<Utc>,
) -> Result<Vec<String>, SourceFetchError> {
    match source.kind {
        SourceKind::Rss => rss::list_urls(fetcher, source, limits, now).await,
        SourceKind::Html => html::list_urls(fetcher, source, limits).await,
        SourceKind::Api => json_api::list_urls(fetcher, source, limits).await,
    }
}

/// Outcome of collecting one batch.
#[derive(Debug, Clone)]
pub struct Collection {
    pub items: ItemSet,
    pub failures: Vec<SourceFetchError>,
    /// Items fetched before de-duplication.
    pub fetched: usize,
    pub duplicates: usize,
}

/// Builds the item set of a batch from a list of sources.
pub trait Collect {
    async fn collect(&self, batch: BatchKey, sources: &[SourceConfig]) -> Collection;
}

/// Collector over any [`FetchPage`] implementation.
#[derive(Debug, Clone)]
pub struct Collector<F> {
    fetcher: F,
    limits: FetchLimits,
    concurrency: usize,
}

impl<F: FetchPage> Collector<F> {
    pub fn new(fetcher: F, limits: FetchLimits, concurrency: usize) -> Self {
        Self {
            fetcher,
            limits,
            concurrency: concurrency.max(1),
        }
    }

    /// Per-source URL listings, in configuration order.
    pub async fn list_urls(
        &self,
        sources: &[SourceConfig],
    ) -> Vec<(String, Result<Vec<String>, SourceFetchError>)> {
        let now = Utc::now();
        let fetcher = &self.fetcher;
        let limits = &self.limits;
        stream::iter(sources)
            .map(move |source| async move {
                let urls = list_source_urls(fetcher, source, limits, now).await;
                (source.display_name().to_string(), urls)
            })
            .buffered(self.concurrency)
            .collect()
            .await
    }
}

impl<F: FetchPage> Collect for Collector<F> {
    #[instrument(level = "info", skip_all, fields(%batch, sources = sources.len()))]
    async fn collect(&self, batch: BatchKey, sources: &[SourceConfig]) -> Collection {
        let now = Utc::now();
        let fetcher = &self.fetcher;
        let limits = &self.limits;

        // `buffered` keeps configuration order regardless of completion order.
        let results: Vec<Result<Vec<CollectedItem>, SourceFetchError>> = stream::iter(sources)
            .map(move |source| fetch_source(fetcher, source, limits, now))
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut items = ItemSet::new(batch);
        let mut failures = Vec::new();
        let mut fetched = 0usize;
        let mut duplicates = 0usize;

        for result in results {
            match result {
                Ok(source_items) => {
                    for item in source_items {
                        fetched += 1;
                        if !items.insert(item) {
                            duplicates += 1;
                        }
                    }
                }
                Err(e) => failures.push(e),
            }
        }

        if !failures.is_empty() {
            warn!(
                failed = failures.len(),
                sources = %failures.iter().map(|f| f.source_name.as_str()).join(", "),
                "Some sources could not be fetched; continuing without them"
            );
            for failure in &failures {
                debug!(error = %failure, "Source failure");
            }
        }
        info!(
            fetched,
            duplicates,
            kept = items.len(),
            "Collected batch items"
        );

        Collection {
            items,
            failures,
            fetched,
            duplicates,
        }
    }
}

/// [`FetchPage`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

impl FetchPage for HttpFetcher {
    #[instrument(level = "debug", skip_all, fields(%url))]
    async fn fetch_page(&self, url: &str) -> Result<String, String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| e.to_string())?;
        let body = response.text().await.map_err(|e| e.to_string())?;
        debug!(bytes = body.len(), "Fetched page");
        Ok(body)
    }
}
