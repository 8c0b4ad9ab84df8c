//! RSS and Atom sources.
//!
//! The feed is parsed with `feed-rs`. Each entry's content (or summary) is
//! converted to plain text; with `fetch_full_text` on, the linked page is
//! fetched as well and its `<article>` text replaces the excerpt when it is
//! not empty.
//!
//! # Filtering
//!
//! - Entries older than the lookback window are dropped; undated entries are kept
//! - Entries without a link or title are dropped
//! - Entries linking back to the feed URL itself are dropped

use super::html::{article_text, html_to_text};
use super::{FetchLimits, FetchPage, SourceEntry, source_error};
use crate::config::SourceConfig;
use crate::error::SourceFetchError;
use crate::utils::{is_same_url, normalize_url, normalize_whitespace};
use chrono::{DateTime, Utc};
use feed_rs::model::Entry;
use futures::stream::{self, StreamExt};
use tracing::{debug, info, instrument, warn};

/// Parse a feed document into entries, applying the source's limits.
///
/// # Arguments
///
/// * `source` - The configured source, used for its URL and item limit
/// * `xml` - The raw feed body
/// * `limits` - Item cap and lookback window
/// * `now` - Reference time for the lookback window
pub fn parse_entries(
    source: &SourceConfig,
    xml: &str,
    limits: &FetchLimits,
    now: DateTime<Utc>,
) -> Result<Vec<SourceEntry>, String> {
    let feed = feed_rs::parser::parse(xml.as_bytes()).map_err(|e| format!("invalid feed: {e}"))?;
    let source_norm = normalize_url(&source.url);
    let cutoff = limits.cutoff(now);
    let limit = item_limit(source, limits);

    let entries: Vec<SourceEntry> = feed
        .entries
        .iter()
        .filter_map(|entry| {
            let published = entry.published.or(entry.updated);
            if let (Some(published), Some(cutoff)) = (published, cutoff) {
                if published < cutoff {
                    debug!(%published, "Skipping entry outside lookback window");
                    return None;
                }
            }
            let link = entry
                .links
                .first()
                .map(|l| l.href.trim().to_string())
                .or_else(|| entry.id.starts_with("http").then(|| entry.id.clone()))?;
            let title = normalize_whitespace(&entry.title.as_ref()?.content);
            if link.is_empty() || title.is_empty() || is_same_url(&link, &source_norm) {
                return None;
            }
            Some(SourceEntry {
                url: link,
                title,
                body: entry_text(entry),
                published: published.map(|p| p.to_rfc3339()),
            })
        })
        .take(limit)
        .collect();

    Ok(entries)
}

/// Effective per-source cap: the collector cap, lowered by `item_limit`.
fn item_limit(source: &SourceConfig, limits: &FetchLimits) -> usize {
    source
        .howto
        .rss
        .as_ref()
        .and_then(|rss| rss.item_limit)
        .map_or(limits.max_items, |limit| limit.min(limits.max_items))
}

fn entry_text(entry: &Entry) -> String {
    let html = entry
        .content
        .as_ref()
        .and_then(|c| c.body.as_deref())
        .or_else(|| entry.summary.as_ref().map(|s| s.content.as_str()));
    html.map(html_to_text).unwrap_or_default()
}

fn fetch_full_text(source: &SourceConfig) -> bool {
    source.howto.rss.as_ref().is_none_or(|rss| rss.fetch_full_text)
}

/// Fetch the feed and, when enabled, the full text of every entry.
#[instrument(level = "info", skip_all, fields(url = %source.url))]
pub async fn fetch<F: FetchPage>(
    fetcher: &F,
    source: &SourceConfig,
    limits: &FetchLimits,
    now: DateTime<Utc>,
) -> Result<Vec<SourceEntry>, SourceFetchError> {
    let xml = fetcher
        .fetch_page(&source.url)
        .await
        .map_err(|e| source_error(source, e))?;
    let entries = parse_entries(source, &xml, limits, now).map_err(|e| source_error(source, e))?;
    info!(count = entries.len(), "Parsed feed entries");

    if !fetch_full_text(source) {
        return Ok(entries);
    }

    let entries = stream::iter(entries)
        .then(|mut entry| async move {
            match fetcher.fetch_page(&entry.url).await {
                Ok(page) => {
                    let text = article_text(&page);
                    if text.is_empty() {
                        debug!(url = %entry.url, "Article page had no text; keeping feed excerpt");
                    } else {
                        entry.body = text;
                    }
                }
                Err(e) => {
                    warn!(url = %entry.url, error = %e, "Full-text fetch failed; keeping feed excerpt");
                }
            }
            entry
        })
        .collect()
        .await;
    Ok(entries)
}

pub async fn list_urls<F: FetchPage>(
    fetcher: &F,
    source: &SourceConfig,
    limits: &FetchLimits,
    now: DateTime<Utc>,
) -> Result<Vec<String>, SourceFetchError> {
    let xml = fetcher
        .fetch_page(&source.url)
        .await
        .map_err(|e| source_error(source, e))?;
    let entries = parse_entries(source, &xml, limits, now).map_err(|e| source_error(source, e))?;
    Ok(entries.into_iter().map(|e| e.url).collect())
}
