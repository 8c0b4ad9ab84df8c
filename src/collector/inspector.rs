//! Source inspection.
//!
//! Given one URL, works out which kind of source it is and proposes a
//! [`SourceConfig`] for it, then runs that config through the same fetch
//! path the collector uses to show what would be extracted. Nothing is
//! persisted.
//!
//! # Detection order
//!
//! 1. The body parses as a feed: `rss`
//! 2. The body is JSON containing a list of objects with URL and title
//!    fields: `api`
//! 3. Anything else: `html`, with selectors inferred from the page

use super::{FetchLimits, FetchPage, fetch_source};
use crate::config::{ApiHowto, HtmlHowto, Howto, RssHowto, SourceConfig, SourceKind};
use crate::error::PipelineError;
use crate::models::CollectedItem;
use crate::utils::normalize_whitespace;
use chrono::Utc;
use itertools::Itertools;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde_json::{Map, Value};
use std::fmt::Write;
use tracing::{info, instrument, warn};

/// Items fetched for the preview.
pub const PREVIEW_LIMIT: usize = 3;
/// Item limit written into a suggested feed config.
const SUGGESTED_ITEM_LIMIT: usize = 50;
/// Anchors with shorter text are treated as navigation.
const MIN_LINK_TEXT_CHARS: usize = 10;

const ITEM_LIST_KEYS: [&str; 6] = ["items", "data", "results", "articles", "posts", "news"];
const URL_FIELDS: [&str; 5] = ["canonical_url", "url", "link", "href", "permalink"];
const TITLE_FIELDS: [&str; 3] = ["title", "headline", "name"];
const DATE_FIELDS: [&str; 9] = [
    "post_date",
    "date",
    "published",
    "published_at",
    "publishedAt",
    "created_at",
    "createdAt",
    "updated_at",
    "updatedAt",
];
const CONTENT_FIELDS: [&str; 8] = [
    "body_html",
    "body_json",
    "truncated_body_text",
    "description",
    "content",
    "summary",
    "body",
    "text",
];

static ANCHORS: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());

/// Result of inspecting one URL.
#[derive(Debug, Clone)]
pub struct Inspection {
    pub suggested: SourceConfig,
    pub preview: Vec<CollectedItem>,
    /// Why the preview is empty, when fetching it failed.
    pub preview_error: Option<String>,
}

impl Inspection {
    /// YAML snippet ready to paste under `collector.sources`, followed by the
    /// preview.
    pub fn render(&self) -> Result<String, PipelineError> {
        let yaml = serde_yaml::to_string(&[&self.suggested]).map_err(|e| PipelineError::Inspection {
            url: self.suggested.url.clone(),
            reason: format!("cannot render config: {e}"),
        })?;

        let mut out = String::new();
        writeln!(out, "# Suggested source ({:?})", self.suggested.kind).unwrap();
        out.push_str(&yaml);
        writeln!(out, "\n# Preview").unwrap();
        match (&self.preview_error, self.preview.is_empty()) {
            (Some(e), _) => {
                writeln!(out, "# preview failed: {e}").unwrap();
            }
            (None, true) => {
                writeln!(out, "# no items extracted").unwrap();
            }
            (None, false) => {
                for (i, item) in self.preview.iter().enumerate() {
                    writeln!(out, "# {}. {}", i + 1, item.title).unwrap();
                    writeln!(out, "#    {}", item.url).unwrap();
                    if let Some(published) = &item.published {
                        writeln!(out, "#    published: {published}").unwrap();
                    }
                }
            }
        }
        Ok(out)
    }
}

/// Inspects a URL using any [`FetchPage`] implementation.
#[derive(Debug, Clone)]
pub struct SourceInspector<F> {
    fetcher: F,
}

impl<F: FetchPage> SourceInspector<F> {
    pub fn new(fetcher: F) -> Self {
        Self { fetcher }
    }

    #[instrument(level = "info", skip(self))]
    pub async fn inspect(&self, url: &str) -> Result<Inspection, PipelineError> {
        let parsed = url::Url::parse(url).map_err(|e| PipelineError::Inspection {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        let body = self
            .fetcher
            .fetch_page(parsed.as_str())
            .await
            .map_err(|reason| PipelineError::Inspection {
                url: url.to_string(),
                reason,
            })?;

        let suggested = detect_source(parsed.as_str(), &body);
        info!(kind = ?suggested.kind, "Detected source type");

        let limits = FetchLimits {
            max_items: PREVIEW_LIMIT,
            lookback_days: i64::from(u16::MAX),
        };
        let (preview, preview_error) =
            match fetch_source(&self.fetcher, &suggested, &limits, Utc::now()).await {
                Ok(items) => (items, None),
                Err(e) => {
                    warn!(error = %e, "Preview fetch failed");
                    (Vec::new(), Some(e.reason))
                }
            };

        Ok(Inspection {
            suggested,
            preview,
            preview_error,
        })
    }
}

/// Infer a source configuration from a fetched body. Pure.
pub fn detect_source(url: &str, body: &str) -> SourceConfig {
    let name = Some(name_from_url(url));

    if looks_like_feed(body) {
        return SourceConfig {
            name,
            url: url.to_string(),
            kind: SourceKind::Rss,
            howto: Howto {
                rss: Some(RssHowto {
                    item_limit: Some(SUGGESTED_ITEM_LIMIT),
                    fetch_full_text: true,
                }),
                ..Howto::default()
            },
        };
    }

    if let Some(api) = serde_json::from_str::<Value>(body).ok().as_ref().and_then(detect_api) {
        return SourceConfig {
            name,
            url: url.to_string(),
            kind: SourceKind::Api,
            howto: Howto {
                api: Some(api),
                ..Howto::default()
            },
        };
    }

    SourceConfig {
        name,
        url: url.to_string(),
        kind: SourceKind::Html,
        howto: Howto {
            html: Some(detect_html(body)),
            ..Howto::default()
        },
    }
}

/// XML feeds count even when empty; a JSON document only counts as a feed
/// when it actually yields entries.
fn looks_like_feed(body: &str) -> bool {
    match feed_rs::parser::parse(body.as_bytes()) {
        Ok(feed) => !feed.entries.is_empty() || body.trim_start().starts_with('<'),
        Err(_) => false,
    }
}

fn name_from_url(url: &str) -> String {
    url.trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_matches('/')
        .to_string()
}

/// Locate the first list of objects: the root itself, a well-known key, or
/// the same search one object deeper. Returns the dot path and the list.
fn find_item_list(value: &Value) -> Option<(String, &Vec<Value>)> {
    match value {
        Value::Array(items) => Some((String::new(), items)),
        Value::Object(map) => find_in_object(map),
        _ => None,
    }
}

fn find_in_object(map: &Map<String, Value>) -> Option<(String, &Vec<Value>)> {
    let direct = ITEM_LIST_KEYS.iter().find_map(|key| match map.get(*key) {
        Some(Value::Array(items)) if items.first().is_some_and(Value::is_object) => {
            Some((key.to_string(), items))
        }
        _ => None,
    });
    direct.or_else(|| {
        map.iter().find_map(|(key, value)| match value {
            Value::Object(inner) => find_in_object(inner).map(|(sub, items)| {
                let path = if sub.is_empty() { key.clone() } else { format!("{key}.{sub}") };
                (path, items)
            }),
            _ => None,
        })
    })
}

fn pick_field(sample: &Map<String, Value>, candidates: &[&str]) -> Option<String> {
    candidates
        .iter()
        .find(|key| sample.contains_key(**key))
        .map(|key| key.to_string())
}

fn detect_api(doc: &Value) -> Option<ApiHowto> {
    let (path, items) = find_item_list(doc)?;
    let sample = items.first()?.as_object()?;
    Some(ApiHowto {
        items_path: if path.is_empty() { "$".to_string() } else { path },
        url_field: pick_field(sample, &URL_FIELDS)?,
        title_field: pick_field(sample, &TITLE_FIELDS)?,
        date_field: pick_field(sample, &DATE_FIELDS),
        content_field: pick_field(sample, &CONTENT_FIELDS),
    })
}

/// The `a.<classes>` selector with the most distinct hrefs among anchors
/// with real link text, else `a[href]`.
fn infer_list_selector(doc: &Html) -> String {
    doc.select(&ANCHORS)
        .filter_map(|a| {
            let text = normalize_whitespace(&a.text().collect::<String>());
            if text.chars().count() < MIN_LINK_TEXT_CHARS {
                return None;
            }
            let classes = a.value().classes().sorted().collect::<Vec<_>>();
            if classes.is_empty() {
                return None;
            }
            let href = a.value().attr("href")?.to_string();
            Some((format!("a.{}", classes.join(".")), href))
        })
        .into_group_map()
        .into_iter()
        .map(|(selector, hrefs)| (hrefs.into_iter().unique().count(), selector))
        // Ties go to the lexically smallest selector so output is stable.
        .max_by(|a, b| a.0.cmp(&b.0).then_with(|| b.1.cmp(&a.1)))
        .map(|(_, selector)| selector)
        .unwrap_or_else(|| "a[href]".to_string())
}

fn first_present(doc: &Html, candidates: &[&str]) -> Option<String> {
    candidates
        .iter()
        .find(|css| {
            Selector::parse(css)
                .ok()
                .is_some_and(|s| doc.select(&s).next().is_some())
        })
        .map(|css| css.to_string())
}

fn detect_html(body: &str) -> HtmlHowto {
    let doc = Html::parse_document(body);
    HtmlHowto {
        list_selector: infer_list_selector(&doc),
        title_selector: first_present(&doc, &["h1"]).unwrap_or_else(|| "title".to_string()),
        date_selector: Some(
            first_present(&doc, &["time", ".date", ".published", ".timestamp"])
                .unwrap_or_else(|| "time".to_string()),
        ),
        content_selector: first_present(&doc, &["article", "main"])
            .unwrap_or_else(|| "body".to_string()),
    }
}
