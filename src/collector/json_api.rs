//! JSON API sources.
//!
//! The document at the source URL is fetched once. `items_path` selects the
//! item array (`$` for the root, dot-separated keys otherwise, numeric
//! segments indexing arrays) and each object is mapped through the
//! configured field names.

use super::{FetchLimits, FetchPage, SourceEntry, source_error};
use crate::config::{ApiHowto, SourceConfig};
use crate::error::SourceFetchError;
use crate::utils::{is_same_url, normalize_url, normalize_whitespace};
use serde_json::Value;
use tracing::{info, instrument};

/// Resolve a dot-separated path inside a JSON document.
pub fn get_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let path = path.trim();
    let path = path.strip_prefix("$.").unwrap_or(path);
    if path.is_empty() || path == "$" {
        return Some(value);
    }
    path.split('.').try_fold(value, |current, part| match current {
        Value::Object(map) => map.get(part),
        Value::Array(items) => part.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// A field rendered as text. Strings are taken as-is; numbers and booleans
/// are formatted; anything else is ignored.
fn field_text(item: &Value, field: &str) -> Option<String> {
    match get_path(item, field)? {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
    .filter(|s| !s.is_empty())
}

/// Map the document's item array to entries.
pub fn extract_items(
    source: &SourceConfig,
    doc: &Value,
    howto: &ApiHowto,
    limit: usize,
) -> Result<Vec<SourceEntry>, String> {
    let items = get_path(doc, &howto.items_path)
        .and_then(Value::as_array)
        .ok_or_else(|| format!("items_path '{}' did not resolve to a list", howto.items_path))?;
    let source_norm = normalize_url(&source.url);

    Ok(items
        .iter()
        .filter(|item| item.is_object())
        .filter_map(|item| {
            let url = field_text(item, &howto.url_field)?;
            let title = normalize_whitespace(&field_text(item, &howto.title_field)?);
            if is_same_url(&url, &source_norm) {
                return None;
            }
            Some(SourceEntry {
                url,
                title,
                body: howto
                    .content_field
                    .as_deref()
                    .and_then(|f| field_text(item, f))
                    .unwrap_or_default(),
                published: howto.date_field.as_deref().and_then(|f| field_text(item, f)),
            })
        })
        .take(limit)
        .collect())
}

fn parse(source: &SourceConfig, body: &str, limits: &FetchLimits) -> Result<Vec<SourceEntry>, SourceFetchError> {
    let howto = source
        .howto
        .api
        .as_ref()
        .ok_or_else(|| source_error(source, "missing howto.api"))?;
    let doc: Value =
        serde_json::from_str(body).map_err(|e| source_error(source, format!("invalid JSON: {e}")))?;
    extract_items(source, &doc, howto, limits.max_items).map_err(|e| source_error(source, e))
}

#[instrument(level = "info", skip_all, fields(url = %source.url))]
pub async fn fetch<F: FetchPage>(
    fetcher: &F,
    source: &SourceConfig,
    limits: &FetchLimits,
) -> Result<Vec<SourceEntry>, SourceFetchError> {
    let body = fetcher
        .fetch_page(&source.url)
        .await
        .map_err(|e| source_error(source, e))?;
    let entries = parse(source, &body, limits)?;
    info!(count = entries.len(), "Mapped API items");
    Ok(entries)
}

pub async fn list_urls<F: FetchPage>(
    fetcher: &F,
    source: &SourceConfig,
    limits: &FetchLimits,
) -> Result<Vec<String>, SourceFetchError> {
    let entries = fetch(fetcher, source, limits).await?;
    Ok(entries.into_iter().map(|e| e.url).collect())
}
