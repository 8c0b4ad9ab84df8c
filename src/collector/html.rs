//! Static HTML sources.
//!
//! The listing page is fetched and every anchor matching `list_selector` is
//! resolved against the page URL. Each article page is then fetched and
//! parsed with the title, date and content selectors. Pages that fail to
//! load or lack a title or content are skipped.
//!
//! Parsing happens in plain functions so no `scraper::Html` is held across
//! an await point.

use super::{FetchLimits, FetchPage, SourceEntry, source_error};
use crate::config::{HtmlSelectors, SourceConfig};
use crate::error::SourceFetchError;
use crate::utils::{is_same_url, normalize_url, normalize_whitespace};
use futures::stream::{self, StreamExt};
use itertools::Itertools;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, instrument, warn};
use url::Url;

static ARTICLE: Lazy<Selector> = Lazy::new(|| Selector::parse("article").unwrap());
static BODY: Lazy<Selector> = Lazy::new(|| Selector::parse("body").unwrap());

/// Text of an element, skipping script and style content.
pub fn element_text(element: ElementRef<'_>) -> String {
    let parts = element.descendants().filter_map(|node| {
        let text = node.value().as_text()?;
        let hidden = node
            .parent()
            .and_then(|p| p.value().as_element())
            .is_some_and(|e| matches!(e.name(), "script" | "style" | "noscript"));
        (!hidden).then_some(&**text)
    });
    normalize_whitespace(&parts.collect::<Vec<_>>().join(" "))
}

/// Convert an HTML fragment (a feed excerpt, say) to plain text.
pub fn html_to_text(fragment: &str) -> String {
    let doc = Html::parse_fragment(fragment);
    element_text(doc.root_element())
}

/// Text of the page's `<article>`, or of the whole body when there is none.
pub fn article_text(page: &str) -> String {
    let doc = Html::parse_document(page);
    doc.select(&ARTICLE)
        .next()
        .or_else(|| doc.select(&BODY).next())
        .map(element_text)
        .unwrap_or_default()
}

/// Absolute URLs of the anchors matching `list`, de-duplicated in page
/// order, without links back to the listing page itself.
pub fn extract_links(page: &str, base: &Url, list: &Selector) -> Vec<String> {
    let doc = Html::parse_document(page);
    let base_norm = normalize_url(base.as_str());
    doc.select(list)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| base.join(href.trim()).ok())
        .map(|url| url.to_string())
        .filter(|url| !is_same_url(url, &base_norm))
        .unique_by(|url| normalize_url(url))
        .collect()
}

/// Extract one article page. `None` when the title or content is missing.
pub fn extract_article(page: &str, url: &str, selectors: &HtmlSelectors) -> Option<SourceEntry> {
    let doc = Html::parse_document(page);
    let title = doc
        .select(&selectors.title)
        .next()
        .map(element_text)
        .filter(|t| !t.is_empty())?;
    let published = selectors
        .date
        .as_ref()
        .and_then(|date| doc.select(date).next())
        .map(|el| {
            el.value()
                .attr("datetime")
                .map(str::to_string)
                .unwrap_or_else(|| element_text(el))
        })
        .filter(|d| !d.is_empty());
    let body = doc
        .select(&selectors.content)
        .next()
        .or_else(|| doc.select(&BODY).next())
        .map(element_text)
        .filter(|b| !b.is_empty())?;
    Some(SourceEntry {
        url: url.to_string(),
        title,
        body,
        published,
    })
}

fn listing(
    source: &SourceConfig,
    page: &str,
    limits: &FetchLimits,
) -> Result<(Vec<String>, HtmlSelectors), SourceFetchError> {
    let howto = source
        .howto
        .html
        .as_ref()
        .ok_or_else(|| source_error(source, "missing howto.html"))?;
    let selectors = howto.selectors().map_err(|e| source_error(source, e))?;
    let base = Url::parse(&source.url).map_err(|e| source_error(source, e.to_string()))?;
    let mut links = extract_links(page, &base, &selectors.list);
    links.truncate(limits.max_items);
    Ok((links, selectors))
}

/// Fetch the listing page and every linked article.
#[instrument(level = "info", skip_all, fields(url = %source.url))]
pub async fn fetch<F: FetchPage>(
    fetcher: &F,
    source: &SourceConfig,
    limits: &FetchLimits,
) -> Result<Vec<SourceEntry>, SourceFetchError> {
    let page = fetcher
        .fetch_page(&source.url)
        .await
        .map_err(|e| source_error(source, e))?;
    let (links, selectors) = listing(source, &page, limits)?;
    info!(count = links.len(), "Indexed article URLs");

    let selectors = &selectors;
    let entries: Vec<SourceEntry> = stream::iter(links)
        .then(|url: String| async move {
            match fetcher.fetch_page(&url).await {
                Ok(body) => {
                    let entry = extract_article(&body, &url, selectors);
                    if entry.is_none() {
                        warn!(%url, "Article page produced no title or content");
                    }
                    entry
                }
                Err(e) => {
                    warn!(error = %e, %url, "Article fetch failed");
                    None
                }
            }
        })
        .filter_map(std::future::ready)
        .collect()
        .await;

    debug!(count = entries.len(), "Fetched article contents");
    Ok(entries)
}

pub async fn list_urls<F: FetchPage>(
    fetcher: &F,
    source: &SourceConfig,
    limits: &FetchLimits,
) -> Result<Vec<String>, SourceFetchError> {
    let page = fetcher
        .fetch_page(&source.url)
        .await
        .map_err(|e| source_error(source, e))?;
    Ok(listing(source, &page, limits)?.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HtmlHowto, Howto, SourceKind};
    use crate::testing::FakeFetcher;

    const LISTING: &str = r#"
<html><body>
  <a class="nav" href="/">Home</a>
  <a class="post-link" href="/posts/one">Post one</a>
  <a class="post-link" href="https://example.com/posts/two">Post two</a>
  <a class="post-link" href="/posts/one#comments">Post one again</a>
  <a class="post-link" href="/posts/broken">Broken</a>
</body></html>"#;

    fn source() -> SourceConfig {
        SourceConfig {
            name: Some("Blog".to_string()),
            url: "https://example.com/".to_string(),
            kind: SourceKind::Html,
            howto: Howto {
                html: Some(HtmlHowto {
                    list_selector: "a.post-link".to_string(),
                    title_selector: "h1".to_string(),
                    date_selector: Some("time".to_string()),
                    content_selector: "article".to_string(),
                }),
                ..Howto::default()
            },
        }
    }

    fn limits() -> FetchLimits {
        FetchLimits {
            max_items: 10,
            lookback_days: 31,
        }
    }

    fn post(title: &str, body: &str) -> String {
        format!(
            r#"<html><head><script>var x = 1;</script></head><body><h1>{title}</h1><time datetime="2026-06-03">June 3</time><article><p>{body}</p></article></body></html>"#
        )
    }

    #[test]
    fn test_html_to_text_strips_markup() {
        assert_eq!(html_to_text("<p>Hello <b>world</b></p>\n<p>again</p>"), "Hello world again");
        assert_eq!(html_to_text("plain text"), "plain text");
    }

    #[test]
    fn test_article_text_prefers_article_and_skips_scripts() {
        let page = "<html><body><script>track()</script><div>chrome</div><article>Story</article></body></html>";
        assert_eq!(article_text(page), "Story");
        let no_article = "<html><body><script>track()</script><p>Only body</p></body></html>";
        assert_eq!(article_text(no_article), "Only body");
    }

    #[test]
    fn test_extract_links_resolves_and_dedupes() {
        let base = Url::parse("https://example.com/").unwrap();
        let list = Selector::parse("a.post-link").unwrap();
        let links = extract_links(LISTING, &base, &list);
        assert_eq!(
            links,
            vec![
                "https://example.com/posts/one",
                "https://example.com/posts/two",
                "https://example.com/posts/broken",
            ]
        );
    }

    #[test]
    fn test_extract_article_requires_title_and_content() {
        let selectors = source().howto.html.unwrap().selectors().unwrap();
        let entry = extract_article(&post("Title", "Body text"), "https://example.com/p", &selectors).unwrap();
        assert_eq!(entry.title, "Title");
        assert_eq!(entry.body, "Body text");
        assert_eq!(entry.published.as_deref(), Some("2026-06-03"));

        assert!(extract_article("<html><body><article>x</article></body></html>", "u", &selectors).is_none());
    }

    #[tokio::test]
    async fn test_fetch_skips_broken_articles() {
        let fetcher = FakeFetcher::new()
            .with_page("https://example.com/", LISTING)
            .with_page("https://example.com/posts/one", &post("One", "First body"))
            .with_page("https://example.com/posts/two", &post("Two", "Second body"));
        let entries = fetch(&fetcher, &source(), &limits()).await.unwrap();
        let titles: Vec<_> = entries.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["One", "Two"]);
    }

    #[tokio::test]
    async fn test_list_urls_respects_limit() {
        let fetcher = FakeFetcher::new().with_page("https://example.com/", LISTING);
        let tight = FetchLimits {
            max_items: 2,
            lookback_days: 31,
        };
        let urls = list_urls(&fetcher, &source(), &tight).await.unwrap();
        assert_eq!(urls.len(), 2);
        assert_eq!(fetcher.calls(), 1);
    }
}
