//! Summary generation for one batch.
//!
//! Every collected item is condensed by the LLM into a short factual
//! summary, then the batch is rendered as one Markdown document: front
//! matter followed by a `####` section per item, in item-set order.
//!
//! Summaries are cached by item fingerprint, so a re-run only asks the LLM
//! about items it has not summarized before. Summaries finished before a
//! failure stay in the cache.
//!
//! With `--skip-summarize` the document is written without any LLM call;
//! cached summaries are used and the other summary lines are left empty.

use crate::api::AskAsync;
use crate::batch::BatchKey;
use crate::config::FrontMatterConfig;
use crate::error::PipelineError;
use crate::models::{CollectedItem, ItemSet, SummaryCache};
use crate::outputs::markdown::FrontMatter;
use crate::utils::truncate_for_log;
use chrono::{NaiveDate, SecondsFormat};
use futures::stream::{self, StreamExt};
use std::fmt::Write;
use tracing::{debug, info, instrument};

const SUMMARY_INSTRUCTIONS: &str = "Summarize the given news article. \
Keep it concise (2-5 sentences), factual, and neutral. \
Do not add information not present in the text.";

/// Produces the summary document of a batch.
pub trait Analyze {
    /// Render the summary document of `items`. New summaries are added to
    /// `cache` as they arrive, including when the call fails part way.
    async fn analyze(
        &self,
        batch: BatchKey,
        items: &ItemSet,
        cache: &mut SummaryCache,
    ) -> Result<String, PipelineError>;
}

#[derive(Debug, Clone)]
pub struct Analyzer<L> {
    /// `None` when summarization is skipped.
    llm: Option<L>,
    concurrency: usize,
    front_matter: FrontMatterConfig,
    run_date: NaiveDate,
}

impl<L: AskAsync> Analyzer<L> {
    pub fn new(
        llm: Option<L>,
        concurrency: usize,
        front_matter: FrontMatterConfig,
        run_date: NaiveDate,
    ) -> Self {
        Self {
            llm,
            concurrency: concurrency.max(1),
            front_matter,
            run_date,
        }
    }

    async fn summarize(&self, llm: &L, item: &CollectedItem) -> Result<String, String> {
        let input = format!("{}\n\n{}", item.title, item.body);
        let summary = llm
            .ask(SUMMARY_INSTRUCTIONS, &input)
            .await
            .map_err(|e| format!("summarizing {}: {e}", item.url))?;
        debug!(url = %item.url, summary = %truncate_for_log(&summary, 120), "Summarized item");
        Ok(summary)
    }
}

impl<L: AskAsync> Analyze for Analyzer<L> {
    #[instrument(level = "info", skip_all, fields(%batch, items = items.len()))]
    async fn analyze(
        &self,
        batch: BatchKey,
        items: &ItemSet,
        cache: &mut SummaryCache,
    ) -> Result<String, PipelineError> {
        let pending: Vec<&CollectedItem> = items
            .iter()
            .filter(|item| cache.get(&item.fingerprint).is_none())
            .collect();
        info!(
            cached = items.len() - pending.len(),
            pending = pending.len(),
            "Checked summary cache"
        );

        match &self.llm {
            None => info!("Summarization skipped"),
            Some(llm) => {
                // `buffered` keeps item order; the first failure aborts the batch.
                let mut summaries = stream::iter(pending)
                    .map(|item| async move { (item, self.summarize(llm, item).await) })
                    .buffered(self.concurrency);
                while let Some((item, summary)) = summaries.next().await {
                    let summary = summary.map_err(|reason| PipelineError::Analysis { batch, reason })?;
                    cache.insert(item.fingerprint.clone(), summary);
                }
            }
        }

        let summaries: Vec<String> = items
            .iter()
            .map(|item| cache.get(&item.fingerprint).unwrap_or_default().to_string())
            .collect();
        let document = render_summary(
            batch,
            items,
            &summaries,
            &self.front_matter,
            self.run_date,
        );
        info!(bytes = document.len(), "Rendered summary document");
        Ok(document)
    }
}

/// Render the summary document. `summaries` is parallel to `items`.
pub fn render_summary(
    batch: BatchKey,
    items: &ItemSet,
    summaries: &[String],
    front_matter: &FrontMatterConfig,
    run_date: NaiveDate,
) -> String {
    let title = format!("News Summary ({batch})");
    let mut md = FrontMatter {
        title: &title,
        date: run_date,
        config: front_matter,
    }
    .render();

    if items.is_empty() {
        md.push_str("_No items were collected for this batch._\n");
        return md;
    }

    for (item, summary) in items.iter().zip(summaries) {
        writeln!(md, "#### {}", item.title).unwrap();
        writeln!(md, "- URL: {}", item.url).unwrap();
        writeln!(md, "- Source: {}", item.source).unwrap();
        writeln!(
            md,
            "- Published: {}",
            item.published.as_deref().unwrap_or("unknown")
        )
        .unwrap();
        writeln!(
            md,
            "- Collected: {}",
            item.retrieved_at.to_rfc3339_opts(SecondsFormat::Secs, true)
        )
        .unwrap();
        writeln!(md, "- Summary:").unwrap();
        writeln!(md, "  {}", summary.trim()).unwrap();
        writeln!(md).unwrap();
    }
    md
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeLlm, sample_items};

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 6, 30).unwrap()
    }

    fn batch() -> BatchKey {
        BatchKey::new(2026, 6).unwrap()
    }

    #[tokio::test]
    async fn test_summarizes_every_item_in_order() {
        let llm = FakeLlm::new();
        let analyzer = Analyzer::new(Some(llm.clone()), 3, FrontMatterConfig::default(), date());
        let items = sample_items(batch(), 4);

        let mut cache = SummaryCache::default();
        let doc = analyzer.analyze(batch(), &items, &mut cache).await.unwrap();
        assert_eq!(llm.calls(), 4);
        assert_eq!(cache.len(), 4);
        assert!(doc.starts_with("---\ntitle: News Summary (2026-06)\n"));
        assert!(doc.contains("date: 2026-06-30"));

        let positions: Vec<_> = (0..4)
            .map(|i| doc.find(&format!("#### Story {i}\n")).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        assert!(doc.contains("- Summary:\n  summary: Story 0"));
        assert!(doc.contains("- Published: unknown"));
        assert!(doc.contains("- Collected: 2026-06-02T08:00:00Z"));
    }

    #[tokio::test]
    async fn test_skip_summarize_makes_no_calls() {
        let analyzer: Analyzer<FakeLlm> =
            Analyzer::new(None, 4, FrontMatterConfig::default(), date());
        let items = sample_items(batch(), 2);
        let doc = analyzer
            .analyze(batch(), &items, &mut SummaryCache::default())
            .await
            .unwrap();
        assert!(doc.contains("#### Story 1"));
        assert!(doc.contains("- Summary:\n  \n"));
    }

    #[tokio::test]
    async fn test_skip_summarize_renders_cached_summaries() {
        let analyzer: Analyzer<FakeLlm> =
            Analyzer::new(None, 4, FrontMatterConfig::default(), date());
        let items = sample_items(batch(), 2);
        let mut cache = SummaryCache::default();
        cache.insert(items.iter().next().unwrap().fingerprint.clone(), "Cached words.");

        let doc = analyzer.analyze(batch(), &items, &mut cache).await.unwrap();
        assert!(doc.contains("#### Story 0\n"));
        assert!(doc.contains("- Summary:\n  Cached words.\n"));
        assert!(doc.contains("- Summary:\n  \n"));
    }

    #[tokio::test]
    async fn test_rerun_only_summarizes_new_items() {
        let llm = FakeLlm::new();
        let analyzer = Analyzer::new(Some(llm.clone()), 2, FrontMatterConfig::default(), date());
        let mut cache = SummaryCache::default();

        let first = analyzer
            .analyze(batch(), &sample_items(batch(), 3), &mut cache)
            .await
            .unwrap();
        assert_eq!(llm.calls(), 3);

        let again = analyzer
            .analyze(batch(), &sample_items(batch(), 3), &mut cache)
            .await
            .unwrap();
        assert_eq!(llm.calls(), 3);
        assert_eq!(first, again);

        analyzer
            .analyze(batch(), &sample_items(batch(), 5), &mut cache)
            .await
            .unwrap();
        assert_eq!(llm.calls(), 5);
    }

    #[tokio::test]
    async fn test_llm_failure_is_analysis_error() {
        let llm = FakeLlm::failing();
        let analyzer = Analyzer::new(Some(llm), 2, FrontMatterConfig::default(), date());
        let err = analyzer
            .analyze(batch(), &sample_items(batch(), 3), &mut SummaryCache::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Analysis { batch: b, .. } if b == batch()));
    }

    #[tokio::test]
    async fn test_failure_keeps_finished_summaries() {
        let llm = FakeLlm::failing_on("Story 2");
        let analyzer = Analyzer::new(Some(llm), 1, FrontMatterConfig::default(), date());
        let items = sample_items(batch(), 4);
        let mut cache = SummaryCache::default();

        assert!(analyzer.analyze(batch(), &items, &mut cache).await.is_err());
        assert_eq!(cache.len(), 2);
        let first = &items.iter().next().unwrap().fingerprint;
        assert_eq!(cache.get(first), Some("summary: Story 0"));
    }

    #[test]
    fn test_empty_item_set_renders_note() {
        let doc = render_summary(
            batch(),
            &ItemSet::new(batch()),
            &[],
            &FrontMatterConfig::default(),
            date(),
        );
        assert!(doc.contains("_No items were collected for this batch._"));
    }
}
