//! Blog article generation from a summary document.
//!
//! The LLM writes the article body. Whatever front matter it emits is
//! discarded, a leading `# ` heading becomes the title, and the final
//! article gets our own front matter plus a link back to the summary it was
//! generated from.

use crate::api::AskAsync;
use crate::batch::BatchKey;
use crate::config::FrontMatterConfig;
use crate::error::PipelineError;
use crate::models::SummaryArtifact;
use crate::outputs::markdown::{FrontMatter, strip_front_matter, take_title};
use chrono::NaiveDate;
use tracing::{info, instrument};

const BLOG_INSTRUCTIONS: &str = "Write a monthly blog post in markdown based on the provided news summary. \
Include a Highlights section (bulleted) and a Detailed Coverage section \
with short commentary per item. Start with a level-1 heading holding the post title.";

/// Title used when the model does not open with a `# ` heading.
pub const DEFAULT_TITLE: &str = "Monthly AI News";

/// Produces the article of a batch from its summary.
pub trait Generate {
    async fn generate(
        &self,
        batch: BatchKey,
        summary: &SummaryArtifact,
    ) -> Result<String, PipelineError>;
}

#[derive(Debug, Clone)]
pub struct Blogger<L> {
    llm: L,
    markdown_instructions: Option<String>,
    front_matter: FrontMatterConfig,
    run_date: NaiveDate,
}

impl<L: AskAsync> Blogger<L> {
    pub fn new(
        llm: L,
        markdown_instructions: Option<String>,
        front_matter: FrontMatterConfig,
        run_date: NaiveDate,
    ) -> Self {
        Self {
            llm,
            markdown_instructions,
            front_matter,
            run_date,
        }
    }

    fn instructions(&self) -> String {
        match self.markdown_instructions.as_deref().map(str::trim) {
            Some(extra) if !extra.is_empty() => {
                format!("{BLOG_INSTRUCTIONS}\n\nFormatting rules:\n{extra}")
            }
            _ => BLOG_INSTRUCTIONS.to_string(),
        }
    }
}

impl<L: AskAsync> Generate for Blogger<L> {
    #[instrument(level = "info", skip_all, fields(%batch, summary = %summary.path.display()))]
    async fn generate(
        &self,
        batch: BatchKey,
        summary: &SummaryArtifact,
    ) -> Result<String, PipelineError> {
        let generated = self
            .llm
            .ask(&self.instructions(), &summary.content)
            .await
            .map_err(|e| PipelineError::Generation {
                batch,
                reason: e.to_string(),
            })?;

        let article = compose_article(&generated, batch, summary, &self.front_matter, self.run_date);
        info!(bytes = article.len(), "Composed article");
        Ok(article)
    }
}

/// Turn model output into the final article. Pure.
pub fn compose_article(
    generated: &str,
    batch: BatchKey,
    summary: &SummaryArtifact,
    front_matter: &FrontMatterConfig,
    run_date: NaiveDate,
) -> String {
    let body = strip_front_matter(generated);
    let (title, body) = take_title(body, DEFAULT_TITLE);

    let mut article = FrontMatter {
        title: &title,
        date: run_date,
        config: front_matter,
    }
    .render();
    article.push_str(body.trim_end());

    let summary_stem = summary
        .path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    article.push_str(&format!(
        "\n\n---\n\n- [News summary: {batch}](../news_summaries/{summary_stem})\n"
    ));
    article
}
