//! Pipeline configuration loaded from YAML.
//!
//! Every section has defaults, so a config file only needs the sources. The
//! LLM credential is never stored in the file: `llm.api_key_env` names the
//! environment variable holding it, which is read once at startup.
//!
//! ```yaml
//! collector:
//!   sources:
//!     - name: Example feed
//!       url: https://example.com/feed.xml
//!       type: rss
//!       howto:
//!         rss: { item_limit: 50 }
//! ```

use crate::api::RetryPolicy;
use crate::error::PipelineError;
use scraper::Selector;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{info, instrument};

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub collector: CollectorConfig,
    pub analyzer: AnalyzerConfig,
    pub blogger: BloggerConfig,
    pub front_matter: FrontMatterConfig,
    pub llm: LlmConfig,
}

impl PipelineConfig {
    /// Load and validate the configuration at `path`.
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Configuration(format!(
                "cannot read config file {}: {e}",
                path.display()
            ))
        })?;
        let config = Self::from_yaml_str(&yaml)?;
        info!(
            sources = config.collector.sources.len(),
            model = %config.llm.model,
            "Loaded configuration"
        );
        Ok(config)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, PipelineError> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| PipelineError::Configuration(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field rules serde cannot express.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let c = &self.collector;
        if c.fetch_concurrency == 0 {
            return Err(PipelineError::Configuration(
                "collector.fetch_concurrency must be at least 1".to_string(),
            ));
        }
        if c.max_items_per_source == 0 {
            return Err(PipelineError::Configuration(
                "collector.max_items_per_source must be at least 1".to_string(),
            ));
        }
        if self.analyzer.concurrency == 0 {
            return Err(PipelineError::Configuration(
                "analyzer.concurrency must be at least 1".to_string(),
            ));
        }
        for source in &c.sources {
            source.validate()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Feed entries older than this many days are dropped.
    pub lookback_days: i64,
    pub max_items_per_source: usize,
    /// How many sources are fetched at once.
    pub fetch_concurrency: usize,
    pub sources: Vec<SourceConfig>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            lookback_days: 31,
            max_items_per_source: 20,
            fetch_concurrency: 4,
            sources: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// How many items are summarized at once.
    pub concurrency: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self { concurrency: 4 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct BloggerConfig {
    /// Extra formatting instructions appended to the blog prompt.
    pub markdown_instructions: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FrontMatterConfig {
    pub tags: Vec<String>,
    pub layout: String,
}

impl Default for FrontMatterConfig {
    fn default() -> Self {
        Self {
            tags: vec!["AI".to_string(), "News".to_string()],
            layout: "layouts/post.njk".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible API, without `/chat/completions`.
    pub base_url: String,
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub timeout_secs: u64,
    pub retry: RetrySettings,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_secs: 120,
            retry: RetrySettings::default(),
        }
    }
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Read the credential from the configured environment variable.
    ///
    /// Called once at startup; the value is then passed explicitly to the
    /// client.
    pub fn credential(&self) -> Result<String, PipelineError> {
        match std::env::var(&self.api_key_env) {
            Ok(key) if !key.trim().is_empty() => Ok(key.trim().to_string()),
            _ => Err(PipelineError::Configuration(format!(
                "LLM credential missing: set {} in the environment or the env file",
                self.api_key_env
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_retries: usize,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_retries: policy.max_retries,
            base_delay_ms: policy.base_delay.as_millis() as u64,
            max_delay_ms: policy.max_delay.as_millis() as u64,
            jitter_ms: policy.jitter.as_millis() as u64,
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            jitter: Duration::from_millis(self.jitter_ms),
        }
    }
}

/// Kind of source, selecting how it is fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Rss,
    Html,
    Api,
}

/// One configured content source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub url: String,
    #[serde(rename = "type")]
    pub kind: SourceKind,
    #[serde(default)]
    pub howto: Howto,
}

impl SourceConfig {
    /// The configured name, or the URL when no name was given.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.url)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        let invalid = |msg: String| {
            PipelineError::Configuration(format!("source {}: {msg}", self.display_name()))
        };
        url::Url::parse(&self.url).map_err(|e| invalid(format!("invalid url: {e}")))?;
        match self.kind {
            SourceKind::Rss => Ok(()),
            SourceKind::Html => {
                let html = self
                    .howto
                    .html
                    .as_ref()
                    .ok_or_else(|| invalid("type html requires howto.html".to_string()))?;
                html.selectors().map_err(invalid)?;
                Ok(())
            }
            SourceKind::Api => {
                let api = self
                    .howto
                    .api
                    .as_ref()
                    .ok_or_else(|| invalid("type api requires howto.api".to_string()))?;
                if api.url_field.trim().is_empty() || api.title_field.trim().is_empty() {
                    return Err(invalid(
                        "howto.api.url_field and title_field must not be empty".to_string(),
                    ));
                }
                Ok(())
            }
        }
    }
}

/// Per-kind fetch parameters. Only the section matching the source type is
/// read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Howto {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rss: Option<RssHowto>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<HtmlHowto>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api: Option<ApiHowto>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RssHowto {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_limit: Option<usize>,
    /// Replace the feed excerpt with the article page text.
    #[serde(default = "default_true")]
    pub fetch_full_text: bool,
}

impl Default for RssHowto {
    fn default() -> Self {
        Self {
            item_limit: None,
            fetch_full_text: true,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HtmlHowto {
    /// Selects the article links on the listing page.
    pub list_selector: String,
    #[serde(default = "default_title_selector")]
    pub title_selector: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_selector: Option<String>,
    #[serde(default = "default_content_selector")]
    pub content_selector: String,
}

fn default_title_selector() -> String {
    "h1".to_string()
}

fn default_content_selector() -> String {
    "article".to_string()
}

/// Parsed form of [`HtmlHowto`].
#[derive(Debug)]
pub struct HtmlSelectors {
    pub list: Selector,
    pub title: Selector,
    pub date: Option<Selector>,
    pub content: Selector,
}

impl HtmlHowto {
    pub fn selectors(&self) -> Result<HtmlSelectors, String> {
        let parse = |field: &str, css: &str| {
            Selector::parse(css).map_err(|e| format!("invalid {field} '{css}': {e}"))
        };
        Ok(HtmlSelectors {
            list: parse("list_selector", &self.list_selector)?,
            title: parse("title_selector", &self.title_selector)?,
            date: self
                .date_selector
                .as_deref()
                .map(|css| parse("date_selector", css))
                .transpose()?,
            content: parse("content_selector", &self.content_selector)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiHowto {
    /// Dot-separated path to the item array; `$` is the document root.
    #[serde(default = "default_items_path")]
    pub items_path: String,
    pub url_field: String,
    pub title_field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_field: Option<String>,
}

fn default_items_path() -> String {
    "$".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = PipelineConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config.collector.lookback_days, 31);
        assert_eq!(config.collector.max_items_per_source, 20);
        assert_eq!(config.collector.fetch_concurrency, 4);
        assert_eq!(config.analyzer.concurrency, 4);
        assert_eq!(config.front_matter.tags, vec!["AI", "News"]);
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.llm.retry.policy(), RetryPolicy::default());
    }

    #[test]
    fn test_parse_sources_of_every_kind() {
        let yaml = r#"
collector:
  lookback_days: 7
  sources:
    - name: Feed
      url: https://example.com/feed.xml
      type: rss
      howto:
        rss: { item_limit: 5, fetch_full_text: false }
    - url: https://example.com/blog
      type: html
      howto:
        html:
          list_selector: "a.post-link"
          date_selector: time
    - name: Api
      url: https://api.example.com/news
      type: api
      howto:
        api:
          items_path: data.items
          url_field: link
          title_field: headline
llm:
  model: local-model
  retry: { max_retries: 2, base_delay_ms: 10, max_delay_ms: 20, jitter_ms: 0 }
"#;
        let config = PipelineConfig::from_yaml_str(yaml).unwrap();
        let sources = &config.collector.sources;
        assert_eq!(sources.len(), 3);

        assert_eq!(sources[0].kind, SourceKind::Rss);
        let rss = sources[0].howto.rss.as_ref().unwrap();
        assert_eq!(rss.item_limit, Some(5));
        assert!(!rss.fetch_full_text);

        assert_eq!(sources[1].display_name(), "https://example.com/blog");
        let html = sources[1].howto.html.as_ref().unwrap();
        assert_eq!(html.title_selector, "h1");
        assert_eq!(html.content_selector, "article");
        assert_eq!(html.date_selector.as_deref(), Some("time"));

        let api = sources[2].howto.api.as_ref().unwrap();
        assert_eq!(api.items_path, "data.items");
        assert_eq!(api.content_field, None);

        assert_eq!(config.llm.model, "local-model");
        assert_eq!(config.llm.retry.policy().max_retries, 2);
        assert_eq!(config.llm.retry.policy().jitter, Duration::ZERO);
    }

    #[test]
    fn test_html_source_without_howto_is_rejected() {
        let yaml = r#"
collector:
  sources:
    - url: https://example.com/blog
      type: html
"#;
        let err = PipelineConfig::from_yaml_str(yaml).unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(ref m) if m.contains("howto.html")));
    }

    #[test]
    fn test_bad_selector_is_rejected() {
        let yaml = r#"
collector:
  sources:
    - url: https://example.com/blog
      type: html
      howto:
        html: { list_selector: "a[[" }
"#;
        let err = PipelineConfig::from_yaml_str(yaml).unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(ref m) if m.contains("list_selector")));
    }

    #[test]
    fn test_unknown_source_type_is_rejected() {
        let yaml = r#"
collector:
  sources:
    - url: https://example.com
      type: js
"#;
        assert!(matches!(
            PipelineConfig::from_yaml_str(yaml).unwrap_err(),
            PipelineError::Configuration(_)
        ));
    }

    #[test]
    fn test_zero_concurrency_is_rejected() {
        let yaml = "collector:\n  fetch_concurrency: 0\n";
        assert!(PipelineConfig::from_yaml_str(yaml).is_err());
    }

    #[test]
    fn test_missing_file_is_configuration_error() {
        let err = PipelineConfig::load(Path::new("/nonexistent/pipeline.yaml")).unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
    }

    #[test]
    fn test_credential_from_named_variable() {
        let llm = LlmConfig {
            api_key_env: "NEWS_PIPELINE_TEST_KEY_UNSET_1F2E".to_string(),
            ..LlmConfig::default()
        };
        assert!(matches!(
            llm.credential().unwrap_err(),
            PipelineError::Configuration(ref m) if m.contains("NEWS_PIPELINE_TEST_KEY_UNSET_1F2E")
        ));
    }

    #[test]
    fn test_source_config_serializes_as_yaml_snippet() {
        let source = SourceConfig {
            name: Some("Feed".to_string()),
            url: "https://example.com/feed.xml".to_string(),
            kind: SourceKind::Rss,
            howto: Howto {
                rss: Some(RssHowto::default()),
                ..Howto::default()
            },
        };
        let yaml = serde_yaml::to_string(&source).unwrap();
        assert!(yaml.contains("type: rss"));
        assert!(yaml.contains("fetch_full_text: true"));
        assert!(!yaml.contains("html"));
        let back: SourceConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, source);
    }
}
