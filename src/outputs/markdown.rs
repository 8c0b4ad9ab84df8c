//! Markdown helpers shared by the summary and article writers.
//!
//! Both documents start with the same YAML front matter block:
//!
//! ```text
//! ---
//! title: News Summary (2026-06)
//! description:
//! date: 2026-06-30
//! scheduled: 2026-06-30
//! tags:
//!   - AI
//!   - News
//! layout: layouts/post.njk
//! ---
//! ```

use crate::config::FrontMatterConfig;
use chrono::NaiveDate;
use std::fmt::Write;

/// Front matter of a generated document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontMatter<'a> {
    pub title: &'a str,
    pub date: NaiveDate,
    pub config: &'a FrontMatterConfig,
}

impl FrontMatter<'_> {
    pub fn render(&self) -> String {
        let mut md = String::new();
        writeln!(md, "---").unwrap();
        writeln!(md, "title: {}", yaml_scalar(self.title)).unwrap();
        writeln!(md, "description:").unwrap();
        writeln!(md, "date: {}", self.date).unwrap();
        writeln!(md, "scheduled: {}", self.date).unwrap();
        if self.config.tags.is_empty() {
            writeln!(md, "tags: []").unwrap();
        } else {
            writeln!(md, "tags:").unwrap();
            for tag in &self.config.tags {
                writeln!(md, "  - {}", yaml_scalar(tag)).unwrap();
            }
        }
        writeln!(md, "layout: {}", yaml_scalar(&self.config.layout)).unwrap();
        writeln!(md, "---").unwrap();
        md.push('\n');
        md
    }
}

/// A string as a single-line YAML scalar, quoted only when it has to be.
fn yaml_scalar(s: &str) -> String {
    match serde_yaml::to_string(s) {
        Ok(yaml) => yaml.trim_end().to_string(),
        Err(_) => format!("{s:?}"),
    }
}

/// Drop a leading `---` front matter block, if the text has a closed one.
pub fn strip_front_matter(text: &str) -> &str {
    let trimmed = text.trim_start();
    let Some(rest) = trimmed.strip_prefix("---") else {
        return text;
    };
    let mut offset = trimmed.len() - rest.len();
    // Segment 0 is the remainder of the opening line.
    for (i, line) in rest.split_inclusive('\n').enumerate() {
        offset += line.len();
        if i > 0 && line.trim() == "---" {
            return trimmed[offset..].trim_start();
        }
    }
    text
}

/// Split a leading `# ` heading off `text`.
///
/// Returns the heading text (or `default` when the first non-blank line is
/// not a level-1 heading) and the remaining body.
pub fn take_title<'a>(text: &'a str, default: &str) -> (String, &'a str) {
    let trimmed = text.trim_start();
    let (first, rest) = trimmed.split_once('\n').unwrap_or((trimmed, ""));
    match first.trim_end().strip_prefix("# ") {
        Some(title) if !title.trim().is_empty() => (title.trim().to_string(), rest.trim_start()),
        _ => (default.to_string(), trimmed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> FrontMatterConfig {
        FrontMatterConfig::default()
    }

    #[test]
    fn test_front_matter_render() {
        let config = config();
        let fm = FrontMatter {
            title: "News Summary (2026-06)",
            date: NaiveDate::from_ymd_opt(2026, 6, 30).unwrap(),
            config: &config,
        };
        assert_eq!(
            fm.render(),
            "---\ntitle: News Summary (2026-06)\ndescription:\ndate: 2026-06-30\nscheduled: 2026-06-30\ntags:\n  - AI\n  - News\nlayout: layouts/post.njk\n---\n\n"
        );
    }

    #[test]
    fn test_front_matter_equality_covers_config() {
        let date = NaiveDate::from_ymd_opt(2026, 6, 30).unwrap();
        let default = config();
        let custom = FrontMatterConfig {
            tags: vec!["Research".to_string()],
            ..FrontMatterConfig::default()
        };
        let a = FrontMatter {
            title: "June",
            date,
            config: &default,
        };
        assert_eq!(a, a.clone());
        assert_ne!(
            a,
            FrontMatter {
                config: &custom,
                ..a.clone()
            }
        );
    }

    #[test]
    fn test_front_matter_quotes_awkward_titles() {
        let config = config();
        let fm = FrontMatter {
            title: "AI: the month in review",
            date: NaiveDate::from_ymd_opt(2026, 6, 30).unwrap(),
            config: &config,
        };
        let rendered = fm.render();
        let yaml = rendered.trim_start_matches("---\n").split("---").next().unwrap();
        let parsed: serde_yaml::Value = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(parsed["title"].as_str(), Some("AI: the month in review"));
    }

    #[test]
    fn test_strip_front_matter() {
        assert_eq!(strip_front_matter("---\ntitle: x\n---\n\n# Body\n"), "# Body\n");
        assert_eq!(strip_front_matter("  \n---\na: 1\n---\nText"), "Text");
        assert_eq!(strip_front_matter("# No front matter"), "# No front matter");
        assert_eq!(strip_front_matter("---\nunterminated"), "---\nunterminated");
    }

    #[test]
    fn test_take_title() {
        let (title, body) = take_title("# June in AI\n\n## Highlights\n- a", "Monthly AI News");
        assert_eq!(title, "June in AI");
        assert_eq!(body, "## Highlights\n- a");

        let (title, body) = take_title("## Highlights\n- a", "Monthly AI News");
        assert_eq!(title, "Monthly AI News");
        assert_eq!(body, "## Highlights\n- a");

        let (title, body) = take_title("# Only a title", "Monthly AI News");
        assert_eq!(title, "Only a title");
        assert_eq!(body, "");
    }
}
