//! Command-line interface definitions for the news pipeline.
//!
//! Every option has a default, so a bare invocation runs the full pipeline
//! for the current month with `configs/pipeline.yaml`.

use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments.
///
/// # Examples
///
/// ```sh
/// # Full pipeline for the current month
/// news_pipeline
///
/// # Only collect and summarize June 2026
/// news_pipeline --run collector,analyzer --batch 2026-06
///
/// # Regenerate an article from a hand-edited summary
/// news_pipeline --run blogger --summary-file output/news_summaries/news_2026_06.md
///
/// # Suggest a configuration entry for a new source
/// news_pipeline --inspect-source https://example.com/feed.xml
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Stages to run: comma-separated subset of collector,analyzer,blogger, or `pipeline`
    #[arg(short, long, default_value = "pipeline")]
    pub run: String,

    /// Summary file to generate the article from, instead of the batch's own
    #[arg(long)]
    pub summary_file: Option<PathBuf>,

    /// Inspect one source URL, print a suggested configuration entry and exit
    #[arg(long, value_name = "URL")]
    pub inspect_source: Option<String>,

    /// Print the URLs each configured source would yield and exit
    #[arg(long)]
    pub list_urls: bool,

    /// Write the summary document without calling the LLM
    #[arg(long)]
    pub skip_summarize: bool,

    /// Batch to operate on, as YYYY-MM (defaults to the current UTC month)
    #[arg(short, long)]
    pub batch: Option<String>,

    /// Path to the pipeline configuration file
    #[arg(
        short,
        long,
        env = "NEWS_PIPELINE_CONFIG",
        default_value = "configs/pipeline.yaml"
    )]
    pub config: PathBuf,

    /// Root directory of the artifact tree
    #[arg(short, long, default_value = "output")]
    pub output_dir: PathBuf,

    /// Dotenv file loaded at startup; existing variables are not overridden
    #[arg(long, default_value = ".env")]
    pub env_file: PathBuf,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["news_pipeline"]);

        assert_eq!(cli.run, "pipeline");
        assert_eq!(cli.output_dir, PathBuf::from("output"));
        assert_eq!(cli.env_file, PathBuf::from(".env"));
        assert_eq!(cli.log_level, "info");
        assert!(cli.summary_file.is_none());
        assert!(cli.batch.is_none());
        assert!(!cli.list_urls);
        assert!(!cli.skip_summarize);
    }

    #[test]
    fn test_cli_stage_options() {
        let cli = Cli::parse_from([
            "news_pipeline",
            "--run",
            "blogger",
            "--summary-file",
            "/tmp/news_2026_06.md",
            "--batch",
            "2026-06",
            "--skip-summarize",
        ]);

        assert_eq!(cli.run, "blogger");
        assert_eq!(cli.summary_file, Some(PathBuf::from("/tmp/news_2026_06.md")));
        assert_eq!(cli.batch.as_deref(), Some("2026-06"));
        assert!(cli.skip_summarize);
    }

    #[test]
    fn test_cli_short_flags() {
        let cli = Cli::parse_from([
            "news_pipeline",
            "-r",
            "collector",
            "-o",
            "/tmp/out",
            "-c",
            "/tmp/pipeline.yaml",
        ]);

        assert_eq!(cli.run, "collector");
        assert_eq!(cli.output_dir, PathBuf::from("/tmp/out"));
        assert_eq!(cli.config, PathBuf::from("/tmp/pipeline.yaml"));
    }

    #[test]
    fn test_cli_inspect_source() {
        let cli = Cli::parse_from([
            "news_pipeline",
            "--inspect-source",
            "https://example.com/feed.xml",
        ]);
        assert_eq!(
            cli.inspect_source.as_deref(),
            Some("https://example.com/feed.xml")
        );
    }
}
