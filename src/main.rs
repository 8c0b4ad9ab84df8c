//! # News Pipeline
//!
//! Collects news items from configured sources, condenses each monthly batch
//! into a summary document with an LLM, and turns the summary into a blog
//! post.
//!
//! ## Features
//!
//! - RSS/Atom feeds, static HTML listing pages and JSON APIs as sources
//! - Content de-duplication across sources by fingerprint
//! - Per-item summaries through an OpenAI-compatible chat API, with retries
//! - Stages that run together or alone, resuming from artifacts on disk
//! - A source inspector that suggests configuration for a new URL
//!
//! ## Usage
//!
//! ```sh
//! news_pipeline --run pipeline --config configs/pipeline.yaml
//! ```
//!
//! ## Architecture
//!
//! One invocation operates on one batch (a calendar month):
//! 1. **Collector**: fetch every source and write the batch's item set
//! 2. **Analyzer**: summarize each item and write the summary document
//! 3. **Blogger**: generate the article from the summary document
//!
//! Stages only communicate through the artifact tree under `--output-dir`.

use chrono::Local;
use clap::Parser;
use std::process::ExitCode;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod analyzer;
mod api;
mod batch;
mod blogger;
mod cli;
mod collector;
mod config;
mod error;
mod models;
mod orchestrator;
mod outputs;
mod stage;
mod store;
#[cfg(test)]
mod testing;
mod utils;

use analyzer::Analyzer;
use api::{OpenAiChat, RetryAsk};
use batch::BatchKey;
use blogger::Blogger;
use cli::Cli;
use collector::inspector::SourceInspector;
use collector::{Collector, FetchLimits, HttpFetcher};
use config::PipelineConfig;
use error::PipelineError;
use orchestrator::Orchestrator;
use stage::{Stage, StageRequest};
use store::ArtifactStore;
use utils::ensure_writable_dir;

/// Timeout for a single source or article page fetch.
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> ExitCode {
    let args = Cli::parse();

    // Existing environment variables win over the file.
    let env_loaded = dotenvy::from_path(&args.env_file).is_ok();

    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = Instant::now();
    info!(version = env!("CARGO_PKG_VERSION"), "news_pipeline starting up");
    debug!(?args, env_file = %args.env_file.display(), env_loaded, "Parsed CLI arguments");

    let outcome = run(&args).await;

    let elapsed = start_time.elapsed();
    match outcome {
        Ok(()) => {
            info!(
                ?elapsed,
                secs = elapsed.as_secs(),
                millis = elapsed.subsec_millis(),
                "Execution complete"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            report_failure(&e);
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run(args: &Cli) -> Result<(), PipelineError> {
    if let Some(url) = &args.inspect_source {
        return inspect_source(url).await;
    }

    let config = PipelineConfig::load(&args.config)?;

    if args.list_urls {
        return list_urls(&config).await;
    }

    // ---- Validation: nothing below touches the network until the orchestrator has planned ----
    let request =
        StageRequest::parse(&args.run)?.with_summary_file(args.summary_file.clone());
    let batch = match &args.batch {
        Some(raw) => raw.parse::<BatchKey>()?,
        None => BatchKey::current(),
    };
    info!(%batch, stages = %request, "Resolved stage request");

    if request.contains(Stage::Collector) && config.collector.sources.is_empty() {
        return Err(PipelineError::Configuration(format!(
            "no sources configured in {}",
            args.config.display()
        )));
    }

    let store = ArtifactStore::new(args.output_dir.clone());
    let plan = orchestrator::plan(&store, batch, &request)?;
    debug!(?plan, "Stage request is runnable");

    let llm = if request.needs_llm(args.skip_summarize) {
        let api_key = config.llm.credential()?;
        let client = OpenAiChat::new(&config.llm, api_key)?;
        Some(RetryAsk::new(client, config.llm.retry.policy()))
    } else {
        None
    };

    ensure_writable_dir(&args.output_dir).await?;

    let fetcher = http_fetcher()?;
    let run_date = Local::now().date_naive();
    let analyzer_llm = if args.skip_summarize {
        None
    } else {
        llm.clone()
    };

    let orchestrator = Orchestrator::new(
        store,
        batch,
        config.collector.sources.clone(),
        Collector::new(
            fetcher,
            FetchLimits::from_config(&config.collector),
            config.collector.fetch_concurrency,
        ),
        Analyzer::new(
            analyzer_llm,
            config.analyzer.concurrency,
            config.front_matter.clone(),
            run_date,
        ),
        llm.map(|llm| {
            Blogger::new(
                llm,
                config.blogger.markdown_instructions.clone(),
                config.front_matter.clone(),
                run_date,
            )
        }),
    );

    let report = orchestrator.run(&request).await?;

    for failure in &report.source_failures {
        warn!(source = %failure.source_name, url = %failure.url, reason = %failure.reason, "Source skipped");
    }
    for artifact in &report.artifacts {
        info!(stage = %artifact.stage, path = %artifact.path.display(), "Wrote artifact");
        println!("{}\t{}", artifact.stage, artifact.path.display());
    }
    Ok(())
}

async fn inspect_source(url: &str) -> Result<(), PipelineError> {
    let inspector = SourceInspector::new(http_fetcher()?);
    let inspection = inspector.inspect(url).await?;
    print!("{}", inspection.render()?);
    Ok(())
}

async fn list_urls(config: &PipelineConfig) -> Result<(), PipelineError> {
    let collector = Collector::new(
        http_fetcher()?,
        FetchLimits::from_config(&config.collector),
        config.collector.fetch_concurrency,
    );
    for (source, listing) in collector.list_urls(&config.collector.sources).await {
        match listing {
            Ok(urls) => {
                info!(%source, count = urls.len(), "Listed source URLs");
                println!("# {source} ({} urls)", urls.len());
                for url in urls {
                    println!("{url}");
                }
            }
            Err(e) => {
                warn!(error = %e, "Listing failed; skipping source");
                println!("# {source} (failed: {})", e.reason);
            }
        }
    }
    Ok(())
}

fn http_fetcher() -> Result<HttpFetcher, PipelineError> {
    HttpFetcher::new(FETCH_TIMEOUT)
        .map_err(|e| PipelineError::Configuration(format!("cannot build HTTP client: {e}")))
}

fn report_failure(e: &PipelineError) {
    match e {
        PipelineError::StageFailed {
            stage,
            batch,
            expected,
            produced,
            source,
        } => {
            error!(
                %stage,
                %batch,
                expected = %expected.display(),
                error = %source,
                "Stage failed"
            );
            for path in produced {
                info!(path = %path.display(), "Artifact produced before the failure");
            }
        }
        other if other.is_validation() => {
            error!(error = %other, "Invalid invocation; nothing was run");
        }
        other => {
            error!(error = %other, "Run failed");
        }
    }
    eprintln!("error: {e}");
}
