//! Stage orchestration.
//!
//! The orchestrator turns a [`StageRequest`] into a [`Plan`], checking every
//! precondition before any stage does network or LLM work, then executes
//! the planned stages in order. Stages hand off through the artifact store
//! only; a path produced earlier in the same invocation is passed forward
//! as-is rather than re-derived.
//!
//! # Validation
//!
//! - `collector` + `blogger` without `analyzer` is rejected
//! - An explicit summary file must exist, unless it is the path the
//!   analyzer writes earlier in the same run
//! - A standalone `analyzer` needs the batch's item set on disk
//! - A standalone `blogger` without an explicit summary needs the batch's
//!   summary on disk

use crate::analyzer::Analyze;
use crate::batch::BatchKey;
use crate::blogger::Generate;
use crate::collector::Collect;
use crate::config::SourceConfig;
use crate::error::{PipelineError, SourceFetchError};
use crate::models::SummaryArtifact;
use crate::stage::{Stage, StageRequest};
use crate::store::ArtifactStore;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

/// Where a stage's input comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageInput {
    /// Produced by the upstream stage earlier in this invocation.
    Produced,
    /// An artifact that already exists on disk.
    Existing(PathBuf),
}

/// A validated execution plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub stages: Vec<Stage>,
    pub analyzer_input: Option<StageInput>,
    pub blogger_input: Option<StageInput>,
    /// Batch the article is filed under. Differs from the run's batch only
    /// when an explicit summary file names another month.
    pub blogger_batch: BatchKey,
}

/// One artifact written by this invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducedArtifact {
    pub stage: Stage,
    pub path: PathBuf,
}

/// What one invocation produced.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub batch: Option<BatchKey>,
    pub artifacts: Vec<ProducedArtifact>,
    pub source_failures: Vec<SourceFetchError>,
}

impl RunReport {
    fn record(&mut self, stage: Stage, path: PathBuf) {
        self.artifacts.push(ProducedArtifact { stage, path });
    }

    /// Path produced by `stage` in this invocation, if any.
    pub fn produced(&self, stage: Stage) -> Option<&Path> {
        self.artifacts
            .iter()
            .find(|a| a.stage == stage)
            .map(|a| a.path.as_path())
    }

    fn paths(&self) -> Vec<PathBuf> {
        self.artifacts.iter().map(|a| a.path.clone()).collect()
    }
}

pub struct Orchestrator<C, A, G> {
    store: ArtifactStore,
    batch: BatchKey,
    sources: Vec<SourceConfig>,
    collector: C,
    analyzer: A,
    /// Absent when no LLM client could be built for this invocation.
    blogger: Option<G>,
}

impl<C, A, G> Orchestrator<C, A, G>
where
    C: Collect,
    A: Analyze,
    G: Generate,
{
    pub fn new(
        store: ArtifactStore,
        batch: BatchKey,
        sources: Vec<SourceConfig>,
        collector: C,
        analyzer: A,
        blogger: Option<G>,
    ) -> Self {
        Self {
            store,
            batch,
            sources,
            collector,
            analyzer,
            blogger,
        }
    }

    /// Validate `request` against the store and build the plan. Performs no
    /// network or LLM calls.
    pub fn plan(&self, request: &StageRequest) -> Result<Plan, PipelineError> {
        let plan = plan(&self.store, self.batch, request)?;
        if plan.blogger_input.is_some() && self.blogger.is_none() {
            return Err(PipelineError::Configuration(
                "blogger requested but no LLM client is configured".to_string(),
            ));
        }
        Ok(plan)
    }

    /// Validate and execute `request`.
    #[instrument(level = "info", skip_all, fields(batch = %self.batch, stages = %request))]
    pub async fn run(&self, request: &StageRequest) -> Result<RunReport, PipelineError> {
        let plan = self.plan(request)?;
        info!(?plan, "Validated stage request");

        let mut report = RunReport {
            batch: Some(self.batch),
            ..RunReport::default()
        };

        for stage in &plan.stages {
            let (batch, expected) = match stage {
                Stage::Blogger => (
                    plan.blogger_batch,
                    self.store.resolve(&plan.blogger_batch, Stage::Blogger),
                ),
                _ => (self.batch, self.store.resolve(&self.batch, *stage)),
            };
            info!(%stage, path = %expected.display(), "Stage starting");

            let result = match stage {
                Stage::Collector => self.run_collector(&expected, &mut report).await,
                Stage::Analyzer => {
                    let input = input_path(plan.analyzer_input.as_ref(), &report, Stage::Collector);
                    self.run_analyzer(input, &expected).await
                }
                Stage::Blogger => {
                    let input = input_path(plan.blogger_input.as_ref(), &report, Stage::Analyzer);
                    self.run_blogger(input, batch, &expected).await
                }
            };

            if let Err(source) = result {
                warn!(%stage, error = %source, produced = report.artifacts.len(), "Stage failed");
                return Err(PipelineError::StageFailed {
                    stage: *stage,
                    batch,
                    expected,
                    produced: report.paths(),
                    source: Box::new(source),
                });
            }
            info!(%stage, path = %expected.display(), "Stage finished");
            report.record(*stage, expected);
        }

        Ok(report)
    }

    async fn run_collector(&self, path: &Path, report: &mut RunReport) -> Result<(), PipelineError> {
        let collection = self.collector.collect(self.batch, &self.sources).await;
        info!(
            fetched = collection.fetched,
            duplicates = collection.duplicates,
            failed_sources = collection.failures.len(),
            "Collection finished"
        );
        report.source_failures = collection.failures;

        let items = if self.store.exists(path) {
            let mut existing = self.store.read_items(path).await?;
            let added = existing.merge(collection.items);
            info!(added, total = existing.len(), "Merged into existing item set");
            existing
        } else {
            collection.items
        };
        self.store.write_items(path, &items).await
    }

    async fn run_analyzer(&self, input: Option<PathBuf>, path: &Path) -> Result<(), PipelineError> {
        let input = input.ok_or_else(|| missing(Stage::Collector, &self.store, self.batch))?;
        let items = self.store.read_items(&input).await?;
        let mut cache = self.store.read_summary_cache(&self.batch).await;
        let cached = cache.len();

        let outcome = self.analyzer.analyze(self.batch, &items, &mut cache).await;
        if cache.len() > cached {
            info!(added = cache.len() - cached, total = cache.len(), "Saving summary cache");
            if let Err(e) = self.store.write_summary_cache(&self.batch, &cache).await {
                // The analysis error, if any, is the one reported.
                if outcome.is_ok() {
                    return Err(e);
                }
                warn!(error = %e, "Summary cache not saved");
            }
        }
        let document = outcome?;
        self.store.write(path, &document).await
    }

    async fn run_blogger(
        &self,
        input: Option<PathBuf>,
        batch: BatchKey,
        path: &Path,
    ) -> Result<(), PipelineError> {
        let blogger = self.blogger.as_ref().ok_or_else(|| {
            PipelineError::Configuration("no LLM client is configured".to_string())
        })?;
        let input = input.ok_or_else(|| missing(Stage::Analyzer, &self.store, batch))?;
        let content = self.store.read(Stage::Analyzer, &input).await?;
        let summary = SummaryArtifact {
            batch,
            path: input,
            content,
        };
        let article = blogger.generate(batch, &summary).await?;
        self.store.write(path, &article).await
    }
}

/// Validate `request` for `batch` against the artifacts in `store` and
/// build the plan. Needs no stage components, so it can run before any
/// client is built.
pub fn plan(store: &ArtifactStore, batch: BatchKey, request: &StageRequest) -> Result<Plan, PipelineError> {
    request.validate_combination()?;

    let analyzer_input = if request.is_standalone(Stage::Analyzer) {
        Some(StageInput::Existing(require(
            store,
            Stage::Collector,
            store.resolve(&batch, Stage::Collector),
        )?))
    } else if request.contains(Stage::Analyzer) {
        Some(StageInput::Produced)
    } else {
        None
    };

    let mut blogger_batch = batch;
    let blogger_input = if !request.contains(Stage::Blogger) {
        None
    } else if let Some(path) = request.summary_override() {
        let produced_here = store.resolve(&batch, Stage::Analyzer);
        if request.contains(Stage::Analyzer) && path == produced_here.as_path() {
            Some(StageInput::Produced)
        } else {
            let path = require(store, Stage::Analyzer, path.to_path_buf())?;
            if let Some(named) = BatchKey::from_file_name(&path) {
                blogger_batch = named;
            }
            Some(StageInput::Existing(path))
        }
    } else if request.contains(Stage::Analyzer) {
        Some(StageInput::Produced)
    } else {
        Some(StageInput::Existing(require(
            store,
            Stage::Analyzer,
            store.resolve(&batch, Stage::Analyzer),
        )?))
    };

    Ok(Plan {
        stages: request.stages().collect(),
        analyzer_input,
        blogger_input,
        blogger_batch,
    })
}

fn require(store: &ArtifactStore, stage: Stage, path: PathBuf) -> Result<PathBuf, PipelineError> {
    if store.exists(&path) {
        Ok(path)
    } else {
        Err(PipelineError::MissingArtifact { stage, path })
    }
}

/// Resolve a planned input to a path, using what this invocation produced
/// for `upstream` when the plan says so.
fn input_path(input: Option<&StageInput>, report: &RunReport, upstream: Stage) -> Option<PathBuf> {
    match input? {
        StageInput::Existing(path) => Some(path.clone()),
        StageInput::Produced => report.produced(upstream).map(Path::to_path_buf),
    }
}

fn missing(stage: Stage, store: &ArtifactStore, batch: BatchKey) -> PipelineError {
    PipelineError::MissingArtifact {
        stage,
        path: store.resolve(&batch, stage),
    }
}
