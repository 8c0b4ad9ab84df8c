//! Stages and stage requests.
//!
//! The set of stages is closed: [`Stage::Collector`], [`Stage::Analyzer`] and
//! [`Stage::Blogger`], always executed in that order. A [`StageRequest`] is
//! the subset one invocation asked for, parsed from the `--run` list.

use crate::error::PipelineError;
use itertools::Itertools;
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Shorthand accepted by `--run` for all three stages.
pub const PIPELINE: &str = "pipeline";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    Collector,
    Analyzer,
    Blogger,
}

impl Stage {
    /// All stages in execution order.
    pub const ALL: [Stage; 3] = [Stage::Collector, Stage::Analyzer, Stage::Blogger];

    pub fn name(self) -> &'static str {
        match self {
            Stage::Collector => "collector",
            Stage::Analyzer => "analyzer",
            Stage::Blogger => "blogger",
        }
    }

    /// The stage whose artifact this stage consumes.
    pub fn upstream(self) -> Option<Stage> {
        match self {
            Stage::Collector => None,
            Stage::Analyzer => Some(Stage::Collector),
            Stage::Blogger => Some(Stage::Analyzer),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Stage {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .into_iter()
            .find(|stage| stage.name() == s)
            .ok_or_else(|| {
                PipelineError::Configuration(format!(
                    "unknown stage '{s}' (expected one of: collector, analyzer, blogger, {PIPELINE})"
                ))
            })
    }
}

/// The stages requested for one invocation, plus the optional explicit
/// summary file for the blogger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageRequest {
    stages: BTreeSet<Stage>,
    summary_override: Option<PathBuf>,
}

impl StageRequest {
    /// Parse a comma-separated `--run` list. Order and duplicates are
    /// irrelevant; `pipeline` expands to every stage.
    pub fn parse(list: &str) -> Result<Self, PipelineError> {
        let mut stages = BTreeSet::new();
        for token in list.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            if token == PIPELINE {
                stages.extend(Stage::ALL);
            } else {
                stages.insert(token.parse::<Stage>()?);
            }
        }
        let request = Self {
            stages,
            summary_override: None,
        };
        request.validate_combination()?;
        Ok(request)
    }

    pub fn from_stages(stages: impl IntoIterator<Item = Stage>) -> Self {
        Self {
            stages: stages.into_iter().collect(),
            summary_override: None,
        }
    }

    pub fn with_summary_file(mut self, path: Option<PathBuf>) -> Self {
        self.summary_override = path;
        self
    }

    pub fn contains(&self, stage: Stage) -> bool {
        self.stages.contains(&stage)
    }

    /// Requested stages in execution order.
    pub fn stages(&self) -> impl Iterator<Item = Stage> + '_ {
        self.stages.iter().copied()
    }

    pub fn summary_override(&self) -> Option<&Path> {
        self.summary_override.as_deref()
    }

    /// True when `stage` is requested but the stage feeding it is not, so its
    /// input must already be on disk.
    pub fn is_standalone(&self, stage: Stage) -> bool {
        self.contains(stage)
            && stage
                .upstream()
                .is_some_and(|upstream| !self.contains(upstream))
    }

    /// Reject stage sets that cannot form a valid run.
    pub fn validate_combination(&self) -> Result<(), PipelineError> {
        if self.stages.is_empty() {
            return Err(PipelineError::Configuration(
                "no stages requested".to_string(),
            ));
        }
        if self.contains(Stage::Collector)
            && self.contains(Stage::Blogger)
            && !self.contains(Stage::Analyzer)
        {
            return Err(PipelineError::Configuration(
                "invalid combination: collector + blogger without analyzer".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether any requested stage will call the LLM.
    pub fn needs_llm(&self, skip_summarize: bool) -> bool {
        self.contains(Stage::Blogger) || (self.contains(Stage::Analyzer) && !skip_summarize)
    }
}

impl fmt::Display for StageRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.stages().map(Stage::name).join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_expands_to_all_stages() {
        let request = StageRequest::parse("pipeline").unwrap();
        assert_eq!(request.stages().collect::<Vec<_>>(), Stage::ALL.to_vec());
        assert_eq!(request.to_string(), "collector,analyzer,blogger");
    }

    #[test]
    fn test_order_insensitive_and_deduplicated() {
        let request = StageRequest::parse(" blogger , analyzer,blogger ").unwrap();
        assert_eq!(
            request.stages().collect::<Vec<_>>(),
            vec![Stage::Analyzer, Stage::Blogger]
        );
    }

    #[test]
    fn test_unknown_stage_is_configuration_error() {
        let err = StageRequest::parse("collector,publisher").unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(ref m) if m.contains("publisher")));
    }

    #[test]
    fn test_empty_list_is_configuration_error() {
        assert!(matches!(
            StageRequest::parse(" , ").unwrap_err(),
            PipelineError::Configuration(_)
        ));
    }

    #[test]
    fn test_collector_blogger_without_analyzer_rejected() {
        let err = StageRequest::parse("collector,blogger").unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
        assert!(StageRequest::parse("collector,analyzer,blogger").is_ok());
    }

    #[test]
    fn test_standalone_detection() {
        let request = StageRequest::parse("analyzer,blogger").unwrap();
        assert!(request.is_standalone(Stage::Analyzer));
        assert!(!request.is_standalone(Stage::Blogger));
        assert!(!request.is_standalone(Stage::Collector));

        let blogger_only = StageRequest::parse("blogger").unwrap();
        assert!(blogger_only.is_standalone(Stage::Blogger));
    }

    #[test]
    fn test_needs_llm() {
        assert!(!StageRequest::parse("collector").unwrap().needs_llm(false));
        assert!(StageRequest::parse("analyzer").unwrap().needs_llm(false));
        assert!(!StageRequest::parse("analyzer").unwrap().needs_llm(true));
        assert!(StageRequest::parse("blogger").unwrap().needs_llm(true));
    }

    #[test]
    fn test_upstream_ordering() {
        assert_eq!(Stage::Collector.upstream(), None);
        assert_eq!(Stage::Analyzer.upstream(), Some(Stage::Collector));
        assert_eq!(Stage::Blogger.upstream(), Some(Stage::Analyzer));
        assert!(Stage::Collector < Stage::Analyzer && Stage::Analyzer < Stage::Blogger);
    }
}
