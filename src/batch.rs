//! Batch identification.
//!
//! A batch is one month of news. Every artifact a run produces is named after
//! its [`BatchKey`], which is what lets `collector`, `analyzer` and `blogger`
//! run as separate invocations and still find each other's output.

use crate::error::PipelineError;
use chrono::{DateTime, Datelike, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

static BATCH_ARG: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{4})-(\d{2})$").unwrap());
static BATCH_IN_FILE_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d{4})_(\d{2})").unwrap());

/// Year and month of one pipeline batch, e.g. `2026-06`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BatchKey {
    year: i32,
    month: u32,
}

impl BatchKey {
    pub fn new(year: i32, month: u32) -> Result<Self, PipelineError> {
        if !(1000..=9999).contains(&year) {
            return Err(PipelineError::Configuration(format!(
                "batch year {year} is out of range"
            )));
        }
        if !(1..=12).contains(&month) {
            return Err(PipelineError::Configuration(format!(
                "batch month {month} is out of range"
            )));
        }
        Ok(Self { year, month })
    }

    pub fn from_datetime<Tz: TimeZone>(dt: &DateTime<Tz>) -> Self {
        Self {
            year: dt.year(),
            month: dt.month(),
        }
    }

    /// The batch the current UTC month belongs to.
    pub fn current() -> Self {
        Self::from_datetime(&Utc::now())
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// `YYYY_MM`, the form embedded in artifact file names.
    pub fn file_stem(&self) -> String {
        format!("{:04}_{:02}", self.year, self.month)
    }

    /// Recover the batch from an artifact file name such as
    /// `news_2026_06.md`. Returns `None` when the name carries no valid
    /// `YYYY_MM` pair.
    pub fn from_file_name(path: &Path) -> Option<Self> {
        let name = path.file_stem()?.to_str()?;
        BATCH_IN_FILE_NAME
            .captures_iter(name)
            .filter_map(|caps| {
                let year = caps[1].parse().ok()?;
                let month = caps[2].parse().ok()?;
                Self::new(year, month).ok()
            })
            .last()
    }
}

impl fmt::Display for BatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for BatchKey {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = BATCH_ARG.captures(s.trim()).ok_or_else(|| {
            PipelineError::Configuration(format!("invalid batch '{s}', expected YYYY-MM"))
        })?;
        let year = caps[1]
            .parse()
            .map_err(|_| PipelineError::Configuration(format!("invalid batch year in '{s}'")))?;
        let month = caps[2]
            .parse()
            .map_err(|_| PipelineError::Configuration(format!("invalid batch month in '{s}'")))?;
        Self::new(year, month)
    }
}

impl TryFrom<String> for BatchKey {
    type Error = PipelineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BatchKey> for String {
    fn from(key: BatchKey) -> Self {
        key.to_string()
    }
}
