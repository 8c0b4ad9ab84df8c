//! Data models shared by the stages.
//!
//! - [`CollectedItem`]: one normalized piece of content fetched by the collector
//! - [`ItemSet`]: the de-duplicated items of one batch, in fetch order
//! - [`SummaryCache`]: per-item summaries kept across analyzer runs
//! - [`SummaryArtifact`]: the analyzer's output as handed to the blogger

use crate::batch::BatchKey;
use crate::utils::{normalize_url, normalize_whitespace};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

/// One normalized unit of content.
///
/// Created once by the collector and never modified afterwards; the
/// fingerprint is computed at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectedItem {
    /// Name of the configured source the item came from.
    pub source: String,
    pub url: String,
    pub title: String,
    /// Plain-text body or excerpt.
    pub body: String,
    /// Publication date as reported by the source, if any.
    pub published: Option<String>,
    pub retrieved_at: DateTime<Utc>,
    /// Hex SHA-256 over the normalized title and body.
    pub fingerprint: String,
}

impl CollectedItem {
    pub fn new(
        source: impl Into<String>,
        url: impl Into<String>,
        title: impl Into<String>,
        body: impl Into<String>,
        published: Option<String>,
        retrieved_at: DateTime<Utc>,
    ) -> Self {
        let title = normalize_whitespace(&title.into());
        let body = normalize_whitespace(&body.into());
        let fingerprint = fingerprint(&title, &body);
        Self {
            source: source.into(),
            url: url.into(),
            title,
            body,
            published,
            retrieved_at,
            fingerprint,
        }
    }
}

/// Content fingerprint used for de-duplication.
///
/// Case and whitespace differences do not change the fingerprint.
pub fn fingerprint(title: &str, body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_whitespace(title).to_lowercase().as_bytes());
    hasher.update(b"\n");
    hasher.update(normalize_whitespace(body).to_lowercase().as_bytes());
    hex::encode(hasher.finalize())
}

/// The items collected for one batch.
///
/// Insertion order is fetch order. An item whose fingerprint or normalized
/// URL is already present is rejected. The lookup index is not serialized;
/// it is rebuilt when an item set is read back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StoredItemSet")]
pub struct ItemSet {
    batch: BatchKey,
    items: Vec<CollectedItem>,
    #[serde(skip)]
    fingerprints: HashSet<String>,
    #[serde(skip)]
    urls: HashSet<String>,
}

/// On-disk shape of an [`ItemSet`].
#[derive(Deserialize)]
struct StoredItemSet {
    batch: BatchKey,
    items: Vec<CollectedItem>,
}

impl From<StoredItemSet> for ItemSet {
    fn from(stored: StoredItemSet) -> Self {
        let fingerprints = stored.items.iter().map(|i| i.fingerprint.clone()).collect();
        let urls = stored.items.iter().map(|i| normalize_url(&i.url)).collect();
        Self {
            batch: stored.batch,
            items: stored.items,
            fingerprints,
            urls,
        }
    }
}

impl ItemSet {
    pub fn new(batch: BatchKey) -> Self {
        Self {
            batch,
            items: Vec::new(),
            fingerprints: HashSet::new(),
            urls: HashSet::new(),
        }
    }

    pub fn batch(&self) -> BatchKey {
        self.batch
    }

    /// Insert `item` unless it duplicates one already present. Returns
    /// whether the item was added.
    pub fn insert(&mut self, item: CollectedItem) -> bool {
        if self.contains(&item) {
            return false;
        }
        self.fingerprints.insert(item.fingerprint.clone());
        self.urls.insert(normalize_url(&item.url));
        self.items.push(item);
        true
    }

    /// Append every non-duplicate item of `other`, keeping its order.
    /// Returns how many were added.
    pub fn merge(&mut self, other: ItemSet) -> usize {
        other
            .items
            .into_iter()
            .map(|item| self.insert(item))
            .filter(|added| *added)
            .count()
    }

    pub fn contains(&self, item: &CollectedItem) -> bool {
        self.fingerprints.contains(&item.fingerprint) || self.urls.contains(&normalize_url(&item.url))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CollectedItem> {
        self.items.iter()
    }
}

/// Summaries already paid for, keyed by item fingerprint.
///
/// Stored next to the batch's summary document. The analyzer only asks the
/// LLM about items that have no entry here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryCache {
    summaries: BTreeMap<String, String>,
}

impl SummaryCache {
    pub fn get(&self, fingerprint: &str) -> Option<&str> {
        self.summaries.get(fingerprint).map(String::as_str)
    }

    pub fn insert(&mut self, fingerprint: impl Into<String>, summary: impl Into<String>) {
        self.summaries.insert(fingerprint.into(), summary.into());
    }

    pub fn len(&self) -> usize {
        self.summaries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.summaries.is_empty()
    }
}

/// The analyzer's output for one batch, as read back for the blogger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryArtifact {
    pub batch: BatchKey,
    pub path: PathBuf,
    pub content: String,
}
