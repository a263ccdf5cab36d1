//! Cumulative blog view totals.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use anyhow::{Context, Result};
use postmill_core::Record;
use postmill_storage::read_json_opt;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

/// Slug -> cumulative views, persisted as `blog_views.json`.
pub type ViewTotals = BTreeMap<String, u64>;

#[derive(Debug, Error)]
pub enum ViewCountError {
    #[error("view count for `{slug}` is not a non-negative integer: {value}")]
    Invalid { slug: String, value: String },
    #[error("view count source unavailable: {0}")]
    Unavailable(String),
}

/// Source of today's view count for one blog slug.
pub trait ViewCounter: Send + Sync {
    fn views_today(&self, slug: &str) -> Result<u64, ViewCountError>;
}

/// Precomputed `{slug: count}` map. Slugs missing from the map had no views.
#[derive(Debug, Clone, Default)]
pub struct JsonViewCounts {
    counts: HashMap<String, Value>,
}

impl JsonViewCounts {
    pub fn from_json(document: Value) -> Result<Self> {
        let counts = serde_json::from_value(document).context("view counts must be a JSON object")?;
        Ok(Self { counts })
    }

    pub async fn load(path: &Path) -> Result<Self> {
        match read_json_opt::<Value>(path).await? {
            Some(document) => {
                Self::from_json(document).with_context(|| format!("parsing {}", path.display()))
            }
            None => {
                warn!(path = %path.display(), "view counts file absent; counting zero views");
                Ok(Self::default())
            }
        }
    }
}

impl ViewCounter for JsonViewCounts {
    fn views_today(&self, slug: &str) -> Result<u64, ViewCountError> {
        match self.counts.get(slug) {
            None => Ok(0),
            Some(value) => value.as_u64().ok_or_else(|| ViewCountError::Invalid {
                slug: slug.to_string(),
                value: value.to_string(),
            }),
        }
    }
}

/// Add today's count to each blog's running total and write it to `views`.
/// Blogs without an `id` slug are left untouched; a failed count adds zero.
pub fn apply_view_counts(
    records: Vec<Record>,
    mut totals: ViewTotals,
    counter: &dyn ViewCounter,
) -> (Vec<Record>, ViewTotals) {
    let records = records
        .into_iter()
        .map(|mut record| {
            let Some(slug) = record
                .get("id")
                .and_then(Value::as_str)
                .filter(|slug| !slug.is_empty())
                .map(str::to_string)
            else {
                return record;
            };

            let today = counter.views_today(&slug).unwrap_or_else(|err| {
                warn!(slug = %slug, error = %err, "view count failed; counting zero");
                0
            });
            let total = totals.get(&slug).copied().unwrap_or(0) + today;
            debug!(slug = %slug, today, total, "blog views");
            totals.insert(slug, total);
            record.insert("views".to_string(), Value::from(total));
            record
        })
        .collect();
    (records, totals)
}
