//! Store merging, rebuild transforms and run orchestration for postmill.

pub mod merge;
pub mod pipeline;
pub mod rebuild;
pub mod views;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use postmill_core::{Diagnostic, MergeOutcome, StoreKind, StoreMode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tracing::info;
use uuid::Uuid;

pub use merge::Collection;
pub use pipeline::{FetchedFeed, SyncPipeline};
pub use rebuild::{assign_sequential_ids, inject_blog_authors, resolve_author_roles, SequentialIdScheme};
pub use views::{apply_view_counts, JsonViewCounts, ViewCountError, ViewCounter, ViewTotals};

pub const CRATE_NAME: &str = "postmill-sync";

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub data_dir: PathBuf,
    pub feed_file: Option<PathBuf>,
    pub feed_url: Option<String>,
    pub authors_path: PathBuf,
    pub roles_badges_path: PathBuf,
    pub artifacts_dir: PathBuf,
    pub reports_dir: PathBuf,
    pub registry_path: PathBuf,
    pub view_counts_path: Option<PathBuf>,
    pub view_totals_path: PathBuf,
    pub user_agent: String,
    pub http_timeout_secs: u64,
}

fn env_path(key: &str, default: &str) -> PathBuf {
    std::env::var(key)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(default))
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        Self {
            data_dir: env_path("POSTMILL_DATA_DIR", "./categories"),
            feed_file: env_opt("POSTMILL_FEED_FILE").map(PathBuf::from),
            feed_url: env_opt("POSTMILL_FEED_URL"),
            authors_path: env_path("POSTMILL_AUTHORS_PATH", "./authors/authors.json"),
            roles_badges_path: env_path("POSTMILL_ROLES_BADGES_PATH", "./roles_and_badges.json"),
            artifacts_dir: env_path("POSTMILL_ARTIFACTS_DIR", "./artifacts"),
            reports_dir: env_path("POSTMILL_REPORTS_DIR", "./reports"),
            registry_path: env_path("POSTMILL_REGISTRY_PATH", "./stores.yaml"),
            view_counts_path: env_opt("POSTMILL_VIEW_COUNTS_PATH").map(PathBuf::from),
            view_totals_path: env_path("POSTMILL_STORAGE_DIR", "./storage").join("blog_views.json"),
            user_agent: std::env::var("POSTMILL_USER_AGENT")
                .unwrap_or_else(|_| "postmill/0.1".to_string()),
            http_timeout_secs: std::env::var("POSTMILL_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(20),
        }
    }

    /// All paths rooted under `root`, nothing read from the environment.
    pub fn rooted_at(root: &Path) -> Self {
        Self {
            data_dir: root.join("categories"),
            feed_file: None,
            feed_url: None,
            authors_path: root.join("authors").join("authors.json"),
            roles_badges_path: root.join("roles_and_badges.json"),
            artifacts_dir: root.join("artifacts"),
            reports_dir: root.join("reports"),
            registry_path: root.join("stores.yaml"),
            view_counts_path: None,
            view_totals_path: root.join("storage").join("blog_views.json"),
            user_agent: "postmill/0.1".to_string(),
            http_timeout_secs: 20,
        }
    }

    /// File backing a store. The authors store doubles as the author catalog.
    pub fn store_path(&self, store: &StoreConfig) -> PathBuf {
        match (&store.file, store.kind) {
            (Some(file), _) => self.data_dir.join(file),
            (None, StoreKind::Authors) => self.authors_path.clone(),
            (None, kind) => self.data_dir.join(kind.default_file_name()),
        }
    }
}

fn enabled_by_default() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub kind: StoreKind,
    /// File name under the data directory; absolute paths are used as-is.
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    /// Informational; must agree with the store kind when present.
    #[serde(default)]
    pub mode: Option<StoreMode>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl StoreConfig {
    pub fn for_kind(kind: StoreKind) -> Self {
        Self {
            kind,
            file: None,
            enabled: true,
            mode: Some(kind.mode()),
            notes: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreRegistry {
    pub stores: Vec<StoreConfig>,
}

impl Default for StoreRegistry {
    fn default() -> Self {
        Self {
            stores: StoreKind::ALL.into_iter().map(StoreConfig::for_kind).collect(),
        }
    }
}

impl StoreRegistry {
    pub fn from_yaml(text: &str) -> Result<Self> {
        let registry: Self = serde_yaml::from_str(text).context("parsing store registry")?;
        registry.validate()?;
        Ok(registry)
    }

    /// Load `stores.yaml`; a missing file means every store with default settings.
    pub async fn load(path: &Path) -> Result<Self> {
        match fs::read_to_string(path).await {
            Ok(text) => Self::from_yaml(&text).with_context(|| format!("loading {}", path.display())),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "store registry absent; using defaults");
                Ok(Self::default())
            }
            Err(err) => Err(err).with_context(|| format!("reading {}", path.display())),
        }
    }

    fn validate(&self) -> Result<()> {
        for (i, store) in self.stores.iter().enumerate() {
            if self.stores[..i].iter().any(|other| other.kind == store.kind) {
                bail!("store `{}` is listed more than once", store.kind);
            }
            if let Some(mode) = store.mode {
                if mode != store.kind.mode() {
                    bail!(
                        "store `{}` is declared {:?} but is a {:?} store",
                        store.kind,
                        mode,
                        store.kind.mode()
                    );
                }
            }
        }
        Ok(())
    }

    /// Settings for `kind`; stores the registry does not list use defaults.
    pub fn config_for(&self, kind: StoreKind) -> StoreConfig {
        self.stores
            .iter()
            .find(|store| store.kind == kind)
            .cloned()
            .unwrap_or_else(|| StoreConfig::for_kind(kind))
    }

    pub fn enabled_ingest_stores(&self) -> Vec<StoreKind> {
        StoreKind::ALL
            .into_iter()
            .filter(|kind| kind.mode() == StoreMode::Ingest)
            .filter(|kind| self.config_for(*kind).enabled)
            .collect()
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("feed source `{name}` unavailable: {reason}")]
    SourceUnavailable { name: String, reason: String },
    #[error("`{0}` is a rebuild store and takes no feed")]
    NotIngestStore(StoreKind),
    #[error("`{0}` is an ingest store and cannot be rebuilt")]
    NotRebuildStore(StoreKind),
    #[error("no feed configured; set POSTMILL_FEED_FILE or POSTMILL_FEED_URL")]
    NoFeedConfigured,
    #[error("store `{0}` is disabled in the store registry")]
    StoreDisabled(StoreKind),
}

/// What happened to one gated post.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordOutcome {
    pub post_id: String,
    pub outcome: MergeOutcome,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub task: String,
    pub store: StoreKind,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub store_path: String,
    pub feed_source: Option<String>,
    pub archived_feed: Option<String>,
    /// SHA-256 of the raw feed bytes.
    pub feed_hash: Option<String>,
    pub posts_seen: usize,
    pub gated: usize,
    pub inserted: usize,
    pub skipped: usize,
    pub rejected: usize,
    pub records_written: usize,
    pub outcomes: Vec<RecordOutcome>,
    pub rebuild_diagnostics: Vec<Diagnostic>,
    pub reports_dir: String,
}

impl RunSummary {
    pub fn diagnostic_count(&self) -> usize {
        self.rebuild_diagnostics.len()
            + self
                .outcomes
                .iter()
                .map(|outcome| outcome.diagnostics.len())
                .sum::<usize>()
    }

    pub fn brief_markdown(&self) -> String {
        let mut brief = format!(
            "# Postmill Run\n\n- Run ID: `{}`\n- Task: {}\n- Store: {}\n- Started: {}\n- Finished: {}\n- Store file: {}\n",
            self.run_id, self.task, self.store, self.started_at, self.finished_at, self.store_path
        );
        if let Some(source) = &self.feed_source {
            brief.push_str(&format!("- Feed: {source}\n"));
        }
        if let Some(archived) = &self.archived_feed {
            brief.push_str(&format!("- Archived feed: {archived}\n"));
        }
        if let Some(hash) = &self.feed_hash {
            brief.push_str(&format!("- Feed hash: sha256:{hash}\n"));
        }
        brief.push_str(&format!(
            "\n## Counts\n- Posts seen: {}\n- Gated: {}\n- Inserted: {}\n- Skipped duplicates: {}\n- Rejected: {}\n- Diagnostics: {}\n- Records written: {}\n",
            self.posts_seen,
            self.gated,
            self.inserted,
            self.skipped,
            self.rejected,
            self.diagnostic_count(),
            self.records_written
        ));

        let notes: Vec<String> = self
            .outcomes
            .iter()
            .flat_map(|o| o.diagnostics.iter().map(move |d| format!("- post {}: {d}", o.post_id)))
            .chain(self.rebuild_diagnostics.iter().map(|d| format!("- {d}")))
            .collect();
        if !notes.is_empty() {
            brief.push_str("\n## Diagnostics\n");
            brief.push_str(&notes.join("\n"));
            brief.push('\n');
        }
        brief
    }
}
