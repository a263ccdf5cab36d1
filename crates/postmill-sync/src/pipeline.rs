//! Ingest and rebuild runs over the record stores.
//!
//! Every run loads what it needs first (catalogs, feed, prior collections) and
//! merges in memory before anything is written: each store file once,
//! atomically, followed by its run report. A multi-store ingest loads and merges
//! every store before the first write, so a bad collection file aborts the run
//! with all stores untouched.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use postmill_adapters::{
    adapter_for_store, enrich_post, EntityCatalog, FeedPayload, FeedSource, FileFeed, HttpFeed,
    PostAdapter, RoleBadgeCatalog,
};
use postmill_core::{Diagnostic, MergeOutcome, Record, StoreKind, StoreMode};
use postmill_storage::{
    load_collection, read_json_opt, save_collection, write_atomic, write_json_atomic, ArchivedFeed,
    FeedArchive, HttpClientConfig, HttpFetcher,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::merge::Collection;
use crate::rebuild::{assign_sequential_ids, inject_blog_authors, resolve_author_roles, SequentialIdScheme};
use crate::views::{apply_view_counts, JsonViewCounts, ViewCounter, ViewTotals};
use crate::{PipelineConfig, RecordOutcome, RunSummary, StoreConfig, StoreRegistry, SyncError};

/// A fetched feed and where its raw bytes were archived.
#[derive(Debug, Clone)]
pub struct FetchedFeed {
    pub source: String,
    pub payload: FeedPayload,
    pub archived: ArchivedFeed,
}

/// One store's merged collection, held in memory until it is written.
struct PendingIngest {
    kind: StoreKind,
    path: PathBuf,
    run_id: Uuid,
    started_at: DateTime<Utc>,
    records: Vec<Record>,
    outcomes: Vec<RecordOutcome>,
    inserted: usize,
    skipped: usize,
    rejected: usize,
}

pub struct SyncPipeline {
    config: PipelineConfig,
    registry: StoreRegistry,
    archive: FeedArchive,
}

impl SyncPipeline {
    pub fn new(config: PipelineConfig, registry: StoreRegistry) -> Self {
        let archive = FeedArchive::new(config.artifacts_dir.clone());
        Self {
            config,
            registry,
            archive,
        }
    }

    pub async fn from_config(config: PipelineConfig) -> Result<Self> {
        let registry = StoreRegistry::load(&config.registry_path).await?;
        Ok(Self::new(config, registry))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn registry(&self) -> &StoreRegistry {
        &self.registry
    }

    fn enabled_store(&self, kind: StoreKind) -> Result<StoreConfig, SyncError> {
        let store = self.registry.config_for(kind);
        if store.enabled {
            Ok(store)
        } else {
            Err(SyncError::StoreDisabled(kind))
        }
    }

    pub fn store_path(&self, kind: StoreKind) -> PathBuf {
        self.config.store_path(&self.registry.config_for(kind))
    }

    /// The configured feed: a local file wins over a URL.
    pub fn feed_source(&self) -> Result<Box<dyn FeedSource>> {
        if let Some(path) = &self.config.feed_file {
            return Ok(Box::new(FileFeed::new(path)));
        }
        if let Some(url) = &self.config.feed_url {
            let http = HttpFetcher::new(HttpClientConfig {
                timeout: Duration::from_secs(self.config.http_timeout_secs),
                user_agent: Some(self.config.user_agent.clone()),
                ..Default::default()
            })?;
            return Ok(Box::new(HttpFeed::new(url.clone(), http)));
        }
        Err(SyncError::NoFeedConfigured.into())
    }

    /// Fetch the feed and archive its raw bytes by content hash.
    pub async fn fetch_feed(&self, source: &dyn FeedSource) -> Result<FetchedFeed> {
        let payload = source.fetch().await.map_err(|err| SyncError::SourceUnavailable {
            name: source.name().to_string(),
            reason: err.to_string(),
        })?;
        let archived = self
            .archive
            .store(Utc::now(), source.name(), &payload.raw)
            .await
            .context("archiving raw feed")?;
        info!(
            feed = source.name(),
            posts = payload.posts.len(),
            archived = %archived.relative_path.display(),
            hash = %archived.content_hash,
            bytes = archived.byte_size,
            deduplicated = archived.deduplicated,
            "fetched feed"
        );
        Ok(FetchedFeed {
            source: source.name().to_string(),
            payload,
            archived,
        })
    }

    fn ingest_adapter(&self, kind: StoreKind) -> Result<Box<dyn PostAdapter>> {
        self.enabled_store(kind)?;
        Ok(adapter_for_store(kind).ok_or(SyncError::NotIngestStore(kind))?)
    }

    async fn load_authors(&self) -> Result<EntityCatalog> {
        EntityCatalog::load("authors", &self.config.authors_path)
            .await
            .with_context(|| format!("loading author catalog {}", self.config.authors_path.display()))
    }

    /// Fetch the configured feed once and ingest it into `kind`.
    pub async fn ingest(&self, kind: StoreKind) -> Result<RunSummary> {
        let adapter = self.ingest_adapter(kind)?;
        let authors = if adapter.uses_author_catalog() {
            Some(self.load_authors().await?)
        } else {
            None
        };
        let source = self.feed_source()?;
        let feed = self.fetch_feed(source.as_ref()).await?;
        let pending = self.merge_posts(adapter.as_ref(), authors.as_ref(), &feed).await?;
        self.commit(pending, &feed).await
    }

    /// Fetch the configured feed once and ingest it into every enabled ingest store.
    pub async fn ingest_all(&self) -> Result<Vec<RunSummary>> {
        let adapters = self
            .registry
            .enabled_ingest_stores()
            .into_iter()
            .map(|kind| self.ingest_adapter(kind))
            .collect::<Result<Vec<_>>>()?;
        let authors = if adapters.iter().any(|adapter| adapter.uses_author_catalog()) {
            Some(self.load_authors().await?)
        } else {
            None
        };
        let source = self.feed_source()?;
        let feed = self.fetch_feed(source.as_ref()).await?;

        let mut pending = Vec::with_capacity(adapters.len());
        for adapter in &adapters {
            pending.push(self.merge_posts(adapter.as_ref(), authors.as_ref(), &feed).await?);
        }

        let mut summaries = Vec::with_capacity(pending.len());
        for store in pending {
            summaries.push(self.commit(store, &feed).await?);
        }
        Ok(summaries)
    }

    /// Ingest an already fetched feed into `kind`.
    pub async fn run_ingest(&self, kind: StoreKind, feed: &FetchedFeed) -> Result<RunSummary> {
        let adapter = self.ingest_adapter(kind)?;
        let authors = if adapter.uses_author_catalog() {
            Some(self.load_authors().await?)
        } else {
            None
        };
        let pending = self.merge_posts(adapter.as_ref(), authors.as_ref(), feed).await?;
        self.commit(pending, feed).await
    }

    /// Load the prior collection of the adapter's store and merge every gated
    /// post into it, without writing anything.
    async fn merge_posts(
        &self,
        adapter: &dyn PostAdapter,
        authors: Option<&EntityCatalog>,
        feed: &FetchedFeed,
    ) -> Result<PendingIngest> {
        let started_at = Utc::now();
        let kind = adapter.store();
        let path = self.store_path(kind);

        let prior = load_collection(&path).await?;
        let mut collection = Collection::from_records(kind.identity_field(), prior);

        let mut outcomes = Vec::new();
        let (mut inserted, mut skipped, mut rejected) = (0usize, 0usize, 0usize);
        for post in &feed.payload.posts {
            if !adapter.accepts(post) {
                continue;
            }
            let mut parsed = adapter.parse_post(post);
            if let Some(authors) = authors {
                parsed = enrich_post(parsed, authors);
            }
            for diagnostic in &parsed.diagnostics {
                debug!(store = %kind, post_id = %parsed.post_id, %diagnostic, "record diagnostic");
            }

            let (next, outcome) = collection.merge(parsed.record);
            collection = next;
            match outcome {
                MergeOutcome::Inserted => inserted += 1,
                MergeOutcome::SkippedDuplicate => skipped += 1,
                MergeOutcome::MissingIdentity => {
                    rejected += 1;
                    warn!(
                        store = %kind,
                        post_id = %parsed.post_id,
                        identity = kind.identity_field(),
                        "record has no identity key; rejected"
                    );
                }
            }
            outcomes.push(RecordOutcome {
                post_id: parsed.post_id,
                outcome,
                diagnostics: parsed.diagnostics,
            });
        }

        Ok(PendingIngest {
            kind,
            path,
            run_id: Uuid::new_v4(),
            started_at,
            records: collection.into_records(),
            outcomes,
            inserted,
            skipped,
            rejected,
        })
    }

    /// Write a merged collection and its run report.
    async fn commit(&self, pending: PendingIngest, feed: &FetchedFeed) -> Result<RunSummary> {
        let PendingIngest {
            kind,
            path,
            run_id,
            started_at,
            records,
            outcomes,
            inserted,
            skipped,
            rejected,
        } = pending;

        save_collection(&path, &records)
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        info!(store = %kind, gated = outcomes.len(), inserted, skipped, rejected, "ingest complete");

        let summary = RunSummary {
            run_id,
            task: "ingest".to_string(),
            store: kind,
            started_at,
            finished_at: Utc::now(),
            store_path: path.display().to_string(),
            feed_source: Some(feed.source.clone()),
            archived_feed: Some(feed.archived.absolute_path.display().to_string()),
            feed_hash: Some(feed.archived.content_hash.clone()),
            posts_seen: feed.payload.posts.len(),
            gated: outcomes.len(),
            inserted,
            skipped,
            rejected,
            records_written: records.len(),
            outcomes,
            rebuild_diagnostics: Vec::new(),
            reports_dir: self.reports_dir_for(run_id).display().to_string(),
        };
        self.write_report(&summary).await?;
        Ok(summary)
    }

    /// Recompute a whole rebuild store from its current records.
    pub async fn run_rebuild(&self, kind: StoreKind) -> Result<RunSummary> {
        if kind.mode() != StoreMode::Rebuild {
            return Err(SyncError::NotRebuildStore(kind).into());
        }
        self.enabled_store(kind)?;
        let started_at = Utc::now();
        let path = self.store_path(kind);

        let (records, diagnostics) = match kind {
            StoreKind::Blogs => {
                let authors = self.load_authors().await?;
                let records = load_collection(&path).await?;
                (inject_blog_authors(records, &authors), Vec::new())
            }
            StoreKind::Companies => {
                let records = load_collection(&path).await?;
                (assign_sequential_ids(records, &SequentialIdScheme::companies()), Vec::new())
            }
            StoreKind::Authors => {
                let catalog = RoleBadgeCatalog::load(&self.config.roles_badges_path)
                    .await
                    .with_context(|| {
                        format!(
                            "loading roles and badges catalog {}",
                            self.config.roles_badges_path.display()
                        )
                    })?;
                let records = load_collection(&path).await?;
                resolve_author_roles(records, &catalog)
            }
            _ => return Err(SyncError::NotRebuildStore(kind).into()),
        };

        save_collection(&path, &records)
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        info!(store = %kind, records = records.len(), diagnostics = diagnostics.len(), "rebuild complete");

        self.finish_rebuild("rebuild", kind, started_at, &path, records.len(), diagnostics)
            .await
    }

    /// Add today's views from the configured counts file to the blog totals.
    pub async fn run_blog_views(&self) -> Result<RunSummary> {
        let counter = match &self.config.view_counts_path {
            Some(path) => JsonViewCounts::load(path).await?,
            None => {
                warn!("no view counts file configured; counting zero views");
                JsonViewCounts::default()
            }
        };
        self.run_blog_views_with(&counter).await
    }

    pub async fn run_blog_views_with(&self, counter: &dyn ViewCounter) -> Result<RunSummary> {
        self.enabled_store(StoreKind::Blogs)?;
        let started_at = Utc::now();
        let path = self.store_path(StoreKind::Blogs);
        let totals_path = &self.config.view_totals_path;

        let records = load_collection(&path).await?;
        let totals: ViewTotals = read_json_opt(totals_path).await?.unwrap_or_default();
        let (records, totals) = apply_view_counts(records, totals, counter);

        // Totals go last: after a failed totals write, a rerun rebuilds the same views.
        save_collection(&path, &records)
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        write_json_atomic(totals_path, &totals)
            .await
            .with_context(|| format!("writing {}", totals_path.display()))?;
        info!(blogs = records.len(), slugs = totals.len(), "blog views updated");

        self.finish_rebuild("blog-views", StoreKind::Blogs, started_at, &path, records.len(), Vec::new())
            .await
    }

    async fn finish_rebuild(
        &self,
        task: &str,
        kind: StoreKind,
        started_at: DateTime<Utc>,
        path: &Path,
        records_written: usize,
        rebuild_diagnostics: Vec<Diagnostic>,
    ) -> Result<RunSummary> {
        let run_id = Uuid::new_v4();
        let summary = RunSummary {
            run_id,
            task: task.to_string(),
            store: kind,
            started_at,
            finished_at: Utc::now(),
            store_path: path.display().to_string(),
            feed_source: None,
            archived_feed: None,
            feed_hash: None,
            posts_seen: 0,
            gated: 0,
            inserted: 0,
            skipped: 0,
            rejected: 0,
            records_written,
            outcomes: Vec::new(),
            rebuild_diagnostics,
            reports_dir: self.reports_dir_for(run_id).display().to_string(),
        };
        self.write_report(&summary).await?;
        Ok(summary)
    }

    fn reports_dir_for(&self, run_id: Uuid) -> PathBuf {
        self.config.reports_dir.join(run_id.to_string())
    }

    async fn write_report(&self, summary: &RunSummary) -> Result<()> {
        let dir = self.reports_dir_for(summary.run_id);
        write_atomic(&dir.join("run_brief.md"), summary.brief_markdown().as_bytes())
            .await
            .context("writing run_brief.md")?;
        write_json_atomic(&dir.join("run_summary.json"), summary)
            .await
            .context("writing run_summary.json")?;
        Ok(())
    }
}
