use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use postmill_core::StoreKind;
use postmill_sync::{PipelineConfig, RunSummary, SyncPipeline};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "postmill")]
#[command(about = "Turn labeled page posts into structured content stores")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Fetch the feed and merge new posts into one ingest store, or all of them.
    Ingest {
        store: Option<StoreKind>,
        /// Read the feed from this file instead of POSTMILL_FEED_FILE / POSTMILL_FEED_URL.
        #[arg(long)]
        feed_file: Option<PathBuf>,
        #[arg(long, conflicts_with = "feed_file")]
        feed_url: Option<String>,
    },
    /// Recompute a rebuild store from its current records.
    Rebuild {
        target: RebuildTarget,
        /// Precomputed `{slug: count}` file for `blog-views`.
        #[arg(long)]
        counts: Option<PathBuf>,
    },
    /// List the store registry.
    Stores,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum RebuildTarget {
    Blogs,
    Companies,
    Authors,
    BlogViews,
}

fn print_summary(summary: &RunSummary) {
    println!(
        "{} {}: run_id={} seen={} gated={} inserted={} skipped={} rejected={} diagnostics={} written={} reports={}",
        summary.task,
        summary.store,
        summary.run_id,
        summary.posts_seen,
        summary.gated,
        summary.inserted,
        summary.skipped,
        summary.rejected,
        summary.diagnostic_count(),
        summary.records_written,
        summary.reports_dir
    );
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let mut config = PipelineConfig::from_env();

    match cli.command {
        Commands::Ingest {
            store,
            feed_file,
            feed_url,
        } => {
            if feed_file.is_some() || feed_url.is_some() {
                config.feed_file = feed_file;
                config.feed_url = feed_url;
            }
            let pipeline = SyncPipeline::from_config(config).await?;
            match store {
                Some(kind) => print_summary(&pipeline.ingest(kind).await?),
                None => {
                    for summary in pipeline.ingest_all().await? {
                        print_summary(&summary);
                    }
                }
            }
        }
        Commands::Rebuild { target, counts } => {
            if counts.is_some() {
                config.view_counts_path = counts;
            }
            let pipeline = SyncPipeline::from_config(config).await?;
            let summary = match target {
                RebuildTarget::Blogs => pipeline.run_rebuild(StoreKind::Blogs).await?,
                RebuildTarget::Companies => pipeline.run_rebuild(StoreKind::Companies).await?,
                RebuildTarget::Authors => pipeline.run_rebuild(StoreKind::Authors).await?,
                RebuildTarget::BlogViews => pipeline.run_blog_views().await?,
            };
            print_summary(&summary);
        }
        Commands::Stores => {
            let pipeline = SyncPipeline::from_config(config).await?;
            for kind in StoreKind::ALL {
                let store = pipeline.registry().config_for(kind);
                println!(
                    "{:<16} {:<8} {:<9} {}{}",
                    kind.as_str(),
                    format!("{:?}", kind.mode()).to_lowercase(),
                    if store.enabled { "enabled" } else { "disabled" },
                    pipeline.store_path(kind).display(),
                    store.notes.map(|n| format!("  # {n}")).unwrap_or_default()
                );
            }
        }
    }

    Ok(())
}
