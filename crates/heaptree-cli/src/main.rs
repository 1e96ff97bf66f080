//! `heaptree` - browse a V8 heap snapshot as a lazily expanded retention tree.

mod explore;
mod retainers;

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use heaptree_core::{
    Address, ExpansionEngine, ExplorerConfig, ExplorerTree, HeapSnapshot, NodeId,
    SnapshotProvider,
};

use explore::ExploreOptions;

/// Heaptree - cycle-safe tree explorer for heap snapshots
#[derive(Parser, Debug)]
#[command(name = "heaptree")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Heap snapshot file (.heapsnapshot)
    snapshot: PathBuf,

    /// Root node by ordinal (defaults to the snapshot root)
    #[arg(long, conflicts_with = "address")]
    root: Option<u64>,

    /// Root node by address (the snapshot's `id` field)
    #[arg(long)]
    address: Option<u64>,

    /// Levels to expand below the root
    #[arg(short, long, default_value = "2")]
    depth: usize,

    /// Edges fetched per page
    #[arg(short = 'n', long)]
    page_size: Option<usize>,

    /// Extra edge pages to follow per expanded node
    #[arg(short, long, default_value = "0")]
    pages: usize,

    /// Configuration file (default: ./heaptree.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    print_config: bool,

    /// Emit JSON lines instead of an indented tree
    #[arg(long)]
    json: bool,

    /// List what retains the root node, with distances, instead of a tree
    #[arg(long, conflicts_with = "json")]
    retainers: bool,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Diagnostics go to stderr so stdout stays parseable.
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    if args.no_color {
        colored::control::set_override(false);
    }

    let mut config = match &args.config {
        Some(path) => ExplorerConfig::load_from(path),
        None => ExplorerConfig::load(),
    }
    .context("failed to load configuration")?;
    if let Some(page_size) = args.page_size {
        config.page_size = page_size;
    }
    if let Some(root) = args.root {
        config.root = Some(root);
    }
    config.validate()?;

    if args.print_config {
        print!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    let snapshot = HeapSnapshot::from_path(&args.snapshot)
        .with_context(|| format!("failed to load {}", args.snapshot.display()))?;
    let snapshot = Arc::new(snapshot);

    let root = match args.address {
        Some(address) => snapshot
            .ordinal_by_address(Address(address))
            .with_context(|| format!("no node at address {}", Address(address)))?,
        None => config.root.map_or_else(|| snapshot.root(), NodeId),
    };

    if args.retainers {
        print!("{}", retainers::render_retainers(&snapshot, root)?);
        return Ok(());
    }

    let engine = ExpansionEngine::new(SnapshotProvider::new(snapshot), &config)?;
    let tree = ExplorerTree::new(engine);
    let root_slot = tree.load_root(root).await?;

    let stats = explore::explore(
        &tree,
        root_slot,
        ExploreOptions {
            depth: args.depth,
            pages: args.pages,
        },
    )
    .await;
    tracing::info!(
        expanded = stats.expanded,
        pages = stats.pages_loaded,
        failures = stats.failures,
        nodes = tree.len(),
        "exploration finished"
    );

    if args.json {
        print!("{}", explore::render_json(&tree, root_slot)?);
    } else {
        print!("{}", explore::render_text(&tree, root_slot));
    }

    if stats.failures > 0 {
        anyhow::bail!("{} node(s) failed to expand", stats.failures);
    }
    Ok(())
}
