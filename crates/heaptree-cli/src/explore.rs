//! Breadth-first expansion driver and tree rendering.

use colored::Colorize;
use futures::future::join_all;
use serde::Serialize;
use std::fmt::Write;
use tracing::{debug, warn};

use heaptree_core::{EdgeClass, Error, ExplorerTree, GraphNodeProvider, SlotId, TreeEntry};

/// How far to expand below the root.
#[derive(Debug, Clone, Copy)]
pub struct ExploreOptions {
    /// Levels to expand below the root.
    pub depth: usize,
    /// Extra edge pages to follow per node.
    pub pages: usize,
}

/// Counters gathered while exploring.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExploreStats {
    pub expanded: usize,
    pub pages_loaded: usize,
    pub failures: usize,
}

/// Expands the tree level by level. Nodes of one level expand concurrently;
/// a failed node is skipped and its subtree left collapsed. A failed extra
/// page is counted, but the children already committed are still explored.
pub async fn explore<P: GraphNodeProvider>(
    tree: &ExplorerTree<P>,
    root: SlotId,
    options: ExploreOptions,
) -> ExploreStats {
    let mut stats = ExploreStats::default();
    let mut level = vec![root];

    for depth in 0..options.depth {
        let results = join_all(
            level
                .iter()
                .map(|&slot| expand_with_pages(tree, slot, options.pages)),
        )
        .await;

        let mut next = Vec::new();
        for (&slot, result) in level.iter().zip(results) {
            match result {
                Ok(outcome) => {
                    stats.expanded += 1;
                    stats.pages_loaded += outcome.pages;
                    if let Some(err) = outcome.page_error {
                        stats.failures += 1;
                        warn!(%slot, depth, "stopped paging: {err}");
                    }
                    next.extend(
                        outcome
                            .children
                            .into_iter()
                            .filter(|&c| is_expandable(tree, c)),
                    );
                }
                Err(err) => {
                    stats.failures += 1;
                    warn!(%slot, depth, "skipping subtree: {err}");
                }
            }
        }
        debug!(depth, next = next.len(), "level expanded");
        if next.is_empty() {
            break;
        }
        level = next;
    }
    stats
}

/// Children of one expanded node. A failed page keeps what was committed.
struct NodeOutcome {
    children: Vec<SlotId>,
    pages: usize,
    page_error: Option<Error>,
}

async fn expand_with_pages<P: GraphNodeProvider>(
    tree: &ExplorerTree<P>,
    slot: SlotId,
    max_pages: usize,
) -> Result<NodeOutcome, Error> {
    let mut children = tree.expand(slot).await?;
    let mut pages = 0;
    let mut page_error = None;
    while pages < max_pages {
        let Some(&last) = children.last() else {
            break;
        };
        if !matches!(tree.entry(last), Some(TreeEntry::LoadMore(_))) {
            break;
        }
        if let Err(err) = tree.load_more(last).await {
            page_error = Some(err);
            break;
        }
        pages += 1;
        children = tree.children(slot);
    }
    Ok(NodeOutcome {
        children,
        pages,
        page_error,
    })
}

fn is_expandable<P: GraphNodeProvider>(tree: &ExplorerTree<P>, slot: SlotId) -> bool {
    tree.node(slot).is_some_and(|node| !node.is_leaf())
}

/// Renders the subtree under `root` as an indented listing.
pub fn render_text<P: GraphNodeProvider>(tree: &ExplorerTree<P>, root: SlotId) -> String {
    let mut out = String::new();
    tree.walk(root, |_, depth, entry| {
        let indent = "  ".repeat(depth);
        match entry {
            TreeEntry::Node(node) => {
                let _ = write!(out, "{indent}");
                if let Some(edge) = &node.inbound {
                    let label = match edge.class {
                        Some(EdgeClass::Property) => edge.label.cyan(),
                        Some(EdgeClass::Context) => edge.label.yellow(),
                        None => edge.label.normal(),
                    };
                    let _ = write!(out, "{label} :: ");
                }
                let name = if node.cycle {
                    node.name.dimmed()
                } else {
                    node.name.bold()
                };
                let _ = write!(out, "{name} {} {}", node.address, node.annotation.dimmed());
                if node.cycle {
                    let _ = write!(out, " {}", "[cycle]".red());
                }
                out.push('\n');
            }
            TreeEntry::LoadMore(more) => {
                let _ = writeln!(
                    out,
                    "{indent}{}",
                    format!("... more edges (cursor {})", more.cursor).italic()
                );
            }
        }
    });
    out
}

#[derive(Serialize)]
struct JsonLine<'a> {
    depth: usize,
    #[serde(flatten)]
    entry: &'a TreeEntry,
}

/// Renders the subtree under `root` as JSON lines, one entry per line.
pub fn render_json<P: GraphNodeProvider>(
    tree: &ExplorerTree<P>,
    root: SlotId,
) -> serde_json::Result<String> {
    let mut out = String::new();
    let mut result = Ok(());
    tree.walk(root, |_, depth, entry| {
        if result.is_err() {
            return;
        }
        match serde_json::to_string(&JsonLine { depth, entry }) {
            Ok(line) => {
                out.push_str(&line);
                out.push('\n');
            }
            Err(err) => result = Err(err),
        }
    });
    result.map(|()| out)
}
