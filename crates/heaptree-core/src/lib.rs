//! # heaptree-core
//!
//! Lazy, cycle-safe tree exploration of heap-snapshot object graphs.
//!
//! A heap snapshot is a cyclic directed graph: objects referencing objects.
//! This crate materializes a *tree view* over it one level at a time. A
//! [`GraphNodeProvider`] hands out a node plus one page of its outgoing
//! edges; the [`ExpansionEngine`] turns pages into [`TreeNode`]s, fetches
//! edge targets in parallel, paginates long edge lists behind a
//! [`LoadMore`] placeholder, and flags a node as a cycle sentinel when its
//! address already occurs on its own ancestor path. [`ExplorerTree`] keeps
//! the materialized tree and commits each step atomically.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use heaptree_core::{
//!     ExpansionEngine, ExplorerConfig, ExplorerTree, HeapSnapshot, SnapshotProvider,
//! };
//!
//! # async fn run() -> heaptree_core::Result<()> {
//! let snapshot = Arc::new(HeapSnapshot::from_path("app.heapsnapshot")?);
//! let root = snapshot.root();
//! let engine = ExpansionEngine::new(SnapshotProvider::new(snapshot), &ExplorerConfig::load()?)?;
//! let tree = ExplorerTree::new(engine);
//!
//! let root_slot = tree.load_root(root).await?;
//! for child in tree.expand(root_slot).await? {
//!     if let Some(node) = tree.node(child) {
//!         println!("{} {}", node.name, node.annotation);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![cfg_attr(test, allow(clippy::doc_markdown, clippy::uninlined_format_args))]

pub mod config;
pub mod engine;
#[cfg(test)]
mod engine_tests;
pub mod error;
pub mod model;
pub mod path;
pub mod provider;
pub mod reporter;
pub mod snapshot;
pub mod tree;
pub mod tree_node;
#[cfg(test)]
mod tree_tests;

pub use config::ExplorerConfig;
pub use engine::{ExpansionEngine, LoadMorePage};
pub use error::{Error, Result};
pub use model::{Address, Cursor, EdgeKind, GraphEdge, NodeId, NodePage};
pub use path::ExpandPath;
pub use provider::GraphNodeProvider;
pub use reporter::{ErrorReporter, TracingReporter};
pub use snapshot::{HeapSnapshot, SnapshotProvider, SYSTEM_DISTANCE_BASE};
pub use tree::{Expansion, ExplorerTree, SlotId};
pub use tree_node::{EdgeClass, InboundEdge, LoadMore, TreeEntry, TreeNode};
