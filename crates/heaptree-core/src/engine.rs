//! Lazy expansion engine.
//!
//! Turns provider pages into [`TreeNode`]s on demand. The engine holds no
//! tree state: every operation takes what it needs (a parent node, a
//! placeholder and its owner's path) and returns freshly formatted nodes.
//! [`ExplorerTree`](crate::ExplorerTree) commits those results.

use futures::future::try_join_all;
use tracing::{debug, info};

use crate::config::ExplorerConfig;
use crate::error::{Error, Result};
use crate::model::{Cursor, GraphEdge, NodeId, NodePage};
use crate::path::ExpandPath;
use crate::provider::GraphNodeProvider;
use crate::tree_node::{LoadMore, TreeEntry, TreeNode};

/// Children revealed by one "load more" continuation.
#[derive(Debug, Clone)]
pub struct LoadMorePage {
    /// Newly formatted children, in edge order.
    pub children: Vec<TreeNode>,
    /// Cursor for the following page; `None` once the owner's edges end.
    pub next: Option<Cursor>,
}

/// Fetches and formats tree nodes through a [`GraphNodeProvider`].
#[derive(Debug)]
pub struct ExpansionEngine<P> {
    provider: P,
    page_size: usize,
}

impl<P: GraphNodeProvider> ExpansionEngine<P> {
    /// Creates an engine fetching `config.page_size` edges per page.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` if the page size is zero.
    pub fn new(provider: P, config: &ExplorerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            provider,
            page_size: config.page_size,
        })
    }

    /// Returns the page size applied to every fetch.
    #[must_use]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Returns the underlying provider.
    #[must_use]
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Loads the top-level node: a single root with `expand_path = [address]`.
    pub async fn expand_root(&self, root: NodeId) -> Result<Vec<TreeNode>> {
        let page = self.fetch(root, Cursor::START).await?;
        info!(%root, address = %page.address, edges = page.edges.len(), "root loaded");
        Ok(vec![TreeNode::root(page)])
    }

    /// Expands `parent` from its known edge page.
    ///
    /// Children keep edge order; a [`LoadMore`] placeholder trails them when
    /// the page is not the last. Any failed target fetch fails the whole
    /// batch and nothing is returned.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotExpandable` for cycle sentinels without calling the
    /// provider, otherwise the first provider error.
    pub async fn expand_children(&self, parent: &TreeNode) -> Result<Vec<TreeEntry>> {
        if parent.cycle {
            return Err(Error::NotExpandable(format!(
                "node {} ({}) is already on its own path",
                parent.id, parent.address
            )));
        }
        if parent.edges.is_empty() {
            return Ok(Vec::new());
        }

        let mut entries: Vec<TreeEntry> = self
            .fetch_children(&parent.expand_path, &parent.edges)
            .await?
            .into_iter()
            .map(TreeEntry::Node)
            .collect();

        if !parent.edges_end {
            entries.push(TreeEntry::LoadMore(LoadMore::new(parent.id, parent.cursor)));
        }
        Ok(entries)
    }

    /// Fetches the page after `placeholder.cursor` and formats its targets.
    ///
    /// `parent_path` is the owning node's path; cycle detection runs against
    /// it, never against the placeholder.
    pub async fn load_more(
        &self,
        placeholder: &LoadMore,
        parent_path: &ExpandPath,
    ) -> Result<LoadMorePage> {
        let page = self.fetch(placeholder.owner, placeholder.cursor).await?;
        if page.address != parent_path.last() {
            return Err(Error::MalformedResponse(format!(
                "node {} moved from {} to {} between pages",
                page.id,
                parent_path.last(),
                page.address
            )));
        }

        let children = self.fetch_children(parent_path, &page.edges).await?;
        let next = (!page.edges_end).then_some(page.edges_current);
        debug!(
            owner = %placeholder.owner,
            from = %placeholder.cursor,
            loaded = children.len(),
            more = next.is_some(),
            "load more resolved"
        );
        Ok(LoadMorePage { children, next })
    }

    /// Formats a root from data already at hand, without fetching.
    #[must_use]
    pub fn format_root(&self, page: NodePage) -> TreeNode {
        TreeNode::root(page)
    }

    async fn fetch_children(
        &self,
        parent_path: &ExpandPath,
        edges: &[GraphEdge],
    ) -> Result<Vec<TreeNode>> {
        if edges.is_empty() {
            return Ok(Vec::new());
        }
        debug!(parent = %parent_path.last(), targets = edges.len(), "fetching edge targets");

        // try_join_all yields results by input index, not completion order.
        let pages =
            try_join_all(edges.iter().map(|edge| self.fetch(edge.to_node, Cursor::START))).await?;

        Ok(edges
            .iter()
            .zip(pages)
            .map(|(edge, page)| TreeNode::child(parent_path, edge, page))
            .collect())
    }

    async fn fetch(&self, id: NodeId, cursor: Cursor) -> Result<NodePage> {
        let page = self.provider.fetch_node(id, cursor, self.page_size).await?;
        if page.id != id {
            return Err(Error::MalformedResponse(format!(
                "requested node {id}, provider answered with {}",
                page.id
            )));
        }
        page.validate(cursor, self.page_size)?;
        Ok(page)
    }
}
