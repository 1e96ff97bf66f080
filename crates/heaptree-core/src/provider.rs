//! The graph data contract consumed by the expansion engine.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;
use crate::model::{Cursor, NodeId, NodePage};

/// Source of node pages: one node's metadata plus one page of its edges.
///
/// Implementations report transport failures as
/// [`Error::ProviderUnavailable`](crate::Error::ProviderUnavailable), unknown
/// identifiers as [`Error::NodeNotFound`](crate::Error::NodeNotFound) and
/// contract violations as
/// [`Error::MalformedResponse`](crate::Error::MalformedResponse).
#[async_trait]
pub trait GraphNodeProvider: Send + Sync {
    /// Fetches `id` with edges `[cursor, cursor + page_size)`.
    async fn fetch_node(&self, id: NodeId, cursor: Cursor, page_size: usize) -> Result<NodePage>;
}

#[async_trait]
impl<P: GraphNodeProvider + ?Sized> GraphNodeProvider for Arc<P> {
    async fn fetch_node(&self, id: NodeId, cursor: Cursor, page_size: usize) -> Result<NodePage> {
        (**self).fetch_node(id, cursor, page_size).await
    }
}
