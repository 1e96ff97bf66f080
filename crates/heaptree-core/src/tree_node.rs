//! UI-facing tree nodes produced by the expansion engine.
//!
//! A [`TreeNode`] is created once, when its parent's edge page resolves, and
//! afterwards only its pagination state (`cursor` and `edges_end`) moves.
//! Cycle sentinels and "load more" placeholders are explicit in the type.

use serde::Serialize;
use uuid::Uuid;

use crate::model::{Address, Cursor, EdgeKind, GraphEdge, NodeId, NodePage};
use crate::path::ExpandPath;

/// Style class derived from the inbound edge type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeClass {
    /// `property`, `element` and `shortcut` edges.
    Property,
    /// `context` edges.
    Context,
}

impl EdgeClass {
    /// Maps an edge type to its style class; other types carry none.
    #[must_use]
    pub fn from_kind(kind: &EdgeKind) -> Option<Self> {
        match kind {
            EdgeKind::Property | EdgeKind::Element | EdgeKind::Shortcut => Some(Self::Property),
            EdgeKind::Context => Some(Self::Context),
            _ => None,
        }
    }

    /// Returns the class name used by renderers.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Property => "property",
            Self::Context => "context",
        }
    }
}

/// The edge through which a child node was reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InboundEdge {
    /// Display label (`name_or_index`).
    pub label: String,
    /// Edge type tag.
    pub kind: EdgeKind,
    /// Style class, if the edge type has one.
    pub class: Option<EdgeClass>,
}

impl From<&GraphEdge> for InboundEdge {
    fn from(edge: &GraphEdge) -> Self {
        Self {
            label: edge.name_or_index.clone(),
            kind: edge.kind.clone(),
            class: EdgeClass::from_kind(&edge.kind),
        }
    }
}

/// One materialized node of the tree view.
#[derive(Debug, Clone, Serialize)]
pub struct TreeNode {
    /// Unique rendering key; distinct even for repeated objects.
    pub key: Uuid,
    /// Provider identifier.
    pub id: NodeId,
    /// Display name.
    pub name: String,
    /// Stable object identity.
    pub address: Address,
    /// Human-readable `(type: ..., self_size: ...)` annotation.
    pub annotation: String,
    /// Edge that produced this node; `None` for the root.
    pub inbound: Option<InboundEdge>,
    /// Addresses from the root down to and including this node.
    pub expand_path: ExpandPath,
    /// Set when this node's address already occurs on its parent's path.
    pub cycle: bool,
    /// Current edge page, used when the node is expanded.
    pub edges: Vec<GraphEdge>,
    /// Pagination state: true once no edge page remains after the last one
    /// loaded. Set by "load more" when it consumes the final page.
    pub edges_end: bool,
    /// Pagination state: cursor to resume from for the next page.
    pub cursor: Cursor,
}

impl TreeNode {
    /// Formats a root node: no inbound edge, path is its own address.
    #[must_use]
    pub fn root(page: NodePage) -> Self {
        let expand_path = ExpandPath::root(page.address);
        Self::from_page(page, None, expand_path, false)
    }

    /// Formats a child reached from `parent_path` through `edge`.
    ///
    /// The cycle test runs against the parent's path, before the child's
    /// own address is appended.
    #[must_use]
    pub fn child(parent_path: &ExpandPath, edge: &GraphEdge, page: NodePage) -> Self {
        let cycle = parent_path.contains(page.address);
        let expand_path = parent_path.child(page.address);
        Self::from_page(page, Some(InboundEdge::from(edge)), expand_path, cycle)
    }

    fn from_page(
        page: NodePage,
        inbound: Option<InboundEdge>,
        expand_path: ExpandPath,
        cycle: bool,
    ) -> Self {
        Self {
            key: Uuid::new_v4(),
            id: page.id,
            annotation: annotation(&page.node_type, page.self_size),
            name: page.name,
            address: page.address,
            inbound,
            expand_path,
            cycle,
            edges: page.edges,
            edges_end: page.edges_end,
            cursor: page.edges_current,
        }
    }

    /// Returns true if this node renders as a leaf.
    ///
    /// Cycle sentinels are always leaves, whatever edges they report.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.cycle || (self.edges.is_empty() && self.edges_end)
    }

    /// Renderer class: `disabled` for cycle sentinels.
    #[must_use]
    pub fn css_class(&self) -> Option<&'static str> {
        if self.cycle {
            Some("disabled")
        } else {
            self.inbound.as_ref().and_then(|e| e.class).map(EdgeClass::as_str)
        }
    }
}

/// Synthetic "load more" placeholder, always the last of its siblings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadMore {
    /// Unique rendering key.
    pub key: Uuid,
    /// Identifier of the node whose edges continue.
    pub owner: NodeId,
    /// Cursor of the next edge page.
    pub cursor: Cursor,
}

impl LoadMore {
    /// Creates a placeholder for `owner` resuming at `cursor`.
    #[must_use]
    pub fn new(owner: NodeId, cursor: Cursor) -> Self {
        Self {
            key: Uuid::new_v4(),
            owner,
            cursor,
        }
    }
}

/// A child entry: either a formatted node or the trailing placeholder.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TreeEntry {
    /// A formatted graph node.
    Node(TreeNode),
    /// Pagination placeholder.
    LoadMore(LoadMore),
}

impl TreeEntry {
    /// Returns the node, if this entry is one.
    #[must_use]
    pub fn as_node(&self) -> Option<&TreeNode> {
        match self {
            Self::Node(node) => Some(node),
            Self::LoadMore(_) => None,
        }
    }

    /// Returns the placeholder, if this entry is one.
    #[must_use]
    pub fn as_load_more(&self) -> Option<&LoadMore> {
        match self {
            Self::LoadMore(more) => Some(more),
            Self::Node(_) => None,
        }
    }

    /// Rendering key of either variant.
    #[must_use]
    pub fn key(&self) -> Uuid {
        match self {
            Self::Node(node) => node.key,
            Self::LoadMore(more) => more.key,
        }
    }
}

/// Builds the `(type: ..., self_size: ...)` annotation.
#[must_use]
pub fn annotation(node_type: &str, self_size: u64) -> String {
    format!("(type: {node_type}, self_size: {})", format_size(self_size))
}

/// Formats a byte count with a binary unit suffix.
#[must_use]
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    #[allow(clippy::cast_precision_loss)]
    // Reason: display only, two decimals of precision are enough
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.2} {}", UNITS[unit])
}
