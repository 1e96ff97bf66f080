//! Provider-facing graph data: node pages and the edges they carry.
//!
//! Field names follow the JSON layout served by heap-snapshot backends
//! (`self_size`, `edges_end`, `edges_current`, `name_or_index`, `to_node`),
//! so a page can be deserialized directly from a provider response.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// Provider-local node identifier (the node ordinal in a snapshot).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable, globally unique object identity.
///
/// Two nodes may share a name and type but never an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(pub u64);

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// Pagination cursor into a node's edge list.
///
/// Opaque to the engine: it is only ever handed back to the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(pub u64);

impl Cursor {
    /// Cursor addressing the first edge page.
    pub const START: Cursor = Cursor(0);
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Edge type tag as reported by the heap snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EdgeKind {
    /// Closure context variable.
    Context,
    /// Indexed array element.
    Element,
    /// Named object property.
    Property,
    /// Engine-internal reference.
    Internal,
    /// Hidden reference not visible to script.
    Hidden,
    /// Shortcut added by the profiler.
    Shortcut,
    /// Weak reference.
    Weak,
    /// Any tag this crate does not know about.
    Other(String),
}

impl EdgeKind {
    /// Returns the wire name of this edge type.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Context => "context",
            Self::Element => "element",
            Self::Property => "property",
            Self::Internal => "internal",
            Self::Hidden => "hidden",
            Self::Shortcut => "shortcut",
            Self::Weak => "weak",
            Self::Other(name) => name,
        }
    }

    /// Returns true when `name_or_index` holds a numeric index rather than a string.
    #[must_use]
    pub fn is_indexed(&self) -> bool {
        matches!(self, Self::Element | Self::Hidden)
    }
}

impl From<String> for EdgeKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "context" => Self::Context,
            "element" => Self::Element,
            "property" => Self::Property,
            "internal" => Self::Internal,
            "hidden" => Self::Hidden,
            "shortcut" => Self::Shortcut,
            "weak" => Self::Weak,
            _ => Self::Other(value),
        }
    }
}

impl From<&str> for EdgeKind {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<EdgeKind> for String {
    fn from(kind: EdgeKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A labelled outgoing reference from one graph node to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEdge {
    /// Edge type tag.
    #[serde(rename = "type")]
    pub kind: EdgeKind,
    /// Display label: property name or element index.
    pub name_or_index: String,
    /// Identifier of the target node.
    pub to_node: NodeId,
}

impl GraphEdge {
    /// Creates a new edge.
    #[must_use]
    pub fn new(kind: impl Into<EdgeKind>, name_or_index: impl Into<String>, to_node: NodeId) -> Self {
        Self {
            kind: kind.into(),
            name_or_index: name_or_index.into(),
            to_node,
        }
    }
}

/// One provider response: node metadata plus one page of outgoing edges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodePage {
    /// Provider-local identifier.
    pub id: NodeId,
    /// Stable object identity.
    pub address: Address,
    /// Display name.
    pub name: String,
    /// Node type tag (`object`, `closure`, `string`, ...).
    #[serde(rename = "type")]
    pub node_type: String,
    /// Shallow size in bytes.
    pub self_size: u64,
    /// Outgoing edges for the requested page, in edge order.
    #[serde(default)]
    pub edges: Vec<GraphEdge>,
    /// True when no edges remain beyond this page.
    pub edges_end: bool,
    /// Cursor to resume from for the next page.
    pub edges_current: Cursor,
}

impl NodePage {
    /// Checks the page against the paging contract for a request made at
    /// `requested` with the given `page_size`.
    ///
    /// A page that is not the last one must hand back a different cursor,
    /// otherwise "load more" would request the same page forever. Cursors
    /// are compared for equality only; their order means nothing.
    pub fn validate(&self, requested: Cursor, page_size: usize) -> Result<()> {
        if self.edges.len() > page_size {
            return Err(Error::MalformedResponse(format!(
                "node {} returned {} edges for a page size of {}",
                self.id,
                self.edges.len(),
                page_size
            )));
        }
        if !self.edges_end && self.edges_current == requested {
            return Err(Error::MalformedResponse(format!(
                "node {} reports more edges but returned cursor {} unchanged",
                self.id, requested
            )));
        }
        Ok(())
    }
}
