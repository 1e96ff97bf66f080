//! Shared test utilities: a scripted in-memory graph provider.
//!
//! Nodes, edges, per-node latency and failures are declared up front;
//! every fetch is logged so tests can assert what was (not) requested.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

use heaptree_core::{
    Address, Cursor, Error, ExpansionEngine, ExplorerConfig, ExplorerTree, GraphEdge,
    GraphNodeProvider, NodeId, NodePage, Result, SlotId, TreeEntry,
};

struct ScriptedNode {
    address: Address,
    name: String,
    edges: Vec<GraphEdge>,
}

/// Provider over a hand-built graph with latency and failure injection.
#[derive(Default)]
pub struct ScriptedProvider {
    nodes: HashMap<NodeId, ScriptedNode>,
    delays: HashMap<NodeId, Duration>,
    failing: Mutex<HashSet<NodeId>>,
    calls: Mutex<Vec<(NodeId, Cursor)>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares node `id` with the given address; the name is `N{id}`.
    #[must_use]
    pub fn node(mut self, id: u64, address: u64) -> Self {
        self.nodes.insert(
            NodeId(id),
            ScriptedNode {
                address: Address(address),
                name: format!("N{id}"),
                edges: Vec::new(),
            },
        );
        self
    }

    /// Adds a `property` edge `from --label--> to`.
    #[must_use]
    pub fn edge(mut self, from: u64, label: &str, to: u64) -> Self {
        self.nodes
            .get_mut(&NodeId(from))
            .expect("edge source must be declared first")
            .edges
            .push(GraphEdge::new("property", label, NodeId(to)));
        self
    }

    /// Delays every fetch of `id`.
    #[must_use]
    pub fn delay(mut self, id: u64, millis: u64) -> Self {
        self.delays.insert(NodeId(id), Duration::from_millis(millis));
        self
    }

    /// Makes fetches of `id` fail with `ProviderUnavailable`.
    pub fn fail(&self, id: u64) {
        self.failing.lock().insert(NodeId(id));
    }

    /// Lets fetches of `id` succeed again.
    pub fn heal(&self, id: u64) {
        self.failing.lock().remove(&NodeId(id));
    }

    /// All fetches so far, in issue order.
    pub fn calls(&self) -> Vec<(NodeId, Cursor)> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Builds the page a real backend would serve, without logging a call.
    pub fn page(&self, id: u64, cursor: Cursor, page_size: usize) -> NodePage {
        let node = &self.nodes[&NodeId(id)];
        let total = node.edges.len();
        let start = usize::try_from(cursor.0).unwrap().min(total);
        let end = (start + page_size).min(total);
        NodePage {
            id: NodeId(id),
            address: node.address,
            name: node.name.clone(),
            node_type: "object".to_string(),
            self_size: 16,
            edges: node.edges[start..end].to_vec(),
            edges_end: end >= total,
            edges_current: Cursor(end as u64),
        }
    }
}

#[async_trait]
impl GraphNodeProvider for ScriptedProvider {
    async fn fetch_node(&self, id: NodeId, cursor: Cursor, page_size: usize) -> Result<NodePage> {
        self.calls.lock().push((id, cursor));
        if let Some(delay) = self.delays.get(&id) {
            tokio::time::sleep(*delay).await;
        }
        if self.failing.lock().contains(&id) {
            return Err(Error::ProviderUnavailable(format!("fetch of node {id} refused")));
        }
        if !self.nodes.contains_key(&id) {
            return Err(Error::NodeNotFound(id));
        }
        Ok(self.page(id.0, cursor, page_size))
    }
}

pub fn tree(provider: ScriptedProvider, page_size: usize) -> ExplorerTree<ScriptedProvider> {
    let engine = ExpansionEngine::new(provider, &ExplorerConfig::with_page_size(page_size))
        .expect("valid page size");
    ExplorerTree::new(engine)
}

/// Renders child slots as `name` / `name*` (cycle sentinel) / `<more>`.
pub fn labels(tree: &ExplorerTree<ScriptedProvider>, slots: &[SlotId]) -> Vec<String> {
    slots
        .iter()
        .map(|&slot| match tree.entry(slot).expect("live slot") {
            TreeEntry::Node(node) if node.cycle => format!("{}*", node.name),
            TreeEntry::Node(node) => node.name,
            TreeEntry::LoadMore(_) => "<more>".to_string(),
        })
        .collect()
}
