//! In-memory V8 heap snapshot and a [`GraphNodeProvider`] backed by it.
//!
//! A `.heapsnapshot` file stores nodes and edges as flat integer arrays whose
//! per-record layout is described by `snapshot.meta`. Field offsets are
//! resolved by name, so snapshots carrying extra fields (`trace_node_id`,
//! `detachedness`) load unchanged.
//!
//! On load the snapshot also builds a reverse (retainer) index and the BFS
//! distance of every node from the roots, as heap profilers display them.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::fs::File;
use std::io::{BufReader, Read};
use std::ops::Range;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::error::{Error, Result};
use crate::model::{Address, Cursor, EdgeKind, GraphEdge, NodeId, NodePage};
use crate::provider::GraphNodeProvider;

/// Distance assigned to system (GC) roots. Nodes reachable only through
/// system roots have distances at or above this base.
pub const SYSTEM_DISTANCE_BASE: u32 = 100_000_000;

const GC_ROOTS_NAME: &str = "(GC roots)";

#[derive(Debug, Deserialize)]
struct RawSnapshot {
    snapshot: RawHeader,
    nodes: Vec<u64>,
    edges: Vec<u64>,
    strings: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawHeader {
    meta: RawMeta,
    #[serde(default)]
    root_index: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawMeta {
    node_fields: Vec<String>,
    node_types: Vec<Value>,
    edge_fields: Vec<String>,
    edge_types: Vec<Value>,
}

#[derive(Debug, Clone, Copy)]
struct NodeLayout {
    stride: usize,
    kind: usize,
    name: usize,
    id: usize,
    self_size: usize,
    edge_count: usize,
}

#[derive(Debug, Clone, Copy)]
struct EdgeLayout {
    stride: usize,
    kind: usize,
    name_or_index: usize,
    to_node: usize,
}

/// A parsed heap snapshot with the indexes needed to serve node pages.
#[derive(Debug)]
pub struct HeapSnapshot {
    nodes: Vec<u64>,
    edges: Vec<u64>,
    strings: Vec<String>,
    node_types: Vec<String>,
    edge_types: Vec<String>,
    node_layout: NodeLayout,
    edge_layout: EdgeLayout,
    /// Edge ordinal of each node's first edge; one extra trailing entry.
    first_edges: Vec<usize>,
    address_map: HashMap<Address, NodeId>,
    /// Index into `retaining_*` of each node's first retainer; one extra
    /// trailing entry.
    first_retainers: Vec<usize>,
    /// Source ordinal of each retaining edge, grouped by target.
    retaining_nodes: Vec<usize>,
    /// Edge ordinal of each retaining edge, grouped by target.
    retaining_edges: Vec<usize>,
    distances: Vec<Option<u32>>,
    root: NodeId,
}

impl HeapSnapshot {
    /// Parses a snapshot from its JSON text.
    pub fn from_json(json: &str) -> Result<Self> {
        Self::from_raw(serde_json::from_str(json)?)
    }

    /// Parses a snapshot from a reader.
    pub fn from_reader(reader: impl Read) -> Result<Self> {
        Self::from_raw(serde_json::from_reader(reader)?)
    }

    /// Opens and parses a `.heapsnapshot` file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let snapshot = Self::from_reader(BufReader::new(file))?;
        info!(
            path = %path.as_ref().display(),
            nodes = snapshot.node_count(),
            edges = snapshot.edge_count(),
            "heap snapshot loaded"
        );
        Ok(snapshot)
    }

    fn from_raw(raw: RawSnapshot) -> Result<Self> {
        let meta = &raw.snapshot.meta;
        let node_layout = NodeLayout {
            stride: meta.node_fields.len(),
            kind: field_offset(&meta.node_fields, "type")?,
            name: field_offset(&meta.node_fields, "name")?,
            id: field_offset(&meta.node_fields, "id")?,
            self_size: field_offset(&meta.node_fields, "self_size")?,
            edge_count: field_offset(&meta.node_fields, "edge_count")?,
        };
        let edge_layout = EdgeLayout {
            stride: meta.edge_fields.len(),
            kind: field_offset(&meta.edge_fields, "type")?,
            name_or_index: field_offset(&meta.edge_fields, "name_or_index")?,
            to_node: field_offset(&meta.edge_fields, "to_node")?,
        };
        let node_types = enum_names(&meta.node_types, "node_types")?;
        let edge_types = enum_names(&meta.edge_types, "edge_types")?;

        if raw.nodes.len() % node_layout.stride != 0 {
            return Err(malformed("nodes array is not a whole number of records"));
        }
        if raw.edges.len() % edge_layout.stride != 0 {
            return Err(malformed("edges array is not a whole number of records"));
        }
        let node_count = raw.nodes.len() / node_layout.stride;
        let edge_count = raw.edges.len() / edge_layout.stride;

        let mut first_edges = Vec::with_capacity(node_count + 1);
        let mut next_edge = 0usize;
        for ordinal in 0..node_count {
            first_edges.push(next_edge);
            let count = to_usize(raw.nodes[ordinal * node_layout.stride + node_layout.edge_count])?;
            next_edge = next_edge.saturating_add(count);
        }
        first_edges.push(next_edge);
        if next_edge != edge_count {
            return Err(malformed(&format!(
                "node edge counts sum to {next_edge} but {edge_count} edges are stored"
            )));
        }

        let mut targets = Vec::with_capacity(edge_count);
        for edge in 0..edge_count {
            let to_node = to_usize(raw.edges[edge * edge_layout.stride + edge_layout.to_node])?;
            if to_node % node_layout.stride != 0 || to_node / node_layout.stride >= node_count {
                return Err(malformed(&format!("edge {edge} points at invalid node index {to_node}")));
            }
            targets.push(to_node / node_layout.stride);
        }
        let (first_retainers, retaining_nodes, retaining_edges) =
            build_retainers(&first_edges, &targets);

        let mut address_map = HashMap::with_capacity(node_count);
        for ordinal in 0..node_count {
            let address = Address(raw.nodes[ordinal * node_layout.stride + node_layout.id]);
            address_map.insert(address, NodeId(ordinal as u64));
        }

        let root = NodeId(raw.snapshot.root_index.unwrap_or(0));
        if node_count > 0 && to_usize(root.0)? >= node_count {
            return Err(malformed(&format!("root index {root} is out of range")));
        }

        let mut snapshot = Self {
            nodes: raw.nodes,
            edges: raw.edges,
            strings: raw.strings,
            node_types,
            edge_types,
            node_layout,
            edge_layout,
            first_edges,
            address_map,
            first_retainers,
            retaining_nodes,
            retaining_edges,
            distances: Vec::new(),
            root,
        };
        snapshot.distances = snapshot.build_distances()?;
        Ok(snapshot)
    }

    /// Number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.first_edges.len() - 1
    }

    /// Number of edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len() / self.edge_layout.stride
    }

    /// The snapshot's root node.
    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Finds the node with the given address.
    #[must_use]
    pub fn ordinal_by_address(&self, address: Address) -> Option<NodeId> {
        self.address_map.get(&address).copied()
    }

    /// Node type name (`object`, `closure`, ...).
    pub fn node_type(&self, id: NodeId) -> Result<&str> {
        let raw = self.node_field(id, self.node_layout.kind)?;
        lookup(&self.node_types, raw, "node type")
    }

    /// Node display name.
    pub fn node_name(&self, id: NodeId) -> Result<&str> {
        let raw = self.node_field(id, self.node_layout.name)?;
        lookup(&self.strings, raw, "string")
    }

    /// Stable object address (the snapshot `id` field).
    pub fn address(&self, id: NodeId) -> Result<Address> {
        self.node_field(id, self.node_layout.id).map(Address)
    }

    /// Shallow size in bytes.
    pub fn self_size(&self, id: NodeId) -> Result<u64> {
        self.node_field(id, self.node_layout.self_size)
    }

    /// Number of outgoing edges.
    pub fn out_degree(&self, id: NodeId) -> Result<usize> {
        Ok(self.edge_range(id)?.len())
    }

    /// Number of edges pointing at this node.
    pub fn retainer_count(&self, id: NodeId) -> Result<usize> {
        Ok(self.retainer_range(id)?.len())
    }

    /// Edges pointing at this node, with their source nodes, ordered by
    /// source ordinal and then by edge order within the source.
    pub fn retainers(&self, id: NodeId) -> Result<Vec<(NodeId, GraphEdge)>> {
        self.retainer_range(id)?
            .map(|slot| {
                let source = NodeId(self.retaining_nodes[slot] as u64);
                Ok((source, self.edge(self.retaining_edges[slot])?))
            })
            .collect()
    }

    /// Shortest distance from the roots, ignoring weak edges.
    ///
    /// User roots (non-synthetic children of the snapshot root) sit at
    /// distance 1. Nodes reachable only from system roots get distances
    /// counted from [`SYSTEM_DISTANCE_BASE`]. `None` means unreachable.
    pub fn distance(&self, id: NodeId) -> Result<Option<u32>> {
        let ordinal = self.ordinal(id)?;
        Ok(self.distances.get(ordinal).copied().flatten())
    }

    /// Outgoing edges in storage order.
    pub fn edges(&self, id: NodeId) -> Result<Vec<GraphEdge>> {
        self.edge_range(id)?.map(|edge| self.edge(edge)).collect()
    }

    /// Builds the page of `id` holding edges `[cursor, cursor + page_size)`.
    pub fn page(&self, id: NodeId, cursor: Cursor, page_size: usize) -> Result<NodePage> {
        let range = self.edge_range(id)?;
        let total = range.len();
        let start = usize::try_from(cursor.0).unwrap_or(usize::MAX).min(total);
        let end = start.saturating_add(page_size).min(total);
        let edges = (range.start + start..range.start + end)
            .map(|edge| self.edge(edge))
            .collect::<Result<Vec<_>>>()?;

        Ok(NodePage {
            id,
            address: self.address(id)?,
            name: self.node_name(id)?.to_string(),
            node_type: self.node_type(id)?.to_string(),
            self_size: self.self_size(id)?,
            edges,
            edges_end: end >= total,
            edges_current: Cursor(end as u64),
        })
    }

    fn ordinal(&self, id: NodeId) -> Result<usize> {
        usize::try_from(id.0)
            .ok()
            .filter(|&ordinal| ordinal < self.node_count())
            .ok_or(Error::NodeNotFound(id))
    }

    fn node_field(&self, id: NodeId, offset: usize) -> Result<u64> {
        let ordinal = self.ordinal(id)?;
        Ok(self.nodes[ordinal * self.node_layout.stride + offset])
    }

    fn retainer_range(&self, id: NodeId) -> Result<Range<usize>> {
        let ordinal = self.ordinal(id)?;
        Ok(self.first_retainers[ordinal]..self.first_retainers[ordinal + 1])
    }

    fn edge_target(&self, edge: usize) -> usize {
        let raw = self.edges[edge * self.edge_layout.stride + self.edge_layout.to_node];
        raw as usize / self.node_layout.stride
    }

    fn edge_kind_name(&self, edge: usize) -> Result<&str> {
        let raw = self.edges[edge * self.edge_layout.stride + self.edge_layout.kind];
        lookup(&self.edge_types, raw, "edge type")
    }

    /// Targets of the snapshot root's outgoing edges, in edge order.
    fn root_targets(&self) -> Result<Vec<usize>> {
        Ok(self.edge_range(self.root)?.map(|e| self.edge_target(e)).collect())
    }

    fn build_distances(&self) -> Result<Vec<Option<u32>>> {
        let mut distances = vec![None; self.node_count()];
        if self.node_count() == 0 {
            return Ok(distances);
        }
        let root_targets = self.root_targets()?;
        let mut gc_roots = None;
        for &target in &root_targets {
            if self.node_name(NodeId(target as u64))? == GC_ROOTS_NAME {
                gc_roots = Some(target);
            }
        }
        let Some(gc_roots) = gc_roots else {
            return Ok(distances);
        };

        // User roots first, so user-reachable objects keep small distances.
        let mut queue = VecDeque::new();
        for &target in &root_targets {
            if self.node_type(NodeId(target as u64))? != "synthetic" {
                enqueue(&mut distances, &mut queue, target, 1);
            }
        }
        self.bfs(&mut distances, queue)?;

        // Then system roots: grandchildren and children of (GC roots), then
        // the remaining root children.
        let mut queue = VecDeque::new();
        for sub_root in self.edge_range(NodeId(gc_roots as u64))?.map(|e| self.edge_target(e)) {
            for nested in self.edge_range(NodeId(sub_root as u64))?.map(|e| self.edge_target(e)) {
                enqueue(&mut distances, &mut queue, nested, SYSTEM_DISTANCE_BASE);
            }
            enqueue(&mut distances, &mut queue, sub_root, SYSTEM_DISTANCE_BASE);
        }
        for &target in &root_targets {
            enqueue(&mut distances, &mut queue, target, SYSTEM_DISTANCE_BASE);
        }
        self.bfs(&mut distances, queue)?;
        Ok(distances)
    }

    fn bfs(&self, distances: &mut [Option<u32>], mut queue: VecDeque<usize>) -> Result<()> {
        while let Some(ordinal) = queue.pop_front() {
            let next = distances[ordinal].map_or(0, |d| d.saturating_add(1));
            for edge in self.edge_range(NodeId(ordinal as u64))? {
                if self.edge_kind_name(edge)? == "weak" {
                    continue;
                }
                enqueue(distances, &mut queue, self.edge_target(edge), next);
            }
        }
        Ok(())
    }

    fn edge_range(&self, id: NodeId) -> Result<Range<usize>> {
        let ordinal = self.ordinal(id)?;
        Ok(self.first_edges[ordinal]..self.first_edges[ordinal + 1])
    }

    fn edge(&self, edge: usize) -> Result<GraphEdge> {
        let base = edge * self.edge_layout.stride;
        let kind = EdgeKind::from(lookup(
            &self.edge_types,
            self.edges[base + self.edge_layout.kind],
            "edge type",
        )?);
        let raw_name = self.edges[base + self.edge_layout.name_or_index];
        let name_or_index = if kind.is_indexed() {
            raw_name.to_string()
        } else {
            lookup(&self.strings, raw_name, "string")?.to_string()
        };
        let to_node = self.edges[base + self.edge_layout.to_node] / self.node_layout.stride as u64;
        Ok(GraphEdge::new(kind, name_or_index, NodeId(to_node)))
    }
}

/// Serves node pages straight from an in-memory [`HeapSnapshot`].
#[derive(Debug, Clone)]
pub struct SnapshotProvider {
    snapshot: Arc<HeapSnapshot>,
}

impl SnapshotProvider {
    /// Wraps a parsed snapshot.
    #[must_use]
    pub fn new(snapshot: Arc<HeapSnapshot>) -> Self {
        Self { snapshot }
    }

    /// Returns the underlying snapshot.
    #[must_use]
    pub fn snapshot(&self) -> &HeapSnapshot {
        &self.snapshot
    }
}

#[async_trait]
impl GraphNodeProvider for SnapshotProvider {
    async fn fetch_node(&self, id: NodeId, cursor: Cursor, page_size: usize) -> Result<NodePage> {
        self.snapshot.page(id, cursor, page_size)
    }
}

/// Records `distance` for an unvisited node and queues it.
fn enqueue(distances: &mut [Option<u32>], queue: &mut VecDeque<usize>, ordinal: usize, distance: u32) {
    if distances[ordinal].is_none() {
        distances[ordinal] = Some(distance);
        queue.push_back(ordinal);
    }
}

/// Groups edges by target: returns per-node offsets plus the source node and
/// edge ordinal of every retaining edge.
fn build_retainers(first_edges: &[usize], targets: &[usize]) -> (Vec<usize>, Vec<usize>, Vec<usize>) {
    let node_count = first_edges.len() - 1;
    let mut first_retainers = vec![0usize; node_count + 1];
    for &target in targets {
        first_retainers[target + 1] += 1;
    }
    for ordinal in 0..node_count {
        first_retainers[ordinal + 1] += first_retainers[ordinal];
    }

    let mut next_slot = first_retainers.clone();
    let mut retaining_nodes = vec![0usize; targets.len()];
    let mut retaining_edges = vec![0usize; targets.len()];
    for source in 0..node_count {
        for edge in first_edges[source]..first_edges[source + 1] {
            let slot = &mut next_slot[targets[edge]];
            retaining_nodes[*slot] = source;
            retaining_edges[*slot] = edge;
            *slot += 1;
        }
    }
    (first_retainers, retaining_nodes, retaining_edges)
}

fn field_offset(fields: &[String], name: &str) -> Result<usize> {
    fields
        .iter()
        .position(|f| f == name)
        .ok_or_else(|| malformed(&format!("snapshot meta lacks field `{name}`")))
}

fn enum_names(types: &[Value], what: &str) -> Result<Vec<String>> {
    types
        .first()
        .and_then(Value::as_array)
        .map(|names| {
            names
                .iter()
                .map(|n| n.as_str().unwrap_or_default().to_string())
                .collect()
        })
        .ok_or_else(|| malformed(&format!("snapshot meta `{what}` has no name table")))
}

fn lookup<'a>(table: &'a [String], index: u64, what: &str) -> Result<&'a str> {
    usize::try_from(index)
        .ok()
        .and_then(|i| table.get(i))
        .map(String::as_str)
        .ok_or_else(|| malformed(&format!("{what} index {index} out of range")))
}

fn to_usize(value: u64) -> Result<usize> {
    usize::try_from(value).map_err(|_| malformed(&format!("value {value} does not fit in usize")))
}

fn malformed(message: &str) -> Error {
    Error::MalformedResponse(message.to_string())
}
