//! Tests for ExpansionEngine against the cycle fixture snapshot.

use async_trait::async_trait;
use std::sync::Arc;

use super::config::ExplorerConfig;
use super::engine::ExpansionEngine;
use super::error::{Error, Result};
use super::model::{Address, Cursor, NodeId, NodePage};
use super::provider::GraphNodeProvider;
use super::snapshot::{HeapSnapshot, SnapshotProvider};
use super::tree_node::{EdgeClass, TreeEntry, TreeNode};

const CYCLE_SNAPSHOT: &str = include_str!("../tests/fixtures/cycle.heapsnapshot");

fn engine(page_size: usize) -> ExpansionEngine<SnapshotProvider> {
    let snapshot = Arc::new(HeapSnapshot::from_json(CYCLE_SNAPSHOT).unwrap());
    ExpansionEngine::new(
        SnapshotProvider::new(snapshot),
        &ExplorerConfig::with_page_size(page_size),
    )
    .unwrap()
}

fn nodes(entries: Vec<TreeEntry>) -> Vec<TreeNode> {
    entries
        .into_iter()
        .filter_map(|e| match e {
            TreeEntry::Node(node) => Some(node),
            TreeEntry::LoadMore(_) => None,
        })
        .collect()
}

#[test]
fn test_zero_page_size_rejected() {
    let snapshot = Arc::new(HeapSnapshot::from_json(CYCLE_SNAPSHOT).unwrap());
    let result = ExpansionEngine::new(
        SnapshotProvider::new(snapshot),
        &ExplorerConfig::with_page_size(0),
    );
    assert!(matches!(result, Err(Error::InvalidConfig(_))));
}

#[tokio::test]
async fn test_expand_root_returns_single_root() {
    let engine = engine(100);
    let roots = engine.expand_root(NodeId(0)).await.unwrap();

    assert_eq!(roots.len(), 1);
    assert_eq!(roots[0].name, "(GC roots)");
    assert!(roots[0].inbound.is_none());
    assert_eq!(roots[0].expand_path.to_vec(), vec![Address(1)]);
}

#[tokio::test]
async fn test_expand_children_formats_edges_in_order() {
    let engine = engine(100);
    let root = engine.expand_root(NodeId(0)).await.unwrap().remove(0);
    let children = engine.expand_children(&root).await.unwrap();

    assert_eq!(children.len(), 2);
    let children = nodes(children);
    assert_eq!(children[0].name, "Window");
    assert_eq!(children[0].inbound.as_ref().unwrap().label, "bar");
    assert_eq!(children[0].inbound.as_ref().unwrap().class, Some(EdgeClass::Property));
    assert_eq!(children[1].name, "Foo");
    assert_eq!(children[1].inbound.as_ref().unwrap().label, "0");
    assert_eq!(children[1].expand_path.to_vec(), vec![Address(1), Address(5)]);
    assert!(children.iter().all(|c| !c.cycle));
}

#[tokio::test]
async fn test_self_reference_is_cycle_sentinel() {
    let engine = engine(100);
    let root = engine.expand_root(NodeId(0)).await.unwrap().remove(0);
    let window = nodes(engine.expand_children(&root).await.unwrap()).remove(0);
    let children = nodes(engine.expand_children(&window).await.unwrap());

    let foo = &children[0];
    let self_ref = &children[1];
    assert!(!foo.cycle);
    assert!(self_ref.cycle);
    assert_eq!(self_ref.inbound.as_ref().unwrap().class, Some(EdgeClass::Context));

    let err = engine.expand_children(self_ref).await.unwrap_err();
    assert!(matches!(err, Error::NotExpandable(_)));
}

#[tokio::test]
async fn test_paginated_parent_gets_trailing_placeholder() {
    let engine = engine(1);
    let root = engine.expand_root(NodeId(0)).await.unwrap().remove(0);
    let children = engine.expand_children(&root).await.unwrap();

    assert_eq!(children.len(), 2);
    assert_eq!(children[0].as_node().unwrap().name, "Window");
    let more = children[1].as_load_more().unwrap();
    assert_eq!(more.owner, NodeId(0));
    assert_eq!(more.cursor, Cursor(1));

    let page = engine.load_more(more, &root.expand_path).await.unwrap();
    assert_eq!(page.children.len(), 1);
    assert_eq!(page.children[0].name, "Foo");
    assert_eq!(page.next, None);
}

struct WrongIdProvider;

#[async_trait]
impl GraphNodeProvider for WrongIdProvider {
    async fn fetch_node(&self, id: NodeId, cursor: Cursor, _page_size: usize) -> Result<NodePage> {
        Ok(NodePage {
            id: NodeId(id.0 + 1),
            address: Address(1),
            name: "impostor".to_string(),
            node_type: "object".to_string(),
            self_size: 0,
            edges: vec![],
            edges_end: true,
            edges_current: cursor,
        })
    }
}

#[tokio::test]
async fn test_mismatched_page_id_is_malformed() {
    let engine = ExpansionEngine::new(WrongIdProvider, &ExplorerConfig::default()).unwrap();
    let err = engine.expand_root(NodeId(4)).await.unwrap_err();
    assert!(matches!(err, Error::MalformedResponse(_)));
}
