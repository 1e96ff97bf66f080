//! Tests for ExplorerTree commits, pagination and reset.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::config::ExplorerConfig;
use super::engine::ExpansionEngine;
use super::error::{Error, Result};
use super::model::{Address, Cursor, NodeId, NodePage};
use super::provider::GraphNodeProvider;
use super::reporter::ErrorReporter;
use super::snapshot::{HeapSnapshot, SnapshotProvider};
use super::tree::{Expansion, ExplorerTree};
use super::tree_node::TreeEntry;

const CYCLE_SNAPSHOT: &str = include_str!("../tests/fixtures/cycle.heapsnapshot");

/// Counts provider calls so tests can assert that no fetch happened.
struct CountingProvider {
    inner: SnapshotProvider,
    calls: AtomicUsize,
}

#[async_trait]
impl GraphNodeProvider for CountingProvider {
    async fn fetch_node(&self, id: NodeId, cursor: Cursor, page_size: usize) -> Result<NodePage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.fetch_node(id, cursor, page_size).await
    }
}

#[derive(Default)]
struct RecordingReporter {
    seen: Mutex<Vec<String>>,
}

impl ErrorReporter for RecordingReporter {
    fn report(&self, context: &str, err: &Error) {
        self.seen.lock().push(format!("{context}: {err}"));
    }
}

fn provider() -> CountingProvider {
    let snapshot = Arc::new(HeapSnapshot::from_json(CYCLE_SNAPSHOT).unwrap());
    CountingProvider {
        inner: SnapshotProvider::new(snapshot),
        calls: AtomicUsize::new(0),
    }
}

fn tree(page_size: usize) -> ExplorerTree<CountingProvider> {
    let engine =
        ExpansionEngine::new(provider(), &ExplorerConfig::with_page_size(page_size)).unwrap();
    ExplorerTree::new(engine)
}

fn calls(tree: &ExplorerTree<CountingProvider>) -> usize {
    tree.engine().provider().calls.load(Ordering::SeqCst)
}

fn names(tree: &ExplorerTree<CountingProvider>, slots: &[super::tree::SlotId]) -> Vec<String> {
    slots
        .iter()
        .map(|&s| match tree.entry(s).unwrap() {
            TreeEntry::Node(node) => node.name,
            TreeEntry::LoadMore(_) => "<more>".to_string(),
        })
        .collect()
}

#[tokio::test]
async fn test_load_root_installs_single_root() {
    let tree = tree(100);
    assert!(tree.is_empty());

    let root = tree.load_root(NodeId(0)).await.unwrap();
    assert_eq!(tree.root(), Some(root));
    assert_eq!(tree.len(), 1);
    assert_eq!(tree.expansion(root), Some(Expansion::Collapsed));
    assert_eq!(tree.node(root).unwrap().name, "(GC roots)");
}

#[tokio::test]
async fn test_expand_commits_children_once() {
    let tree = tree(100);
    let root = tree.load_root(NodeId(0)).await.unwrap();

    let children = tree.expand(root).await.unwrap();
    assert_eq!(names(&tree, &children), ["Window", "Foo"]);
    assert_eq!(tree.expansion(root), Some(Expansion::Expanded));
    assert_eq!(tree.parent(children[0]), Some(root));

    let before = calls(&tree);
    let again = tree.expand(root).await.unwrap();
    assert_eq!(again, children);
    assert_eq!(calls(&tree), before);
}

#[tokio::test]
async fn test_cycle_sentinel_is_never_expanded() {
    let tree = tree(100);
    let root = tree.load_root(NodeId(0)).await.unwrap();
    let window = tree.expand(root).await.unwrap()[0];
    let window_children = tree.expand(window).await.unwrap();
    let self_ref = window_children[1];
    assert!(tree.node(self_ref).unwrap().cycle);

    let before = calls(&tree);
    let err = tree.expand(self_ref).await.unwrap_err();
    assert!(matches!(err, Error::NotExpandable(_)));
    assert_eq!(calls(&tree), before);
    assert!(tree.children(self_ref).is_empty());
}

#[tokio::test]
async fn test_load_more_drains_placeholder() {
    let tree = tree(1);
    let root = tree.load_root(NodeId(0)).await.unwrap();

    let children = tree.expand(root).await.unwrap();
    assert_eq!(names(&tree, &children), ["Window", "<more>"]);

    let inserted = tree.load_more(children[1]).await.unwrap();
    assert_eq!(names(&tree, &inserted), ["Foo"]);

    let final_children = tree.children(root);
    assert_eq!(names(&tree, &final_children), ["Window", "Foo"]);
    assert!(tree.entry(children[1]).is_none());
    assert!(tree.node(root).unwrap().edges_end);
}

#[tokio::test]
async fn test_placeholder_cannot_be_expanded() {
    let tree = tree(1);
    let root = tree.load_root(NodeId(0)).await.unwrap();
    let placeholder = tree.expand(root).await.unwrap()[1];

    assert!(matches!(
        tree.expand(placeholder).await,
        Err(Error::NotExpandable(_))
    ));
    assert!(matches!(
        tree.load_more(root).await,
        Err(Error::NotExpandable(_))
    ));
}

#[tokio::test]
async fn test_reset_root_is_idempotent() {
    let tree = tree(100);
    let root = tree.load_root(NodeId(0)).await.unwrap();
    let window = tree.expand(root).await.unwrap()[0];
    tree.expand(window).await.unwrap();
    assert_eq!(tree.len(), 5);

    let new_root = tree
        .engine()
        .provider()
        .inner
        .snapshot()
        .page(NodeId(1), Cursor::START, 100)
        .unwrap();

    for _ in 0..2 {
        let slot = tree.reset_root(new_root.clone());
        assert_eq!(slot, root);
        assert_eq!(tree.len(), 1);
        assert!(tree.children(slot).is_empty());
        assert_eq!(tree.expansion(slot), Some(Expansion::Collapsed));

        let node = tree.node(slot).unwrap();
        assert_eq!(node.name, "Window");
        assert_eq!(node.expand_path.to_vec(), vec![Address(3)]);
    }
    assert!(tree.entry(window).is_none());
}

#[tokio::test]
async fn test_failures_reach_reporter() {
    let reporter = Arc::new(RecordingReporter::default());
    let engine = ExpansionEngine::new(provider(), &ExplorerConfig::default()).unwrap();
    let tree = ExplorerTree::with_reporter(engine, reporter.clone());

    let err = tree.load_root(NodeId(99)).await.unwrap_err();
    assert!(matches!(err, Error::NodeNotFound(NodeId(99))));
    assert!(tree.is_empty());

    let seen = reporter.seen.lock();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0], "load root: Node not found: 99");
}

#[tokio::test]
async fn test_walk_is_preorder_with_depths() {
    let tree = tree(100);
    let root = tree.load_root(NodeId(0)).await.unwrap();
    let window = tree.expand(root).await.unwrap()[0];
    tree.expand(window).await.unwrap();

    let mut seen = Vec::new();
    tree.walk(root, |_, depth, entry| {
        seen.push((depth, entry.as_node().unwrap().name.clone()));
    });
    let expected = [
        (0, "(GC roots)"),
        (1, "Window"),
        (2, "Foo"),
        (2, "Window"),
        (1, "Foo"),
    ];
    let expected: Vec<(usize, String)> =
        expected.iter().map(|(d, n)| (*d, (*n).to_string())).collect();
    assert_eq!(seen, expected);
}

#[tokio::test]
async fn test_refused_expansions_reach_reporter() {
    let reporter = Arc::new(RecordingReporter::default());
    let engine = ExpansionEngine::new(provider(), &ExplorerConfig::with_page_size(1)).unwrap();
    let tree = ExplorerTree::with_reporter(engine, reporter.clone());

    let root = tree.load_root(NodeId(1)).await.unwrap();
    let children = tree.expand(root).await.unwrap();
    let foo = children[0];
    let placeholder = children[1];
    let self_ref = tree.load_more(placeholder).await.unwrap()[0];
    assert!(tree.node(self_ref).unwrap().cycle);
    assert!(reporter.seen.lock().is_empty());

    assert!(tree.expand(self_ref).await.is_err());
    assert!(tree.load_more(foo).await.is_err());

    let seen = reporter.seen.lock();
    assert_eq!(seen.len(), 2);
    assert!(seen[0].starts_with("expand: Not expandable:"));
    assert!(seen[0].contains("cycle sentinel"));
    assert!(seen[1].starts_with("load more: Not expandable:"));
}

#[tokio::test]
async fn test_load_more_touches_only_owner_pagination_state() {
    let tree = tree(1);
    let root = tree.load_root(NodeId(0)).await.unwrap();
    let placeholder = tree.expand(root).await.unwrap()[1];
    let before = tree.node(root).unwrap();
    assert!(!before.edges_end);

    tree.load_more(placeholder).await.unwrap();
    let after = tree.node(root).unwrap();
    assert!(after.edges_end);
    assert_eq!(after.key, before.key);
    assert_eq!(after.name, before.name);
    assert_eq!(after.expand_path, before.expand_path);
    assert_eq!(after.annotation, before.annotation);
    assert_eq!(
        after.edges.iter().map(|e| e.to_node).collect::<Vec<_>>(),
        before.edges.iter().map(|e| e.to_node).collect::<Vec<_>>()
    );
}
