//! The materialized tree view.
//!
//! [`ExplorerTree`] owns the parent/child structure and expansion flags and
//! applies engine results to it. Slots live in an arena addressed by
//! [`SlotId`]; ids are never reused, so a handle to a discarded slot stays
//! invalid instead of silently pointing at another node.
//!
//! Each async operation locks the arena only to read its inputs and, after
//! every provider call of that step has resolved, once more to commit. The
//! lock is never held across an `.await`, so concurrent expansions of
//! different nodes interleave freely and readers never observe a
//! half-applied step.

use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::engine::{ExpansionEngine, LoadMorePage};
use crate::error::{Error, Result};
use crate::model::{NodeId, NodePage};
use crate::path::ExpandPath;
use crate::provider::GraphNodeProvider;
use crate::reporter::{ErrorReporter, TracingReporter};
use crate::tree_node::{LoadMore, TreeEntry, TreeNode};

/// Handle to one entry of an [`ExplorerTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SlotId(usize);

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Expansion state of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Expansion {
    /// Children not loaded (initial state, and after a failed expansion).
    Collapsed,
    /// A fetch for this slot is in flight.
    Loading,
    /// Children committed.
    Expanded,
}

#[derive(Debug)]
struct Slot {
    entry: TreeEntry,
    parent: Option<SlotId>,
    children: Vec<SlotId>,
    expansion: Expansion,
    /// Bumped whenever the slot is reformatted in place; in-flight results
    /// captured under an older epoch are dropped.
    epoch: u64,
}

impl Slot {
    fn new(entry: TreeEntry, parent: Option<SlotId>) -> Self {
        Self {
            entry,
            parent,
            children: Vec::new(),
            expansion: Expansion::Collapsed,
            epoch: 0,
        }
    }
}

#[derive(Debug, Default)]
struct Arena {
    slots: Vec<Option<Slot>>,
    root: Option<SlotId>,
}

impl Arena {
    fn get(&self, id: SlotId) -> Result<&Slot> {
        self.slots
            .get(id.0)
            .and_then(Option::as_ref)
            .ok_or(Error::UnknownSlot(id))
    }

    fn get_mut(&mut self, id: SlotId) -> Result<&mut Slot> {
        self.slots
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or(Error::UnknownSlot(id))
    }

    /// Looks up a slot for a commit; gone or re-formatted means superseded.
    fn current_mut(&mut self, id: SlotId, epoch: u64) -> Result<&mut Slot> {
        match self.slots.get_mut(id.0).and_then(Option::as_mut) {
            Some(slot) if slot.epoch == epoch => Ok(slot),
            _ => Err(Error::Superseded(id)),
        }
    }

    fn insert(&mut self, slot: Slot) -> SlotId {
        self.slots.push(Some(slot));
        SlotId(self.slots.len() - 1)
    }

    /// Frees every descendant of `id`, leaving `id` itself with no children.
    fn discard_children(&mut self, id: SlotId) {
        let mut pending = match self.get_mut(id) {
            Ok(slot) => std::mem::take(&mut slot.children),
            Err(_) => return,
        };
        while let Some(child) = pending.pop() {
            if let Some(slot) = self.slots.get_mut(child.0).and_then(Option::take) {
                pending.extend(slot.children);
            }
        }
    }

    fn live_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}

/// A lazily expanded, cycle-safe tree over a [`GraphNodeProvider`].
pub struct ExplorerTree<P> {
    engine: ExpansionEngine<P>,
    arena: Mutex<Arena>,
    reporter: Arc<dyn ErrorReporter>,
}

impl<P: GraphNodeProvider> ExplorerTree<P> {
    /// Creates an empty tree reporting failures through `tracing`.
    #[must_use]
    pub fn new(engine: ExpansionEngine<P>) -> Self {
        Self::with_reporter(engine, Arc::new(TracingReporter))
    }

    /// Creates an empty tree with a custom error reporter.
    #[must_use]
    pub fn with_reporter(engine: ExpansionEngine<P>, reporter: Arc<dyn ErrorReporter>) -> Self {
        Self {
            engine,
            arena: Mutex::new(Arena::default()),
            reporter,
        }
    }

    /// Returns the engine driving this tree.
    #[must_use]
    pub fn engine(&self) -> &ExpansionEngine<P> {
        &self.engine
    }

    // ── Async operations ───────────────────────────────────────────────

    /// Expands the top level: fetches `root` and installs it as the only
    /// top-level node, replacing any previous tree.
    pub async fn load_root(&self, root: NodeId) -> Result<SlotId> {
        let nodes = self
            .engine
            .expand_root(root)
            .await
            .map_err(|err| self.report("load root", err))?;

        let node = nodes
            .into_iter()
            .next()
            .ok_or_else(|| Error::MalformedResponse(format!("root {root} produced no node")))?;

        let mut arena = self.arena.lock();
        if let Some(old) = arena.root.take() {
            arena.discard_children(old);
            arena.slots[old.0] = None;
        }
        let id = arena.insert(Slot::new(TreeEntry::Node(node), None));
        arena.root = Some(id);
        Ok(id)
    }

    /// Expands a node slot and returns its child slots in order.
    ///
    /// Already-expanded slots return their children without fetching. On
    /// failure the slot is left collapsed so the call can be retried.
    ///
    /// # Errors
    ///
    /// `Error::NotExpandable` for cycle sentinels and placeholders;
    /// `Error::Superseded` if the slot was reset meanwhile; provider errors.
    pub async fn expand(&self, id: SlotId) -> Result<Vec<SlotId>> {
        let begin = self
            .begin_expand(id)
            .map_err(|err| self.report("expand", err))?;
        let (node, epoch) = match begin {
            Begin::Ready(children) => return Ok(children),
            Begin::Fetch(node, epoch) => (node, epoch),
        };

        match self.engine.expand_children(&node).await {
            Ok(entries) => self
                .commit_expand(id, epoch, entries)
                .map_err(|err| self.report("expand", err)),
            Err(err) => {
                self.abort(id, epoch);
                Err(self.report("expand", err))
            }
        }
    }

    /// Continues pagination for a placeholder slot.
    ///
    /// New children are inserted immediately before the placeholder. The
    /// placeholder is removed once the owner's edges end, otherwise its
    /// cursor (and the owner's) advances. A failure leaves the tree exactly
    /// as it was, so retrying resumes from the same cursor.
    ///
    /// Returns the newly inserted slots.
    pub async fn load_more(&self, placeholder: SlotId) -> Result<Vec<SlotId>> {
        let (more, parent, path, parent_epoch) = self
            .begin_load_more(placeholder)
            .map_err(|err| self.report("load more", err))?;

        match self.engine.load_more(&more, &path).await {
            Ok(page) => self
                .commit_load_more(placeholder, parent, parent_epoch, page)
                .map_err(|err| self.report("load more", err)),
            Err(err) => {
                let mut arena = self.arena.lock();
                if let Ok(slot) = arena.get_mut(placeholder) {
                    slot.expansion = Expansion::Collapsed;
                }
                drop(arena);
                Err(self.report("load more", err))
            }
        }
    }

    // ── Synchronous operations ─────────────────────────────────────────

    /// Replaces the root subject with data already at hand (no fetch).
    ///
    /// The root's subtree is discarded and the root reformatted in place
    /// with `expand_path = [new_root.address]`. Results of fetches still in
    /// flight for the old root are dropped when they resolve.
    pub fn reset_root(&self, new_root: NodePage) -> SlotId {
        let node = self.engine.format_root(new_root);
        info!(root = %node.id, address = %node.address, "root reset");

        let mut arena = self.arena.lock();
        match arena.root {
            Some(id) => {
                arena.discard_children(id);
                if let Ok(slot) = arena.get_mut(id) {
                    slot.entry = TreeEntry::Node(node);
                    slot.expansion = Expansion::Collapsed;
                    slot.epoch += 1;
                }
                id
            }
            None => {
                let id = arena.insert(Slot::new(TreeEntry::Node(node), None));
                arena.root = Some(id);
                id
            }
        }
    }

    /// Returns the top-level slot, if a root is loaded.
    #[must_use]
    pub fn root(&self) -> Option<SlotId> {
        self.arena.lock().root
    }

    /// Returns a copy of the slot's entry.
    #[must_use]
    pub fn entry(&self, id: SlotId) -> Option<TreeEntry> {
        self.arena.lock().get(id).ok().map(|s| s.entry.clone())
    }

    /// Returns a copy of the slot's node, if it is a node entry.
    #[must_use]
    pub fn node(&self, id: SlotId) -> Option<TreeNode> {
        self.entry(id).and_then(|e| match e {
            TreeEntry::Node(node) => Some(node),
            TreeEntry::LoadMore(_) => None,
        })
    }

    /// Returns the slot's children in display order.
    #[must_use]
    pub fn children(&self, id: SlotId) -> Vec<SlotId> {
        self.arena
            .lock()
            .get(id)
            .map(|s| s.children.clone())
            .unwrap_or_default()
    }

    /// Returns the slot's parent.
    #[must_use]
    pub fn parent(&self, id: SlotId) -> Option<SlotId> {
        self.arena.lock().get(id).ok().and_then(|s| s.parent)
    }

    /// Returns the slot's expansion state.
    #[must_use]
    pub fn expansion(&self, id: SlotId) -> Option<Expansion> {
        self.arena.lock().get(id).ok().map(|s| s.expansion)
    }

    /// Number of live slots (nodes plus placeholders).
    #[must_use]
    pub fn len(&self) -> usize {
        self.arena.lock().live_count()
    }

    /// Returns true if no root is loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.arena.lock().root.is_none()
    }

    /// Visits the subtree under `id` depth-first, pre-order, with depths
    /// relative to `id`.
    ///
    /// The visitor runs under the tree lock and must not call back into the
    /// tree.
    pub fn walk(&self, id: SlotId, mut visitor: impl FnMut(SlotId, usize, &TreeEntry)) {
        let arena = self.arena.lock();
        let mut stack = vec![(id, 0usize)];
        while let Some((current, depth)) = stack.pop() {
            let Ok(slot) = arena.get(current) else {
                continue;
            };
            visitor(current, depth, &slot.entry);
            stack.extend(slot.children.iter().rev().map(|&c| (c, depth + 1)));
        }
    }

    // ── Commit helpers (lock held, never across .await) ────────────────
    //
    // Errors are returned unreported; callers report them once the lock is
    // released.

    fn begin_expand(&self, id: SlotId) -> Result<Begin> {
        let mut arena = self.arena.lock();
        let slot = arena.get_mut(id)?;
        let node = match &slot.entry {
            TreeEntry::LoadMore(_) => {
                return Err(Error::NotExpandable(format!(
                    "slot {id} is a load-more placeholder"
                )))
            }
            TreeEntry::Node(node) if node.cycle => {
                return Err(Error::NotExpandable(format!(
                    "slot {id} ({}) is a cycle sentinel",
                    node.address
                )))
            }
            TreeEntry::Node(node) => node.clone(),
        };
        if slot.expansion == Expansion::Expanded {
            return Ok(Begin::Ready(slot.children.clone()));
        }
        slot.expansion = Expansion::Loading;
        Ok(Begin::Fetch(node, slot.epoch))
    }

    fn commit_expand(&self, id: SlotId, epoch: u64, entries: Vec<TreeEntry>) -> Result<Vec<SlotId>> {
        let mut arena = self.arena.lock();
        let committed = match arena.current_mut(id, epoch) {
            Ok(slot) if slot.expansion == Expansion::Expanded => Some(slot.children.clone()),
            Ok(_) => None,
            Err(err) => {
                warn!(slot = %id, "dropping expansion results for a reset slot");
                return Err(err);
            }
        };
        // A concurrent expansion of the same slot committed first.
        if let Some(children) = committed {
            return Ok(children);
        }

        let children: Vec<SlotId> = entries
            .into_iter()
            .map(|entry| arena.insert(Slot::new(entry, Some(id))))
            .collect();
        let slot = arena.current_mut(id, epoch)?;
        slot.children.clone_from(&children);
        slot.expansion = Expansion::Expanded;
        debug!(slot = %id, children = children.len(), "expansion committed");
        Ok(children)
    }

    fn abort(&self, id: SlotId, epoch: u64) {
        let mut arena = self.arena.lock();
        if let Ok(slot) = arena.current_mut(id, epoch) {
            if slot.expansion == Expansion::Loading {
                slot.expansion = Expansion::Collapsed;
            }
        }
    }

    fn begin_load_more(&self, placeholder: SlotId) -> Result<(LoadMore, SlotId, ExpandPath, u64)> {
        let mut arena = self.arena.lock();
        let slot = arena.get(placeholder)?;
        let TreeEntry::LoadMore(more) = &slot.entry else {
            return Err(Error::NotExpandable(format!(
                "slot {placeholder} is not a load-more placeholder"
            )));
        };
        if slot.expansion == Expansion::Loading {
            return Err(Error::NotExpandable(format!(
                "slot {placeholder} is already loading"
            )));
        }
        let more = more.clone();
        let parent = slot.parent.ok_or(Error::UnknownSlot(placeholder))?;

        let parent_slot = arena.get(parent)?;
        let path = match &parent_slot.entry {
            TreeEntry::Node(node) => node.expand_path.clone(),
            TreeEntry::LoadMore(_) => return Err(Error::UnknownSlot(parent)),
        };
        let parent_epoch = parent_slot.epoch;

        arena.get_mut(placeholder)?.expansion = Expansion::Loading;
        Ok((more, parent, path, parent_epoch))
    }

    fn commit_load_more(
        &self,
        placeholder: SlotId,
        parent: SlotId,
        parent_epoch: u64,
        page: LoadMorePage,
    ) -> Result<Vec<SlotId>> {
        let mut arena = self.arena.lock();
        let position = match arena.current_mut(parent, parent_epoch) {
            Ok(slot) => slot.children.iter().position(|&c| c == placeholder),
            Err(_) => None,
        };
        let Some(position) = position else {
            warn!(slot = %placeholder, "dropping load-more results for a discarded placeholder");
            return Err(Error::Superseded(placeholder));
        };

        let inserted: Vec<SlotId> = page
            .children
            .into_iter()
            .map(|node| arena.insert(Slot::new(TreeEntry::Node(node), Some(parent))))
            .collect();

        let parent_slot = arena.get_mut(parent)?;
        let tail = parent_slot.children.split_off(position);
        parent_slot.children.extend(inserted.iter().copied());
        parent_slot.children.extend(tail);
        // Only the owner's pagination state (cursor, edges_end) changes.
        if let TreeEntry::Node(owner) = &mut parent_slot.entry {
            match page.next {
                Some(next) => owner.cursor = next,
                None => owner.edges_end = true,
            }
        }

        match page.next {
            None => {
                parent_slot.children.retain(|&c| c != placeholder);
                arena.slots[placeholder.0] = None;
            }
            Some(next) => {
                let slot = arena.get_mut(placeholder)?;
                if let TreeEntry::LoadMore(more) = &mut slot.entry {
                    more.cursor = next;
                }
                slot.expansion = Expansion::Collapsed;
            }
        }
        debug!(
            slot = %placeholder,
            inserted = inserted.len(),
            done = page.next.is_none(),
            "load more committed"
        );
        Ok(inserted)
    }

    fn report(&self, context: &str, err: Error) -> Error {
        self.reporter.report(context, &err);
        err
    }
}

enum Begin {
    Ready(Vec<SlotId>),
    Fetch(TreeNode, u64),
}
