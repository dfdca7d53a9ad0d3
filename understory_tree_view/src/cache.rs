// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Core cache implementation: arena, visible-node index, incremental updates.

use alloc::{vec, vec::Vec};

use crate::source::{NodeKind, TreeChange, TreeSource};
use crate::{NodeFlags, NodeHandle, Path, TreeError, TreeStyle};

/// Incrementally maintained, flattened view over a hierarchical data model.
///
/// The cache mirrors the data model with one entry per node it has needed so
/// far. Children of a branch are loaded on first use (first expansion, or a
/// path lookup through the branch) and kept until the branch's entry is
/// released. Alongside the entries it keeps the *visible-node index*: every
/// node whose ancestors are all expanded, in depth-first pre-order. That
/// order is both the paint order and the keyboard order.
///
/// Edits to the data model must be reported with the matching notification
/// ([`VisibilityCache::node_inserted`], [`VisibilityCache::nodes_removed`],
/// and so on, or [`VisibilityCache::apply`] with a [`TreeChange`]) before the
/// next query. Each notification splices only the affected run of rows.
///
/// All operations are synchronous and leave the cache consistent on return.
/// Errors mean the caller and the cache disagree about the tree; re-attach to
/// recover.
///
/// ## Example
///
/// ```rust
/// use understory_tree_view::{SourceNode, SourceTree, TreeStyle, VisibilityCache};
///
/// let source = SourceTree::from_nodes([
///     SourceNode::leaf("A"),
///     SourceNode::branch("B", [SourceNode::leaf("C"), SourceNode::leaf("D")]),
/// ]);
///
/// let mut cache = VisibilityCache::new(TreeStyle::default());
/// cache.attach(&source).unwrap();
/// assert_eq!(cache.visible_len(), 2);
///
/// cache.expand(&source, &[1]).unwrap();
/// let names: Vec<&str> = cache
///     .visible_nodes()
///     .iter()
///     .map(|&node| **cache.data(node).unwrap())
///     .collect();
/// assert_eq!(names, ["A", "B", "C", "D"]);
/// ```
pub struct VisibilityCache<D> {
    /// slots
    nodes: Vec<Option<NodeInfo<D>>>,
    /// last generation per slot (persists across frees)
    generations: Vec<u32>,
    free_list: Vec<usize>,
    pub(crate) root: Option<NodeHandle>,
    pub(crate) visible: Vec<NodeHandle>,
    pub(crate) style: TreeStyle,
    pub(crate) highlighted: Option<NodeHandle>,
    pub(crate) node_height: f64,
    pub(crate) preferred_width: Option<f64>,
}

impl<D> core::fmt::Debug for VisibilityCache<D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let total = self.nodes.len();
        let alive = self.nodes.iter().filter(|n| n.is_some()).count();
        f.debug_struct("VisibilityCache")
            .field("nodes_total", &total)
            .field("nodes_alive", &alive)
            .field("free_list", &self.free_list.len())
            .field("visible", &self.visible.len())
            .field("root", &self.root)
            .field("style", &self.style)
            .finish_non_exhaustive()
    }
}

impl<D> Default for VisibilityCache<D> {
    fn default() -> Self {
        Self::new(TreeStyle::default())
    }
}

/// Cached metadata mirroring one source node.
#[derive(Clone, Debug)]
pub(crate) struct NodeInfo<D> {
    generation: u32,
    pub(crate) parent: Option<NodeHandle>,
    /// `None` only for the root.
    pub(crate) data: Option<D>,
    pub(crate) depth: usize,
    pub(crate) flags: NodeFlags,
    /// `Some` for branches.
    pub(crate) branch: Option<BranchInfo>,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct BranchInfo {
    /// `None` until first needed.
    pub(crate) children: Option<Vec<NodeHandle>>,
    pub(crate) expanded: bool,
}

impl<D> VisibilityCache<D> {
    /// Creates an empty, detached cache.
    pub fn new(style: TreeStyle) -> Self {
        Self {
            nodes: Vec::new(),
            generations: Vec::new(),
            free_list: Vec::new(),
            root: None,
            visible: Vec::new(),
            style,
            highlighted: None,
            node_height: 0.0,
            preferred_width: None,
        }
    }

    /// The layout configuration.
    pub fn style(&self) -> &TreeStyle {
        &self.style
    }

    /// Replaces the layout configuration.
    pub fn set_style(&mut self, style: TreeStyle) {
        let mixed_changed =
            style.show_mixed_checkmark_state != self.style.show_mixed_checkmark_state;
        self.style = style;
        if mixed_changed {
            self.refresh_all_check_states();
        }
        self.invalidate_layout();
    }

    /// Discards any existing entries and mirrors `source` from scratch.
    ///
    /// The initial visible-node index holds the top-level nodes plus the
    /// visible runs of any branches the source reports as starting expanded.
    pub fn attach<S>(&mut self, source: &S) -> Result<(), TreeError>
    where
        S: TreeSource<Data = D>,
    {
        self.release_all();
        let root = self.alloc(None, None, 0, NodeKind::Branch { expanded: true });
        self.root = Some(root);
        if let Err(err) = self.rebuild_visible(source) {
            self.detach();
            return Err(err);
        }
        log::debug!("attached tree: {} visible rows", self.visible.len());
        Ok(())
    }

    /// Releases every entry. Queries return nothing until the next attach.
    pub fn detach(&mut self) {
        self.release_all();
        log::debug!("detached tree");
    }

    /// Returns `true` if a tree is attached.
    pub fn is_attached(&self) -> bool {
        self.root.is_some()
    }

    /// Handle of the root branch. The root is never a visible row.
    pub fn root(&self) -> Option<NodeHandle> {
        self.root
    }

    /// Expands the branch at `path`.
    ///
    /// Ancestors are loaded as needed. If the branch is visible, its visible
    /// descendants are spliced in right after it. Expanding an expanded
    /// branch, or the root, does nothing.
    pub fn expand<S>(&mut self, source: &S, path: &[usize]) -> Result<(), TreeError>
    where
        S: TreeSource<Data = D>,
    {
        let id = self.locate(source, path)?;
        if self.root == Some(id) {
            return Ok(());
        }
        match &self.node(id).branch {
            None => return Err(TreeError::not_a_branch(path)),
            Some(branch) if branch.expanded => return Ok(()),
            Some(_) => {}
        }
        // Nothing changes until the run is loaded.
        if let Some(row) = self.visible_row_of(id) {
            let mut run = Vec::new();
            self.collect_children_runs(source, id, &mut Path::from(path), &mut run)?;
            log::trace!("expand {}: {} rows at {}", Path::from(path), run.len(), row + 1);
            self.visible.splice(row + 1..row + 1, run);
        }
        self.set_expanded_flag(id, true);
        self.invalidate_layout();
        Ok(())
    }

    /// Collapses the branch at `path`.
    ///
    /// The branch's loaded children are kept, only hidden. Collapsing a
    /// collapsed branch, or the root, does nothing.
    pub fn collapse<S>(&mut self, source: &S, path: &[usize]) -> Result<(), TreeError>
    where
        S: TreeSource<Data = D>,
    {
        let id = self.locate(source, path)?;
        if self.root == Some(id) {
            return Ok(());
        }
        match &self.node(id).branch {
            None => return Err(TreeError::not_a_branch(path)),
            Some(branch) if !branch.expanded => return Ok(()),
            Some(_) => {}
        }
        if let Some(row) = self.visible_row_of(id) {
            let end = self.run_end(row);
            log::trace!("collapse {}: {} rows at {}", Path::from(path), end - row - 1, row + 1);
            self.visible.drain(row + 1..end);
        }
        self.set_expanded_flag(id, false);
        self.invalidate_layout();
        Ok(())
    }

    /// Expands or collapses the branch at `path`; returns the new state.
    pub fn toggle<S>(&mut self, source: &S, path: &[usize]) -> Result<bool, TreeError>
    where
        S: TreeSource<Data = D>,
    {
        let id = self.locate(source, path)?;
        if self.is_expanded(id) {
            self.collapse(source, path)?;
            Ok(false)
        } else {
            self.expand(source, path)?;
            Ok(true)
        }
    }

    /// Loads and expands every branch in the tree.
    ///
    /// This touches the whole source tree.
    pub fn expand_all<S>(&mut self, source: &S) -> Result<(), TreeError>
    where
        S: TreeSource<Data = D>,
    {
        let root = self.root.ok_or(TreeError::Detached)?;
        // Load everything first; flags only change once nothing can fail.
        let mut branches = Vec::new();
        let mut stack = vec![(root, Path::root())];
        while let Some((id, path)) = stack.pop() {
            self.ensure_loaded(source, id, &path)?;
            for (index, &child) in self.loaded_children(id).iter().enumerate() {
                if self.node(child).branch.is_some() {
                    stack.push((child, path.child(index)));
                }
            }
            branches.push(id);
        }
        for id in branches {
            self.set_expanded_flag(id, true);
        }
        self.rebuild_visible(source)?;
        log::debug!("expanded all: {} visible rows", self.visible.len());
        Ok(())
    }

    /// Collapses every loaded branch, leaving only top-level rows.
    pub fn collapse_all(&mut self) {
        let root = self.root;
        for (idx, slot) in self.nodes.iter_mut().enumerate() {
            if let Some(node) = slot
                && let Some(branch) = &mut node.branch
                && root.is_none_or(|r| r.idx() != idx)
            {
                branch.expanded = false;
            }
        }
        let nodes = &self.nodes;
        self.visible.retain(|id| {
            nodes[id.idx()]
                .as_ref()
                .is_some_and(|node| node.depth == 0)
        });
        self.invalidate_layout();
    }

    /// Applies a recorded change notification.
    pub fn apply<S>(&mut self, source: &S, change: &TreeChange) -> Result<(), TreeError>
    where
        S: TreeSource<Data = D>,
    {
        match change {
            TreeChange::Inserted { parent, index } => self.node_inserted(source, parent, *index),
            TreeChange::Removed {
                parent,
                index,
                count,
            } => self.nodes_removed(parent, *index, *count),
            TreeChange::Cleared { parent } => self.nodes_cleared(parent),
            TreeChange::Updated { parent, index } => self.node_updated(source, parent, *index),
            TreeChange::Sorted { parent } => self.nodes_sorted(source, parent),
        }
    }

    /// The source inserted a child at `index` under the branch at `parent`.
    ///
    /// Nothing happens if that branch's children were never loaded.
    pub fn node_inserted<S>(
        &mut self,
        source: &S,
        parent: &[usize],
        index: usize,
    ) -> Result<(), TreeError>
    where
        S: TreeSource<Data = D>,
    {
        let Some(parent_id) = self.find_loaded_branch(parent)? else {
            self.invalidate_layout();
            return Ok(());
        };
        let len = self.loaded_children(parent_id).len();
        let child_path = Path::from(parent).child(index);
        if index > len {
            return Err(TreeError::invalid_path(&child_path, parent.len()));
        }
        let entry = source
            .child(parent, index)
            .ok_or_else(|| TreeError::invalid_path(&child_path, parent.len()))?;
        let depth = self.children_depth(parent_id);
        let id = self.alloc(Some(parent_id), Some(entry.data), depth, entry.kind);

        let splice = if self.children_exposed(parent_id) {
            let row = if index == 0 {
                self.children_start_row(parent_id)
            } else {
                let prev = self.loaded_children(parent_id)[index - 1];
                let Some(prev_row) = self.visible_row_of(prev) else {
                    unreachable!("exposed children are in the visible index");
                };
                self.run_end(prev_row)
            };
            let mut run = Vec::new();
            if let Err(err) = self.collect_run(source, id, &mut child_path.clone(), &mut run) {
                self.release(id);
                return Err(err);
            }
            Some((row, run))
        } else {
            None
        };
        self.loaded_children_mut(parent_id).insert(index, id);
        if let Some((row, run)) = splice {
            log::trace!("insert {child_path}: {} rows at {row}", run.len());
            self.visible.splice(row..row, run);
        }
        self.invalidate_layout();
        Ok(())
    }

    /// The source removed `count` children starting at `index` under the
    /// branch at `parent`.
    pub fn nodes_removed(
        &mut self,
        parent: &[usize],
        index: usize,
        count: usize,
    ) -> Result<(), TreeError> {
        let Some(parent_id) = self.find_loaded_branch(parent)? else {
            self.invalidate_layout();
            return Ok(());
        };
        let len = self.loaded_children(parent_id).len();
        if index.checked_add(count).is_none_or(|end| end > len) {
            return Err(TreeError::invalid_path(
                &Path::from(parent).child(index),
                parent.len(),
            ));
        }
        self.remove_children(parent_id, index, count);
        log::trace!("remove {}: {count} children at {index}", Path::from(parent));
        Ok(())
    }

    /// The source removed every child of the branch at `parent`.
    pub fn nodes_cleared(&mut self, parent: &[usize]) -> Result<(), TreeError> {
        let Some(parent_id) = self.find_loaded_branch(parent)? else {
            self.invalidate_layout();
            return Ok(());
        };
        let len = self.loaded_children(parent_id).len();
        self.remove_children(parent_id, 0, len);
        log::trace!("clear {}: {len} children", Path::from(parent));
        Ok(())
    }

    /// The source replaced the value at `index` under the branch at `parent`.
    ///
    /// A value with a new identity gets a fresh entry (its kind may differ).
    /// The same identity only invalidates measurements.
    pub fn node_updated<S>(
        &mut self,
        source: &S,
        parent: &[usize],
        index: usize,
    ) -> Result<(), TreeError>
    where
        S: TreeSource<Data = D>,
    {
        let Some(parent_id) = self.find_loaded_branch(parent)? else {
            self.invalidate_layout();
            return Ok(());
        };
        let child_path = Path::from(parent).child(index);
        let Some(&old) = self.loaded_children(parent_id).get(index) else {
            return Err(TreeError::invalid_path(&child_path, parent.len()));
        };
        let entry = source
            .child(parent, index)
            .ok_or_else(|| TreeError::invalid_path(&child_path, parent.len()))?;
        let same = self
            .node(old)
            .data
            .as_ref()
            .is_some_and(|data| source.same_node(data, &entry.data));
        if same {
            self.invalidate_layout();
            return Ok(());
        }
        log::trace!("update {child_path}: replacing entry");
        self.remove_children(parent_id, index, 1);
        self.node_inserted(source, parent, index)
    }

    /// The source reordered the children of the branch at `parent`.
    ///
    /// The branch's loaded children are dropped and, if exposed, reloaded
    /// with their visible run rebuilt.
    pub fn nodes_sorted<S>(&mut self, source: &S, parent: &[usize]) -> Result<(), TreeError>
    where
        S: TreeSource<Data = D>,
    {
        let Some(parent_id) = self.find_loaded_branch(parent)? else {
            self.invalidate_layout();
            return Ok(());
        };
        let exposed = self
            .children_exposed(parent_id)
            .then(|| (self.children_start_row(parent_id), self.children_end_row(parent_id)));
        let old = self.take_children(parent_id);
        if let Some((start, end)) = exposed {
            let mut run = Vec::new();
            let reloaded =
                self.collect_children_runs(source, parent_id, &mut Path::from(parent), &mut run);
            if let Err(err) = reloaded {
                // Put the previous children back so the visible rows stay valid.
                for id in self.take_children(parent_id) {
                    self.release(id);
                }
                if let Some(branch) = &mut self.node_mut(parent_id).branch {
                    branch.children = Some(old);
                }
                return Err(err);
            }
            log::trace!("sort {}: {} rows at {start}", Path::from(parent), run.len());
            self.visible.splice(start..end, run);
        }
        for id in old {
            self.release(id);
        }
        self.refresh_check_chain(parent_id);
        self.invalidate_layout();
        Ok(())
    }

    /// Resolves `path` to its entry, loading children along the way.
    pub fn locate<S>(&mut self, source: &S, path: &[usize]) -> Result<NodeHandle, TreeError>
    where
        S: TreeSource<Data = D>,
    {
        let mut current = self.root.ok_or(TreeError::Detached)?;
        for (depth, &index) in path.iter().enumerate() {
            self.ensure_loaded(source, current, &path[..depth])?;
            current = *self
                .loaded_children(current)
                .get(index)
                .ok_or_else(|| TreeError::invalid_path(path, depth))?;
        }
        Ok(current)
    }

    /// Resolves `path` without loading anything.
    ///
    /// Returns `None` if the path is invalid or runs through a branch whose
    /// children are not loaded.
    pub fn get(&self, path: &[usize]) -> Option<NodeHandle> {
        self.find_loaded(path).ok().flatten()
    }

    /// Reconstructs the path of a live entry.
    pub fn path_of(&self, id: NodeHandle) -> Result<Path, TreeError> {
        if !self.is_live(id) {
            return Err(TreeError::StaleHandle);
        }
        let mut indices = Vec::new();
        let mut current = id;
        while let Some(parent) = self.node(current).parent {
            let Some(index) = self
                .loaded_children(parent)
                .iter()
                .position(|&c| c == current)
            else {
                unreachable!("an entry is always among its parent's loaded children");
            };
            indices.push(index);
            current = parent;
        }
        Ok(indices.into_iter().rev().collect())
    }

    /// Path of the node at a visible row.
    pub fn visible_path_at(&self, row: usize) -> Option<Path> {
        let id = *self.visible.get(row)?;
        self.path_of(id).ok()
    }

    /// Number of visible rows.
    pub fn visible_len(&self) -> usize {
        self.visible.len()
    }

    /// Visible nodes in pre-order.
    pub fn visible_nodes(&self) -> &[NodeHandle] {
        &self.visible
    }

    /// Row of a visible node, or `None` if it is hidden or stale.
    pub fn visible_row_of(&self, id: NodeHandle) -> Option<usize> {
        if !self.is_visible(id) {
            return None;
        }
        self.visible.iter().position(|&v| v == id)
    }

    /// Returns `true` if every ancestor of `id` (below the root) is expanded.
    pub fn is_visible(&self, id: NodeHandle) -> bool {
        if !self.is_live(id) || self.root == Some(id) {
            return false;
        }
        let mut current = self.node(id).parent;
        while let Some(parent) = current {
            if self.root == Some(parent) {
                return true;
            }
            let node = self.node(parent);
            if !node.branch.as_ref().is_some_and(|b| b.expanded) {
                return false;
            }
            current = node.parent;
        }
        false
    }

    /// Returns `true` if `id` refers to a live entry.
    pub fn is_live(&self, id: NodeHandle) -> bool {
        self.nodes
            .get(id.idx())
            .and_then(|n| n.as_ref())
            .is_some_and(|n| n.generation == id.1)
    }

    /// Source value of an entry. `None` for the root and stale handles.
    pub fn data(&self, id: NodeHandle) -> Option<&D> {
        self.node_opt(id)?.data.as_ref()
    }

    /// Depth of an entry (0 for children of the root).
    pub fn depth(&self, id: NodeHandle) -> Option<usize> {
        self.node_opt(id).map(|n| n.depth)
    }

    /// Returns `true` if the entry is a branch.
    pub fn is_branch(&self, id: NodeHandle) -> bool {
        self.node_opt(id).is_some_and(|n| n.branch.is_some())
    }

    /// Returns `true` if the entry is an expanded branch.
    pub fn is_expanded(&self, id: NodeHandle) -> bool {
        self.node_opt(id)
            .and_then(|n| n.branch.as_ref())
            .is_some_and(|b| b.expanded)
    }

    /// Returns `true` if the entry is a branch whose children are loaded.
    pub fn is_loaded(&self, id: NodeHandle) -> bool {
        self.node_opt(id)
            .and_then(|n| n.branch.as_ref())
            .is_some_and(|b| b.children.is_some())
    }

    /// Loaded children of a branch, or `None` for leaves, unloaded branches,
    /// and stale handles.
    pub fn children_of(&self, id: NodeHandle) -> Option<&[NodeHandle]> {
        self.node_opt(id)?.branch.as_ref()?.children.as_deref()
    }

    /// Parent of an entry. Top-level nodes and the root have none.
    pub fn parent_of(&self, id: NodeHandle) -> Option<NodeHandle> {
        self.node_opt(id)?.parent.filter(|&p| self.root != Some(p))
    }
}

impl<D> VisibilityCache<D> {
    // --- internals ---

    /// Access a node; panics if `id` is stale.
    pub(crate) fn node(&self, id: NodeHandle) -> &NodeInfo<D> {
        self.nodes[id.idx()].as_ref().expect("dangling NodeHandle")
    }

    /// Access a node mutably; panics if `id` is stale.
    pub(crate) fn node_mut(&mut self, id: NodeHandle) -> &mut NodeInfo<D> {
        self.nodes[id.idx()].as_mut().expect("dangling NodeHandle")
    }

    pub(crate) fn node_opt(&self, id: NodeHandle) -> Option<&NodeInfo<D>> {
        let n = self.nodes.get(id.idx())?.as_ref()?;
        (n.generation == id.1).then_some(n)
    }

    pub(crate) fn node_opt_mut(&mut self, id: NodeHandle) -> Option<&mut NodeInfo<D>> {
        let n = self.nodes.get_mut(id.idx())?.as_mut()?;
        if n.generation != id.1 {
            return None;
        }
        Some(n)
    }

    /// Loaded children of `id`, empty if none are loaded.
    pub(crate) fn loaded_children(&self, id: NodeHandle) -> &[NodeHandle] {
        self.node(id)
            .branch
            .as_ref()
            .and_then(|b| b.children.as_deref())
            .unwrap_or(&[])
    }

    fn loaded_children_mut(&mut self, id: NodeHandle) -> &mut Vec<NodeHandle> {
        let Some(children) = self
            .node_mut(id)
            .branch
            .as_mut()
            .and_then(|b| b.children.as_mut())
        else {
            unreachable!("children are loaded before they are edited");
        };
        children
    }

    pub(crate) fn invalidate_layout(&mut self) {
        self.preferred_width = None;
    }

    fn alloc(
        &mut self,
        parent: Option<NodeHandle>,
        data: Option<D>,
        depth: usize,
        kind: NodeKind,
    ) -> NodeHandle {
        let branch = match kind {
            NodeKind::Leaf => None,
            NodeKind::Branch { expanded } => Some(BranchInfo {
                children: None,
                expanded,
            }),
        };
        let make = |generation| NodeInfo {
            generation,
            parent,
            data,
            depth,
            flags: NodeFlags::empty(),
            branch,
        };
        let (idx, generation) = if let Some(idx) = self.free_list.pop() {
            let generation = self.generations[idx].saturating_add(1);
            self.generations[idx] = generation;
            self.nodes[idx] = Some(make(generation));
            #[allow(
                clippy::cast_possible_truncation,
                reason = "NodeHandle stores 32-bit slot indices"
            )]
            (idx as u32, generation)
        } else {
            let generation = 1_u32;
            self.nodes.push(Some(make(generation)));
            self.generations.push(generation);
            #[allow(
                clippy::cast_possible_truncation,
                reason = "NodeHandle stores 32-bit slot indices"
            )]
            ((self.nodes.len() - 1) as u32, generation)
        };
        NodeHandle::new(idx, generation)
    }

    /// Frees an entry and all of its loaded descendants.
    fn release(&mut self, id: NodeHandle) {
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            let Some(node) = self.nodes[id.idx()].take() else {
                continue;
            };
            if let Some(children) = node.branch.and_then(|b| b.children) {
                stack.extend(children);
            }
            if self.highlighted == Some(id) {
                self.highlighted = None;
            }
            self.free_list.push(id.idx());
        }
    }

    fn release_all(&mut self) {
        for (idx, slot) in self.nodes.iter_mut().enumerate() {
            if slot.take().is_some() {
                self.free_list.push(idx);
            }
        }
        self.root = None;
        self.visible.clear();
        self.highlighted = None;
        self.invalidate_layout();
    }

    /// Detaches the loaded children of `id`, leaving it unloaded.
    fn take_children(&mut self, id: NodeHandle) -> Vec<NodeHandle> {
        self.node_mut(id)
            .branch
            .as_mut()
            .and_then(|branch| branch.children.take())
            .unwrap_or_default()
    }

    fn set_expanded_flag(&mut self, id: NodeHandle, expanded: bool) {
        if let Some(branch) = &mut self.node_mut(id).branch {
            branch.expanded = expanded;
        }
    }

    fn children_depth(&self, parent: NodeHandle) -> usize {
        if self.root == Some(parent) {
            0
        } else {
            self.node(parent).depth + 1
        }
    }

    /// Returns `true` if the children of `id` belong in the visible index.
    fn children_exposed(&self, id: NodeHandle) -> bool {
        self.root == Some(id) || (self.is_expanded(id) && self.is_visible(id))
    }

    /// First row of an exposed branch's visible descendants.
    fn children_start_row(&self, id: NodeHandle) -> usize {
        if self.root == Some(id) {
            return 0;
        }
        let Some(row) = self.visible_row_of(id) else {
            unreachable!("an exposed branch is in the visible index");
        };
        row + 1
    }

    /// One past the last row of an exposed branch's visible descendants.
    fn children_end_row(&self, id: NodeHandle) -> usize {
        if self.root == Some(id) {
            return self.visible.len();
        }
        let Some(row) = self.visible_row_of(id) else {
            unreachable!("an exposed branch is in the visible index");
        };
        self.run_end(row)
    }

    /// One past the last row of the run starting at `row`: the node there
    /// plus every following row that is deeper.
    pub(crate) fn run_end(&self, row: usize) -> usize {
        let depth = self.node(self.visible[row]).depth;
        let mut end = row + 1;
        while end < self.visible.len() && self.node(self.visible[end]).depth > depth {
            end += 1;
        }
        end
    }

    /// Drops `count` loaded children of `parent` starting at `index`, along
    /// with their visible runs.
    fn remove_children(&mut self, parent: NodeHandle, index: usize, count: usize) {
        if count == 0 {
            return;
        }
        if self.children_exposed(parent) {
            let first = self.loaded_children(parent)[index];
            let Some(start) = self.visible_row_of(first) else {
                unreachable!("exposed children are in the visible index");
            };
            let mut end = start;
            for _ in 0..count {
                end = self.run_end(end);
            }
            self.visible.drain(start..end);
        }
        let removed: Vec<NodeHandle> = self
            .loaded_children_mut(parent)
            .drain(index..index + count)
            .collect();
        for id in removed {
            self.release(id);
        }
        self.refresh_check_chain(parent);
        self.invalidate_layout();
    }

    /// Walks `path` through loaded entries only.
    ///
    /// `Ok(None)` means some branch on the way has no loaded children, so
    /// nothing below it is cached.
    fn find_loaded(&self, path: &[usize]) -> Result<Option<NodeHandle>, TreeError> {
        let mut current = self.root.ok_or(TreeError::Detached)?;
        for (depth, &index) in path.iter().enumerate() {
            let Some(branch) = &self.node(current).branch else {
                return Err(TreeError::not_a_branch(&path[..depth]));
            };
            let Some(children) = &branch.children else {
                return Ok(None);
            };
            current = *children
                .get(index)
                .ok_or_else(|| TreeError::invalid_path(path, depth))?;
        }
        Ok(Some(current))
    }

    /// Like [`Self::find_loaded`], but also requires the target to be a branch
    /// with loaded children.
    fn find_loaded_branch(&self, path: &[usize]) -> Result<Option<NodeHandle>, TreeError> {
        let Some(id) = self.find_loaded(path)? else {
            return Ok(None);
        };
        match &self.node(id).branch {
            None => Err(TreeError::not_a_branch(path)),
            Some(branch) if branch.children.is_none() => Ok(None),
            Some(_) => Ok(Some(id)),
        }
    }

    /// Loads the children of the branch `id` at `path` if needed.
    fn ensure_loaded<S>(
        &mut self,
        source: &S,
        id: NodeHandle,
        path: &[usize],
    ) -> Result<(), TreeError>
    where
        S: TreeSource<Data = D>,
    {
        match &self.node(id).branch {
            None => return Err(TreeError::not_a_branch(path)),
            Some(branch) if branch.children.is_some() => return Ok(()),
            Some(_) => {}
        }
        let count = source
            .child_count(path)
            .ok_or_else(|| TreeError::not_a_branch(path))?;
        let depth = self.children_depth(id);
        let mut children = Vec::with_capacity(count);
        for index in 0..count {
            let Some(entry) = source.child(path, index) else {
                for child in children {
                    self.release(child);
                }
                return Err(TreeError::invalid_path(
                    &Path::from(path).child(index),
                    path.len(),
                ));
            };
            children.push(self.alloc(Some(id), Some(entry.data), depth, entry.kind));
        }
        if let Some(branch) = &mut self.node_mut(id).branch {
            branch.children = Some(children);
        }
        Ok(())
    }

    /// Appends `id` and its visible descendants to `out` in pre-order.
    fn collect_run<S>(
        &mut self,
        source: &S,
        id: NodeHandle,
        path: &mut Path,
        out: &mut Vec<NodeHandle>,
    ) -> Result<(), TreeError>
    where
        S: TreeSource<Data = D>,
    {
        out.push(id);
        if self.is_expanded(id) {
            self.collect_children_runs(source, id, path, out)?;
        }
        Ok(())
    }

    /// Appends the visible runs of every child of the branch `id`.
    fn collect_children_runs<S>(
        &mut self,
        source: &S,
        id: NodeHandle,
        path: &mut Path,
        out: &mut Vec<NodeHandle>,
    ) -> Result<(), TreeError>
    where
        S: TreeSource<Data = D>,
    {
        self.ensure_loaded(source, id, path)?;
        let children = self.loaded_children(id).to_vec();
        for (index, child) in children.into_iter().enumerate() {
            path.push(index);
            let result = self.collect_run(source, child, path, out);
            path.pop();
            result?;
        }
        Ok(())
    }

    fn rebuild_visible<S>(&mut self, source: &S) -> Result<(), TreeError>
    where
        S: TreeSource<Data = D>,
    {
        let root = self.root.ok_or(TreeError::Detached)?;
        let mut run = Vec::new();
        self.collect_children_runs(source, root, &mut Path::root(), &mut run)?;
        self.visible = run;
        self.invalidate_layout();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{SourceNode, SourceTree};
    use alloc::vec::Vec;

    type Cache = VisibilityCache<alloc::rc::Rc<&'static str>>;

    fn names(cache: &Cache) -> Vec<&'static str> {
        cache
            .visible_nodes()
            .iter()
            .map(|&id| **cache.data(id).unwrap())
            .collect()
    }

    /// `[A, B[C, D]]`
    fn scenario_tree() -> SourceTree<&'static str> {
        SourceTree::from_nodes([
            SourceNode::leaf("A"),
            SourceNode::branch("B", [SourceNode::leaf("C"), SourceNode::leaf("D")]),
        ])
    }

    /// `[A, B[C[E, F], D]]`
    fn nested_tree() -> SourceTree<&'static str> {
        SourceTree::from_nodes([
            SourceNode::leaf("A"),
            SourceNode::branch(
                "B",
                [
                    SourceNode::branch("C", [SourceNode::leaf("E"), SourceNode::leaf("F")]),
                    SourceNode::leaf("D"),
                ],
            ),
        ])
    }

    fn attached(source: &SourceTree<&'static str>) -> Cache {
        let mut cache = Cache::default();
        cache.attach(source).unwrap();
        cache
    }

    #[test]
    fn attach_then_expand() {
        let source = scenario_tree();
        let mut cache = attached(&source);
        assert_eq!(names(&cache), ["A", "B"]);
        cache.expand(&source, &[1]).unwrap();
        assert_eq!(names(&cache), ["A", "B", "C", "D"]);
    }

    #[test]
    fn collapse_keeps_loaded_children() {
        let source = scenario_tree();
        let mut cache = attached(&source);
        cache.expand(&source, &[1]).unwrap();
        cache.collapse(&source, &[1]).unwrap();
        assert_eq!(names(&cache), ["A", "B"]);

        let b = cache.get(&[1]).unwrap();
        assert!(cache.is_loaded(b));
        let children: Vec<&str> = cache
            .children_of(b)
            .unwrap()
            .iter()
            .map(|&id| **cache.data(id).unwrap())
            .collect();
        assert_eq!(children, ["C", "D"]);
    }

    #[test]
    fn insert_before_first_child() {
        let mut source = scenario_tree();
        let mut cache = attached(&source);
        cache.expand(&source, &[1]).unwrap();
        let change = source.insert(&[1], 0, SourceNode::leaf("X")).unwrap();
        cache.apply(&source, &change).unwrap();
        assert_eq!(names(&cache), ["A", "B", "X", "C", "D"]);
    }

    #[test]
    fn insert_after_sibling_with_visible_descendants() {
        let mut source = nested_tree();
        let mut cache = attached(&source);
        cache.expand(&source, &[1]).unwrap();
        cache.expand(&source, &[1, 0]).unwrap();
        let change = source.insert(&[1], 1, SourceNode::leaf("X")).unwrap();
        cache.apply(&source, &change).unwrap();
        assert_eq!(names(&cache), ["A", "B", "C", "E", "F", "X", "D"]);
    }

    #[test]
    fn insert_under_collapsed_branch_is_hidden() {
        let mut source = scenario_tree();
        let mut cache = attached(&source);
        cache.expand(&source, &[1]).unwrap();
        cache.collapse(&source, &[1]).unwrap();
        let change = source.insert(&[1], 2, SourceNode::leaf("X")).unwrap();
        cache.apply(&source, &change).unwrap();
        assert_eq!(names(&cache), ["A", "B"]);
        cache.expand(&source, &[1]).unwrap();
        assert_eq!(names(&cache), ["A", "B", "C", "D", "X"]);
    }

    #[test]
    fn insert_under_unloaded_branch_is_ignored() {
        let mut source = scenario_tree();
        let mut cache = attached(&source);
        let change = source.insert(&[1], 0, SourceNode::leaf("X")).unwrap();
        cache.apply(&source, &change).unwrap();
        assert!(!cache.is_loaded(cache.get(&[1]).unwrap()));
        cache.expand(&source, &[1]).unwrap();
        assert_eq!(names(&cache), ["A", "B", "X", "C", "D"]);
    }

    #[test]
    fn remove_children_of_expanded_branch() {
        let mut source = scenario_tree();
        let mut cache = attached(&source);
        cache.expand(&source, &[1]).unwrap();
        let c = cache.get(&[1, 0]).unwrap();
        let change = source.remove(&[1], 0, 2).unwrap();
        cache.apply(&source, &change).unwrap();
        assert_eq!(names(&cache), ["A", "B"]);
        assert!(!cache.is_live(c), "removed entries are released");

        let b = cache.locate(&source, &[1]).unwrap();
        assert_eq!(**cache.data(b).unwrap(), "B");
        assert_eq!(
            cache.locate(&source, &[1, 0]),
            Err(TreeError::InvalidPath {
                path: Path::from([1, 0]),
                depth: 1
            })
        );
    }

    #[test]
    fn remove_takes_visible_descendants() {
        let mut source = nested_tree();
        let mut cache = attached(&source);
        cache.expand(&source, &[1]).unwrap();
        cache.expand(&source, &[1, 0]).unwrap();
        let change = source.remove(&[1], 0, 1).unwrap();
        cache.apply(&source, &change).unwrap();
        assert_eq!(names(&cache), ["A", "B", "D"]);
    }

    #[test]
    fn clear_removes_everything_below() {
        let mut source = nested_tree();
        let mut cache = attached(&source);
        cache.expand_all(&source).unwrap();
        let change = source.clear(&[1]).unwrap();
        cache.apply(&source, &change).unwrap();
        assert_eq!(names(&cache), ["A", "B"]);

        let change = source.clear(&[]).unwrap();
        cache.apply(&source, &change).unwrap();
        assert_eq!(cache.visible_len(), 0);
    }

    #[test]
    fn collapse_removes_contiguous_descendant_run() {
        let source = nested_tree();
        let mut cache = attached(&source);
        cache.expand(&source, &[1]).unwrap();
        cache.expand(&source, &[1, 0]).unwrap();
        assert_eq!(names(&cache), ["A", "B", "C", "E", "F", "D"]);
        cache.collapse(&source, &[1]).unwrap();
        assert_eq!(names(&cache), ["A", "B"]);

        // C stays expanded while hidden and reappears with its children.
        cache.expand(&source, &[1]).unwrap();
        assert_eq!(names(&cache), ["A", "B", "C", "E", "F", "D"]);
    }

    #[test]
    fn expand_hidden_branch_defers_rows() {
        let source = nested_tree();
        let mut cache = attached(&source);
        cache.expand(&source, &[1, 0]).unwrap();
        assert_eq!(names(&cache), ["A", "B"]);
        let c = cache.get(&[1, 0]).unwrap();
        assert!(cache.is_expanded(c));
        assert!(!cache.is_visible(c));
        cache.expand(&source, &[1]).unwrap();
        assert_eq!(names(&cache), ["A", "B", "C", "E", "F", "D"]);
    }

    #[test]
    fn expand_is_idempotent() {
        let source = nested_tree();
        let mut cache = attached(&source);
        cache.expand(&source, &[1]).unwrap();
        let once = cache.visible_nodes().to_vec();
        cache.expand(&source, &[1]).unwrap();
        assert_eq!(cache.visible_nodes(), once.as_slice());
    }

    #[test]
    fn expand_leaf_is_type_confusion() {
        let source = scenario_tree();
        let mut cache = attached(&source);
        assert_eq!(
            cache.expand(&source, &[0]),
            Err(TreeError::NotABranch {
                path: Path::from([0])
            })
        );
        assert_eq!(
            cache.locate(&source, &[0, 1]),
            Err(TreeError::NotABranch {
                path: Path::from([0])
            })
        );
    }

    #[test]
    fn operations_require_attach() {
        let source = scenario_tree();
        let mut cache = Cache::default();
        assert_eq!(cache.expand(&source, &[1]), Err(TreeError::Detached));
        assert_eq!(cache.nodes_removed(&[], 0, 1), Err(TreeError::Detached));
        assert!(cache.get(&[]).is_none());
    }

    #[test]
    fn path_round_trip() {
        let source = nested_tree();
        let mut cache = attached(&source);
        let paths: [&[usize]; 6] = [&[], &[0], &[1], &[1, 0], &[1, 0, 1], &[1, 1]];
        for path in paths {
            let id = cache.locate(&source, path).unwrap();
            assert_eq!(&*cache.path_of(id).unwrap(), path);
        }
        cache.expand_all(&source).unwrap();
        assert_eq!(cache.visible_path_at(3), Some(Path::from([1, 0, 0])));
        assert_eq!(cache.visible_path_at(6), None);
    }

    #[test]
    fn update_with_new_identity_replaces_entry() {
        let mut source = nested_tree();
        let mut cache = attached(&source);
        cache.expand_all(&source).unwrap();
        let old = cache.get(&[1, 0]).unwrap();

        // Branch C becomes leaf Y.
        let change = source.replace(&[1], 0, SourceNode::leaf("Y")).unwrap();
        cache.apply(&source, &change).unwrap();
        assert_eq!(names(&cache), ["A", "B", "Y", "D"]);
        assert!(!cache.is_live(old));
        assert!(!cache.is_branch(cache.get(&[1, 0]).unwrap()));
    }

    #[test]
    fn update_with_same_identity_keeps_entry() {
        let source = scenario_tree();
        let mut cache = attached(&source);
        let a = cache.get(&[0]).unwrap();
        cache.preferred_width = Some(10.0);
        cache.node_updated(&source, &[], 0).unwrap();
        assert!(cache.is_live(a));
        assert_eq!(cache.preferred_width, None, "measurements go stale");
    }

    #[test]
    fn sort_reloads_children() {
        let mut source = SourceTree::from_nodes([SourceNode::branch(
            "R",
            [
                SourceNode::leaf("c"),
                SourceNode::branch("a", [SourceNode::leaf("x")]),
                SourceNode::leaf("b"),
            ],
        )]);
        let mut cache = VisibilityCache::default();
        cache.attach(&source).unwrap();
        cache.expand_all(&source).unwrap();
        assert_eq!(cache.visible_len(), 5);

        let change = source.sort_by(&[0], |a, b| a.cmp(b)).unwrap();
        cache.apply(&source, &change).unwrap();
        let order: Vec<&str> = cache
            .visible_nodes()
            .iter()
            .map(|&id| **cache.data(id).unwrap())
            .collect();
        // Reloaded branches start collapsed.
        assert_eq!(order, ["R", "a", "b", "c"]);
    }

    #[test]
    fn starts_expanded_branches_are_visible_on_attach() {
        let source = SourceTree::from_nodes([
            SourceNode::branch("B", [SourceNode::leaf("C")]).expanded(),
            SourceNode::leaf("A"),
        ]);
        let cache = attached(&source);
        assert_eq!(names(&cache), ["B", "C", "A"]);
    }

    #[test]
    fn collapse_all_keeps_top_level() {
        let source = nested_tree();
        let mut cache = attached(&source);
        cache.expand_all(&source).unwrap();
        assert_eq!(cache.visible_len(), 6);
        cache.collapse_all();
        assert_eq!(names(&cache), ["A", "B"]);
        cache.expand(&source, &[1]).unwrap();
        assert_eq!(names(&cache), ["A", "B", "C", "D"]);
    }

    #[test]
    fn toggle_flips_state() {
        let source = scenario_tree();
        let mut cache = attached(&source);
        assert_eq!(cache.toggle(&source, &[1]), Ok(true));
        assert_eq!(cache.visible_len(), 4);
        assert_eq!(cache.toggle(&source, &[1]), Ok(false));
        assert_eq!(cache.visible_len(), 2);
    }

    #[test]
    fn reattach_invalidates_handles() {
        let source = scenario_tree();
        let mut cache = attached(&source);
        let a = cache.get(&[0]).unwrap();
        cache.attach(&source).unwrap();
        assert!(!cache.is_live(a));
        assert_eq!(cache.path_of(a), Err(TreeError::StaleHandle));
        let a2 = cache.get(&[0]).unwrap();
        assert_ne!(a, a2, "generation distinguishes reused slots");
    }

    #[test]
    fn out_of_range_notifications_are_errors() {
        let source = scenario_tree();
        let mut cache = attached(&source);
        assert!(matches!(
            cache.nodes_removed(&[], 1, 5),
            Err(TreeError::InvalidPath { .. })
        ));
        assert!(matches!(
            cache.node_inserted(&source, &[], 7),
            Err(TreeError::InvalidPath { .. })
        ));
        assert!(matches!(
            cache.nodes_sorted(&source, &[0]),
            Err(TreeError::NotABranch { .. })
        ));
    }

    /// A source that cannot produce the second child of `broken`.
    struct Flaky {
        inner: SourceTree<&'static str>,
        broken: Path,
    }

    impl TreeSource for Flaky {
        type Data = alloc::rc::Rc<&'static str>;

        fn child_count(&self, branch: &[usize]) -> Option<usize> {
            self.inner.child_count(branch)
        }

        fn child(
            &self,
            branch: &[usize],
            index: usize,
        ) -> Option<crate::source::SourceEntry<Self::Data>> {
            if *branch == *self.broken && index == 1 {
                return None;
            }
            self.inner.child(branch, index)
        }

        fn same_node(&self, a: &Self::Data, b: &Self::Data) -> bool {
            self.inner.same_node(a, b)
        }
    }

    #[test]
    fn failed_expand_leaves_branch_collapsed() {
        let mut source = Flaky {
            inner: scenario_tree(),
            broken: Path::from([1]),
        };
        let mut cache = Cache::default();
        cache.attach(&source).unwrap();
        assert!(matches!(
            cache.expand(&source, &[1]),
            Err(TreeError::InvalidPath { .. })
        ));
        let b = cache.get(&[1]).unwrap();
        assert!(!cache.is_expanded(b));
        assert_eq!(names(&cache), ["A", "B"]);

        source.broken = Path::root().child(9);
        cache.expand(&source, &[1]).unwrap();
        assert_eq!(names(&cache), ["A", "B", "C", "D"]);
    }

    #[test]
    fn failed_insert_leaves_no_entry() {
        let mut source = Flaky {
            inner: SourceTree::from_nodes([SourceNode::leaf("A")]),
            broken: Path::from([1]),
        };
        let mut cache = Cache::default();
        cache.attach(&source).unwrap();
        let x = SourceNode::branch("X", [SourceNode::leaf("Y"), SourceNode::leaf("Z")]);
        let change = source.inner.insert(&[], 1, x.expanded()).unwrap();
        assert!(cache.apply(&source, &change).is_err());
        assert_eq!(names(&cache), ["A"]);
        assert_eq!(cache.get(&[1]), None);
        assert_eq!(cache.children_of(cache.root().unwrap()).map(<[_]>::len), Some(1));

        source.broken = Path::root().child(9);
        cache.apply(&source, &change).unwrap();
        assert_eq!(names(&cache), ["A", "X", "Y", "Z"]);
    }

    #[test]
    fn failed_sort_keeps_previous_rows() {
        let mut source = Flaky {
            inner: SourceTree::from_nodes([
                SourceNode::leaf("A"),
                SourceNode::branch("B", [SourceNode::leaf("C"), SourceNode::leaf("D")])
                    .expanded(),
            ]),
            broken: Path::root().child(9),
        };
        let mut cache = Cache::default();
        cache.attach(&source).unwrap();
        assert_eq!(names(&cache), ["A", "B", "C", "D"]);

        let change = source.inner.sort_by(&[], |a, b| b.cmp(a)).unwrap();
        source.broken = Path::from([0]);
        assert!(cache.apply(&source, &change).is_err());
        assert_eq!(names(&cache), ["A", "B", "C", "D"]);
        let c = cache.get(&[1, 0]).unwrap();
        assert_eq!(cache.visible_row_of(c), Some(2));

        source.broken = Path::root().child(9);
        cache.apply(&source, &change).unwrap();
        assert_eq!(names(&cache), ["B", "C", "D", "A"]);
    }

    #[test]
    fn failed_expand_all_changes_no_flags() {
        let mut source = Flaky {
            inner: nested_tree(),
            broken: Path::from([1, 0]),
        };
        let mut cache = Cache::default();
        cache.attach(&source).unwrap();
        assert!(cache.expand_all(&source).is_err());
        assert_eq!(names(&cache), ["A", "B"]);
        let b = cache.get(&[1]).unwrap();
        assert!(!cache.is_expanded(b));

        source.broken = Path::root().child(9);
        cache.expand_all(&source).unwrap();
        assert_eq!(names(&cache), ["A", "B", "C", "E", "F", "D"]);
    }
}
