// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-node display state: selection, highlight, disabled, and check marks.
//!
//! Flags live on cache entries. When an entry is released (removed, replaced
//! by an update with a new identity, or dropped by a sort of its parent) its
//! flags go with it, and the host re-applies whatever it tracks itself.

use alloc::{vec, vec::Vec};

use crate::{CheckState, NodeFlags, NodeHandle, NodeState, Path, TreeError, VisibilityCache};

impl<D> VisibilityCache<D> {
    /// Flags of a live entry.
    pub fn flags(&self, id: NodeHandle) -> Option<NodeFlags> {
        self.node_opt(id).map(|n| n.flags)
    }

    /// Display state of a live entry, as handed to renderers.
    pub fn node_state(&self, id: NodeHandle) -> Option<NodeState> {
        let node = self.node_opt(id)?;
        Some(NodeState {
            depth: node.depth,
            expanded: node.branch.as_ref().map(|b| b.expanded),
            flags: node.flags,
        })
    }

    /// Selects or deselects a node. Returns `true` if anything changed.
    pub fn set_selected(&mut self, id: NodeHandle, selected: bool) -> Result<bool, TreeError> {
        self.update_flag(id, NodeFlags::SELECTED, selected)
    }

    /// Returns `true` if the node is selected.
    pub fn is_selected(&self, id: NodeHandle) -> bool {
        self.has_flag(id, NodeFlags::SELECTED)
    }

    /// Deselects every loaded node.
    pub fn clear_selection(&mut self) {
        for id in self.selected_nodes() {
            if let Some(node) = self.node_opt_mut(id) {
                node.flags.remove(NodeFlags::SELECTED);
            }
        }
        self.invalidate_layout();
    }

    /// Selected nodes in pre-order over the loaded tree, hidden ones included.
    pub fn selected_nodes(&self) -> Vec<NodeHandle> {
        let Some(root) = self.root else {
            return Vec::new();
        };
        let mut out = Vec::new();
        let mut stack: Vec<NodeHandle> =
            self.loaded_children(root).iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            if self.node(id).flags.contains(NodeFlags::SELECTED) {
                out.push(id);
            }
            stack.extend(self.loaded_children(id).iter().rev().copied());
        }
        out
    }

    /// Paths of [`VisibilityCache::selected_nodes`].
    pub fn selected_paths(&self) -> Vec<Path> {
        self.selected_nodes()
            .into_iter()
            .filter_map(|id| self.path_of(id).ok())
            .collect()
    }

    /// The highlighted node, if any.
    pub fn highlighted(&self) -> Option<NodeHandle> {
        self.highlighted.filter(|&id| self.is_live(id))
    }

    /// Moves the single highlight to `id` (or clears it). Returns the
    /// previously highlighted node.
    pub fn set_highlighted(
        &mut self,
        id: Option<NodeHandle>,
    ) -> Result<Option<NodeHandle>, TreeError> {
        if let Some(id) = id
            && !self.is_live(id)
        {
            return Err(TreeError::StaleHandle);
        }
        let previous = self.highlighted();
        if previous == id {
            return Ok(previous);
        }
        if let Some(prev) = previous {
            self.node_mut(prev).flags.remove(NodeFlags::HIGHLIGHTED);
        }
        if let Some(id) = id {
            self.node_mut(id).flags.insert(NodeFlags::HIGHLIGHTED);
        }
        self.highlighted = id;
        self.invalidate_layout();
        Ok(previous)
    }

    /// Enables or disables a node. Returns `true` if anything changed.
    pub fn set_disabled(&mut self, id: NodeHandle, disabled: bool) -> Result<bool, TreeError> {
        self.update_flag(id, NodeFlags::DISABLED, disabled)
    }

    /// Returns `true` if the node is disabled.
    pub fn is_disabled(&self, id: NodeHandle) -> bool {
        self.has_flag(id, NodeFlags::DISABLED)
    }

    /// Checks or unchecks a node. Returns `true` if anything changed.
    ///
    /// With [`crate::TreeStyle::show_mixed_checkmark_state`] on, the node's
    /// ancestors are re-derived: an unchecked branch shows as mixed iff one of
    /// its loaded children is checked or mixed.
    pub fn set_checked(&mut self, id: NodeHandle, checked: bool) -> Result<bool, TreeError> {
        let changed = self.update_flag(id, NodeFlags::CHECKED, checked)?;
        if changed {
            self.refresh_check_chain(id);
        }
        Ok(changed)
    }

    /// Check state of a live entry.
    pub fn check_state(&self, id: NodeHandle) -> Option<CheckState> {
        self.flags(id).map(CheckState::from_flags)
    }

    fn has_flag(&self, id: NodeHandle, flag: NodeFlags) -> bool {
        self.node_opt(id).is_some_and(|n| n.flags.contains(flag))
    }

    fn update_flag(
        &mut self,
        id: NodeHandle,
        flag: NodeFlags,
        on: bool,
    ) -> Result<bool, TreeError> {
        let node = self.node_opt_mut(id).ok_or(TreeError::StaleHandle)?;
        let before = node.flags;
        node.flags.set(flag, on);
        let changed = before != node.flags;
        if changed {
            self.invalidate_layout();
        }
        Ok(changed)
    }

    /// Re-derives the mixed state of `from` and each of its ancestors below
    /// the root.
    pub(crate) fn refresh_check_chain(&mut self, from: NodeHandle) {
        let mut current = Some(from);
        while let Some(id) = current {
            if self.root == Some(id) {
                break;
            }
            self.refresh_mixed(id);
            current = self.node(id).parent;
        }
    }

    /// Re-derives the mixed state of every loaded entry.
    pub(crate) fn refresh_all_check_states(&mut self) {
        let Some(root) = self.root else {
            return;
        };
        // Children before parents: reverse pre-order.
        let mut order = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.loaded_children(id).iter().copied());
        }
        for id in order.into_iter().rev() {
            if self.root != Some(id) {
                self.refresh_mixed(id);
            }
        }
    }

    fn refresh_mixed(&mut self, id: NodeHandle) {
        let mixed = self.style.show_mixed_checkmark_state
            && !self.node(id).flags.contains(NodeFlags::CHECKED)
            && self.loaded_children(id).iter().any(|&child| {
                self.node(child)
                    .flags
                    .intersects(NodeFlags::CHECKED | NodeFlags::MIXED)
            });
        self.node_mut(id).flags.set(NodeFlags::MIXED, mixed);
    }
}
