// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The measurement boundary towards node renderers.

use kurbo::Size;

use crate::{CheckState, NodeFlags};

/// Display state of a node, handed to renderers alongside its value.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct NodeState {
    /// Nesting depth (0 for children of the root).
    pub depth: usize,
    /// `Some(expanded)` for branches, `None` for leaves.
    pub expanded: Option<bool>,
    /// Highlight, selection, disabled, and check flags.
    pub flags: NodeFlags,
}

impl NodeState {
    /// Derived check state.
    #[must_use]
    pub fn check_state(&self) -> CheckState {
        CheckState::from_flags(self.flags)
    }

    /// Returns `true` if the node is a branch.
    #[must_use]
    pub fn is_branch(&self) -> bool {
        self.expanded.is_some()
    }
}

/// Measures node visuals.
///
/// The cache asks for sizes only. Drawing is up to the host, which gets the
/// same data and [`NodeState`] from [`crate::VisibilityCache::paint_rows`].
pub trait NodeRenderer<D> {
    /// Preferred size of the visual for `data` in `state`.
    ///
    /// `data` is `None` for the placeholder used to measure the uniform row
    /// height.
    fn preferred_size(&mut self, data: Option<&D>, state: &NodeState) -> Size;
}

impl<D, F> NodeRenderer<D> for F
where
    F: FnMut(Option<&D>, &NodeState) -> Size,
{
    fn preferred_size(&mut self, data: Option<&D>, state: &NodeState) -> Size {
        self(data, state)
    }
}
