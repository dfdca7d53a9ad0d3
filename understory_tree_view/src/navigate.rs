// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Keyboard-order navigation over visible rows.
//!
//! Visible pre-order is the keyboard order. Disabled nodes are skipped and
//! navigation never wraps. "Left" movement to a parent is
//! [`VisibilityCache::parent_of`].

use crate::{NodeFlags, NodeHandle, VisibilityCache};

#[derive(Copy, Clone, Debug)]
enum Step {
    Forward,
    Backward,
}

impl<D> VisibilityCache<D> {
    /// The first enabled visible node after `from`.
    ///
    /// If `from` is not visible, this is [`VisibilityCache::first_enabled`].
    pub fn next_enabled(&self, from: NodeHandle) -> Option<NodeHandle> {
        self.step_enabled(from, Step::Forward)
    }

    /// The last enabled visible node before `from`.
    ///
    /// If `from` is not visible, this is [`VisibilityCache::last_enabled`].
    pub fn prev_enabled(&self, from: NodeHandle) -> Option<NodeHandle> {
        self.step_enabled(from, Step::Backward)
    }

    /// The topmost enabled visible node.
    pub fn first_enabled(&self) -> Option<NodeHandle> {
        self.visible
            .iter()
            .copied()
            .find(|&id| self.is_row_enabled(id))
    }

    /// The bottommost enabled visible node.
    pub fn last_enabled(&self) -> Option<NodeHandle> {
        self.visible
            .iter()
            .rev()
            .copied()
            .find(|&id| self.is_row_enabled(id))
    }

    fn step_enabled(&self, from: NodeHandle, step: Step) -> Option<NodeHandle> {
        let Some(row) = self.visible_row_of(from) else {
            return match step {
                Step::Forward => self.first_enabled(),
                Step::Backward => self.last_enabled(),
            };
        };
        match step {
            Step::Forward => self.visible[row + 1..]
                .iter()
                .copied()
                .find(|&id| self.is_row_enabled(id)),
            Step::Backward => self.visible[..row]
                .iter()
                .rev()
                .copied()
                .find(|&id| self.is_row_enabled(id)),
        }
    }

    fn is_row_enabled(&self, id: NodeHandle) -> bool {
        !self.node(id).flags.contains(NodeFlags::DISABLED)
    }
}
