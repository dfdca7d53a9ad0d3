// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Public types for the cache: node handles, display flags, and check state.

/// Handle to a cached node (generational).
///
/// Handles stay valid until the node's entry is released, which happens when
/// the node is removed, replaced by an identity-changing update, dropped by a
/// sort of its parent, or when the whole tree is re-attached. A released
/// handle's slot may be reused; the generation tells the two apart.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct NodeHandle(pub(crate) u32, pub(crate) u32);

impl NodeHandle {
    pub(crate) const fn new(idx: u32, generation: u32) -> Self {
        Self(idx, generation)
    }

    pub(crate) const fn idx(self) -> usize {
        self.0 as usize
    }
}

bitflags::bitflags! {
    /// Transient display state of a node.
    ///
    /// [`NodeFlags::CHECKED`] and [`NodeFlags::MIXED`] are never both set;
    /// neither set means unchecked.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct NodeFlags: u8 {
        /// Node is under the pointer.
        const HIGHLIGHTED = 0b0000_0001;
        /// Node is selected.
        const SELECTED    = 0b0000_0010;
        /// Node is disabled and skipped by navigation.
        const DISABLED    = 0b0000_0100;
        /// Node is checked.
        const CHECKED     = 0b0000_1000;
        /// Branch is not checked but has checked descendants.
        const MIXED       = 0b0001_0000;
    }
}

/// Check state of a node, derived from its [`NodeFlags`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum CheckState {
    /// Neither checked nor mixed.
    #[default]
    Unchecked,
    /// Checked.
    Checked,
    /// Some descendants are checked.
    Mixed,
}

impl CheckState {
    /// Reads the check state out of a flag set.
    #[must_use]
    pub fn from_flags(flags: NodeFlags) -> Self {
        if flags.contains(NodeFlags::CHECKED) {
            Self::Checked
        } else if flags.contains(NodeFlags::MIXED) {
            Self::Mixed
        } else {
            Self::Unchecked
        }
    }
}
