// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Positional node addresses.

use core::fmt;
use core::ops::Deref;

use smallvec::SmallVec;

/// Address of a node: child indices from the root, outermost first.
///
/// The empty path names the root branch itself. Paths are positional, so
/// a path held across a structural change may name a different node (or
/// none at all) afterwards.
///
/// Operations accept `&[usize]`; a `&Path` derefs to that.
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Path(SmallVec<[usize; 8]>);

impl Path {
    /// The root path.
    #[must_use]
    pub fn root() -> Self {
        Self(SmallVec::new())
    }

    /// Returns `true` for the root path.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Appends a child index.
    pub fn push(&mut self, index: usize) {
        self.0.push(index);
    }

    /// Removes and returns the innermost child index.
    pub fn pop(&mut self) -> Option<usize> {
        self.0.pop()
    }

    /// Returns a path extended by one child index.
    #[must_use]
    pub fn child(&self, index: usize) -> Self {
        let mut out = self.clone();
        out.push(index);
        out
    }

    /// Returns the parent path, or `None` for the root.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        let (_, head) = self.0.split_last()?;
        Some(Self(head.iter().copied().collect()))
    }

    /// Number of indices, which is one more than the node's depth.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Same as [`Path::is_root`].
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Deref for Path {
    type Target = [usize];

    fn deref(&self) -> &[usize] {
        &self.0
    }
}

impl From<&[usize]> for Path {
    fn from(indices: &[usize]) -> Self {
        Self(indices.iter().copied().collect())
    }
}

impl<const N: usize> From<[usize; N]> for Path {
    fn from(indices: [usize; N]) -> Self {
        Self(indices.iter().copied().collect())
    }
}

impl FromIterator<usize> for Path {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Debug for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, index) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{index}")?;
        }
        f.write_str("]")
    }
}
