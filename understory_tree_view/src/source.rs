// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The data model boundary: what the cache reads, and what it is told.
//!
//! The cache never owns node values. It reads the hierarchy through
//! [`TreeSource`] and is kept in sync by forwarding [`TreeChange`]s (or
//! calling the matching cache methods directly) after each edit.
//!
//! [`SourceTree`] is a small owned implementation whose mutators return the
//! [`TreeChange`] to forward. Hosts with their own models implement
//! [`TreeSource`] instead.

use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cmp::Ordering;

use crate::{Path, TreeError};

/// Whether a source node is a leaf or a branch.
///
/// Decided once by the data model; the cache never inspects values to
/// classify them.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NodeKind {
    /// A node without children.
    Leaf,
    /// A node with an ordered (possibly empty) child sequence.
    Branch {
        /// Whether a freshly built entry for this branch starts expanded.
        expanded: bool,
    },
}

impl NodeKind {
    /// Returns `true` for [`NodeKind::Branch`].
    #[must_use]
    pub const fn is_branch(self) -> bool {
        matches!(self, Self::Branch { .. })
    }
}

/// One child position as reported by a [`TreeSource`].
#[derive(Clone, Debug)]
pub struct SourceEntry<D> {
    /// Shared handle to the node's value.
    pub data: D,
    /// Leaf or branch.
    pub kind: NodeKind,
}

/// Read access to an ordered, hierarchical data model.
///
/// Paths passed here always name a branch position the cache believes
/// exists; returning `None` tells the cache it does not, which it reports
/// as a [`TreeError`].
pub trait TreeSource {
    /// Cheap, shared handle to a node value (for example `Rc<T>` or a key).
    type Data: Clone;

    /// Number of children of the branch at `branch`, or `None` if `branch`
    /// does not name a branch. The empty path is the top-level sequence.
    fn child_count(&self, branch: &[usize]) -> Option<usize>;

    /// The child at `index` under the branch at `branch`.
    fn child(&self, branch: &[usize], index: usize) -> Option<SourceEntry<Self::Data>>;

    /// Returns `true` if both handles refer to the same node value.
    ///
    /// This is an identity test, not a content comparison.
    fn same_node(&self, a: &Self::Data, b: &Self::Data) -> bool;
}

/// A structural change notification scoped to a parent branch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TreeChange {
    /// A child was inserted at `index`.
    Inserted {
        /// Path of the parent branch.
        parent: Path,
        /// Position of the new child.
        index: usize,
    },
    /// `count` children starting at `index` were removed.
    Removed {
        /// Path of the parent branch.
        parent: Path,
        /// Position of the first removed child.
        index: usize,
        /// Number of removed children.
        count: usize,
    },
    /// All children were removed.
    Cleared {
        /// Path of the parent branch.
        parent: Path,
    },
    /// The value at `index` was replaced.
    Updated {
        /// Path of the parent branch.
        parent: Path,
        /// Position of the replaced child.
        index: usize,
    },
    /// The children were reordered.
    Sorted {
        /// Path of the parent branch.
        parent: Path,
    },
}

/// A node of a [`SourceTree`].
#[derive(Clone, Debug)]
pub enum SourceNode<T> {
    /// A leaf value.
    Leaf(Rc<T>),
    /// A branch value with children.
    Branch(SourceBranch<T>),
}

/// Branch payload of a [`SourceNode`].
#[derive(Clone, Debug)]
pub struct SourceBranch<T> {
    value: Rc<T>,
    children: Vec<SourceNode<T>>,
    expanded: bool,
}

impl<T> SourceBranch<T> {
    /// The branch's children.
    #[must_use]
    pub fn children(&self) -> &[SourceNode<T>] {
        &self.children
    }

    /// Whether the branch starts expanded.
    #[must_use]
    pub const fn starts_expanded(&self) -> bool {
        self.expanded
    }
}

impl<T> SourceNode<T> {
    /// Creates a leaf.
    pub fn leaf(value: T) -> Self {
        Self::Leaf(Rc::new(value))
    }

    /// Creates a collapsed branch.
    pub fn branch(value: T, children: impl IntoIterator<Item = Self>) -> Self {
        Self::Branch(SourceBranch {
            value: Rc::new(value),
            children: children.into_iter().collect(),
            expanded: false,
        })
    }

    /// Marks a branch as starting expanded. Leaves are returned unchanged.
    #[must_use]
    pub fn expanded(mut self) -> Self {
        if let Self::Branch(branch) = &mut self {
            branch.expanded = true;
        }
        self
    }

    /// The node's value.
    pub fn value(&self) -> &T {
        self.data()
    }

    /// The shared handle to the node's value.
    pub fn data(&self) -> &Rc<T> {
        match self {
            Self::Leaf(value) => value,
            Self::Branch(branch) => &branch.value,
        }
    }

    /// The node's kind.
    pub fn kind(&self) -> NodeKind {
        match self {
            Self::Leaf(_) => NodeKind::Leaf,
            Self::Branch(branch) => NodeKind::Branch {
                expanded: branch.expanded,
            },
        }
    }

    /// The children of a branch, or `None` for a leaf.
    pub fn children(&self) -> Option<&[Self]> {
        match self {
            Self::Leaf(_) => None,
            Self::Branch(branch) => Some(&branch.children),
        }
    }
}

/// An owned tree implementing [`TreeSource`] with `Rc` identity.
///
/// Every mutator validates its path and returns the [`TreeChange`] the
/// cache must be told about.
///
/// ```rust
/// use understory_tree_view::{SourceNode, SourceTree, TreeStyle, VisibilityCache};
///
/// let mut source = SourceTree::from_nodes([
///     SourceNode::leaf("a"),
///     SourceNode::branch("b", [SourceNode::leaf("c")]),
/// ]);
/// let mut cache = VisibilityCache::new(TreeStyle::default());
/// cache.attach(&source).unwrap();
/// cache.expand(&source, &[1]).unwrap();
///
/// let change = source.insert(&[1], 0, SourceNode::leaf("x")).unwrap();
/// cache.apply(&source, &change).unwrap();
/// assert_eq!(cache.visible_len(), 4);
/// ```
#[derive(Clone, Debug)]
pub struct SourceTree<T> {
    roots: Vec<SourceNode<T>>,
}

impl<T> Default for SourceTree<T> {
    fn default() -> Self {
        Self { roots: Vec::new() }
    }
}

impl<T> SourceTree<T> {
    /// Creates an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a tree from its top-level nodes.
    pub fn from_nodes(nodes: impl IntoIterator<Item = SourceNode<T>>) -> Self {
        Self {
            roots: nodes.into_iter().collect(),
        }
    }

    /// The children of the branch at `branch` (the top level for the root path).
    pub fn children(&self, branch: &[usize]) -> Option<&[SourceNode<T>]> {
        let mut current = self.roots.as_slice();
        for &index in branch {
            current = current.get(index)?.children()?;
        }
        Some(current)
    }

    /// The node at `path`, or `None` for the root path or an unresolved path.
    pub fn node(&self, path: &[usize]) -> Option<&SourceNode<T>> {
        let (&last, parent) = path.split_last()?;
        self.children(parent)?.get(last)
    }

    /// The value at `path`.
    pub fn value(&self, path: &[usize]) -> Option<&T> {
        self.node(path).map(SourceNode::value)
    }

    /// Inserts `node` at `index` under `parent`.
    pub fn insert(
        &mut self,
        parent: &[usize],
        index: usize,
        node: SourceNode<T>,
    ) -> Result<TreeChange, TreeError> {
        let children = self.children_mut(parent)?;
        if index > children.len() {
            return Err(TreeError::invalid_path(&Path::from(parent).child(index), parent.len()));
        }
        children.insert(index, node);
        Ok(TreeChange::Inserted {
            parent: parent.into(),
            index,
        })
    }

    /// Removes `count` children of `parent` starting at `index`.
    pub fn remove(
        &mut self,
        parent: &[usize],
        index: usize,
        count: usize,
    ) -> Result<TreeChange, TreeError> {
        let children = self.children_mut(parent)?;
        let end = index.checked_add(count).filter(|&end| end <= children.len());
        let Some(end) = end else {
            return Err(TreeError::invalid_path(&Path::from(parent).child(index), parent.len()));
        };
        children.drain(index..end);
        Ok(TreeChange::Removed {
            parent: parent.into(),
            index,
            count,
        })
    }

    /// Removes all children of `parent`.
    pub fn clear(&mut self, parent: &[usize]) -> Result<TreeChange, TreeError> {
        self.children_mut(parent)?.clear();
        Ok(TreeChange::Cleared {
            parent: parent.into(),
        })
    }

    /// Replaces the child at `index` under `parent` with `node`.
    pub fn replace(
        &mut self,
        parent: &[usize],
        index: usize,
        node: SourceNode<T>,
    ) -> Result<TreeChange, TreeError> {
        let children = self.children_mut(parent)?;
        let Some(slot) = children.get_mut(index) else {
            return Err(TreeError::invalid_path(&Path::from(parent).child(index), parent.len()));
        };
        *slot = node;
        Ok(TreeChange::Updated {
            parent: parent.into(),
            index,
        })
    }

    /// Sorts the children of `parent` by value with a stable sort.
    pub fn sort_by<F>(&mut self, parent: &[usize], mut compare: F) -> Result<TreeChange, TreeError>
    where
        F: FnMut(&T, &T) -> Ordering,
    {
        self.children_mut(parent)?
            .sort_by(|a, b| compare(a.value(), b.value()));
        Ok(TreeChange::Sorted {
            parent: parent.into(),
        })
    }

    fn children_mut(&mut self, branch: &[usize]) -> Result<&mut Vec<SourceNode<T>>, TreeError> {
        let mut current = &mut self.roots;
        for (depth, &index) in branch.iter().enumerate() {
            match current.get_mut(index) {
                None => return Err(TreeError::invalid_path(branch, depth)),
                Some(SourceNode::Leaf(_)) => {
                    return Err(TreeError::not_a_branch(&branch[..=depth]));
                }
                Some(SourceNode::Branch(next)) => current = &mut next.children,
            }
        }
        Ok(current)
    }
}

impl<T> TreeSource for SourceTree<T> {
    type Data = Rc<T>;

    fn child_count(&self, branch: &[usize]) -> Option<usize> {
        self.children(branch).map(<[_]>::len)
    }

    fn child(&self, branch: &[usize], index: usize) -> Option<SourceEntry<Rc<T>>> {
        let node = self.children(branch)?.get(index)?;
        Some(SourceEntry {
            data: Rc::clone(node.data()),
            kind: node.kind(),
        })
    }

    fn same_node(&self, a: &Rc<T>, b: &Rc<T>) -> bool {
        Rc::ptr_eq(a, b)
    }
}
