// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Errors reported by the cache and the reference data model.

use thiserror::Error;

use crate::Path;

/// Failure to resolve or use a node.
///
/// None of these are transient. They mean the caller and the cache disagree
/// about the tree, usually because a change notification was missed or
/// delivered out of order. The recovery is to re-attach.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum TreeError {
    /// An index along the path is out of range for its level.
    #[error("path {path} does not resolve: index out of range at depth {depth}")]
    InvalidPath {
        /// The path as supplied.
        path: Path,
        /// Position in `path` of the offending index.
        depth: usize,
    },
    /// The path (or a prefix of it) names a leaf where a branch is required.
    #[error("path {path} does not name a branch")]
    NotABranch {
        /// The prefix that resolved to a leaf.
        path: Path,
    },
    /// The handle refers to a node that has since been released.
    #[error("node handle is stale")]
    StaleHandle,
    /// No tree is attached.
    #[error("no tree is attached")]
    Detached,
}

impl TreeError {
    pub(crate) fn invalid_path(path: &[usize], depth: usize) -> Self {
        Self::InvalidPath {
            path: path.into(),
            depth,
        }
    }

    pub(crate) fn not_a_branch(path: &[usize]) -> Self {
        Self::NotABranch { path: path.into() }
    }
}
