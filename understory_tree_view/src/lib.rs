// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Understory Tree View: an incremental visibility cache for hierarchical views.
//!
//! A tree view shows a flattened, indented slice of a hierarchy: every node whose
//! ancestors are all expanded, in depth-first order. This crate maintains that
//! slice for a caller-owned data model and keeps it in sync as the model is edited
//! and branches are expanded or collapsed.
//!
//! - Loads children lazily, the first time a branch is expanded or addressed.
//! - Applies inserts, removals, updates, sorts, and clears by splicing only the
//!   affected rows.
//! - Answers row, coordinate, paint, and hit-test queries in time proportional to
//!   the visible window, using a uniform row height.
//! - Tracks per-node display state: selection, a single highlight, disabled nodes,
//!   and check marks with optional mixed-state propagation.
//!
//! ## Not a widget
//!
//! This crate owns no node values, draws nothing, and routes no input.
//! The host reads its model through [`TreeSource`], forwards each edit as a
//! [`TreeChange`], and draws the rows that [`VisibilityCache::paint_rows`] reports.
//! Measurements come from a [`NodeRenderer`], which is any closure
//! `FnMut(Option<&D>, &NodeState) -> Size`.
//!
//! Positions in the hierarchy are addressed by [`Path`]: the child indices from the
//! root. Cache entries are addressed by [`NodeHandle`], a generational handle that
//! goes stale when its entry is released.
//!
//! ## API overview
//!
//! - [`VisibilityCache`]: the cache.
//! - [`TreeSource`], [`SourceEntry`], [`NodeKind`]: the data model boundary.
//! - [`SourceTree`], [`SourceNode`]: a ready-made data model whose mutators return
//!   the [`TreeChange`] to forward.
//! - [`TreeStyle`]: indents, spacing, and which row parts are shown.
//! - [`TreeError`]: invalid paths, type confusion, stale handles, detached cache.
//!
//! Key operations:
//! - [`VisibilityCache::attach`] / [`VisibilityCache::detach`]
//! - [`VisibilityCache::expand`] / [`VisibilityCache::collapse`] / [`VisibilityCache::toggle`]
//! - [`VisibilityCache::apply`], or the individual notifications such as
//!   [`VisibilityCache::node_inserted`] and [`VisibilityCache::nodes_removed`].
//! - [`VisibilityCache::node_at_y`], [`VisibilityCache::bounds_of`],
//!   [`VisibilityCache::hit_test`], [`VisibilityCache::paint_rows`].
//! - [`VisibilityCache::next_enabled`] / [`VisibilityCache::prev_enabled`] for
//!   keyboard movement.
//!
//! ## Example
//!
//! ```rust
//! use std::rc::Rc;
//!
//! use kurbo::{Point, Size};
//! use understory_tree_view::{
//!     HitPart, NodeState, SourceNode, SourceTree, TreeStyle, VisibilityCache,
//! };
//!
//! let source = SourceTree::from_nodes([
//!     SourceNode::leaf("README"),
//!     SourceNode::branch("src", [SourceNode::leaf("lib.rs")]),
//! ]);
//! let mut cache = VisibilityCache::new(TreeStyle::default());
//! cache.attach(&source).unwrap();
//! let mut renderer = |_: Option<&Rc<&str>>, _: &NodeState| Size::new(80.0, 20.0);
//! cache.measure_node_height(&mut renderer);
//!
//! // Clicking the branch control of "src" expands it.
//! let hit = cache.hit_test(Point::new(4.0, 30.0), 200.0).unwrap();
//! assert_eq!(hit.part, HitPart::BranchControl);
//! let path = cache.path_of(hit.node).unwrap();
//! cache.toggle(&source, &path).unwrap();
//!
//! let rows: Vec<_> = cache
//!     .visible_nodes()
//!     .iter()
//!     .map(|&id| **cache.data(id).unwrap())
//!     .collect();
//! assert_eq!(rows, ["README", "src", "lib.rs"]);
//! ```
//!
//! This crate is `no_std` and uses `alloc`.

#![no_std]

extern crate alloc;

mod cache;
mod error;
mod layout;
mod navigate;
mod path;
mod render;
mod source;
mod state;
mod style;
mod types;

pub use cache::VisibilityCache;
pub use error::TreeError;
pub use layout::{HitPart, PaintRow, PaintRows, TreeHit};
pub use path::Path;
pub use render::{NodeRenderer, NodeState};
pub use source::{
    NodeKind, SourceBranch, SourceEntry, SourceNode, SourceTree, TreeChange, TreeSource,
};
pub use style::TreeStyle;
pub use types::{CheckState, NodeFlags, NodeHandle};
