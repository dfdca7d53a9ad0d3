// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Row metrics: mapping between rows, pixel coordinates, and node parts.
//!
//! Every row has the same height, measured once from the renderer with a
//! placeholder. Row `i` starts at `i * (node_height + vertical_spacing)`,
//! so every query here is a division or a multiplication plus, at most, a
//! scan of the visible-node index.

use core::ops::Range;

use kurbo::{Point, Rect, Size};

use crate::{NodeHandle, NodeRenderer, NodeState, Path, VisibilityCache};

/// Which part of a row a point falls on.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HitPart {
    /// The expand/collapse control of a branch.
    BranchControl,
    /// The checkbox.
    Checkbox,
    /// The node's content, from its indent to the right edge.
    Content,
    /// The indentation left of the content that is neither of the above.
    Indent,
}

/// Result of [`VisibilityCache::hit_test`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TreeHit {
    /// The node whose row contains the point.
    pub node: NodeHandle,
    /// The row of that node.
    pub row: usize,
    /// The part of the row that was hit.
    pub part: HitPart,
}

/// Geometry and state of one visible row.
#[derive(Clone, Debug)]
pub struct PaintRow<'a, D> {
    /// Row in the visible-node index.
    pub row: usize,
    /// The node.
    pub node: NodeHandle,
    /// The node's source value.
    pub data: &'a D,
    /// Display state to hand to the renderer.
    pub state: NodeState,
    /// The full row, from `x = 0` to the view width.
    pub row_bounds: Rect,
    /// The node's content area, right of its indent.
    pub content_bounds: Rect,
    /// The branch control, for branches when controls are shown.
    pub branch_control: Option<Rect>,
    /// The checkbox, when checkmarks are enabled.
    pub checkbox: Option<Rect>,
}

/// Iterator over the rows intersecting a clip rectangle.
///
/// Returned by [`VisibilityCache::paint_rows`].
#[derive(Debug)]
pub struct PaintRows<'a, D> {
    cache: &'a VisibilityCache<D>,
    rows: Range<usize>,
    width: f64,
}

impl<'a, D> Iterator for PaintRows<'a, D> {
    type Item = PaintRow<'a, D>;

    fn next(&mut self) -> Option<Self::Item> {
        let row = self.rows.next()?;
        self.cache.row_geometry(row, self.width)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.rows.size_hint()
    }
}

impl<D> VisibilityCache<D> {
    /// The uniform node height.
    pub fn node_height(&self) -> f64 {
        self.node_height
    }

    /// Sets the uniform node height directly.
    pub fn set_node_height(&mut self, height: f64) {
        debug_assert!(
            height.is_finite(),
            "node heights must be finite; got {height:?}"
        );
        // Clamp finite negative values to `0.0`.
        self.node_height = height.max(0.0);
        self.invalidate_layout();
    }

    /// Measures the uniform node height by asking `renderer` for the size of
    /// a placeholder node, and stores it.
    pub fn measure_node_height<R>(&mut self, renderer: &mut R) -> f64
    where
        R: NodeRenderer<D>,
    {
        let size = renderer.preferred_size(None, &NodeState::default());
        self.set_node_height(size.height);
        self.node_height
    }

    /// Distance between the tops of consecutive rows.
    pub fn row_extent(&self) -> f64 {
        self.node_height + self.style.vertical_spacing
    }

    /// Total height of all visible rows.
    #[allow(
        clippy::cast_precision_loss,
        reason = "Row counts are far below f64's exact integer range"
    )]
    pub fn content_height(&self) -> f64 {
        self.visible.len() as f64 * self.row_extent()
    }

    /// Horizontal offset of the content of a node at `depth`.
    pub fn indent_for_depth(&self, depth: usize) -> f64 {
        self.style.indent_for_depth(depth)
    }

    /// Row containing vertical offset `y`, if any.
    pub fn row_at_y(&self, y: f64) -> Option<usize> {
        let extent = self.row_extent();
        if y.is_nan() || y < 0.0 || extent <= 0.0 {
            return None;
        }
        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            reason = "`y` is non-negative and truncation is the intended floor"
        )]
        let row = (y / extent) as usize;
        (row < self.visible.len()).then_some(row)
    }

    /// Node whose row contains vertical offset `y`, if any.
    pub fn node_at_y(&self, y: f64) -> Option<NodeHandle> {
        self.row_at_y(y).map(|row| self.visible[row])
    }

    /// Path of the node whose row contains vertical offset `y`, if any.
    pub fn path_at_y(&self, y: f64) -> Option<Path> {
        self.visible_path_at(self.row_at_y(y)?)
    }

    /// Top of a row.
    #[allow(
        clippy::cast_precision_loss,
        reason = "Row counts are far below f64's exact integer range"
    )]
    pub fn row_y(&self, row: usize) -> f64 {
        row as f64 * self.row_extent()
    }

    /// Bounds of a visible node's content in a view `width` wide.
    ///
    /// Returns `None` if the node is hidden behind a collapsed ancestor or
    /// stale.
    pub fn bounds_of(&self, id: NodeHandle, width: f64) -> Option<Rect> {
        let row = self.visible_row_of(id)?;
        let x = self.indent_for_depth(self.node(id).depth);
        let y = self.row_y(row);
        Some(Rect::new(x, y, width.max(x), y + self.node_height))
    }

    /// Bounds of the node at `path`, if it is loaded and visible.
    pub fn bounds_of_path(&self, path: &[usize], width: f64) -> Option<Rect> {
        self.bounds_of(self.get(path)?, width)
    }

    /// Rows whose extent intersects the vertical span `y0..y1`.
    pub fn rows_in(&self, y0: f64, y1: f64) -> Range<usize> {
        let extent = self.row_extent();
        let len = self.visible.len();
        if extent <= 0.0 || y0.is_nan() || y1.is_nan() || y1 <= y0 || y1 <= 0.0 {
            return 0..0;
        }
        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            clippy::cast_precision_loss,
            reason = "Both quotients are non-negative and clamped to the row count"
        )]
        let (start, end) = {
            let rows = len as f64;
            let start = (y0.max(0.0) / extent).min(rows) as usize;
            // Clamp before rounding so unbounded clips stay in range.
            let q = (y1 / extent).min(rows);
            let mut end = q as usize;
            // Round up to include a partially covered last row.
            if end < len && (end as f64) < q {
                end += 1;
            }
            (start, end)
        };
        start..end
    }

    /// Rows intersecting `clip`, with geometry for a view `width` wide.
    ///
    /// This only touches the rows inside the clip.
    pub fn paint_rows(&self, clip: Rect, width: f64) -> PaintRows<'_, D> {
        PaintRows {
            cache: self,
            rows: self.rows_in(clip.y0, clip.y1),
            width,
        }
    }

    /// Finds the node and part under `point` in a view `width` wide.
    ///
    /// Points left of `0.0` or at or beyond `width` hit nothing.
    pub fn hit_test(&self, point: Point, width: f64) -> Option<TreeHit> {
        if !(0.0..width).contains(&point.x) {
            return None;
        }
        let row = self.row_at_y(point.y)?;
        let geometry = self.row_geometry(row, width)?;
        let part = if geometry
            .branch_control
            .is_some_and(|r| r.contains(point))
        {
            HitPart::BranchControl
        } else if geometry.checkbox.is_some_and(|r| r.contains(point)) {
            HitPart::Checkbox
        } else if point.x >= geometry.content_bounds.x0 {
            HitPart::Content
        } else {
            HitPart::Indent
        };
        Some(TreeHit {
            node: geometry.node,
            row,
            part,
        })
    }

    /// Widest visible node plus its indent, as measured by `renderer`.
    ///
    /// The result is cached until the next change that can affect it.
    pub fn preferred_width<R>(&mut self, renderer: &mut R) -> f64
    where
        R: NodeRenderer<D>,
    {
        if let Some(width) = self.preferred_width {
            return width;
        }
        let mut width = 0.0_f64;
        for &id in &self.visible {
            let node = self.node(id);
            let state = NodeState {
                depth: node.depth,
                expanded: node.branch.as_ref().map(|b| b.expanded),
                flags: node.flags,
            };
            let size = renderer.preferred_size(node.data.as_ref(), &state);
            width = width.max(self.indent_for_depth(node.depth) + size.width);
        }
        self.preferred_width = Some(width);
        width
    }

    /// Preferred width and total content height.
    pub fn preferred_size<R>(&mut self, renderer: &mut R) -> Size
    where
        R: NodeRenderer<D>,
    {
        Size::new(self.preferred_width(renderer), self.content_height())
    }

    pub(crate) fn row_geometry(&self, row: usize, width: f64) -> Option<PaintRow<'_, D>> {
        let id = *self.visible.get(row)?;
        let node = self.node(id);
        let data = node.data.as_ref()?;
        let state = NodeState {
            depth: node.depth,
            expanded: node.branch.as_ref().map(|b| b.expanded),
            flags: node.flags,
        };
        let style = &self.style;
        let y = self.row_y(row);
        let h = self.node_height;
        let x = self.indent_for_depth(node.depth);

        let branch_control = (style.show_branch_controls && state.is_branch()).then(|| {
            let bx = style.branch_control_x(node.depth);
            Rect::new(bx, y, bx + style.indent, y + h)
        });
        let checkbox = style.checkmarks_enabled.then(|| {
            let cx = style.checkbox_x(node.depth);
            let cy = y + (h - style.checkbox_size) / 2.0;
            Rect::new(cx, cy, cx + style.checkbox_size, cy + style.checkbox_size)
        });

        Some(PaintRow {
            row,
            node: id,
            data,
            state,
            row_bounds: Rect::new(0.0, y, width.max(0.0), y + h),
            content_bounds: Rect::new(x, y, width.max(x), y + h),
            branch_control,
            checkbox,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{HitPart, TreeHit};
    use crate::source::{SourceNode, SourceTree};
    use crate::{NodeState, Path, TreeStyle, VisibilityCache};
    use alloc::rc::Rc;
    use alloc::vec::Vec;
    use kurbo::{Point, Rect, Size};

    type Cache = VisibilityCache<Rc<&'static str>>;

    /// 20 logical pixels tall, 10 per character wide.
    fn renderer(data: Option<&Rc<&'static str>>, _: &NodeState) -> Size {
        Size::new(data.map_or(0.0, |d| 10.0 * d.len() as f64), 20.0)
    }

    fn setup() -> (SourceTree<&'static str>, Cache) {
        let source = SourceTree::from_nodes([
            SourceNode::leaf("A"),
            SourceNode::branch(
                "B",
                [
                    SourceNode::branch("Cccc", [SourceNode::leaf("E")]),
                    SourceNode::leaf("D"),
                ],
            ),
        ]);
        let mut cache = Cache::default();
        cache.attach(&source).unwrap();
        assert_eq!(cache.measure_node_height(&mut renderer), 20.0);
        (source, cache)
    }

    #[test]
    fn node_at_y_uses_uniform_rows() {
        let (source, mut cache) = setup();
        cache.expand(&source, &[1]).unwrap();
        // Rows are 21 apart: 20 high plus 1 spacing.
        assert_eq!(cache.row_at_y(0.0), Some(0));
        assert_eq!(cache.row_at_y(20.9), Some(0));
        assert_eq!(cache.row_at_y(21.0), Some(1));
        assert_eq!(cache.path_at_y(42.0), Some(Path::from([1, 0])));
        assert_eq!(cache.node_at_y(84.0), None);
        assert_eq!(cache.node_at_y(-1.0), None);
        assert_eq!(cache.content_height(), 84.0);
    }

    #[test]
    fn bounds_follow_row_and_depth() {
        let (source, mut cache) = setup();
        let c = cache.locate(&source, &[1, 0]).unwrap();
        assert_eq!(cache.bounds_of(c, 200.0), None, "hidden behind B");
        cache.expand(&source, &[1]).unwrap();
        assert_eq!(
            cache.bounds_of(c, 200.0),
            Some(Rect::new(44.0, 42.0, 200.0, 62.0))
        );
        assert_eq!(
            cache.bounds_of_path(&[0], 200.0),
            Some(Rect::new(22.0, 0.0, 200.0, 20.0))
        );
    }

    #[test]
    fn paint_rows_cover_only_the_clip() {
        let (source, mut cache) = setup();
        cache.expand_all(&source).unwrap();
        assert_eq!(cache.visible_len(), 5);
        let rows: Vec<usize> = cache
            .paint_rows(Rect::new(0.0, 30.0, 100.0, 64.0), 100.0)
            .map(|r| r.row)
            .collect();
        assert_eq!(rows, [1, 2, 3]);

        let row = cache
            .paint_rows(Rect::new(0.0, 0.0, 100.0, 1.0), 100.0)
            .next()
            .unwrap();
        assert_eq!(**row.data, "A");
        assert_eq!(row.branch_control, None, "leaves have no control");
        assert_eq!(cache.rows_in(0.0, 1000.0), 0..5);
        assert_eq!(cache.rows_in(50.0, 10.0), 0..0);
    }

    #[test]
    fn hit_test_distinguishes_parts() {
        let (_, mut cache) = setup();
        cache.set_style(TreeStyle::default().with_checkmarks(true));
        let b = cache.get(&[1]).unwrap();
        // Row 1 spans y in 21..41. Control at 0..16, checkbox at 22..36.
        assert_eq!(
            cache.hit_test(Point::new(5.0, 30.0), 300.0),
            Some(TreeHit {
                node: b,
                row: 1,
                part: HitPart::BranchControl
            })
        );
        assert_eq!(
            cache.hit_test(Point::new(25.0, 30.0), 300.0).map(|h| h.part),
            Some(HitPart::Checkbox)
        );
        assert_eq!(
            cache.hit_test(Point::new(18.0, 30.0), 300.0).map(|h| h.part),
            Some(HitPart::Indent)
        );
        assert_eq!(
            cache.hit_test(Point::new(60.0, 30.0), 300.0).map(|h| h.part),
            Some(HitPart::Content)
        );
        assert_eq!(cache.hit_test(Point::new(60.0, 500.0), 300.0), None);
        assert_eq!(cache.hit_test(Point::new(-1.0, 30.0), 300.0), None);
        assert_eq!(cache.hit_test(Point::new(300.0, 30.0), 300.0), None);
    }

    #[test]
    fn unbounded_clips_cover_every_row() {
        let (source, mut cache) = setup();
        cache.expand_all(&source).unwrap();
        assert_eq!(cache.rows_in(0.0, f64::INFINITY), 0..5);
        assert_eq!(cache.rows_in(f64::NEG_INFINITY, 1e30), 0..5);
        assert_eq!(cache.rows_in(1e30, f64::INFINITY), 5..5);
        let painted = cache
            .paint_rows(Rect::new(0.0, 0.0, 100.0, 1e30), 100.0)
            .count();
        assert_eq!(painted, 5);
    }

    #[test]
    fn preferred_width_is_cached_until_change() {
        let (source, mut cache) = setup();
        let mut calls = 0;
        let mut counting = |data: Option<&Rc<&'static str>>, state: &NodeState| {
            calls += 1;
            renderer(data, state)
        };
        // "A" and "B" at depth 0: 22 + 10.
        assert_eq!(cache.preferred_width(&mut counting), 32.0);
        assert_eq!(cache.preferred_width(&mut counting), 32.0);
        cache.expand(&source, &[1]).unwrap();
        // "Cccc" at depth 1: 44 + 40.
        assert_eq!(cache.preferred_width(&mut counting), 84.0);
        assert_eq!(calls, 6);
        assert_eq!(
            cache.preferred_size(&mut renderer),
            Size::new(84.0, 84.0)
        );
    }
}
