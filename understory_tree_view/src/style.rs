// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Layout configuration for a tree view.

/// Layout constants used to turn rows and depths into coordinates.
///
/// The cache takes this explicitly at construction; there is no global theme.
/// All values are in the same coordinate space as the renderer's measurements
/// (typically logical pixels).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TreeStyle {
    /// Horizontal indent per nesting level, also the width of a branch control.
    pub indent: f64,
    /// Horizontal gap after each indent step, branch control, and checkbox.
    pub spacing: f64,
    /// Vertical gap between rows.
    pub vertical_spacing: f64,
    /// Whether an expand/collapse control is laid out before each node.
    pub show_branch_controls: bool,
    /// Whether a checkbox is laid out before each node.
    pub checkmarks_enabled: bool,
    /// Whether unchecked branches with checked descendants show as mixed.
    pub show_mixed_checkmark_state: bool,
    /// Side length of the checkbox.
    pub checkbox_size: f64,
}

impl Default for TreeStyle {
    fn default() -> Self {
        Self {
            indent: 16.0,
            spacing: 6.0,
            vertical_spacing: 1.0,
            show_branch_controls: true,
            checkmarks_enabled: false,
            show_mixed_checkmark_state: false,
            checkbox_size: 14.0,
        }
    }
}

impl TreeStyle {
    /// Same as [`TreeStyle::default`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the per-level indent.
    #[must_use]
    pub fn with_indent(mut self, indent: f64) -> Self {
        self.indent = indent.max(0.0);
        self
    }

    /// Sets the horizontal spacing.
    #[must_use]
    pub fn with_spacing(mut self, spacing: f64) -> Self {
        self.spacing = spacing.max(0.0);
        self
    }

    /// Sets the vertical gap between rows.
    #[must_use]
    pub fn with_vertical_spacing(mut self, spacing: f64) -> Self {
        self.vertical_spacing = spacing.max(0.0);
        self
    }

    /// Shows or hides branch controls.
    #[must_use]
    pub fn with_branch_controls(mut self, show: bool) -> Self {
        self.show_branch_controls = show;
        self
    }

    /// Enables or disables checkboxes.
    #[must_use]
    pub fn with_checkmarks(mut self, enabled: bool) -> Self {
        self.checkmarks_enabled = enabled;
        self
    }

    /// Enables or disables the mixed check state for branches.
    #[must_use]
    pub fn with_mixed_checkmark_state(mut self, show: bool) -> Self {
        self.show_mixed_checkmark_state = show;
        self
    }

    /// Horizontal offset of the content of a node at `depth`.
    ///
    /// Depth 0 is a child of the root.
    #[must_use]
    pub fn indent_for_depth(&self, depth: usize) -> f64 {
        let mut x = self.branch_control_x(depth);
        if self.show_branch_controls {
            x += self.indent + self.spacing;
        }
        if self.checkmarks_enabled {
            x += self.checkbox_size.max(self.indent) + self.spacing;
        }
        x
    }

    /// Horizontal offset of the branch control of a node at `depth`.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        reason = "Tree depths are far below f64's exact integer range"
    )]
    pub(crate) fn branch_control_x(&self, depth: usize) -> f64 {
        depth as f64 * (self.indent + self.spacing)
    }

    /// Horizontal offset of the checkbox of a node at `depth`.
    #[must_use]
    pub(crate) fn checkbox_x(&self, depth: usize) -> f64 {
        let mut x = self.branch_control_x(depth);
        if self.show_branch_controls {
            x += self.indent + self.spacing;
        }
        x
    }
}
