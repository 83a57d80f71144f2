//! Logging and debugging facilities for Trellis.
//!
//! This module provides:
//! - Target names for filtering the `tracing` output of each subsystem
//! - Debug visualization for widget trees
//! - Performance tracing hooks for profiling
//!
//! # Tracing Integration
//!
//! Trellis emits `trace` and `debug` events through the `tracing` crate and
//! never installs a subscriber itself. To see them, install one in the host:
//!
//! ```ignore
//! tracing_subscriber::fmt()
//!     .with_env_filter("trellis_core::input=debug,trellis_core::broadcast=trace")
//!     .init();
//! ```
//!
//! # Debug Visualization
//!
//! Use [`WidgetTreeDebug`] to dump the widget hierarchy:
//!
//! ```
//! use trellis_core::logging::{TreeFormatOptions, WidgetTreeDebug};
//! use trellis_core::{Rect, WidgetTree};
//!
//! let tree = WidgetTree::new();
//! let window = tree.create_node(Rect::new(0, 100, 100, 0), true, None, None)?;
//! tree.set_descriptor(window, "Main")?;
//!
//! let dump = WidgetTreeDebug::with_options(&tree, TreeFormatOptions::minimal()).format_all();
//! assert!(dump.contains("Main"));
//! # Ok::<(), trellis_core::TreeError>(())
//! ```

use std::fmt;

use crate::error::TreeResult;
use crate::tree::{WidgetId, WidgetTree};

/// Target names for log filtering.
///
/// Use these with `tracing` directives to filter logs by subsystem.
pub mod targets {
    /// Core framework target.
    pub const CORE: &str = "trellis_core";
    /// Widget lifecycle and structure changes.
    pub const TREE: &str = "trellis_core::tree";
    /// Dispatch passes and per-widget delivery.
    pub const DISPATCH: &str = "trellis_core::dispatch";
    /// Broadcaster/listener activity.
    pub const BROADCAST: &str = "trellis_core::broadcast";
    /// Capture, focus and stock behaviours.
    pub const INPUT: &str = "trellis_core::input";
    /// Performance spans.
    pub const PERF: &str = "trellis_core::perf";
}

/// Style options for widget tree visualization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TreeStyle {
    /// ASCII characters for tree branches.
    Ascii,
    /// Unicode box-drawing characters.
    #[default]
    Unicode,
    /// Compact single-line representation.
    Compact,
}

/// Configuration for widget tree debug output.
#[derive(Debug, Clone)]
pub struct TreeFormatOptions {
    /// The style of tree visualization.
    pub style: TreeStyle,
    /// Whether to show widget IDs.
    pub show_ids: bool,
    /// Whether to show geometry and visibility.
    pub show_geometry: bool,
    /// Whether to show property keys and values.
    pub show_properties: bool,
    /// Maximum depth to traverse (None for unlimited).
    pub max_depth: Option<usize>,
    /// Indent size for each level.
    pub indent_size: usize,
}

impl Default for TreeFormatOptions {
    fn default() -> Self {
        Self {
            style: TreeStyle::default(),
            show_ids: true,
            show_geometry: true,
            show_properties: false,
            max_depth: None,
            indent_size: 2,
        }
    }
}

impl TreeFormatOptions {
    /// Create options for detailed debugging output.
    pub fn detailed() -> Self {
        Self {
            show_properties: true,
            ..Default::default()
        }
    }

    /// Create options for minimal output.
    pub fn minimal() -> Self {
        Self {
            show_ids: false,
            show_geometry: false,
            show_properties: false,
            ..Default::default()
        }
    }
}

/// Debug utility for visualizing a widget tree.
#[derive(Debug, Clone)]
pub struct WidgetTreeDebug<'a> {
    tree: &'a WidgetTree,
    options: TreeFormatOptions,
}

impl<'a> WidgetTreeDebug<'a> {
    /// Create a visualizer with default options.
    pub fn new(tree: &'a WidgetTree) -> Self {
        Self::with_options(tree, TreeFormatOptions::default())
    }

    /// Create a visualizer with custom options.
    pub fn with_options(tree: &'a WidgetTree, options: TreeFormatOptions) -> Self {
        Self { tree, options }
    }

    /// Format every root window, back to front.
    pub fn format_all(&self) -> String {
        let _span = PerfSpan::new("format_widget_tree");
        let roots = self.tree.roots();
        let mut output = format!("Widget Tree ({} widgets):\n", self.tree.node_count());

        if roots.is_empty() {
            output.push_str("  (empty)\n");
        }
        for root in roots {
            if let Err(err) = self.format_subtree_into(root, 0, true, &mut output) {
                output.push_str(&format!("  <{err}>\n"));
            }
        }
        output
    }

    /// Format the subtree rooted at `root`.
    pub fn format_subtree(&self, root: WidgetId) -> TreeResult<String> {
        let mut output = String::new();
        self.format_subtree_into(root, 0, true, &mut output)?;
        Ok(output)
    }

    fn format_subtree_into(
        &self,
        id: WidgetId,
        depth: usize,
        is_last: bool,
        output: &mut String,
    ) -> TreeResult<()> {
        if let Some(max) = self.options.max_depth {
            if depth > max {
                return Ok(());
            }
        }

        let descriptor = self.tree.descriptor(id)?;
        let children = self.tree.children(id)?;

        output.push_str(&self.build_prefix(depth, is_last));
        output.push_str(if descriptor.is_empty() {
            "(no descriptor)"
        } else {
            &descriptor
        });

        if self.options.show_ids {
            output.push_str(&format!(" [{id:?}]"));
        }
        if self.options.show_geometry {
            let rect = self.tree.geometry(id)?;
            output.push_str(&format!(
                " ({}, {}, {}, {})",
                rect.left, rect.top, rect.right, rect.bottom
            ));
            if !self.tree.is_visible(id)? {
                output.push_str(" hidden");
            }
        }
        output.push('\n');

        if self.options.show_properties {
            let prefix = self.build_property_prefix(depth);
            for key in self.tree.property_keys(id)? {
                let value = self.tree.property(id, key)?;
                output.push_str(&format!("{prefix}  .{key:?} = {value:?}\n"));
            }
        }

        let child_count = children.len();
        for (i, child) in children.into_iter().enumerate() {
            self.format_subtree_into(child, depth + 1, i + 1 == child_count, output)?;
        }
        Ok(())
    }

    /// Build the prefix string for a tree node.
    fn build_prefix(&self, depth: usize, is_last: bool) -> String {
        if depth == 0 {
            return String::new();
        }

        let (branch, tee, corner) = match self.options.style {
            TreeStyle::Ascii => ("|", "+--", "`--"),
            TreeStyle::Unicode => ("\u{2502}", "\u{251c}\u{2500}\u{2500}", "\u{2514}\u{2500}\u{2500}"),
            TreeStyle::Compact => ("", "-", "-"),
        };

        let mut prefix = String::new();
        for _ in 0..(depth - 1) {
            prefix.push_str(branch);
            prefix.push_str(&" ".repeat(self.options.indent_size));
        }
        prefix.push_str(if is_last { corner } else { tee });
        prefix.push(' ');
        prefix
    }

    /// Build the prefix for property lines.
    fn build_property_prefix(&self, depth: usize) -> String {
        let branch = match self.options.style {
            TreeStyle::Ascii => "|",
            TreeStyle::Unicode => "\u{2502}",
            TreeStyle::Compact => "",
        };
        let mut prefix = String::new();
        for _ in 0..depth {
            prefix.push_str(branch);
            prefix.push_str(&" ".repeat(self.options.indent_size));
        }
        prefix
    }
}

impl fmt::Display for WidgetTreeDebug<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format_all())
    }
}

/// A guard that keeps a tracing span entered until dropped.
///
/// This is useful for tracking the duration of operations.
#[derive(Debug)]
pub struct PerfSpan {
    _span: tracing::span::EnteredSpan,
}

impl PerfSpan {
    /// Create a new performance span.
    ///
    /// The span will be active until the guard is dropped.
    pub fn new(name: &'static str) -> Self {
        let span = tracing::info_span!(target: "trellis_core::perf", "perf", operation = name);
        Self {
            _span: span.entered(),
        }
    }
}
