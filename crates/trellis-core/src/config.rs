//! Configuration for widget trees.
//!
//! [`TreeConfig`] holds the knobs a host may want to adjust when building a
//! [`WidgetTree`](crate::WidgetTree). Use [`TreeConfig::default()`] for the
//! usual settings or [`TreeConfigBuilder`] to override individual fields.
//!
//! ```
//! use trellis_core::{TreeConfig, WidgetTree};
//!
//! let config = TreeConfig::builder()
//!     .max_dispatch_depth(32)
//!     .trace_messages(true)
//!     .build();
//! let tree = WidgetTree::with_config(config);
//! assert_eq!(tree.config().max_dispatch_depth, 32);
//! ```

/// Default limit for nested dispatch passes.
///
/// Each handler that dispatches again from inside a callback adds one level.
pub const DEFAULT_MAX_DISPATCH_DEPTH: usize = 64;

/// Tunable behaviour of a [`WidgetTree`](crate::WidgetTree).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeConfig {
    /// Assert that every tree operation runs on the thread that created the
    /// tree. Defaults to `true` in debug builds and `false` in release builds.
    pub thread_checks: bool,
    /// Maximum nesting of dispatch passes started from inside callbacks.
    pub max_dispatch_depth: usize,
    /// Emit a `trace` event for every message delivered to a callback stack.
    pub trace_messages: bool,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            thread_checks: cfg!(debug_assertions),
            max_dispatch_depth: DEFAULT_MAX_DISPATCH_DEPTH,
            trace_messages: false,
        }
    }
}

impl TreeConfig {
    /// Start building a configuration from the defaults.
    pub fn builder() -> TreeConfigBuilder {
        TreeConfigBuilder::new()
    }
}

/// Builder for [`TreeConfig`].
#[derive(Debug, Default)]
pub struct TreeConfigBuilder {
    config: TreeConfig,
}

impl TreeConfigBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable thread-affinity assertions.
    pub fn thread_checks(mut self, enabled: bool) -> Self {
        self.config.thread_checks = enabled;
        self
    }

    /// Set the maximum nested dispatch depth. Values below 1 are clamped to 1.
    pub fn max_dispatch_depth(mut self, depth: usize) -> Self {
        self.config.max_dispatch_depth = depth.max(1);
        self
    }

    /// Enable or disable per-message trace events.
    pub fn trace_messages(mut self, enabled: bool) -> Self {
        self.config.trace_messages = enabled;
        self
    }

    /// Finish building.
    pub fn build(self) -> TreeConfig {
        self.config
    }
}
