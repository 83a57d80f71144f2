//! Message dispatch for widget trees.
//!
//! This module provides the dispatch engine that delivers a [`Message`] to the
//! callback stacks of one or more widgets.
//!
//! # Dispatch Flow
//!
//! Within one widget the callback stack is invoked most recently added first.
//! How widgets are visited, and when the pass stops, depends on the
//! [`DispatchMode`]:
//!
//! | Mode | Widgets visited | Stops |
//! |---|---|---|
//! | [`Direct`](DispatchMode::Direct) | target | at the first callback that handles |
//! | [`UpChain`](DispatchMode::UpChain) | target, parent, ... root | at the first widget that handles |
//! | [`Recursive`](DispatchMode::Recursive) | target subtree, pre-order | never; the result is the OR |
//! | [`DirectAllCallbacks`](DispatchMode::DirectAllCallbacks) | target | never; the result is the OR |
//! | [`Once`](DispatchMode::Once) | target, first-registered callback only | after that one call |
//!
//! # Reentrancy
//!
//! The callback stack (and, for recursive passes, the child list) of each
//! widget is snapshotted just before that widget is visited. Callbacks added
//! during a pass are not invoked by it, and a widget destroyed mid-pass is not
//! visited again. Callbacks may dispatch further messages; the nesting depth is
//! bounded by [`TreeConfig::max_dispatch_depth`](crate::TreeConfig::max_dispatch_depth).

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{TreeError, TreeResult};
use crate::message::Message;
use crate::tree::{WidgetCallback, WidgetId, WidgetTree};

/// How a dispatch pass traverses the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DispatchMode {
    /// The target's callbacks only; stop at the first that handles.
    #[default]
    Direct,
    /// Like `Direct` on the target, then on each ancestor up to the root,
    /// stopping at the first widget that handles.
    UpChain,
    /// Every callback of every widget in the target's subtree, pre-order.
    Recursive,
    /// Every callback of the target, regardless of results.
    DirectAllCallbacks,
    /// Only the first callback ever registered on the target.
    Once,
}

/// Detailed result of a dispatch pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchOutcome {
    /// Whether any callback reported the message as handled.
    pub handled: bool,
    /// The first widget whose callback handled the message.
    pub handled_by: Option<WidgetId>,
    /// Total number of callbacks invoked.
    pub invocations: usize,
}

/// Which part of a widget's stack to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StackPolicy {
    FirstHandled,
    All,
    OnlyFirstRegistered,
}

/// Tracks the nesting level of dispatch passes for one tree.
struct DepthGuard<'a> {
    counter: &'a AtomicUsize,
}

impl<'a> DepthGuard<'a> {
    fn enter(counter: &'a AtomicUsize, limit: usize) -> TreeResult<Self> {
        let depth = counter.fetch_add(1, Ordering::AcqRel) + 1;
        if depth > limit {
            counter.fetch_sub(1, Ordering::AcqRel);
            return Err(TreeError::DispatchDepthExceeded { depth: limit });
        }
        Ok(Self { counter })
    }
}

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::AcqRel);
    }
}

impl WidgetTree {
    /// Deliver a message to the target according to `mode`.
    ///
    /// Returns whether any callback handled it. A widget without callbacks
    /// simply reports `false`.
    ///
    /// # Errors
    ///
    /// - [`TreeError::InvalidHandle`] if `target` is not a live widget
    /// - [`TreeError::DispatchDepthExceeded`] if callbacks nest dispatch passes
    ///   deeper than the configured limit
    pub fn dispatch(&self, target: WidgetId, message: &Message, mode: DispatchMode) -> TreeResult<bool> {
        Ok(self.dispatch_traced(target, message, mode)?.handled)
    }

    /// Like [`dispatch`](Self::dispatch), also reporting which widget handled
    /// the message and how many callbacks ran.
    pub fn dispatch_traced(
        &self,
        target: WidgetId,
        message: &Message,
        mode: DispatchMode,
    ) -> TreeResult<DispatchOutcome> {
        self.check_thread("dispatch a message");
        if !self.contains(target) {
            return Err(TreeError::InvalidHandle(target));
        }
        let _depth = DepthGuard::enter(self.dispatch_depth(), self.config().max_dispatch_depth)?;

        let mut outcome = DispatchOutcome::default();
        match mode {
            DispatchMode::Direct => {
                self.run_stack(target, message, StackPolicy::FirstHandled, &mut outcome);
            }
            DispatchMode::DirectAllCallbacks => {
                self.run_stack(target, message, StackPolicy::All, &mut outcome);
            }
            DispatchMode::Once => {
                self.run_stack(target, message, StackPolicy::OnlyFirstRegistered, &mut outcome);
            }
            DispatchMode::UpChain => self.dispatch_up_chain(target, message, &mut outcome),
            DispatchMode::Recursive => self.dispatch_recursive(target, message, &mut outcome),
        }

        tracing::trace!(
            target: "trellis_core::dispatch",
            ?target,
            kind = ?message.kind(),
            ?mode,
            handled = outcome.handled,
            invocations = outcome.invocations,
            "dispatch complete"
        );
        Ok(outcome)
    }

    fn dispatch_up_chain(&self, target: WidgetId, message: &Message, outcome: &mut DispatchOutcome) {
        let mut current = Some(target);
        while let Some(id) = current {
            if self.run_stack(id, message, StackPolicy::FirstHandled, outcome) {
                return;
            }
            // Callbacks may have moved or destroyed the widget; follow the
            // chain as it is now.
            current = self.parent(id).ok().flatten();
        }
    }

    fn dispatch_recursive(&self, id: WidgetId, message: &Message, outcome: &mut DispatchOutcome) {
        if !self.contains(id) {
            return;
        }
        self.run_stack(id, message, StackPolicy::All, outcome);

        let children = match self.state().nodes.get(id) {
            Some(node) => node.children.clone(),
            None => return,
        };
        for child in children {
            self.dispatch_recursive(child, message, outcome);
        }
    }

    /// Invoke one widget's callbacks. Returns whether this widget handled.
    fn run_stack(
        &self,
        id: WidgetId,
        message: &Message,
        policy: StackPolicy,
        outcome: &mut DispatchOutcome,
    ) -> bool {
        let callbacks: Vec<WidgetCallback> = {
            let state = self.state();
            let Some(node) = state.nodes.get(id) else {
                return false;
            };
            match policy {
                StackPolicy::OnlyFirstRegistered => node.callbacks.first().cloned().into_iter().collect(),
                StackPolicy::FirstHandled | StackPolicy::All => {
                    node.callbacks.iter().rev().cloned().collect()
                }
            }
        };

        if self.config().trace_messages {
            tracing::trace!(
                target: "trellis_core::dispatch",
                widget = ?id,
                kind = ?message.kind(),
                callbacks = callbacks.len(),
                "delivering message"
            );
        }

        let mut handled_here = false;
        for (index, callback) in callbacks.into_iter().enumerate() {
            if index > 0 && !self.contains(id) {
                break;
            }
            outcome.invocations += 1;
            if callback(self, id, message) {
                handled_here = true;
                outcome.handled = true;
                outcome.handled_by.get_or_insert(id);
                if policy != StackPolicy::All {
                    break;
                }
            }
        }
        handled_here
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TreeConfig;
    use crate::geometry::Rect;
    use crate::tree::callback;
    use parking_lot::Mutex;
    use std::sync::Arc;

    const MODES: [DispatchMode; 5] = [
        DispatchMode::Direct,
        DispatchMode::UpChain,
        DispatchMode::Recursive,
        DispatchMode::DirectAllCallbacks,
        DispatchMode::Once,
    ];

    /// Push a callback that logs `(label, widget)` and returns `handled`.
    fn logging_callback(
        tree: &WidgetTree,
        id: WidgetId,
        label: &'static str,
        handled: bool,
        log: &Arc<Mutex<Vec<(&'static str, WidgetId)>>>,
    ) {
        let log = log.clone();
        tree.add_callback(
            id,
            callback(move |_, widget, _| {
                log.lock().push((label, widget));
                handled
            }),
        )
        .unwrap();
    }

    fn node(tree: &WidgetTree, parent: Option<WidgetId>) -> WidgetId {
        tree.create_node(Rect::ZERO, true, parent, None).unwrap()
    }

    #[test]
    fn test_empty_stack_is_unhandled_in_every_mode() {
        let tree = WidgetTree::new();
        let root = node(&tree, None);
        let leaf = node(&tree, Some(root));

        for mode in MODES {
            assert!(!tree.dispatch(leaf, &Message::Paint, mode).unwrap(), "{mode:?}");
        }
    }

    #[test]
    fn test_dead_target_is_invalid_handle() {
        let tree = WidgetTree::new();
        let id = node(&tree, None);
        tree.destroy_node(id).unwrap();

        for mode in MODES {
            assert_eq!(
                tree.dispatch(id, &Message::Paint, mode),
                Err(TreeError::InvalidHandle(id))
            );
        }
    }

    #[test]
    fn test_direct_runs_newest_first_and_short_circuits() {
        let tree = WidgetTree::new();
        let id = node(&tree, None);
        let log = Arc::new(Mutex::new(Vec::new()));
        logging_callback(&tree, id, "first", false, &log);
        logging_callback(&tree, id, "second", true, &log);
        logging_callback(&tree, id, "third", false, &log);

        assert!(tree.dispatch(id, &Message::Paint, DispatchMode::Direct).unwrap());
        let labels: Vec<_> = log.lock().iter().map(|(label, _)| *label).collect();
        assert_eq!(labels, vec!["third", "second"]);
    }

    #[test]
    fn test_up_chain_stops_at_handler() {
        let tree = WidgetTree::new();
        let c = node(&tree, None);
        let b = node(&tree, Some(c));
        let a = node(&tree, Some(b));
        let above = node(&tree, None);
        tree.set_parent(c, Some(above)).unwrap();

        let log = Arc::new(Mutex::new(Vec::new()));
        logging_callback(&tree, a, "a", false, &log);
        logging_callback(&tree, b, "b", false, &log);
        logging_callback(&tree, c, "c", true, &log);
        logging_callback(&tree, above, "above", true, &log);

        let outcome = tree
            .dispatch_traced(a, &Message::Paint, DispatchMode::UpChain)
            .unwrap();

        assert!(outcome.handled);
        assert_eq!(outcome.handled_by, Some(c));
        assert_eq!(*log.lock(), vec![("a", a), ("b", b), ("c", c)]);
    }

    #[test]
    fn test_recursive_visits_every_callback() {
        let tree = WidgetTree::new();
        let root = node(&tree, None);
        let left = node(&tree, Some(root));
        let right = node(&tree, Some(root));
        let leaf = node(&tree, Some(left));

        let log = Arc::new(Mutex::new(Vec::new()));
        logging_callback(&tree, root, "root", true, &log);
        logging_callback(&tree, root, "root-2", true, &log);
        logging_callback(&tree, left, "left", true, &log);
        logging_callback(&tree, leaf, "leaf", false, &log);
        logging_callback(&tree, right, "right", false, &log);

        let outcome = tree
            .dispatch_traced(root, &Message::Paint, DispatchMode::Recursive)
            .unwrap();

        assert!(outcome.handled);
        assert_eq!(outcome.invocations, 5);
        let order: Vec<_> = log.lock().iter().map(|(label, _)| *label).collect();
        assert_eq!(order, vec!["root-2", "root", "left", "leaf", "right"]);
    }

    #[test]
    fn test_direct_all_callbacks_ignores_results() {
        let tree = WidgetTree::new();
        let id = node(&tree, None);
        let log = Arc::new(Mutex::new(Vec::new()));
        logging_callback(&tree, id, "first", true, &log);
        logging_callback(&tree, id, "second", true, &log);

        let outcome = tree
            .dispatch_traced(id, &Message::Paint, DispatchMode::DirectAllCallbacks)
            .unwrap();

        assert!(outcome.handled);
        assert_eq!(outcome.invocations, 2);
    }

    #[test]
    fn test_once_invokes_first_registered_only() {
        let tree = WidgetTree::new();
        let id = node(&tree, None);
        let log = Arc::new(Mutex::new(Vec::new()));
        logging_callback(&tree, id, "first", false, &log);
        logging_callback(&tree, id, "second", true, &log);

        assert!(!tree.dispatch(id, &Message::Paint, DispatchMode::Once).unwrap());
        assert_eq!(*log.lock(), vec![("first", id)]);
    }

    #[test]
    fn test_callback_added_mid_pass_is_not_invoked() {
        let tree = WidgetTree::new();
        let id = node(&tree, None);
        let late_calls = Arc::new(Mutex::new(0));
        let late_calls_clone = late_calls.clone();

        tree.add_callback(
            id,
            callback(move |tree, widget, _| {
                let late_calls = late_calls_clone.clone();
                tree.add_callback(
                    widget,
                    callback(move |_, _, _| {
                        *late_calls.lock() += 1;
                        false
                    }),
                )
                .unwrap();
                false
            }),
        )
        .unwrap();

        tree.dispatch(id, &Message::Paint, DispatchMode::Direct).unwrap();
        assert_eq!(*late_calls.lock(), 0);
        assert_eq!(tree.callback_count(id).unwrap(), 2);
    }

    #[test]
    fn test_up_chain_stops_when_widget_destroyed() {
        let tree = WidgetTree::new();
        let root = node(&tree, None);
        let leaf = node(&tree, Some(root));
        let root_paints = Arc::new(Mutex::new(0));
        let root_paints_clone = root_paints.clone();
        tree.add_callback(
            root,
            callback(move |_, _, msg| {
                if matches!(msg, Message::Paint) {
                    *root_paints_clone.lock() += 1;
                }
                true
            }),
        )
        .unwrap();

        tree.add_callback(
            leaf,
            callback(|tree, widget, msg| {
                if matches!(msg, Message::Paint) {
                    tree.destroy_node(widget).unwrap();
                }
                false
            }),
        )
        .unwrap();

        assert!(!tree.dispatch(leaf, &Message::Paint, DispatchMode::UpChain).unwrap());
        assert!(!tree.contains(leaf));
        assert_eq!(*root_paints.lock(), 0);
    }

    #[test]
    fn test_nested_dispatch_depth_limit() {
        let tree = WidgetTree::with_config(TreeConfig::builder().max_dispatch_depth(4).build());
        let id = node(&tree, None);
        let errors = Arc::new(Mutex::new(Vec::new()));
        let errors_clone = errors.clone();

        tree.add_callback(
            id,
            callback(move |tree, widget, msg| {
                if let Err(err) = tree.dispatch(widget, msg, DispatchMode::Direct) {
                    errors_clone.lock().push(err);
                }
                false
            }),
        )
        .unwrap();

        assert!(!tree.dispatch(id, &Message::user(10_001, 0, 0), DispatchMode::Direct).unwrap());
        assert_eq!(*errors.lock(), vec![TreeError::DispatchDepthExceeded { depth: 4 }]);

        // The counter unwound fully: a fresh pass works again.
        errors.lock().clear();
        tree.dispatch(id, &Message::Paint, DispatchMode::Direct).unwrap();
        assert_eq!(errors.lock().len(), 1);
    }

    #[test]
    fn test_default_mode_is_direct() {
        assert_eq!(DispatchMode::default(), DispatchMode::Direct);
    }
}
