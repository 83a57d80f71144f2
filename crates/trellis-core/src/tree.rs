//! Widget tree for Trellis.
//!
//! Provides the widget model with:
//! - Generational widget handles via arena-based storage
//! - Parent-child ownership with depth-first destruction
//! - Sibling z-order and hit-testing in one global coordinate space
//! - Per-widget callback stacks, property tables and descriptors
//!
//! # Key Types
//!
//! - [`WidgetTree`] - Cloneable handle to the tree; passed to every callback
//! - [`WidgetId`] - Stable handle for one widget, never reused while live
//! - [`WidgetCallback`] - One entry of a widget's callback stack
//!
//! # Reentrancy
//!
//! Callbacks receive the tree and may create, destroy, move and dispatch to
//! widgets while a dispatch pass is running. The tree state lives behind one
//! lock that is taken only for bookkeeping and always released before a
//! callback runs, so every structural change is applied in a single step and
//! no callback ever sees a half-updated parent/child relationship.
//!
//! ```
//! use trellis_core::{DispatchMode, Message, Rect, WidgetTree};
//!
//! let tree = WidgetTree::new();
//! let window = tree.create_node(Rect::new(0, 100, 200, 0), true, None, None)?;
//! let button = tree.create_node(Rect::new(10, 30, 60, 10), true, Some(window), None)?;
//!
//! assert_eq!(tree.parent(button)?, Some(window));
//! assert_eq!(tree.widget_at(20, 20), Some(button));
//! assert!(!tree.dispatch(button, &Message::Paint, DispatchMode::UpChain)?);
//! # Ok::<(), trellis_core::TreeError>(())
//! ```

use std::fmt;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use slotmap::{new_key_type, SlotMap};

use crate::config::TreeConfig;
use crate::dispatch::DispatchMode;
use crate::error::{TreeError, TreeResult};
use crate::geometry::Rect;
use crate::input::InputState;
use crate::logging::PerfSpan;
use crate::message::Message;
use crate::property::{PropertyKey, PropertyTable, PropertyValue};
use crate::thread_check::ThreadAffinity;

new_key_type! {
    /// A unique identifier for a widget in a [`WidgetTree`].
    ///
    /// `WidgetId`s are generational: once a widget is destroyed its id never
    /// resolves again, even if the storage slot is reused for a new widget.
    pub struct WidgetId;
}

impl WidgetId {
    /// Convert the id to a raw u64 value, e.g. to store it in a host table.
    #[inline]
    pub fn as_raw(self) -> u64 {
        use slotmap::Key;
        self.data().as_ffi()
    }

    /// Rebuild an id from [`as_raw`](Self::as_raw). The tree still decides
    /// whether it names a live widget.
    #[inline]
    pub fn from_raw(raw: u64) -> Self {
        Self::from(slotmap::KeyData::from_ffi(raw))
    }
}

/// One handler on a widget's callback stack.
///
/// Arguments are the tree, the widget the callback is installed on, and the
/// message. Return `true` when the message was handled.
pub type WidgetCallback = Arc<dyn Fn(&WidgetTree, WidgetId, &Message) -> bool + Send + Sync>;

/// Wrap a closure as a [`WidgetCallback`].
pub fn callback<F>(f: F) -> WidgetCallback
where
    F: Fn(&WidgetTree, WidgetId, &Message) -> bool + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Internal data stored for each widget.
pub(crate) struct NodeData {
    pub(crate) geometry: Rect,
    /// The widget's own flag, not considering ancestors.
    pub(crate) visible: bool,
    pub(crate) parent: Option<WidgetId>,
    /// Paint order: index 0 is at the back.
    pub(crate) children: Vec<WidgetId>,
    /// Registration order: the last entry is invoked first.
    pub(crate) callbacks: Vec<WidgetCallback>,
    pub(crate) properties: PropertyTable,
    pub(crate) descriptor: String,
    /// Set once `Destroy` has been sent; the slot is released later.
    pub(crate) destroying: bool,
}

impl NodeData {
    fn new(geometry: Rect, visible: bool, parent: Option<WidgetId>) -> Self {
        Self {
            geometry,
            visible,
            parent,
            children: Vec::new(),
            callbacks: Vec::new(),
            properties: PropertyTable::new(),
            descriptor: String::new(),
            destroying: false,
        }
    }
}

impl fmt::Debug for NodeData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeData")
            .field("geometry", &self.geometry)
            .field("visible", &self.visible)
            .field("parent", &self.parent)
            .field("children", &self.children)
            .field("callbacks", &self.callbacks.len())
            .field("descriptor", &self.descriptor)
            .field("destroying", &self.destroying)
            .finish()
    }
}

fn keep_first_error(slot: &mut Option<TreeError>, result: TreeResult<()>) {
    if let Err(err) = result {
        slot.get_or_insert(err);
    }
}

/// All mutable state of a tree, guarded by one lock.
#[derive(Debug, Default)]
pub(crate) struct TreeState {
    pub(crate) nodes: SlotMap<WidgetId, NodeData>,
    /// Root widgets in z-order: the last entry is in front.
    pub(crate) roots: Vec<WidgetId>,
    pub(crate) input: InputState,
}

impl TreeState {
    pub(crate) fn node(&self, id: WidgetId) -> TreeResult<&NodeData> {
        self.nodes.get(id).ok_or(TreeError::InvalidHandle(id))
    }

    pub(crate) fn node_mut(&mut self, id: WidgetId) -> TreeResult<&mut NodeData> {
        self.nodes.get_mut(id).ok_or(TreeError::InvalidHandle(id))
    }

    /// The list that holds `id` in z-order: its parent's children or the roots.
    fn sibling_list_mut(&mut self, id: WidgetId) -> TreeResult<&mut Vec<WidgetId>> {
        match self.node(id)?.parent {
            Some(parent) => Ok(&mut self.node_mut(parent)?.children),
            None => Ok(&mut self.roots),
        }
    }

    fn sibling_list(&self, id: WidgetId) -> TreeResult<&[WidgetId]> {
        match self.node(id)?.parent {
            Some(parent) => Ok(&self.node(parent)?.children),
            None => Ok(&self.roots),
        }
    }

    /// Remove `id` from whichever list currently holds it.
    fn unlink(&mut self, id: WidgetId) {
        if let Ok(list) = self.sibling_list_mut(id) {
            list.retain(|&sibling| sibling != id);
        } else {
            // Parent already released: the widget may still sit in the roots.
            self.roots.retain(|&root| root != id);
        }
    }

    /// Check if `ancestor` is `id` or one of its ancestors.
    pub(crate) fn is_self_or_ancestor(&self, ancestor: WidgetId, id: WidgetId) -> bool {
        let mut current = Some(id);
        while let Some(current_id) = current {
            if current_id == ancestor {
                return true;
            }
            current = self.nodes.get(current_id).and_then(|n| n.parent);
        }
        false
    }

    pub(crate) fn is_effectively_visible(&self, id: WidgetId) -> TreeResult<bool> {
        let mut current = Some(id);
        while let Some(current_id) = current {
            let node = self.node(current_id)?;
            if !node.visible {
                return Ok(false);
            }
            current = node.parent;
        }
        Ok(true)
    }

    pub(crate) fn root_of(&self, id: WidgetId) -> TreeResult<WidgetId> {
        let mut current = id;
        while let Some(parent) = self.node(current)?.parent {
            current = parent;
        }
        Ok(current)
    }

    /// Front-most widget under the point within `id`'s subtree.
    fn hit_test(
        &self,
        id: WidgetId,
        x: i32,
        y: i32,
        recursive: bool,
        visible_only: bool,
    ) -> Option<WidgetId> {
        let node = self.nodes.get(id)?;
        if visible_only && !node.visible {
            return None;
        }
        if !node.geometry.contains(x, y) {
            return None;
        }

        // Children are painted back to front, so search front to back.
        for &child_id in node.children.iter().rev() {
            if recursive {
                if let Some(hit) = self.hit_test(child_id, x, y, true, visible_only) {
                    return Some(hit);
                }
            } else if let Some(child) = self.nodes.get(child_id) {
                if (!visible_only || child.visible) && child.geometry.contains(x, y) {
                    return Some(child_id);
                }
            }
        }

        Some(id)
    }

    fn preorder_into(&self, id: WidgetId, out: &mut Vec<WidgetId>) -> TreeResult<()> {
        let node = self.node(id)?;
        out.push(id);
        for &child in &node.children {
            self.preorder_into(child, out)?;
        }
        Ok(())
    }
}

struct TreeShared {
    state: Mutex<TreeState>,
    config: TreeConfig,
    affinity: ThreadAffinity,
    /// Nesting level of dispatch passes currently on the call stack.
    dispatch_depth: AtomicUsize,
}

/// A tree of widgets, their callback stacks and the input routing state.
///
/// `WidgetTree` is a cheap handle: cloning it yields another handle to the
/// same tree. Every callback receives a handle so it can re-enter the tree.
///
/// # Related Types
///
/// - [`WidgetId`] - Keys into this tree
/// - [`DispatchMode`] - How [`dispatch`](Self::dispatch) walks the tree
/// - [`TreeConfig`] - Construction-time settings
#[derive(Clone)]
pub struct WidgetTree {
    shared: Arc<TreeShared>,
}

static_assertions::assert_impl_all!(WidgetTree: Send, Sync);

impl Default for WidgetTree {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for WidgetTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("WidgetTree")
            .field("nodes", &state.nodes.len())
            .field("roots", &state.roots)
            .field("config", &self.shared.config)
            .finish()
    }
}

impl WidgetTree {
    /// Create an empty tree with the default configuration.
    pub fn new() -> Self {
        Self::with_config(TreeConfig::default())
    }

    /// Create an empty tree with a custom configuration.
    pub fn with_config(config: TreeConfig) -> Self {
        let affinity = ThreadAffinity::with_checks(config.thread_checks);
        Self {
            shared: Arc::new(TreeShared {
                state: Mutex::new(TreeState::default()),
                config,
                affinity,
                dispatch_depth: AtomicUsize::new(0),
            }),
        }
    }

    /// The configuration this tree was built with.
    pub fn config(&self) -> &TreeConfig {
        &self.shared.config
    }

    /// Whether two handles refer to the same tree.
    pub fn same_tree(&self, other: &WidgetTree) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, TreeState> {
        self.shared.state.lock()
    }

    pub(crate) fn dispatch_depth(&self) -> &AtomicUsize {
        &self.shared.dispatch_depth
    }

    #[inline]
    #[track_caller]
    pub(crate) fn check_thread(&self, operation: &str) {
        self.shared.affinity.check(operation);
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Create a widget and send it [`Message::Create`].
    ///
    /// The widget is appended to `parent`'s children (in front of its
    /// siblings), or to the root list when `parent` is `None`.
    /// `class_callback`, when given, becomes the bottom of the callback stack.
    ///
    /// # Errors
    ///
    /// [`TreeError::InvalidParent`] if `parent` is not a live widget.
    #[tracing::instrument(skip(self, class_callback), target = "trellis_core::tree", level = "trace")]
    pub fn create_node(
        &self,
        rect: Rect,
        visible: bool,
        parent: Option<WidgetId>,
        class_callback: Option<WidgetCallback>,
    ) -> TreeResult<WidgetId> {
        self.check_thread("create a widget");
        let subclassed = class_callback.is_some();

        let id = {
            let mut state = self.state();
            if let Some(parent_id) = parent {
                if !state.nodes.contains_key(parent_id) {
                    return Err(TreeError::InvalidParent(parent_id));
                }
            }

            let mut data = NodeData::new(rect, visible, parent);
            data.callbacks.extend(class_callback);
            let id = state.nodes.insert(data);

            match parent {
                Some(parent_id) => state.node_mut(parent_id)?.children.push(id),
                None => state.roots.push(id),
            }
            id
        };
        tracing::trace!(target: "trellis_core::tree", ?id, ?parent, "created widget");

        self.dispatch(id, &Message::Create { subclassed }, DispatchMode::Direct)?;
        Ok(id)
    }

    /// Destroy a widget and its subtree.
    ///
    /// The widget receives [`Message::Destroy`] (every callback on its stack
    /// sees it) before anything is released. Its children are then destroyed
    /// depth-first with `forced: true`; a child that the `Destroy` handler
    /// reparented elsewhere survives. Storage is released bottom-up and the
    /// former parent finally receives [`Message::LoseChild`].
    ///
    /// Destroying a dead handle, or a widget whose destruction is already in
    /// progress further up the call stack, is a no-op.
    #[tracing::instrument(skip(self), target = "trellis_core::tree", level = "trace")]
    pub fn destroy_node(&self, id: WidgetId) -> TreeResult<()> {
        self.check_thread("destroy a widget");
        let _span = PerfSpan::new("destroy_widget");
        self.destroy_subtree(id, false)
    }

    fn destroy_subtree(&self, id: WidgetId, forced: bool) -> TreeResult<()> {
        let claimed = {
            let mut state = self.state();
            match state.nodes.get_mut(id) {
                Some(node) if !node.destroying => {
                    node.destroying = true;
                    true
                }
                _ => false,
            }
        };
        if !claimed {
            return Ok(());
        }

        // Keep going after a failed notification so the subtree is always
        // released; report the first failure at the end.
        let mut first_error = None;
        keep_first_error(&mut first_error, self.release_input(id));
        keep_first_error(
            &mut first_error,
            self.dispatch(id, &Message::Destroy { forced }, DispatchMode::DirectAllCallbacks)
                .map(drop),
        );

        // Children may be reparented away (or added) by the handlers above,
        // so re-read the list after every removal.
        loop {
            let next_child = {
                let state = self.state();
                state.nodes.get(id).and_then(|node| {
                    node.children
                        .iter()
                        .copied()
                        .find(|&child| state.nodes.get(child).is_some_and(|c| !c.destroying))
                })
            };
            match next_child {
                Some(child) => keep_first_error(&mut first_error, self.destroy_subtree(child, true)),
                None => break,
            }
        }

        let former_parent = {
            let mut state = self.state();
            state.unlink(id);
            let Some(node) = state.nodes.remove(id) else {
                return first_error.map_or(Ok(()), Err);
            };
            // Only children whose own destruction is still running remain;
            // they stay consistent as roots until their frames release them.
            for child in node.children {
                if let Some(child_node) = state.nodes.get_mut(child) {
                    child_node.parent = None;
                    state.roots.push(child);
                }
            }
            node.parent
                .filter(|&parent| state.nodes.get(parent).is_some_and(|p| !p.destroying))
        };
        tracing::trace!(target: "trellis_core::tree", ?id, forced, "destroyed widget");

        if let Some(parent) = former_parent {
            keep_first_error(
                &mut first_error,
                self.dispatch(parent, &Message::LoseChild(id), DispatchMode::Direct)
                    .map(drop),
            );
        }

        first_error.map_or(Ok(()), Err)
    }

    /// Check if a widget is live.
    pub fn contains(&self, id: WidgetId) -> bool {
        self.state().nodes.contains_key(id)
    }

    /// Number of live widgets.
    pub fn node_count(&self) -> usize {
        self.state().nodes.len()
    }

    // =========================================================================
    // Geometry & Visibility
    // =========================================================================

    /// The widget's rectangle in global coordinates.
    pub fn geometry(&self, id: WidgetId) -> TreeResult<Rect> {
        Ok(self.state().node(id)?.geometry)
    }

    /// Move or resize a widget.
    ///
    /// Sends [`Message::Reshape`] up-chain from the widget, carrying the
    /// position and size delta. Children are not moved; containers that want
    /// that install [`behaviors::fixed_layout`](crate::behaviors::fixed_layout).
    /// Setting the current geometry again does nothing.
    pub fn set_geometry(&self, id: WidgetId, rect: Rect) -> TreeResult<()> {
        self.check_thread("set widget geometry");
        let delta = {
            let mut state = self.state();
            let node = state.node_mut(id)?;
            if node.geometry == rect {
                return Ok(());
            }
            let delta = node.geometry.delta_to(&rect);
            node.geometry = rect;
            delta
        };
        tracing::trace!(target: "trellis_core::tree", ?id, ?rect, "reshaped widget");

        self.dispatch(id, &Message::Reshape { origin: id, delta }, DispatchMode::UpChain)?;
        Ok(())
    }

    /// The widget's own visibility flag.
    pub fn is_visible(&self, id: WidgetId) -> TreeResult<bool> {
        Ok(self.state().node(id)?.visible)
    }

    /// Whether the widget and all of its ancestors are visible.
    pub fn is_effectively_visible(&self, id: WidgetId) -> TreeResult<bool> {
        self.state().is_effectively_visible(id)
    }

    /// Show or hide a widget.
    ///
    /// Sends [`Message::Shown`] or [`Message::Hidden`] up-chain when the flag
    /// actually changes. Setting the current value again dispatches nothing.
    pub fn set_visible(&self, id: WidgetId, visible: bool) -> TreeResult<()> {
        self.check_thread("set widget visibility");
        {
            let mut state = self.state();
            let node = state.node_mut(id)?;
            if node.visible == visible {
                return Ok(());
            }
            node.visible = visible;
        }
        tracing::trace!(target: "trellis_core::tree", ?id, visible, "visibility changed");

        let message = if visible {
            Message::Shown(id)
        } else {
            Message::Hidden(id)
        };
        self.dispatch(id, &message, DispatchMode::UpChain)?;
        Ok(())
    }

    // =========================================================================
    // Hierarchy
    // =========================================================================

    /// The widget's parent, `None` for roots.
    pub fn parent(&self, id: WidgetId) -> TreeResult<Option<WidgetId>> {
        Ok(self.state().node(id)?.parent)
    }

    /// The widget's children in paint order (back to front).
    pub fn children(&self, id: WidgetId) -> TreeResult<Vec<WidgetId>> {
        Ok(self.state().node(id)?.children.clone())
    }

    /// Number of direct children.
    pub fn child_count(&self, id: WidgetId) -> TreeResult<usize> {
        Ok(self.state().node(id)?.children.len())
    }

    /// The `index`-th child in paint order.
    pub fn nth_child(&self, id: WidgetId, index: usize) -> TreeResult<Option<WidgetId>> {
        Ok(self.state().node(id)?.children.get(index).copied())
    }

    /// Root widgets in z-order (back to front).
    pub fn roots(&self) -> Vec<WidgetId> {
        self.state().roots.clone()
    }

    /// The root of the tree containing `id`.
    pub fn root_of(&self, id: WidgetId) -> TreeResult<WidgetId> {
        self.state().root_of(id)
    }

    /// Ancestors from the immediate parent up to the root.
    pub fn ancestors(&self, id: WidgetId) -> TreeResult<Vec<WidgetId>> {
        let state = self.state();
        let mut result = Vec::new();
        let mut current = state.node(id)?.parent;
        while let Some(current_id) = current {
            result.push(current_id);
            current = state.nodes.get(current_id).and_then(|n| n.parent);
        }
        Ok(result)
    }

    /// The widget and its descendants in depth-first pre-order.
    pub fn depth_first_preorder(&self, id: WidgetId) -> TreeResult<Vec<WidgetId>> {
        let state = self.state();
        let mut result = Vec::new();
        state.preorder_into(id, &mut result)?;
        Ok(result)
    }

    /// Whether `ancestor` is `id` itself or one of its ancestors.
    pub fn is_self_or_ancestor(&self, ancestor: WidgetId, id: WidgetId) -> TreeResult<bool> {
        let state = self.state();
        state.node(id)?;
        Ok(state.is_self_or_ancestor(ancestor, id))
    }

    /// Move a widget under a new parent, or make it a root with `None`.
    ///
    /// The move is applied in one step and keeps the widget's global
    /// geometry. Afterwards the old parent receives [`Message::LoseChild`],
    /// the widget [`Message::AcceptParent`] and the new parent
    /// [`Message::AcceptChild`]. Placing a widget where it already is does
    /// nothing.
    ///
    /// # Errors
    ///
    /// - [`TreeError::InvalidHandle`] if `id` is not live
    /// - [`TreeError::InvalidParent`] if `new_parent` is not live
    /// - [`TreeError::CircularParentage`] if `new_parent` lies in `id`'s subtree
    #[tracing::instrument(skip(self), target = "trellis_core::tree", level = "trace")]
    pub fn set_parent(&self, id: WidgetId, new_parent: Option<WidgetId>) -> TreeResult<()> {
        self.check_thread("reparent a widget");
        let old_parent = {
            let mut state = self.state();
            let old_parent = state.node(id)?.parent;

            if let Some(parent_id) = new_parent {
                if !state.nodes.contains_key(parent_id) {
                    return Err(TreeError::InvalidParent(parent_id));
                }
                if state.is_self_or_ancestor(id, parent_id) {
                    return Err(TreeError::CircularParentage {
                        child: id,
                        parent: parent_id,
                    });
                }
            }
            if old_parent == new_parent {
                return Ok(());
            }

            state.unlink(id);
            state.node_mut(id)?.parent = new_parent;
            match new_parent {
                Some(parent_id) => state.node_mut(parent_id)?.children.push(id),
                None => state.roots.push(id),
            }
            old_parent
        };

        if let Some(old) = old_parent.filter(|&old| self.contains(old)) {
            self.dispatch(old, &Message::LoseChild(id), DispatchMode::Direct)?;
        }
        if let Some(parent_id) = new_parent {
            self.dispatch(id, &Message::AcceptParent(parent_id), DispatchMode::Direct)?;
            self.dispatch(parent_id, &Message::AcceptChild(id), DispatchMode::Direct)?;
        }
        Ok(())
    }

    // =========================================================================
    // Z-Order / Sibling Ordering
    // =========================================================================

    /// Index among siblings (or roots); 0 is the back.
    pub fn sibling_index(&self, id: WidgetId) -> TreeResult<usize> {
        let state = self.state();
        let siblings = state.sibling_list(id)?;
        Ok(siblings.iter().position(|&s| s == id).unwrap_or(0))
    }

    /// Move the widget in front of all its siblings.
    pub fn bring_to_front(&self, id: WidgetId) -> TreeResult<()> {
        self.check_thread("reorder widgets");
        let mut state = self.state();
        let siblings = state.sibling_list_mut(id)?;
        siblings.retain(|&s| s != id);
        siblings.push(id);
        Ok(())
    }

    /// Move the widget behind all its siblings.
    pub fn send_to_back(&self, id: WidgetId) -> TreeResult<()> {
        self.check_thread("reorder widgets");
        let mut state = self.state();
        let siblings = state.sibling_list_mut(id)?;
        siblings.retain(|&s| s != id);
        siblings.insert(0, id);
        Ok(())
    }

    /// Place the widget directly in front of `sibling`.
    pub fn stack_above(&self, id: WidgetId, sibling: WidgetId) -> TreeResult<()> {
        self.restack(id, sibling, 1)
    }

    /// Place the widget directly behind `sibling`.
    pub fn stack_under(&self, id: WidgetId, sibling: WidgetId) -> TreeResult<()> {
        self.restack(id, sibling, 0)
    }

    fn restack(&self, id: WidgetId, sibling: WidgetId, offset: usize) -> TreeResult<()> {
        self.check_thread("reorder widgets");
        let mut state = self.state();
        if state.node(id)?.parent != state.node(sibling)?.parent || id == sibling {
            return Err(TreeError::NotSiblings(id, sibling));
        }

        let siblings = state.sibling_list_mut(id)?;
        siblings.retain(|&s| s != id);
        let position = siblings
            .iter()
            .position(|&s| s == sibling)
            .ok_or(TreeError::NotSiblings(id, sibling))?;
        siblings.insert(position + offset, id);
        Ok(())
    }

    /// Whether the widget belongs to the front-most root.
    pub fn is_in_front(&self, id: WidgetId) -> TreeResult<bool> {
        let state = self.state();
        let root = state.root_of(id)?;
        Ok(state.roots.last() == Some(&root))
    }

    // =========================================================================
    // Hit Testing
    // =========================================================================

    /// The front-most visible widget under a point, across all roots.
    pub fn widget_at(&self, x: i32, y: i32) -> Option<WidgetId> {
        let state = self.state();
        state
            .roots
            .iter()
            .rev()
            .find_map(|&root| state.hit_test(root, x, y, true, true))
    }

    /// The widget under a point within `container`.
    ///
    /// With `recursive` the deepest front-most descendant is returned,
    /// otherwise only direct children are considered. The container itself
    /// is returned when the point is inside it but no child matches. With
    /// `visible_only`, hidden widgets (including widgets under a hidden
    /// ancestor) never match.
    pub fn widget_for_location(
        &self,
        container: WidgetId,
        x: i32,
        y: i32,
        recursive: bool,
        visible_only: bool,
    ) -> TreeResult<Option<WidgetId>> {
        let state = self.state();
        if visible_only && !state.is_effectively_visible(container)? {
            return Ok(None);
        }
        Ok(state.hit_test(container, x, y, recursive, visible_only))
    }

    // =========================================================================
    // Callbacks
    // =========================================================================

    /// Push a callback on top of the widget's stack.
    ///
    /// The newest callback sees messages first. Callbacks are released when
    /// the widget is destroyed.
    pub fn add_callback(&self, id: WidgetId, callback: WidgetCallback) -> TreeResult<()> {
        self.check_thread("add a widget callback");
        self.state().node_mut(id)?.callbacks.push(callback);
        Ok(())
    }

    /// Number of callbacks installed on the widget.
    pub fn callback_count(&self, id: WidgetId) -> TreeResult<usize> {
        Ok(self.state().node(id)?.callbacks.len())
    }

    // =========================================================================
    // Properties & Descriptor
    // =========================================================================

    /// Store a property value.
    ///
    /// When the stored value changes the widget receives
    /// [`Message::PropertyChanged`]. Returns whether it changed.
    pub fn set_property(
        &self,
        id: WidgetId,
        key: PropertyKey,
        value: impl Into<PropertyValue>,
    ) -> TreeResult<bool> {
        self.check_thread("set a widget property");
        let value = value.into();
        let changed = self.state().node_mut(id)?.properties.set(key, value);
        if changed {
            self.dispatch(id, &Message::PropertyChanged { key, value }, DispatchMode::Direct)?;
        }
        Ok(changed)
    }

    /// A property value, or the default (integer zero) when unset.
    pub fn property(&self, id: WidgetId, key: PropertyKey) -> TreeResult<PropertyValue> {
        Ok(self.try_property(id, key)?.unwrap_or_default())
    }

    /// A property value, or `None` when unset.
    pub fn try_property(&self, id: WidgetId, key: PropertyKey) -> TreeResult<Option<PropertyValue>> {
        Ok(self.state().node(id)?.properties.get(key))
    }

    /// Remove a property, returning the previous value.
    pub fn remove_property(
        &self,
        id: WidgetId,
        key: PropertyKey,
    ) -> TreeResult<Option<PropertyValue>> {
        self.check_thread("remove a widget property");
        Ok(self.state().node_mut(id)?.properties.remove(key))
    }

    /// Keys set on the widget, ascending.
    pub fn property_keys(&self, id: WidgetId) -> TreeResult<Vec<PropertyKey>> {
        Ok(self.state().node(id)?.properties.keys())
    }

    /// The widget's descriptor text.
    pub fn descriptor(&self, id: WidgetId) -> TreeResult<String> {
        Ok(self.state().node(id)?.descriptor.clone())
    }

    /// Replace the descriptor text, sending [`Message::DescriptorChanged`]
    /// when it differs from the current one.
    pub fn set_descriptor(&self, id: WidgetId, descriptor: impl Into<String>) -> TreeResult<()> {
        self.check_thread("set a widget descriptor");
        let descriptor = descriptor.into();
        {
            let mut state = self.state();
            let node = state.node_mut(id)?;
            if node.descriptor == descriptor {
                return Ok(());
            }
            node.descriptor = descriptor;
        }
        self.dispatch(id, &Message::DescriptorChanged, DispatchMode::Direct)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageKind;

    fn rect(left: i32, top: i32, right: i32, bottom: i32) -> Rect {
        Rect::new(left, top, right, bottom)
    }

    fn recorder(tree: &WidgetTree, id: WidgetId) -> Arc<Mutex<Vec<MessageKind>>> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_clone = log.clone();
        tree.add_callback(
            id,
            callback(move |_, _, msg| {
                log_clone.lock().push(msg.kind());
                false
            }),
        )
        .unwrap();
        log
    }

    #[test]
    fn test_create_sends_create_message() {
        let tree = WidgetTree::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();

        let id = tree
            .create_node(
                rect(0, 10, 10, 0),
                true,
                None,
                Some(callback(move |_, _, msg| {
                    seen_clone.lock().push(msg.clone());
                    true
                })),
            )
            .unwrap();

        assert!(tree.contains(id));
        assert_eq!(*seen.lock(), vec![Message::Create { subclassed: true }]);
        assert_eq!(tree.roots(), vec![id]);
    }

    #[test]
    fn test_create_with_dead_parent() {
        let tree = WidgetTree::new();
        let parent = tree.create_node(Rect::ZERO, true, None, None).unwrap();
        tree.destroy_node(parent).unwrap();

        let result = tree.create_node(Rect::ZERO, true, Some(parent), None);
        assert_eq!(result, Err(TreeError::InvalidParent(parent)));
        assert_eq!(tree.node_count(), 0);
    }

    #[test]
    fn test_cascade_destroy() {
        let tree = WidgetTree::new();
        let root = tree.create_node(Rect::ZERO, true, None, None).unwrap();
        let child1 = tree.create_node(Rect::ZERO, true, Some(root), None).unwrap();
        let child2 = tree.create_node(Rect::ZERO, true, Some(root), None).unwrap();
        let grandchild = tree.create_node(Rect::ZERO, true, Some(child1), None).unwrap();

        tree.destroy_node(root).unwrap();

        for id in [root, child1, child2, grandchild] {
            assert!(!tree.contains(id));
        }
        assert!(tree.roots().is_empty());
    }

    #[test]
    fn test_destroy_twice_is_noop() {
        let tree = WidgetTree::new();
        let id = tree.create_node(Rect::ZERO, true, None, None).unwrap();

        assert!(tree.destroy_node(id).is_ok());
        assert!(tree.destroy_node(id).is_ok());
        assert_eq!(tree.node_count(), 0);
    }

    #[test]
    fn test_destroy_notifies_parent() {
        let tree = WidgetTree::new();
        let parent = tree.create_node(Rect::ZERO, true, None, None).unwrap();
        let child = tree.create_node(Rect::ZERO, true, Some(parent), None).unwrap();
        let log = recorder(&tree, parent);

        tree.destroy_node(child).unwrap();

        assert_eq!(*log.lock(), vec![MessageKind::LoseChild]);
        assert!(tree.children(parent).unwrap().is_empty());
    }

    #[test]
    fn test_stale_handle_is_not_reused() {
        let tree = WidgetTree::new();
        let first = tree.create_node(Rect::ZERO, true, None, None).unwrap();
        tree.destroy_node(first).unwrap();
        let second = tree.create_node(Rect::ZERO, true, None, None).unwrap();

        assert_ne!(first, second);
        assert!(!tree.contains(first));
        assert_eq!(tree.geometry(first), Err(TreeError::InvalidHandle(first)));
    }

    #[test]
    fn test_set_geometry_sends_reshape_up_chain() {
        let tree = WidgetTree::new();
        let parent = tree.create_node(rect(0, 100, 100, 0), true, None, None).unwrap();
        let child = tree.create_node(rect(0, 10, 10, 0), true, Some(parent), None).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        tree.add_callback(
            parent,
            callback(move |_, _, msg| {
                seen_clone.lock().push(msg.clone());
                true
            }),
        )
        .unwrap();

        tree.set_geometry(child, rect(5, 20, 25, 5)).unwrap();
        tree.set_geometry(child, rect(5, 20, 25, 5)).unwrap();

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        match &seen[0] {
            Message::Reshape { origin, delta } => {
                assert_eq!(*origin, child);
                assert_eq!((delta.dx, delta.dy, delta.dwidth, delta.dheight), (5, 5, 10, 5));
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn test_extreme_geometry_reshape() {
        let tree = WidgetTree::new();
        let id = tree.create_node(Rect::ZERO, true, None, None).unwrap();
        let deltas = Arc::new(Mutex::new(Vec::new()));
        let deltas_clone = deltas.clone();
        tree.add_callback(
            id,
            callback(move |_, _, msg| {
                if let Message::Reshape { delta, .. } = msg {
                    deltas_clone.lock().push(*delta);
                }
                false
            }),
        )
        .unwrap();

        let huge = rect(i32::MIN, 10, i32::MAX, 0);
        tree.set_geometry(id, huge).unwrap();
        tree.set_geometry(id, Rect::ZERO).unwrap();

        assert_eq!(tree.geometry(id).unwrap(), Rect::ZERO);
        let deltas = deltas.lock();
        assert_eq!(deltas.len(), 2);
        assert_eq!((deltas[0].dx, deltas[0].dwidth), (i64::from(i32::MIN), i64::from(u32::MAX)));
        assert_eq!((deltas[1].dx, deltas[1].dwidth), (-i64::from(i32::MIN), -i64::from(u32::MAX)));
    }

    #[test]
    fn test_redundant_visibility_is_silent() {
        let tree = WidgetTree::new();
        let id = tree.create_node(Rect::ZERO, true, None, None).unwrap();
        let log = recorder(&tree, id);

        tree.set_visible(id, true).unwrap();
        tree.set_visible(id, false).unwrap();
        tree.set_visible(id, false).unwrap();
        tree.set_visible(id, true).unwrap();

        assert_eq!(*log.lock(), vec![MessageKind::Hidden, MessageKind::Shown]);
    }

    #[test]
    fn test_effective_visibility() {
        let tree = WidgetTree::new();
        let root = tree.create_node(Rect::ZERO, true, None, None).unwrap();
        let child = tree.create_node(Rect::ZERO, true, Some(root), None).unwrap();

        assert!(tree.is_effectively_visible(child).unwrap());
        tree.set_visible(root, false).unwrap();
        assert!(tree.is_visible(child).unwrap());
        assert!(!tree.is_effectively_visible(child).unwrap());
    }

    #[test]
    fn test_reparent_preserves_geometry() {
        let tree = WidgetTree::new();
        let first = tree.create_node(rect(0, 50, 50, 0), true, None, None).unwrap();
        let second = tree.create_node(rect(100, 150, 150, 100), true, None, None).unwrap();
        let child = tree.create_node(rect(10, 20, 20, 10), true, Some(first), None).unwrap();

        tree.set_parent(child, Some(second)).unwrap();

        assert_eq!(tree.geometry(child).unwrap(), rect(10, 20, 20, 10));
        assert!(!tree.children(first).unwrap().contains(&child));
        assert_eq!(tree.children(second).unwrap(), vec![child]);
        assert_eq!(tree.parent(child).unwrap(), Some(second));
    }

    #[test]
    fn test_reparent_messages() {
        let tree = WidgetTree::new();
        let first = tree.create_node(Rect::ZERO, true, None, None).unwrap();
        let second = tree.create_node(Rect::ZERO, true, None, None).unwrap();
        let child = tree.create_node(Rect::ZERO, true, Some(first), None).unwrap();
        let first_log = recorder(&tree, first);
        let second_log = recorder(&tree, second);
        let child_log = recorder(&tree, child);

        tree.set_parent(child, Some(second)).unwrap();

        assert_eq!(*first_log.lock(), vec![MessageKind::LoseChild]);
        assert_eq!(*child_log.lock(), vec![MessageKind::AcceptParent]);
        assert_eq!(*second_log.lock(), vec![MessageKind::AcceptChild]);
    }

    #[test]
    fn test_reparent_is_complete_before_handlers_run() {
        let tree = WidgetTree::new();
        let first = tree.create_node(Rect::ZERO, true, None, None).unwrap();
        let second = tree.create_node(Rect::ZERO, true, None, None).unwrap();
        let child = tree.create_node(Rect::ZERO, true, Some(first), None).unwrap();
        let checks = Arc::new(Mutex::new(Vec::new()));

        let moved = move |tree: &WidgetTree| {
            !tree.children(first).unwrap().contains(&child)
                && tree.children(second).unwrap().contains(&child)
                && tree.parent(child).unwrap() == Some(second)
        };

        let checks_clone = checks.clone();
        tree.add_callback(
            first,
            callback(move |tree, _, msg| {
                if let Message::LoseChild(lost) = msg {
                    checks_clone.lock().push((MessageKind::LoseChild, *lost == child && moved(tree)));
                }
                false
            }),
        )
        .unwrap();
        let checks_clone = checks.clone();
        tree.add_callback(
            child,
            callback(move |tree, _, msg| {
                if let Message::AcceptParent(parent) = msg {
                    checks_clone.lock().push((MessageKind::AcceptParent, *parent == second && moved(tree)));
                }
                false
            }),
        )
        .unwrap();

        tree.set_parent(child, Some(second)).unwrap();

        assert_eq!(
            *checks.lock(),
            vec![(MessageKind::LoseChild, true), (MessageKind::AcceptParent, true)]
        );
    }

    #[test]
    fn test_circular_parentage_rejected() {
        let tree = WidgetTree::new();
        let root = tree.create_node(Rect::ZERO, true, None, None).unwrap();
        let child = tree.create_node(Rect::ZERO, true, Some(root), None).unwrap();

        assert!(matches!(
            tree.set_parent(root, Some(child)),
            Err(TreeError::CircularParentage { .. })
        ));
        assert!(matches!(
            tree.set_parent(root, Some(root)),
            Err(TreeError::CircularParentage { .. })
        ));
        assert_eq!(tree.parent(child).unwrap(), Some(root));
    }

    #[test]
    fn test_reparent_to_root() {
        let tree = WidgetTree::new();
        let root = tree.create_node(Rect::ZERO, true, None, None).unwrap();
        let child = tree.create_node(Rect::ZERO, true, Some(root), None).unwrap();

        tree.set_parent(child, None).unwrap();

        assert_eq!(tree.roots(), vec![root, child]);
        assert_eq!(tree.parent(child).unwrap(), None);
        assert!(tree.is_in_front(child).unwrap());
    }

    #[test]
    fn test_z_order() {
        let tree = WidgetTree::new();
        let parent = tree.create_node(Rect::ZERO, true, None, None).unwrap();
        let a = tree.create_node(Rect::ZERO, true, Some(parent), None).unwrap();
        let b = tree.create_node(Rect::ZERO, true, Some(parent), None).unwrap();
        let c = tree.create_node(Rect::ZERO, true, Some(parent), None).unwrap();

        tree.bring_to_front(a).unwrap();
        assert_eq!(tree.children(parent).unwrap(), vec![b, c, a]);

        tree.send_to_back(a).unwrap();
        assert_eq!(tree.children(parent).unwrap(), vec![a, b, c]);

        tree.stack_under(c, b).unwrap();
        assert_eq!(tree.children(parent).unwrap(), vec![a, c, b]);

        tree.stack_above(a, b).unwrap();
        assert_eq!(tree.children(parent).unwrap(), vec![c, b, a]);
        assert_eq!(tree.sibling_index(a).unwrap(), 2);

        assert_eq!(tree.stack_above(a, parent), Err(TreeError::NotSiblings(a, parent)));
    }

    #[test]
    fn test_hit_testing_front_to_back() {
        let tree = WidgetTree::new();
        let window = tree.create_node(rect(0, 100, 100, 0), true, None, None).unwrap();
        let back = tree.create_node(rect(0, 50, 50, 0), true, Some(window), None).unwrap();
        let front = tree.create_node(rect(25, 75, 75, 25), true, Some(window), None).unwrap();

        assert_eq!(tree.widget_at(30, 30), Some(front));
        assert_eq!(tree.widget_at(10, 10), Some(back));
        assert_eq!(tree.widget_at(90, 90), Some(window));
        assert_eq!(tree.widget_at(200, 200), None);

        tree.bring_to_front(back).unwrap();
        assert_eq!(tree.widget_at(30, 30), Some(back));
    }

    #[test]
    fn test_hidden_ancestor_masks_descendants() {
        let tree = WidgetTree::new();
        let window = tree.create_node(rect(0, 100, 100, 0), true, None, None).unwrap();
        let panel = tree.create_node(rect(0, 50, 50, 0), true, Some(window), None).unwrap();
        let button = tree.create_node(rect(10, 20, 20, 10), true, Some(panel), None).unwrap();

        assert_eq!(tree.widget_at(15, 15), Some(button));
        tree.set_visible(panel, false).unwrap();
        assert_eq!(tree.widget_at(15, 15), Some(window));
        assert_eq!(tree.widget_for_location(panel, 15, 15, true, true).unwrap(), None);
        assert_eq!(
            tree.widget_for_location(panel, 15, 15, true, false).unwrap(),
            Some(button)
        );
    }

    #[test]
    fn test_widget_for_location_non_recursive() {
        let tree = WidgetTree::new();
        let window = tree.create_node(rect(0, 100, 100, 0), true, None, None).unwrap();
        let panel = tree.create_node(rect(0, 50, 50, 0), true, Some(window), None).unwrap();
        let _button = tree.create_node(rect(10, 20, 20, 10), true, Some(panel), None).unwrap();

        assert_eq!(
            tree.widget_for_location(window, 15, 15, false, true).unwrap(),
            Some(panel)
        );
        assert_eq!(
            tree.widget_for_location(window, 80, 80, false, true).unwrap(),
            Some(window)
        );
    }

    #[test]
    fn test_degenerate_rect_never_hit() {
        let tree = WidgetTree::new();
        let flat = tree.create_node(rect(0, 0, 100, 0), true, None, None).unwrap();
        assert_eq!(tree.widget_at(10, 0), None);
        assert!(tree.contains(flat));
    }

    #[test]
    fn test_properties() {
        let tree = WidgetTree::new();
        let id = tree.create_node(Rect::ZERO, true, None, None).unwrap();
        let log = recorder(&tree, id);
        let key = PropertyKey::user(4);

        assert_eq!(tree.property(id, key).unwrap(), PropertyValue::Int(0));
        assert_eq!(tree.try_property(id, key).unwrap(), None);

        assert!(tree.set_property(id, key, 12).unwrap());
        assert!(!tree.set_property(id, key, 12).unwrap());
        assert_eq!(tree.property(id, key).unwrap(), PropertyValue::Int(12));
        assert_eq!(*log.lock(), vec![MessageKind::PropertyChanged]);

        assert_eq!(tree.remove_property(id, key).unwrap(), Some(PropertyValue::Int(12)));
        assert!(tree.property_keys(id).unwrap().is_empty());
    }

    #[test]
    fn test_descriptor() {
        let tree = WidgetTree::new();
        let id = tree.create_node(Rect::ZERO, true, None, None).unwrap();
        let log = recorder(&tree, id);

        tree.set_descriptor(id, "OK").unwrap();
        tree.set_descriptor(id, "OK").unwrap();

        assert_eq!(tree.descriptor(id).unwrap(), "OK");
        assert_eq!(*log.lock(), vec![MessageKind::DescriptorChanged]);
    }

    #[test]
    fn test_traversal() {
        let tree = WidgetTree::new();
        let root = tree.create_node(Rect::ZERO, true, None, None).unwrap();
        let child1 = tree.create_node(Rect::ZERO, true, Some(root), None).unwrap();
        let child2 = tree.create_node(Rect::ZERO, true, Some(root), None).unwrap();
        let grandchild = tree.create_node(Rect::ZERO, true, Some(child1), None).unwrap();

        assert_eq!(
            tree.depth_first_preorder(root).unwrap(),
            vec![root, child1, grandchild, child2]
        );
        assert_eq!(tree.ancestors(grandchild).unwrap(), vec![child1, root]);
        assert_eq!(tree.root_of(grandchild).unwrap(), root);
        assert_eq!(tree.nth_child(root, 1).unwrap(), Some(child2));
        assert_eq!(tree.child_count(root).unwrap(), 2);
        assert!(tree.is_self_or_ancestor(root, grandchild).unwrap());
        assert!(!tree.is_self_or_ancestor(child2, grandchild).unwrap());
    }

    #[test]
    fn test_raw_id_roundtrip() {
        let tree = WidgetTree::new();
        let id = tree.create_node(Rect::ZERO, true, None, None).unwrap();
        assert_eq!(WidgetId::from_raw(id.as_raw()), id);
    }
}
