//! Input routing for widget trees.
//!
//! This module turns raw pointer and keyboard events delivered by the host
//! into dispatch passes, keeping two pieces of state on the tree:
//!
//! - **Capture**: the widget that handled a pointer-down receives every move
//!   and the release of that gesture, wherever the pointer goes.
//! - **Keyboard focus**: at most one widget receives key events. Focus moves
//!   through a two-phase handshake: the holder is asked to let go
//!   ([`Message::KeyLoseFocus`]) and may refuse by leaving the message
//!   unhandled; then the new widget is offered focus
//!   ([`Message::KeyTakeFocus`]). A widget that declines passes the offer to
//!   its ancestors.
//!
//! Key sniffers see every key before the focus holder does and may consume it.
//!
//! ```
//! use trellis_core::{callback, Message, MouseButton, Rect, WidgetTree};
//!
//! let tree = WidgetTree::new();
//! let button = tree.create_node(Rect::new(0, 10, 10, 0), true, None, None)?;
//! tree.add_callback(button, callback(|_, _, msg| matches!(msg, Message::MouseDown(_))))?;
//!
//! assert!(tree.inject_pointer_down(5, 5, MouseButton::Left)?);
//! assert_eq!(tree.capture_target(), Some(button));
//! tree.inject_pointer_up(50, 50, MouseButton::Left)?;
//! assert_eq!(tree.capture_target(), None);
//! # Ok::<(), trellis_core::TreeError>(())
//! ```

use std::fmt;
use std::sync::Arc;

use crate::dispatch::DispatchMode;
use crate::error::{TreeError, TreeResult};
use crate::message::{KeyState, Message, MouseButton, MouseState, WheelAxis};
use crate::tree::{WidgetId, WidgetTree};

/// A handler that sees every key before the focused widget.
///
/// Return `true` to consume the key.
pub type KeySniffer = Arc<dyn Fn(&WidgetTree, &KeyState) -> bool + Send + Sync>;

/// Identifies an installed key sniffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeySnifferId(u64);

/// The widget holding pointer capture and the button that started it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Capture {
    pub(crate) widget: WidgetId,
    pub(crate) button: MouseButton,
}

/// Pointer and keyboard routing state of one tree.
#[derive(Default)]
pub(crate) struct InputState {
    pub(crate) capture: Option<Capture>,
    pub(crate) focus: Option<WidgetId>,
    pub(crate) last_pointer: (i32, i32),
    sniffers: Vec<(KeySnifferId, KeySniffer)>,
    next_sniffer: u64,
}

impl fmt::Debug for InputState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputState")
            .field("capture", &self.capture)
            .field("focus", &self.focus)
            .field("last_pointer", &self.last_pointer)
            .field("sniffers", &self.sniffers.len())
            .finish()
    }
}

impl WidgetTree {
    // =========================================================================
    // Pointer
    // =========================================================================

    /// Deliver a button press at a global point.
    ///
    /// [`Message::MouseDown`] travels up-chain from the front-most visible
    /// widget under the point. The widget that handles it captures the
    /// gesture. A press while another gesture is captured cancels that
    /// gesture first. Returns whether any widget handled the press.
    pub fn inject_pointer_down(&self, x: i32, y: i32, button: MouseButton) -> TreeResult<bool> {
        self.check_thread("inject pointer input");
        let stale = {
            let mut state = self.state();
            state.input.last_pointer = (x, y);
            state.input.capture.take()
        };
        if let Some(stale) = stale.filter(|c| self.contains(c.widget)) {
            let cancel = Message::MouseCancel(MouseState::new(x, y, stale.button));
            self.dispatch(stale.widget, &cancel, DispatchMode::Direct)?;
        }

        let Some(hit) = self.widget_at(x, y) else {
            return Ok(false);
        };
        let message = Message::MouseDown(MouseState::new(x, y, button));
        let outcome = self.dispatch_traced(hit, &message, DispatchMode::UpChain)?;

        if let Some(widget) = outcome.handled_by.filter(|&w| self.contains(w)) {
            self.state().input.capture = Some(Capture { widget, button });
            tracing::debug!(target: "trellis_core::input", ?widget, ?button, "pointer captured");
        }
        Ok(outcome.handled)
    }

    /// Deliver pointer movement.
    ///
    /// While a gesture is captured the capturing widget receives
    /// [`Message::MouseDrag`] directly, even when the pointer is outside it.
    /// Otherwise [`Message::CursorAdjust`] travels up-chain from the widget
    /// under the pointer.
    pub fn inject_pointer_move(&self, x: i32, y: i32, button: MouseButton) -> TreeResult<bool> {
        self.check_thread("inject pointer input");
        let capture = {
            let mut state = self.state();
            state.input.last_pointer = (x, y);
            state.input.capture
        };
        let pointer = MouseState::new(x, y, button);

        if let Some(capture) = capture.filter(|c| self.contains(c.widget)) {
            return self.dispatch(capture.widget, &Message::MouseDrag(pointer), DispatchMode::Direct);
        }
        match self.widget_at(x, y) {
            Some(hit) => self.dispatch(hit, &Message::CursorAdjust(pointer), DispatchMode::UpChain),
            None => Ok(false),
        }
    }

    /// Deliver a button release.
    ///
    /// The capturing widget receives [`Message::MouseUp`] directly and
    /// capture ends. Without capture nothing is dispatched.
    pub fn inject_pointer_up(&self, x: i32, y: i32, button: MouseButton) -> TreeResult<bool> {
        self.check_thread("inject pointer input");
        let capture = {
            let mut state = self.state();
            state.input.last_pointer = (x, y);
            state.input.capture.take()
        };

        match capture.filter(|c| self.contains(c.widget)) {
            Some(capture) => {
                tracing::debug!(target: "trellis_core::input", widget = ?capture.widget, "pointer released");
                let message = Message::MouseUp(MouseState::new(x, y, button));
                self.dispatch(capture.widget, &message, DispatchMode::Direct)
            }
            None => Ok(false),
        }
    }

    /// Deliver wheel movement of `clicks` notches on `axis`.
    ///
    /// [`Message::MouseWheel`] travels up-chain from the widget under the
    /// pointer; capture does not apply.
    pub fn inject_wheel(&self, x: i32, y: i32, axis: WheelAxis, clicks: i32) -> TreeResult<bool> {
        self.check_thread("inject pointer input");
        self.state().input.last_pointer = (x, y);

        let Some(hit) = self.widget_at(x, y) else {
            return Ok(false);
        };
        let pointer = MouseState {
            delta: clicks,
            ..MouseState::new(x, y, MouseButton::Middle)
        };
        self.dispatch(hit, &Message::MouseWheel(pointer, axis), DispatchMode::UpChain)
    }

    /// The widget holding pointer capture, if a gesture is in progress.
    pub fn capture_target(&self) -> Option<WidgetId> {
        self.state().input.capture.map(|c| c.widget)
    }

    // =========================================================================
    // Keyboard
    // =========================================================================

    /// Install a key sniffer. Sniffers run in installation order.
    pub fn add_key_sniffer(&self, sniffer: KeySniffer) -> KeySnifferId {
        self.check_thread("install a key sniffer");
        let mut state = self.state();
        let id = KeySnifferId(state.input.next_sniffer);
        state.input.next_sniffer += 1;
        state.input.sniffers.push((id, sniffer));
        id
    }

    /// Remove a key sniffer. Returns `false` if it was not installed.
    pub fn remove_key_sniffer(&self, id: KeySnifferId) -> bool {
        self.check_thread("remove a key sniffer");
        let mut state = self.state();
        let before = state.input.sniffers.len();
        state.input.sniffers.retain(|(sniffer_id, _)| *sniffer_id != id);
        state.input.sniffers.len() != before
    }

    /// Deliver a key event.
    ///
    /// Sniffers see the key first; the first one returning `true` consumes
    /// it. Otherwise [`Message::KeyPress`] travels up-chain from the focused
    /// widget. Returns `false` when nobody handled the key, so the host may
    /// process it.
    pub fn inject_key(&self, key: KeyState) -> TreeResult<bool> {
        self.check_thread("inject key input");
        let sniffers: Vec<KeySniffer> = self
            .state()
            .input
            .sniffers
            .iter()
            .map(|(_, sniffer)| sniffer.clone())
            .collect();
        if sniffers.iter().any(|sniffer| sniffer(self, &key)) {
            tracing::trace!(target: "trellis_core::input", ?key, "key consumed by sniffer");
            return Ok(true);
        }

        match self.keyboard_focus() {
            Some(focus) => self.dispatch(focus, &Message::KeyPress(key), DispatchMode::UpChain),
            None => Ok(false),
        }
    }

    /// The widget holding keyboard focus.
    pub fn keyboard_focus(&self) -> Option<WidgetId> {
        let state = self.state();
        state.input.focus.filter(|&f| state.nodes.contains_key(f))
    }

    /// Move keyboard focus to `target`, or clear it with `None`.
    ///
    /// The current holder receives [`Message::KeyLoseFocus`] first; leaving
    /// it unhandled refuses and keeps focus where it is. Then `target`
    /// receives [`Message::KeyTakeFocus`]; if it declines, the offer moves up
    /// to each ancestor with `child_gave_up` set. The first widget to accept
    /// takes focus; if none does, no widget holds focus.
    ///
    /// Returns the widget holding focus afterwards.
    ///
    /// # Errors
    ///
    /// [`TreeError::InvalidHandle`] if `target` is not a live widget.
    pub fn set_keyboard_focus(&self, target: Option<WidgetId>) -> TreeResult<Option<WidgetId>> {
        self.check_thread("change keyboard focus");
        if let Some(target_id) = target {
            if !self.contains(target_id) {
                return Err(TreeError::InvalidHandle(target_id));
            }
        }

        let current = self.keyboard_focus();
        if current == target {
            return Ok(current);
        }

        if let Some(old) = current {
            let lose = Message::KeyLoseFocus {
                taken_by_other: target.is_some(),
            };
            if !self.dispatch(old, &lose, DispatchMode::Direct)? {
                tracing::debug!(target: "trellis_core::input", holder = ?old, "focus change refused");
                return Ok(Some(old));
            }
            self.state().input.focus = None;
        }

        let mut candidate = target;
        let mut child_gave_up = false;
        while let Some(id) = candidate {
            if !self.contains(id) {
                break;
            }
            let take = Message::KeyTakeFocus { child_gave_up };
            if self.dispatch(id, &take, DispatchMode::Direct)? {
                self.state().input.focus = Some(id);
                tracing::debug!(target: "trellis_core::input", holder = ?id, "keyboard focus moved");
                return Ok(Some(id));
            }
            child_gave_up = true;
            candidate = self.parent(id).ok().flatten();
        }

        self.state().input.focus = None;
        tracing::debug!(target: "trellis_core::input", "keyboard focus cleared");
        Ok(None)
    }

    // =========================================================================
    // Destruction
    // =========================================================================

    /// Release capture and focus held inside the subtree of `id`, which is
    /// about to be destroyed.
    ///
    /// The capturing widget receives [`Message::MouseCancel`]; the focus
    /// holder receives a `KeyLoseFocus` whose result is ignored.
    pub(crate) fn release_input(&self, id: WidgetId) -> TreeResult<()> {
        let (cancel, lost_focus) = {
            let mut state = self.state();
            let cancel = state
                .input
                .capture
                .filter(|c| state.is_self_or_ancestor(id, c.widget));
            if cancel.is_some() {
                state.input.capture = None;
            }
            let lost_focus = state
                .input
                .focus
                .filter(|&f| state.is_self_or_ancestor(id, f));
            if lost_focus.is_some() {
                state.input.focus = None;
            }
            (cancel.map(|c| (c, state.input.last_pointer)), lost_focus)
        };

        if let Some((capture, (x, y))) = cancel {
            tracing::debug!(target: "trellis_core::input", widget = ?capture.widget, "gesture cancelled by destruction");
            let message = Message::MouseCancel(MouseState::new(x, y, capture.button));
            self.dispatch(capture.widget, &message, DispatchMode::Direct)?;
        }
        if let Some(holder) = lost_focus {
            let message = Message::KeyLoseFocus {
                taken_by_other: false,
            };
            self.dispatch(holder, &message, DispatchMode::Direct)?;
        }
        Ok(())
    }
}
