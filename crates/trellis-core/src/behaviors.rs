//! Ready-made widget callbacks for common interaction patterns.
//!
//! Each function returns a [`WidgetCallback`] to push on a widget's stack
//! with [`WidgetTree::add_callback`].
//!
//! ```
//! use trellis_core::{behaviors, MouseButton, Rect, WidgetTree};
//!
//! let tree = WidgetTree::new();
//! let window = tree.create_node(Rect::from_origin_size(0, 0, 200, 100), true, None, None)?;
//! tree.add_callback(window, behaviors::fixed_layout())?;
//! tree.add_callback(window, behaviors::drag_widget(Rect::from_origin_size(0, 80, 200, 20)))?;
//!
//! // Grab the title bar and move the window 10 units right.
//! tree.inject_pointer_down(50, 90, MouseButton::Left)?;
//! tree.inject_pointer_move(60, 90, MouseButton::Left)?;
//! tree.inject_pointer_up(60, 90, MouseButton::Left)?;
//! assert_eq!(tree.geometry(window)?, Rect::from_origin_size(10, 0, 200, 100));
//! # Ok::<(), trellis_core::TreeError>(())
//! ```

use crate::geometry::Rect;
use crate::message::{Message, MouseState};
use crate::property::{PropertyKey, PropertyValue};
use crate::tree::{callback, WidgetCallback, WidgetId, WidgetTree};

/// Bring the widget's window (its root) to the front on a button press.
///
/// Never consumes the press.
pub fn select_if_needed() -> WidgetCallback {
    callback(|tree, id, msg| {
        if let Message::MouseDown(_) = msg {
            let raised = tree.root_of(id).and_then(|root| tree.bring_to_front(root));
            if let Err(err) = raised {
                tracing::debug!(target: "trellis_core::input", widget = ?id, %err, "select failed");
            }
        }
        false
    })
}

/// Clear keyboard focus on a button press when it is held by the widget or
/// one of its descendants.
///
/// The holder may still refuse to let go. Never consumes the press.
pub fn defocus_keyboard() -> WidgetCallback {
    callback(|tree, id, msg| {
        if let Message::MouseDown(_) = msg {
            let held_inside = tree
                .keyboard_focus()
                .is_some_and(|holder| tree.is_self_or_ancestor(id, holder).unwrap_or(false));
            if held_inside {
                if let Err(err) = tree.set_keyboard_focus(None) {
                    tracing::debug!(target: "trellis_core::input", widget = ?id, %err, "defocus failed");
                }
            }
        }
        false
    })
}

/// Let the user drag the widget around by a region of it.
///
/// `drag_region` is relative to the widget's bottom-left corner. A press
/// inside it starts a drag (and is consumed, so the widget captures the
/// gesture); drags move the widget with the pointer and the release or a
/// cancel ends it. The drag state lives in the reserved
/// [`PropertyKey::DRAGGING`], [`PropertyKey::DRAG_X_OFFSET`] and
/// [`PropertyKey::DRAG_Y_OFFSET`] properties.
pub fn drag_widget(drag_region: Rect) -> WidgetCallback {
    callback(move |tree, id, msg| match msg {
        Message::MouseDown(pointer) => begin_drag(tree, id, pointer, drag_region).unwrap_or(false),
        Message::MouseDrag(pointer) => continue_drag(tree, id, pointer).unwrap_or(false),
        Message::MouseUp(pointer) => {
            let moved = continue_drag(tree, id, pointer).unwrap_or(false);
            end_drag(tree, id) || moved
        }
        Message::MouseCancel(_) => end_drag(tree, id),
        _ => false,
    })
}

fn begin_drag(
    tree: &WidgetTree,
    id: WidgetId,
    pointer: &MouseState,
    drag_region: Rect,
) -> crate::TreeResult<bool> {
    let geometry = tree.geometry(id)?;
    let region = drag_region.translated(i64::from(geometry.left), i64::from(geometry.bottom));
    if !region.contains(pointer.x, pointer.y) {
        return Ok(false);
    }

    let x_offset = i64::from(pointer.x) - i64::from(geometry.left);
    let y_offset = i64::from(pointer.y) - i64::from(geometry.bottom);
    tree.set_property(id, PropertyKey::DRAG_X_OFFSET, x_offset)?;
    tree.set_property(id, PropertyKey::DRAG_Y_OFFSET, y_offset)?;
    tree.set_property(id, PropertyKey::DRAGGING, true)?;
    tracing::trace!(target: "trellis_core::input", widget = ?id, "drag started");
    Ok(true)
}

fn continue_drag(tree: &WidgetTree, id: WidgetId, pointer: &MouseState) -> crate::TreeResult<bool> {
    if !tree.property(id, PropertyKey::DRAGGING)?.is_truthy() {
        return Ok(false);
    }
    let offset = |key: PropertyKey| -> crate::TreeResult<i64> {
        Ok(tree.property(id, key)?.as_int().unwrap_or(0))
    };
    let geometry = tree.geometry(id)?;
    let dx = i64::from(pointer.x)
        .saturating_sub(offset(PropertyKey::DRAG_X_OFFSET)?)
        .saturating_sub(i64::from(geometry.left));
    let dy = i64::from(pointer.y)
        .saturating_sub(offset(PropertyKey::DRAG_Y_OFFSET)?)
        .saturating_sub(i64::from(geometry.bottom));

    tree.set_geometry(id, geometry.translated(dx, dy))?;
    Ok(true)
}

fn end_drag(tree: &WidgetTree, id: WidgetId) -> bool {
    let dragging = tree
        .property(id, PropertyKey::DRAGGING)
        .is_ok_and(|value| value.is_truthy());
    if dragging {
        if let Err(err) = tree.set_property(id, PropertyKey::DRAGGING, PropertyValue::Int(0)) {
            tracing::debug!(target: "trellis_core::input", widget = ?id, %err, "drag reset failed");
        }
        tracing::trace!(target: "trellis_core::input", widget = ?id, "drag ended");
    }
    dragging
}

/// Keep children at fixed offsets from the widget.
///
/// When the widget itself moves, every direct child moves by the same
/// amount (and theirs in turn if they carry this behaviour too). Resizing
/// alone leaves children where they are.
pub fn fixed_layout() -> WidgetCallback {
    callback(|tree, id, msg| {
        if let Message::Reshape { origin, delta } = msg {
            if *origin == id && delta.is_moved() {
                for child in tree.children(id).unwrap_or_default() {
                    let moved = tree
                        .geometry(child)
                        .and_then(|rect| tree.set_geometry(child, rect.translated(delta.dx, delta.dy)));
                    if let Err(err) = moved {
                        tracing::debug!(target: "trellis_core::tree", ?child, %err, "fixed layout move failed");
                    }
                }
            }
        }
        false
    })
}
