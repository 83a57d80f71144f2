//! Messages delivered to widget callback stacks.
//!
//! A [`Message`] is the typed replacement for a numeric message ID plus two
//! pointer-width parameters: each variant carries exactly the payload its
//! receivers need. Applications define their own messages through
//! [`Message::User`], which keeps the classic `(id, param1, param2)` shape.

use crate::geometry::GeometryDelta;
use crate::property::{PropertyKey, PropertyValue};
use crate::tree::WidgetId;

/// First message ID available to applications for [`Message::User`].
pub const USER_MESSAGE_START: u32 = 10_000;

/// Mouse button identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MouseButton {
    /// Primary (usually left) button.
    #[default]
    Left,
    /// Secondary (usually right) button.
    Right,
    /// Middle button or wheel press.
    Middle,
    /// Any other button, numbered by the host.
    Other(u8),
}

/// Axis of a wheel movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WheelAxis {
    /// Vertical scrolling.
    #[default]
    Vertical,
    /// Horizontal scrolling.
    Horizontal,
}

/// Pointer state delivered with mouse messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MouseState {
    /// Pointer x in global coordinates.
    pub x: i32,
    /// Pointer y in global coordinates.
    pub y: i32,
    /// The button involved in this gesture.
    pub button: MouseButton,
    /// Wheel clicks for wheel messages; zero otherwise.
    pub delta: i32,
}

impl MouseState {
    /// Create a pointer state without wheel movement.
    pub fn new(x: i32, y: i32, button: MouseButton) -> Self {
        Self {
            x,
            y,
            button,
            delta: 0,
        }
    }
}

/// Modifier and transition flags of a key event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct KeyFlags {
    /// Shift is held.
    pub shift: bool,
    /// Alt/Option is held.
    pub alt: bool,
    /// Control (Cmd on macOS) is held.
    pub control: bool,
    /// The key went down with this event.
    pub down: bool,
    /// The key went up with this event.
    pub up: bool,
}

impl KeyFlags {
    /// No modifiers, no transition.
    pub const NONE: Self = Self {
        shift: false,
        alt: false,
        control: false,
        down: false,
        up: false,
    };

    /// A plain key press.
    pub const DOWN: Self = Self {
        down: true,
        ..Self::NONE
    };

    /// A plain key release.
    pub const UP: Self = Self {
        up: true,
        ..Self::NONE
    };

    /// Whether any modifier key is held.
    pub fn has_modifiers(&self) -> bool {
        self.shift || self.alt || self.control
    }
}

/// Keyboard state delivered with key messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyState {
    /// The character produced by the key, `'\0'` if none.
    pub key: char,
    /// Modifiers and transition.
    pub flags: KeyFlags,
    /// Host virtual key code.
    pub virtual_key: u32,
}

impl KeyState {
    /// Create a key state without a virtual key code.
    pub fn new(key: char, flags: KeyFlags) -> Self {
        Self {
            key,
            flags,
            virtual_key: 0,
        }
    }
}

/// A message delivered to widget callbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// The widget was just created. `subclassed` is true when the creator
    /// supplied a class callback rather than a bare node.
    Create {
        /// Whether a class callback was installed at creation.
        subclassed: bool,
    },
    /// The widget is about to be destroyed. `forced` is true when an ancestor
    /// is being destroyed, false when the widget itself was targeted.
    Destroy {
        /// Destroyed as part of an ancestor's subtree.
        forced: bool,
    },
    /// Paint the widget itself.
    Paint,
    /// Paint the widget's contents after its children.
    Draw,
    /// A key event routed from the focus holder.
    KeyPress(KeyState),
    /// Keyboard focus is arriving. `child_gave_up` is set when a descendant
    /// declined focus and it bubbled up here.
    KeyTakeFocus {
        /// A descendant declined focus first.
        child_gave_up: bool,
    },
    /// Keyboard focus is leaving. Return "not handled" to refuse.
    KeyLoseFocus {
        /// Another widget is taking focus (false when focus is being cleared).
        taken_by_other: bool,
    },
    /// A pointer button went down over the widget.
    MouseDown(MouseState),
    /// The pointer moved while the widget holds capture.
    MouseDrag(MouseState),
    /// The captured button was released.
    MouseUp(MouseState),
    /// The captured gesture was abandoned without a release.
    MouseCancel(MouseState),
    /// The wheel turned over the widget.
    MouseWheel(MouseState, WheelAxis),
    /// The pointer hovers over the widget without capture.
    CursorAdjust(MouseState),
    /// A widget's geometry changed. Sent up-chain from `origin`.
    Reshape {
        /// The widget whose geometry changed.
        origin: WidgetId,
        /// Position and size change.
        delta: GeometryDelta,
    },
    /// A child was placed under this widget.
    AcceptChild(WidgetId),
    /// A child left this widget.
    LoseChild(WidgetId),
    /// This widget was placed under a new parent.
    AcceptParent(WidgetId),
    /// A widget became visible. Sent up-chain from that widget.
    Shown(WidgetId),
    /// A widget became hidden. Sent up-chain from that widget.
    Hidden(WidgetId),
    /// The widget's descriptor text changed.
    DescriptorChanged,
    /// A property value changed.
    PropertyChanged {
        /// The property that changed.
        key: PropertyKey,
        /// Its new value.
        value: PropertyValue,
    },
    /// Application-defined message.
    User {
        /// Message ID, at or above [`USER_MESSAGE_START`] by convention.
        id: u32,
        /// First parameter.
        param1: isize,
        /// Second parameter.
        param2: isize,
    },
}

/// Discriminant of a [`Message`] without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// See [`Message::Create`].
    Create,
    /// See [`Message::Destroy`].
    Destroy,
    /// See [`Message::Paint`].
    Paint,
    /// See [`Message::Draw`].
    Draw,
    /// See [`Message::KeyPress`].
    KeyPress,
    /// See [`Message::KeyTakeFocus`].
    KeyTakeFocus,
    /// See [`Message::KeyLoseFocus`].
    KeyLoseFocus,
    /// See [`Message::MouseDown`].
    MouseDown,
    /// See [`Message::MouseDrag`].
    MouseDrag,
    /// See [`Message::MouseUp`].
    MouseUp,
    /// See [`Message::MouseCancel`].
    MouseCancel,
    /// See [`Message::MouseWheel`].
    MouseWheel,
    /// See [`Message::CursorAdjust`].
    CursorAdjust,
    /// See [`Message::Reshape`].
    Reshape,
    /// See [`Message::AcceptChild`].
    AcceptChild,
    /// See [`Message::LoseChild`].
    LoseChild,
    /// See [`Message::AcceptParent`].
    AcceptParent,
    /// See [`Message::Shown`].
    Shown,
    /// See [`Message::Hidden`].
    Hidden,
    /// See [`Message::DescriptorChanged`].
    DescriptorChanged,
    /// See [`Message::PropertyChanged`].
    PropertyChanged,
    /// See [`Message::User`].
    User(u32),
}

impl Message {
    /// Build a user message.
    pub fn user(id: u32, param1: isize, param2: isize) -> Self {
        Self::User { id, param1, param2 }
    }

    /// The payload-free kind of this message.
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Create { .. } => MessageKind::Create,
            Self::Destroy { .. } => MessageKind::Destroy,
            Self::Paint => MessageKind::Paint,
            Self::Draw => MessageKind::Draw,
            Self::KeyPress(_) => MessageKind::KeyPress,
            Self::KeyTakeFocus { .. } => MessageKind::KeyTakeFocus,
            Self::KeyLoseFocus { .. } => MessageKind::KeyLoseFocus,
            Self::MouseDown(_) => MessageKind::MouseDown,
            Self::MouseDrag(_) => MessageKind::MouseDrag,
            Self::MouseUp(_) => MessageKind::MouseUp,
            Self::MouseCancel(_) => MessageKind::MouseCancel,
            Self::MouseWheel(..) => MessageKind::MouseWheel,
            Self::CursorAdjust(_) => MessageKind::CursorAdjust,
            Self::Reshape { .. } => MessageKind::Reshape,
            Self::AcceptChild(_) => MessageKind::AcceptChild,
            Self::LoseChild(_) => MessageKind::LoseChild,
            Self::AcceptParent(_) => MessageKind::AcceptParent,
            Self::Shown(_) => MessageKind::Shown,
            Self::Hidden(_) => MessageKind::Hidden,
            Self::DescriptorChanged => MessageKind::DescriptorChanged,
            Self::PropertyChanged { .. } => MessageKind::PropertyChanged,
            Self::User { id, .. } => MessageKind::User(*id),
        }
    }

    /// The pointer state carried by mouse messages.
    pub fn mouse_state(&self) -> Option<&MouseState> {
        match self {
            Self::MouseDown(state)
            | Self::MouseDrag(state)
            | Self::MouseUp(state)
            | Self::MouseCancel(state)
            | Self::MouseWheel(state, _)
            | Self::CursorAdjust(state) => Some(state),
            _ => None,
        }
    }

    /// Whether this is one of the pointer messages.
    pub fn is_mouse(&self) -> bool {
        self.mouse_state().is_some()
    }
}
