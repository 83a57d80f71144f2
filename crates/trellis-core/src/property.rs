//! Per-widget property tables.
//!
//! Every widget owns a [`PropertyTable`] mapping a 32-bit [`PropertyKey`] to a
//! [`PropertyValue`]. Keys below [`PropertyKey::USER_START`] are reserved for
//! the framework (the stock behaviours in [`crate::behaviors`] keep their drag
//! state there); applications use keys at or above it.
//!
//! Reading an unset key is not an error: the table reports it as unset and
//! [`WidgetTree::property`](crate::WidgetTree::property) falls back to
//! [`PropertyValue::default()`], integer zero.
//!
//! ```
//! use trellis_core::{PropertyKey, PropertyTable, PropertyValue};
//!
//! let mut table = PropertyTable::new();
//! let key = PropertyKey::user(1);
//!
//! assert!(table.set(key, PropertyValue::Int(5)));
//! assert!(!table.set(key, PropertyValue::Int(5))); // unchanged
//! assert_eq!(table.get(key), Some(PropertyValue::Int(5)));
//! ```

use std::collections::HashMap;
use std::fmt;

use crate::tree::WidgetId;

/// Identifies a property within a widget's table.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PropertyKey(pub u32);

impl PropertyKey {
    /// Opaque application reference attached to a widget.
    pub const REFCON: Self = Self(0);
    /// Non-zero while a drag gesture started by the drag behaviour is active.
    pub const DRAGGING: Self = Self(1);
    /// Horizontal offset between the pointer and the widget's left edge.
    pub const DRAG_X_OFFSET: Self = Self(2);
    /// Vertical offset between the pointer and the widget's bottom edge.
    pub const DRAG_Y_OFFSET: Self = Self(3);
    /// Non-zero while the widget is highlighted.
    pub const HILITED: Self = Self(4);
    /// Non-zero when the widget accepts input. Unset means enabled.
    pub const ENABLED: Self = Self(7);
    /// First key of the application range.
    pub const USER_START: Self = Self(10_000);

    /// The `offset`-th key of the application range.
    pub const fn user(offset: u32) -> Self {
        Self(Self::USER_START.0 + offset)
    }

    /// Whether this key belongs to the framework range.
    #[inline]
    pub fn is_reserved(self) -> bool {
        self.0 < Self::USER_START.0
    }
}

impl fmt::Debug for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_reserved() {
            write!(f, "PropertyKey(reserved {})", self.0)
        } else {
            write!(f, "PropertyKey(user {})", self.0 - Self::USER_START.0)
        }
    }
}

/// A property value: an integer or a pointer-width opaque reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyValue {
    /// A plain integer.
    Int(i64),
    /// An opaque pointer-width reference owned by the application.
    Opaque(usize),
    /// A reference to another widget.
    Widget(WidgetId),
}

impl Default for PropertyValue {
    fn default() -> Self {
        Self::Int(0)
    }
}

impl PropertyValue {
    /// The integer value, if this is an integer.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// The opaque reference, if this is one.
    pub fn as_opaque(&self) -> Option<usize> {
        match self {
            Self::Opaque(v) => Some(*v),
            _ => None,
        }
    }

    /// The referenced widget, if this is a widget reference.
    pub fn as_widget(&self) -> Option<WidgetId> {
        match self {
            Self::Widget(id) => Some(*id),
            _ => None,
        }
    }

    /// Truthiness in the C sense: non-zero integers and any reference.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Int(v) => *v != 0,
            Self::Opaque(v) => *v != 0,
            Self::Widget(_) => true,
        }
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for PropertyValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<WidgetId> for PropertyValue {
    fn from(value: WidgetId) -> Self {
        Self::Widget(value)
    }
}

/// The property storage owned by one widget.
#[derive(Debug, Clone, Default)]
pub struct PropertyTable {
    values: HashMap<PropertyKey, PropertyValue>,
}

impl PropertyTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value, returning `true` if the stored value changed.
    pub fn set(&mut self, key: PropertyKey, value: PropertyValue) -> bool {
        match self.values.insert(key, value) {
            Some(previous) => previous != value,
            None => true,
        }
    }

    /// The stored value, or `None` if the key is unset.
    pub fn get(&self, key: PropertyKey) -> Option<PropertyValue> {
        self.values.get(&key).copied()
    }

    /// Remove a value, returning it if it was set.
    pub fn remove(&mut self, key: PropertyKey) -> Option<PropertyValue> {
        self.values.remove(&key)
    }

    /// Whether the key is set.
    pub fn contains(&self, key: PropertyKey) -> bool {
        self.values.contains_key(&key)
    }

    /// Number of set keys.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no key is set.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Set keys in ascending order.
    pub fn keys(&self) -> Vec<PropertyKey> {
        let mut keys: Vec<_> = self.values.keys().copied().collect();
        keys.sort_unstable();
        keys
    }
}
