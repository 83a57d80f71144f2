//! Error types for Trellis.
//!
//! Structural errors are returned to the caller of the offending operation and
//! are never downgraded to log messages inside the core. Idempotent cleanup
//! (double detach, double destroy, redundant visibility changes) is not an
//! error and has no variant here.

use crate::broadcast::{BroadcasterId, ListenerId};
use crate::tree::WidgetId;

/// Result type alias for operations that may fail in either subsystem.
pub type Result<T> = std::result::Result<T, TrellisError>;

/// Result type for widget tree, dispatch and input operations.
pub type TreeResult<T> = std::result::Result<T, TreeError>;

/// Result type for broadcaster/listener operations.
pub type BroadcastResult<T> = std::result::Result<T, BroadcastError>;

/// Errors raised by the widget tree, the dispatch engine and the input router.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreeError {
    /// The widget handle is unknown or the widget has been destroyed.
    #[error("Invalid or destroyed widget handle {0:?}")]
    InvalidHandle(WidgetId),

    /// A parent handle was supplied but does not name a live widget.
    #[error("Parent widget {0:?} is not a live widget")]
    InvalidParent(WidgetId),

    /// Attempted to place a widget inside its own subtree.
    #[error("Cannot place widget {child:?} inside its own subtree (under {parent:?})")]
    CircularParentage {
        /// The widget being moved.
        child: WidgetId,
        /// The requested new parent.
        parent: WidgetId,
    },

    /// The two widgets do not share a parent (or are not both roots).
    #[error("Widgets {0:?} and {1:?} are not siblings")]
    NotSiblings(WidgetId, WidgetId),

    /// Handlers re-entered the dispatcher deeper than the configured limit.
    #[error("Nested dispatch depth limit of {depth} exceeded")]
    DispatchDepthExceeded {
        /// The configured limit that was hit.
        depth: usize,
    },
}

/// Errors raised by the broadcaster/listener registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BroadcastError {
    /// The broadcaster handle is unknown or destroyed.
    #[error("Invalid or destroyed broadcaster handle {0:?}")]
    InvalidBroadcaster(BroadcasterId),

    /// The listener handle is unknown or destroyed.
    #[error("Invalid or destroyed listener handle {0:?}")]
    InvalidListener(ListenerId),

    /// A listener tried to publish on the broadcaster that is currently
    /// delivering to it.
    #[error("Broadcaster {0:?} is already publishing; nested publish rejected")]
    ReentrantPublish(BroadcasterId),
}

/// The umbrella error type for Trellis operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TrellisError {
    /// Widget tree, dispatch or input error.
    #[error("Widget tree error: {0}")]
    Tree(#[from] TreeError),

    /// Broadcaster/listener error.
    #[error("Broadcast error: {0}")]
    Broadcast(#[from] BroadcastError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::KeyData;

    #[test]
    fn test_error_display() {
        let id = WidgetId::from(KeyData::from_ffi(1));
        let err = TreeError::InvalidHandle(id);
        assert!(err.to_string().starts_with("Invalid or destroyed widget handle"));

        let err = TreeError::DispatchDepthExceeded { depth: 8 };
        assert_eq!(err.to_string(), "Nested dispatch depth limit of 8 exceeded");
    }

    #[test]
    fn test_umbrella_conversion() {
        let id = BroadcasterId::from(KeyData::from_ffi(1));
        let err: TrellisError = BroadcastError::ReentrantPublish(id).into();
        assert!(matches!(
            err,
            TrellisError::Broadcast(BroadcastError::ReentrantPublish(_))
        ));
        assert!(err.to_string().starts_with("Broadcast error:"));
    }
}
