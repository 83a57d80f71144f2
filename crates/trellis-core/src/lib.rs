//! Core systems for Trellis.
//!
//! This crate provides a hierarchical widget message-dispatch engine and a
//! reentrancy-safe broadcaster/listener mechanism:
//!
//! - **Widget Tree**: Parent-child ownership, z-order, hit-testing, per-widget
//!   callback stacks, properties and descriptors
//! - **Dispatch Engine**: Direct, up-chain, recursive, all-callbacks and
//!   once-only message delivery
//! - **Input Router**: Pointer capture, keyboard focus handshake, key sniffers
//! - **Behaviours**: Ready-made callbacks for dragging, window selection,
//!   defocusing and fixed layouts
//! - **Broadcast Hub**: Many-to-many notifications that tolerate attach,
//!   detach and destroy from inside a publish
//!
//! Rendering, timers and host services are not part of this crate; the host
//! injects input and reacts to messages.
//!
//! # Dispatch Example
//!
//! ```
//! use trellis_core::{callback, DispatchMode, Message, Rect, WidgetTree};
//!
//! let tree = WidgetTree::new();
//! let window = tree.create_node(Rect::new(0, 100, 200, 0), true, None, None)?;
//! let button = tree.create_node(Rect::new(10, 30, 60, 10), true, Some(window), None)?;
//!
//! // The window handles anything its children ignore.
//! tree.add_callback(window, callback(|_, _, msg| matches!(msg, Message::User { .. })))?;
//!
//! let ping = Message::user(10_000, 0, 0);
//! assert!(!tree.dispatch(button, &ping, DispatchMode::Direct)?);
//! assert!(tree.dispatch(button, &ping, DispatchMode::UpChain)?);
//! # Ok::<(), trellis_core::TreeError>(())
//! ```
//!
//! # Broadcast Example
//!
//! ```
//! use trellis_core::BroadcastHub;
//!
//! let hub = BroadcastHub::<u32>::new();
//! let altitude = hub.create_broadcaster();
//! let gauge = hub.create_listener_fn(|_, _, feet: &u32| assert_eq!(*feet, 3500));
//!
//! hub.attach(altitude, gauge)?;
//! assert_eq!(hub.publish(altitude, &3500)?, 1);
//! # Ok::<(), trellis_core::BroadcastError>(())
//! ```

pub mod behaviors;
pub mod broadcast;
mod config;
mod dispatch;
mod error;
mod geometry;
mod input;
pub mod logging;
mod message;
pub mod property;
pub mod thread_check;
mod tree;

pub use broadcast::{BroadcastHub, BroadcasterId, Listener, ListenerGuard, ListenerId};
pub use config::{TreeConfig, TreeConfigBuilder, DEFAULT_MAX_DISPATCH_DEPTH};
pub use dispatch::{DispatchMode, DispatchOutcome};
pub use error::{BroadcastError, BroadcastResult, Result, TreeError, TreeResult, TrellisError};
pub use geometry::{GeometryDelta, Rect};
pub use input::{KeySniffer, KeySnifferId};
pub use logging::{PerfSpan, TreeFormatOptions, TreeStyle, WidgetTreeDebug};
pub use message::{
    KeyFlags, KeyState, Message, MessageKind, MouseButton, MouseState, WheelAxis,
    USER_MESSAGE_START,
};
pub use property::{PropertyKey, PropertyTable, PropertyValue};
pub use tree::{callback, WidgetCallback, WidgetId, WidgetTree};
