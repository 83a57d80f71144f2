//! Broadcaster/listener registry.
//!
//! A [`BroadcastHub`] owns any number of broadcasters and listeners and the
//! many-to-many attachments between them. Publishing on a broadcaster
//! synchronously delivers a message to every attached listener in attachment
//! order.
//!
//! # Key Types
//!
//! - [`BroadcastHub<M>`] - Cloneable handle to the registry
//! - [`BroadcasterId`] / [`ListenerId`] - Generational handles
//! - [`Listener<M>`] - Handler trait; closures work through
//!   [`BroadcastHub::create_listener_fn`]
//! - [`ListenerGuard`] - RAII guard that destroys its listener when dropped
//!
//! # Mutation during a publish
//!
//! Listener code may attach, detach and destroy freely while a publish is
//! running, including detaching itself. The broadcaster keeps a cursor over
//! its listener list for the duration of the pass and every removal adjusts
//! it, so no remaining listener is skipped or visited twice. Listeners
//! attached during a pass are first visited by the next publish. Publishing
//! the same broadcaster again from inside its own pass fails with
//! [`BroadcastError::ReentrantPublish`]; publishing a different one is fine.
//!
//! ```
//! use std::sync::Arc;
//! use parking_lot::Mutex;
//! use trellis_core::BroadcastHub;
//!
//! let hub = BroadcastHub::<String>::new();
//! let frequency = hub.create_broadcaster();
//!
//! let heard = Arc::new(Mutex::new(Vec::new()));
//! let heard_clone = heard.clone();
//! let radio = hub.create_listener_fn(move |_, _, msg: &String| heard_clone.lock().push(msg.clone()));
//!
//! hub.attach(frequency, radio)?;
//! assert_eq!(hub.publish(frequency, &"122.8".to_string())?, 1);
//! assert_eq!(*heard.lock(), vec!["122.8".to_string()]);
//! # Ok::<(), trellis_core::BroadcastError>(())
//! ```

use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use slotmap::{new_key_type, SlotMap};

use crate::error::{BroadcastError, BroadcastResult};
use crate::thread_check::ThreadAffinity;

new_key_type! {
    /// A unique identifier for a broadcaster in a [`BroadcastHub`].
    pub struct BroadcasterId;

    /// A unique identifier for a listener in a [`BroadcastHub`].
    pub struct ListenerId;
}

/// Receives messages published on the broadcasters it is attached to.
pub trait Listener<M>: Send + Sync {
    /// Called once per publish on an attached broadcaster.
    fn listen_to_message(&self, hub: &BroadcastHub<M>, source: BroadcasterId, message: &M);

    /// Called once when an attached broadcaster is destroyed. The
    /// attachment is already gone when this runs.
    fn broadcaster_removed(&self, hub: &BroadcastHub<M>, broadcaster: BroadcasterId) {
        let _ = (hub, broadcaster);
    }
}

/// Adapts a closure to [`Listener`].
struct FnListener<F>(F);

impl<M, F> Listener<M> for FnListener<F>
where
    F: Fn(&BroadcastHub<M>, BroadcasterId, &M) + Send + Sync,
{
    fn listen_to_message(&self, hub: &BroadcastHub<M>, source: BroadcasterId, message: &M) {
        (self.0)(hub, source, message)
    }
}

/// Position of an in-progress publish within a listener list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PublishCursor {
    /// Index of the next listener to visit.
    next: usize,
    /// One past the last listener this pass may visit.
    end: usize,
}

#[derive(Debug, Default)]
struct BroadcasterData {
    /// Attachment order, no duplicates.
    listeners: Vec<ListenerId>,
    cursor: Option<PublishCursor>,
}

impl BroadcasterData {
    /// Remove a listener, keeping an active cursor on the same logical entry.
    fn remove_listener(&mut self, listener: ListenerId) -> bool {
        let Some(position) = self.listeners.iter().position(|&l| l == listener) else {
            return false;
        };
        self.listeners.remove(position);
        if let Some(cursor) = self.cursor.as_mut() {
            if position < cursor.next {
                cursor.next -= 1;
            }
            if position < cursor.end {
                cursor.end -= 1;
            }
        }
        true
    }
}

struct ListenerData<M> {
    handler: Arc<dyn Listener<M>>,
    /// Attachment order, no duplicates.
    attached: Vec<BroadcasterId>,
}

struct HubState<M> {
    broadcasters: SlotMap<BroadcasterId, BroadcasterData>,
    listeners: SlotMap<ListenerId, ListenerData<M>>,
}

struct HubShared<M> {
    state: Mutex<HubState<M>>,
    affinity: ThreadAffinity,
}

/// Registry of broadcasters, listeners and their attachments.
///
/// `BroadcastHub` is a cheap handle: clones share one registry. Handlers
/// receive the hub so they can re-enter it.
pub struct BroadcastHub<M> {
    shared: Arc<HubShared<M>>,
}

static_assertions::assert_impl_all!(BroadcastHub<String>: Send, Sync);

impl<M> Clone for BroadcastHub<M> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<M> Default for BroadcastHub<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> fmt::Debug for BroadcastHub<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("BroadcastHub")
            .field("broadcasters", &state.broadcasters.len())
            .field("listeners", &state.listeners.len())
            .finish()
    }
}

impl<M> BroadcastHub<M> {
    /// Create an empty hub bound to the current thread.
    pub fn new() -> Self {
        Self::with_thread_checks(cfg!(debug_assertions))
    }

    /// Create an empty hub with thread-affinity checks on or off.
    pub fn with_thread_checks(enabled: bool) -> Self {
        Self {
            shared: Arc::new(HubShared {
                state: Mutex::new(HubState {
                    broadcasters: SlotMap::with_key(),
                    listeners: SlotMap::with_key(),
                }),
                affinity: ThreadAffinity::with_checks(enabled),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, HubState<M>> {
        self.shared.state.lock()
    }

    #[inline]
    #[track_caller]
    fn check_thread(&self, operation: &str) {
        self.shared.affinity.check(operation);
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Create a broadcaster with no listeners.
    pub fn create_broadcaster(&self) -> BroadcasterId {
        self.check_thread("create a broadcaster");
        let id = self.state().broadcasters.insert(BroadcasterData::default());
        tracing::trace!(target: "trellis_core::broadcast", ?id, "created broadcaster");
        id
    }

    /// Create a listener from a [`Listener`] implementation.
    pub fn create_listener<L>(&self, listener: L) -> ListenerId
    where
        L: Listener<M> + 'static,
    {
        self.check_thread("create a listener");
        let id = self.state().listeners.insert(ListenerData {
            handler: Arc::new(listener),
            attached: Vec::new(),
        });
        tracing::trace!(target: "trellis_core::broadcast", ?id, "created listener");
        id
    }

    /// Create a listener from a closure.
    pub fn create_listener_fn<F>(&self, handler: F) -> ListenerId
    where
        F: Fn(&BroadcastHub<M>, BroadcasterId, &M) + Send + Sync + 'static,
        M: 'static,
    {
        self.create_listener(FnListener(handler))
    }

    /// Create a closure listener attached to `broadcaster` that is destroyed
    /// when the returned guard drops.
    pub fn listen_scoped<F>(&self, broadcaster: BroadcasterId, handler: F) -> BroadcastResult<ListenerGuard<M>>
    where
        F: Fn(&BroadcastHub<M>, BroadcasterId, &M) + Send + Sync + 'static,
        M: 'static,
    {
        if !self.contains_broadcaster(broadcaster) {
            return Err(BroadcastError::InvalidBroadcaster(broadcaster));
        }
        let id = self.create_listener_fn(handler);
        let guard = ListenerGuard {
            hub: self.clone(),
            id,
        };
        self.attach(broadcaster, id)?;
        Ok(guard)
    }

    /// Destroy a broadcaster.
    ///
    /// Each listener still attached loses the attachment and then receives
    /// exactly one [`Listener::broadcaster_removed`]. A publish running on
    /// the broadcaster stops after its current delivery. Returns `false` if
    /// the broadcaster was already gone.
    pub fn destroy_broadcaster(&self, broadcaster: BroadcasterId) -> bool {
        self.check_thread("destroy a broadcaster");
        let orphaned = {
            let mut guard = self.state();
            let state = &mut *guard;
            let Some(data) = state.broadcasters.remove(broadcaster) else {
                return false;
            };
            for &listener in &data.listeners {
                if let Some(listener_data) = state.listeners.get_mut(listener) {
                    listener_data.attached.retain(|&b| b != broadcaster);
                }
            }
            data.listeners
        };
        tracing::trace!(
            target: "trellis_core::broadcast",
            ?broadcaster,
            listeners = orphaned.len(),
            "destroyed broadcaster"
        );

        for listener in orphaned {
            let handler = self.state().listeners.get(listener).map(|l| l.handler.clone());
            if let Some(handler) = handler {
                handler.broadcaster_removed(self, broadcaster);
            }
        }
        true
    }

    /// Destroy a listener, detaching it from every broadcaster.
    ///
    /// Safe to call from any handler, including the listener's own, while a
    /// publish is running. Returns `false` if the listener was already gone.
    pub fn destroy_listener(&self, listener: ListenerId) -> bool {
        self.check_thread("destroy a listener");
        let mut guard = self.state();
        let state = &mut *guard;
        let Some(data) = state.listeners.remove(listener) else {
            return false;
        };
        for broadcaster in data.attached {
            if let Some(broadcaster_data) = state.broadcasters.get_mut(broadcaster) {
                broadcaster_data.remove_listener(listener);
            }
        }
        tracing::trace!(target: "trellis_core::broadcast", ?listener, "destroyed listener");
        true
    }

    // =========================================================================
    // Attachments
    // =========================================================================

    /// Attach a listener to a broadcaster.
    ///
    /// Returns `true` for a new attachment and `false` if the pair was
    /// already attached. A listener attached while the broadcaster is
    /// publishing is first reached by the next publish.
    pub fn attach(&self, broadcaster: BroadcasterId, listener: ListenerId) -> BroadcastResult<bool> {
        self.check_thread("attach a listener");
        let mut guard = self.state();
        let state = &mut *guard;
        let broadcaster_data = state
            .broadcasters
            .get_mut(broadcaster)
            .ok_or(BroadcastError::InvalidBroadcaster(broadcaster))?;
        let listener_data = state
            .listeners
            .get_mut(listener)
            .ok_or(BroadcastError::InvalidListener(listener))?;

        if broadcaster_data.listeners.contains(&listener) {
            return Ok(false);
        }
        broadcaster_data.listeners.push(listener);
        listener_data.attached.push(broadcaster);
        Ok(true)
    }

    /// Detach a listener from a broadcaster.
    ///
    /// Returns whether an attachment was removed. Unknown handles and pairs
    /// that are not attached are not an error.
    pub fn detach(&self, broadcaster: BroadcasterId, listener: ListenerId) -> bool {
        self.check_thread("detach a listener");
        let mut guard = self.state();
        let state = &mut *guard;
        let Some(broadcaster_data) = state.broadcasters.get_mut(broadcaster) else {
            return false;
        };
        if !broadcaster_data.remove_listener(listener) {
            return false;
        }
        if let Some(listener_data) = state.listeners.get_mut(listener) {
            listener_data.attached.retain(|&b| b != broadcaster);
        }
        true
    }

    // =========================================================================
    // Publishing
    // =========================================================================

    /// Deliver a message to every listener attached to `broadcaster`, in
    /// attachment order. Returns the number of deliveries.
    ///
    /// # Errors
    ///
    /// - [`BroadcastError::InvalidBroadcaster`] if the broadcaster is gone
    /// - [`BroadcastError::ReentrantPublish`] if called from inside a publish
    ///   on the same broadcaster
    pub fn publish(&self, broadcaster: BroadcasterId, message: &M) -> BroadcastResult<usize> {
        self.check_thread("publish a message");
        {
            let mut state = self.state();
            let data = state
                .broadcasters
                .get_mut(broadcaster)
                .ok_or(BroadcastError::InvalidBroadcaster(broadcaster))?;
            if data.cursor.is_some() {
                return Err(BroadcastError::ReentrantPublish(broadcaster));
            }
            data.cursor = Some(PublishCursor {
                next: 0,
                end: data.listeners.len(),
            });
        }
        let _cursor = CursorGuard {
            hub: self,
            broadcaster,
        };

        let mut delivered = 0;
        while let Some(handler) = self.advance(broadcaster) {
            if let Some(handler) = handler {
                handler.listen_to_message(self, broadcaster, message);
                delivered += 1;
            }
        }

        tracing::trace!(target: "trellis_core::broadcast", ?broadcaster, delivered, "publish complete");
        Ok(delivered)
    }

    /// Step the cursor of an active publish.
    ///
    /// Returns `None` when the pass is over and `Some(None)` for an entry
    /// whose listener vanished.
    fn advance(&self, broadcaster: BroadcasterId) -> Option<Option<Arc<dyn Listener<M>>>> {
        let mut guard = self.state();
        let state = &mut *guard;
        let data = state.broadcasters.get_mut(broadcaster)?;
        let cursor = data.cursor.as_mut()?;
        if cursor.next >= cursor.end {
            return None;
        }
        let listener = *data.listeners.get(cursor.next)?;
        cursor.next += 1;
        Some(state.listeners.get(listener).map(|l| l.handler.clone()))
    }

    /// Whether a publish is running on the broadcaster.
    pub fn is_publishing(&self, broadcaster: BroadcasterId) -> bool {
        self.state()
            .broadcasters
            .get(broadcaster)
            .is_some_and(|b| b.cursor.is_some())
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Listeners attached to the broadcaster, in attachment order.
    pub fn listeners_of(&self, broadcaster: BroadcasterId) -> BroadcastResult<Vec<ListenerId>> {
        self.state()
            .broadcasters
            .get(broadcaster)
            .map(|b| b.listeners.clone())
            .ok_or(BroadcastError::InvalidBroadcaster(broadcaster))
    }

    /// Broadcasters the listener is attached to, in attachment order.
    pub fn broadcasters_of(&self, listener: ListenerId) -> BroadcastResult<Vec<BroadcasterId>> {
        self.state()
            .listeners
            .get(listener)
            .map(|l| l.attached.clone())
            .ok_or(BroadcastError::InvalidListener(listener))
    }

    /// Whether the pair is attached.
    pub fn is_attached(&self, broadcaster: BroadcasterId, listener: ListenerId) -> bool {
        self.state()
            .broadcasters
            .get(broadcaster)
            .is_some_and(|b| b.listeners.contains(&listener))
    }

    /// Whether the broadcaster is live.
    pub fn contains_broadcaster(&self, broadcaster: BroadcasterId) -> bool {
        self.state().broadcasters.contains_key(broadcaster)
    }

    /// Whether the listener is live.
    pub fn contains_listener(&self, listener: ListenerId) -> bool {
        self.state().listeners.contains_key(listener)
    }

    /// Number of live broadcasters.
    pub fn broadcaster_count(&self) -> usize {
        self.state().broadcasters.len()
    }

    /// Number of live listeners.
    pub fn listener_count(&self) -> usize {
        self.state().listeners.len()
    }
}

/// Ends a publish pass, even when a listener panics.
struct CursorGuard<'a, M> {
    hub: &'a BroadcastHub<M>,
    broadcaster: BroadcasterId,
}

impl<M> Drop for CursorGuard<'_, M> {
    fn drop(&mut self) {
        if let Some(data) = self.hub.state().broadcasters.get_mut(self.broadcaster) {
            data.cursor = None;
        }
    }
}

/// RAII guard that destroys its listener when dropped.
///
/// Returned by [`BroadcastHub::listen_scoped`].
///
/// ```
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
/// use trellis_core::BroadcastHub;
///
/// let hub = BroadcastHub::<usize>::new();
/// let ticks = hub.create_broadcaster();
/// let total = Arc::new(AtomicUsize::new(0));
///
/// {
///     let total_clone = total.clone();
///     let _guard = hub.listen_scoped(ticks, move |_, _, &n| {
///         total_clone.fetch_add(n, Ordering::SeqCst);
///     })?;
///     hub.publish(ticks, &42)?;
/// }
/// hub.publish(ticks, &43)?; // listener already destroyed
/// assert_eq!(total.load(Ordering::SeqCst), 42);
/// # Ok::<(), trellis_core::BroadcastError>(())
/// ```
pub struct ListenerGuard<M> {
    hub: BroadcastHub<M>,
    id: ListenerId,
}

impl<M> ListenerGuard<M> {
    /// The guarded listener.
    pub fn id(&self) -> ListenerId {
        self.id
    }
}

impl<M> fmt::Debug for ListenerGuard<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerGuard").field("id", &self.id).finish()
    }
}

impl<M> Drop for ListenerGuard<M> {
    fn drop(&mut self) {
        self.hub.destroy_listener(self.id);
    }
}
