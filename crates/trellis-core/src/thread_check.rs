//! Thread affinity checks for widget trees and broadcast hubs.
//!
//! Trellis runs on one logical thread: every dispatch, publish and tree
//! mutation executes to completion on the host's UI/update thread. The state
//! behind a [`WidgetTree`](crate::WidgetTree) is only ever locked for
//! bookkeeping, so nothing stops a careless host from touching it from two
//! threads at once and interleaving two dispatch passes. [`ThreadAffinity`]
//! records the thread a structure was created on and lets every entry point
//! verify it is still being driven from there.
//!
//! ```
//! use trellis_core::thread_check::ThreadAffinity;
//!
//! let affinity = ThreadAffinity::current();
//! assert!(affinity.is_same_thread());
//! affinity.check("update the widget tree");
//! ```

use std::thread::ThreadId;

/// Records the creating thread of a tree or hub and asserts later calls happen
/// on it.
///
/// Checks can be switched off per instance (see
/// [`TreeConfig::thread_checks`](crate::TreeConfig::thread_checks)); a hub
/// whose owner drives it from a serialized worker can opt out the same way.
#[derive(Debug, Clone, Copy)]
pub struct ThreadAffinity {
    thread_id: ThreadId,
    enabled: bool,
}

impl Default for ThreadAffinity {
    fn default() -> Self {
        Self::current()
    }
}

impl ThreadAffinity {
    /// Bind to the current thread with checks enabled in debug builds.
    #[inline]
    pub fn current() -> Self {
        Self::with_checks(cfg!(debug_assertions))
    }

    /// Bind to the current thread with checks explicitly enabled or disabled.
    #[inline]
    pub fn with_checks(enabled: bool) -> Self {
        Self {
            thread_id: std::thread::current().id(),
            enabled,
        }
    }

    /// The thread this affinity is bound to.
    #[inline]
    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    /// Whether [`check`](Self::check) actually verifies anything.
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Check if the current thread matches this affinity.
    #[inline]
    pub fn is_same_thread(&self) -> bool {
        std::thread::current().id() == self.thread_id
    }

    /// Panic if checks are enabled and we are on a different thread.
    ///
    /// `operation` names what the caller was trying to do and ends up in the
    /// panic message.
    #[inline]
    #[track_caller]
    pub fn check(&self, operation: &str) {
        if self.enabled && !self.is_same_thread() {
            self.panic_wrong_thread(operation);
        }
    }

    #[cold]
    #[inline(never)]
    #[track_caller]
    fn panic_wrong_thread(&self, operation: &str) -> ! {
        let current = std::thread::current();
        let current_name = current.name().unwrap_or("<unnamed>");
        let current_id = current.id();

        panic!(
            "thread affinity violation: cannot {operation} from thread \"{current_name}\" \
             ({current_id:?}); the structure belongs to thread {:?}. Serialize access \
             through the owning thread or disable thread checks in TreeConfig.",
            self.thread_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_thread_affinity_same_thread() {
        let affinity = ThreadAffinity::with_checks(true);
        assert!(affinity.is_same_thread());
        affinity.check("run on the owning thread");
    }

    #[test]
    fn test_thread_affinity_different_thread() {
        let affinity = ThreadAffinity::current();
        let result = Arc::new(AtomicBool::new(false));
        let result_clone = result.clone();

        std::thread::spawn(move || {
            result_clone.store(!affinity.is_same_thread(), Ordering::SeqCst);
        })
        .join()
        .unwrap();

        assert!(result.load(Ordering::SeqCst));
    }

    #[test]
    fn test_check_panics_on_wrong_thread() {
        let affinity = ThreadAffinity::with_checks(true);

        let result = std::thread::spawn(move || {
            affinity.check("touch the tree");
        })
        .join();

        assert!(result.is_err(), "expected an affinity violation panic");
    }

    #[test]
    fn test_disabled_check_is_silent() {
        let affinity = ThreadAffinity::with_checks(false);
        assert!(!affinity.is_enabled());

        let result = std::thread::spawn(move || {
            affinity.check("touch the tree");
        })
        .join();

        assert!(result.is_ok());
    }
}
