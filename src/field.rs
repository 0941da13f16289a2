//! Observable value with thread-safe listener registration.
//!
//! Listeners are stored in a copy-on-write list, so [`FieldChangeHub::set`]
//! iterates a snapshot without holding the list lock while listeners run.
//! Each listener carries a liveness flag and a reentrant gate held for the
//! duration of each call.
//!
//! [`FieldChangeHub::remove_listener`] clears the flag, so no call starts
//! afterwards. Called from outside any listener, it also takes the gate to
//! wait out a call in progress on another thread. Called from inside a
//! listener it does not wait, so listeners may remove themselves or each
//! other from any thread without deadlocking.

// ============================================================================
// Imports
// ============================================================================

use std::cell::Cell;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, ReentrantMutex, RwLock};

// ============================================================================
// Types
// ============================================================================

/// Callback invoked with the new value.
pub type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Registered listener, its liveness flag and its call gate.
struct Entry<T> {
    listener: Listener<T>,
    alive: Arc<AtomicBool>,
    gate: Arc<ReentrantMutex<()>>,
}

impl<T> Clone for Entry<T> {
    fn clone(&self) -> Self {
        Self {
            listener: Arc::clone(&self.listener),
            alive: Arc::clone(&self.alive),
            gate: Arc::clone(&self.gate),
        }
    }
}

/// Identity comparison that ignores vtable pointers.
fn same_listener<T>(a: &Listener<T>, b: &Listener<T>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

thread_local! {
    /// Number of listener calls on this thread's stack.
    static CALL_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Marks the current thread as inside a listener until dropped.
struct CallScope;

impl CallScope {
    fn enter() -> Self {
        CALL_DEPTH.with(|depth| depth.set(depth.get() + 1));
        Self
    }

    fn active() -> bool {
        CALL_DEPTH.with(|depth| depth.get() > 0)
    }
}

impl Drop for CallScope {
    fn drop(&mut self) {
        CALL_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

// ============================================================================
// FieldChangeHub
// ============================================================================

/// A value that notifies listeners synchronously on every `set`.
pub struct FieldChangeHub<T> {
    value: Mutex<T>,
    listeners: RwLock<Arc<[Entry<T>]>>,
}

impl<T: Clone> FieldChangeHub<T> {
    /// Creates a hub holding `initial`.
    #[must_use]
    pub fn new(initial: T) -> Self {
        Self {
            value: Mutex::new(initial),
            listeners: RwLock::new(Arc::from(Vec::new())),
        }
    }

    /// Returns a copy of the current value.
    #[must_use]
    pub fn get(&self) -> T {
        self.value.lock().clone()
    }

    /// Stores `value` and calls every registered listener with it.
    ///
    /// Listeners run on the calling thread.
    pub fn set(&self, value: T) {
        *self.value.lock() = value.clone();

        let snapshot = self.listeners.read().clone();
        for entry in snapshot.iter() {
            let _gate = entry.gate.lock();
            if entry.alive.load(Ordering::Acquire) {
                let _scope = CallScope::enter();
                (entry.listener)(&value);
            }
        }
    }

    /// Registers `listener`. Returns `false` if it was already registered.
    pub fn add_listener(&self, listener: Listener<T>) -> bool {
        let mut listeners = self.listeners.write();
        if listeners
            .iter()
            .any(|entry| same_listener(&entry.listener, &listener))
        {
            return false;
        }

        let mut next: Vec<Entry<T>> = listeners.to_vec();
        next.push(Entry {
            listener,
            alive: Arc::new(AtomicBool::new(true)),
            gate: Arc::new(ReentrantMutex::new(())),
        });
        *listeners = Arc::from(next);
        true
    }

    /// Unregisters `listener`. Returns `false` if it was not registered.
    ///
    /// No call of the listener starts after this returns. Outside a
    /// listener it also waits for a call already running on another thread.
    pub fn remove_listener(&self, listener: &Listener<T>) -> bool {
        let removed = {
            let mut listeners = self.listeners.write();
            let Some(index) = listeners
                .iter()
                .position(|entry| same_listener(&entry.listener, listener))
            else {
                return false;
            };

            let mut next: Vec<Entry<T>> = listeners.to_vec();
            let removed = next.remove(index);
            *listeners = Arc::from(next);
            removed
        };

        removed.alive.store(false, Ordering::Release);

        // Inside a listener the wait could close a cycle with another setter.
        if !CallScope::active() {
            drop(removed.gate.lock());
        }
        true
    }

    /// Registers `listener` until the returned guard is dropped.
    #[must_use = "the listener is removed when the guard is dropped"]
    pub fn register(&self, listener: Listener<T>) -> ListenerGuard<'_, T> {
        self.add_listener(Arc::clone(&listener));
        ListenerGuard {
            hub: self,
            listener,
        }
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }
}

impl<T: Clone + Default> Default for FieldChangeHub<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for FieldChangeHub<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldChangeHub")
            .field("value", &*self.value.lock())
            .field("listeners", &self.listeners.read().len())
            .finish()
    }
}

// ============================================================================
// ListenerGuard
// ============================================================================

/// Removes its listener on drop.
pub struct ListenerGuard<'a, T: Clone> {
    hub: &'a FieldChangeHub<T>,
    listener: Listener<T>,
}

impl<T: Clone> Drop for ListenerGuard<'_, T> {
    fn drop(&mut self) {
        self.hub.remove_listener(&self.listener);
    }
}

// ============================================================================
// Tests
// ============================================================================
