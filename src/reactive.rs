//! Minimal reactive primitives.
//!
//! - [`Signal<T>`]: an observable cell.  Reads are cheap clones, writes notify
//!   every receiver obtained from [`Signal::subscribe`].
//! - [`Scope`]: owns cleanup callbacks and runs each of them exactly once when
//!   disposed or dropped.
//! - [`effect`]: re-runs a closure on every change of a signal until its scope
//!   is disposed.
//! - [`defer`]: runs a closure on a later turn of the runtime.
//!
//! Effects and deferred work are tokio tasks, so both require a running tokio
//! runtime.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;

///////////////////////////////////////////// Signal ////////////////////////////////////////////

/// An observable value shared by every clone of the handle.
pub struct Signal<T> {
    tx: Arc<watch::Sender<T>>,
}

impl<T> Signal<T> {
    /// Creates a signal holding `value`.
    pub fn new(value: T) -> Self {
        let (tx, _) = watch::channel(value);
        Self { tx: Arc::new(tx) }
    }

    /// Replaces the value and notifies observers.
    pub fn set(&self, value: T) {
        self.tx.send_replace(value);
    }

    /// Modifies the value in place and notifies observers.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        self.tx.send_modify(f);
    }

    /// Modifies the value in place, notifying observers only when `f` returns
    /// true.  Returns what `f` returned.
    ///
    /// The check and the write happen under one lock, so this can serve as a
    /// compare-and-set.
    pub fn update_if(&self, f: impl FnOnce(&mut T) -> bool) -> bool {
        self.tx.send_if_modified(f)
    }

    /// Reads the value through a closure without cloning it.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.tx.borrow())
    }

    /// Returns a receiver that observes every subsequent change.
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.tx.subscribe()
    }
}

impl<T: Clone> Signal<T> {
    /// Returns a copy of the current value.
    pub fn get(&self) -> T {
        self.tx.borrow().clone()
    }
}

impl<T: Default> Default for Signal<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            tx: Arc::clone(&self.tx),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Signal").field(&*self.tx.borrow()).finish()
    }
}

///////////////////////////////////////////// Scope /////////////////////////////////////////////

type Cleanup = Box<dyn FnOnce() + Send>;

/// Owner of cleanup callbacks.
///
/// Cleanups run in reverse registration order.  A cleanup registered after the
/// scope is disposed runs immediately.
#[derive(Default)]
pub struct Scope {
    cleanups: Mutex<Vec<Cleanup>>,
    disposed: AtomicBool,
}

impl Scope {
    /// Creates an empty scope.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Cleanup>> {
        self.cleanups.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Registers `f` to run when the scope is disposed.
    pub fn on_cleanup(&self, f: impl FnOnce() + Send + 'static) {
        let mut cleanups = self.lock();
        // Checked under the lock so a concurrent dispose cannot miss `f`.
        if self.disposed.load(Ordering::Acquire) {
            drop(cleanups);
            f();
            return;
        }
        cleanups.push(Box::new(f));
    }

    /// Returns true once [`Scope::dispose`] has run.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Runs every registered cleanup.  Later calls do nothing.
    pub fn dispose(&self) {
        let cleanups = {
            let mut cleanups = self.lock();
            if self.disposed.swap(true, Ordering::AcqRel) {
                return;
            }
            std::mem::take(&mut *cleanups)
        };
        for cleanup in cleanups.into_iter().rev() {
            cleanup();
        }
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

//////////////////////////////////////////// Effects ////////////////////////////////////////////

/// Runs `f` with the current value of `signal`, then again after every change,
/// until `scope` is disposed.
///
/// Several writes between two runs coalesce into one run with the latest value.
pub fn effect<T, F>(scope: &Scope, signal: &Signal<T>, mut f: F)
where
    T: Clone + Send + Sync + 'static,
    F: FnMut(T) + Send + 'static,
{
    let mut rx = signal.subscribe();
    let handle = tokio::spawn(async move {
        loop {
            let value = rx.borrow_and_update().clone();
            f(value);
            if rx.changed().await.is_err() {
                break;
            }
        }
    });
    scope.on_cleanup(move || handle.abort());
}

/// Runs `f` on a later turn of the runtime, after the current task yields.
pub fn defer(f: impl FnOnce() + Send + 'static) {
    tokio::spawn(async move {
        tokio::task::yield_now().await;
        f();
    });
}
