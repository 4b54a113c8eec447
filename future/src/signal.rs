//! Abort signals for cooperative cancellation.
//!
//! This module provides an [`AbortController`] / [`AbortSignal`] pair. The
//! controller is the trigger; the signal is the read-only side handed to a
//! computation so it can notice that it has been asked to stop.
//!
//! # Current Implementation
//!
//! The aborted flag is carried by a `tokio_util::sync::CancellationToken`,
//! so a signal can be awaited from any task and bridged into code that
//! already speaks in cancellation tokens. On top of the token the signal
//! records the abort reason exactly once and runs synchronous listeners,
//! which lets callback-style code react to an abort without spawning a task.
//!
//! Aborting never forces anything: a computation that ignores its signal
//! simply carries on.
//!
//! # Example
//!
//! ```no_run
//! use hardy_future::AbortController;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let controller = AbortController::<&'static str>::new();
//! let signal = controller.signal();
//!
//! tokio::spawn(async move {
//!     signal.aborted().await;
//!     println!("Aborted: {:?}", signal.reason());
//! });
//!
//! controller.abort("no longer needed");
//! # });
//! ```

use alloc::{
    boxed::Box,
    sync::{Arc, Weak},
    vec::Vec,
};
use std::sync::OnceLock;
use tokio_util::sync::CancellationToken;
use tracing::trace;

type Listener<R> = Box<dyn FnOnce(&R) + Send>;

struct Listeners<R> {
    next_id: u64,
    entries: Vec<(u64, Listener<R>)>,
    // Set once the abort has run every queued listener
    drained: bool,
}

struct Inner<R> {
    token: CancellationToken,
    reason: OnceLock<R>,
    // The reason is published while this is held
    listeners: spin::Mutex<Listeners<R>>,
}

impl<R> Inner<R> {
    fn remove(&self, ids: &[u64]) -> usize {
        let removed: Vec<_> = {
            let mut listeners = self.listeners.lock();
            let (removed, kept): (Vec<_>, Vec<_>) = core::mem::take(&mut listeners.entries)
                .into_iter()
                .partition(|(id, _)| ids.contains(id));
            listeners.entries = kept;
            removed
        };
        removed.len()
    }

    // Runs `batch`, then anything registered while it ran, until nothing is left
    fn drain(&self, mut batch: Vec<(u64, Listener<R>)>) {
        loop {
            if let Some(reason) = self.reason.get() {
                for (_, listener) in batch {
                    listener(reason);
                }
            }

            let mut listeners = self.listeners.lock();
            if listeners.entries.is_empty() {
                listeners.drained = true;
                return;
            }
            batch = core::mem::take(&mut listeners.entries);
        }
    }
}

/// The observable side of an abort.
///
/// Clones share the same underlying state. A signal can be inspected with
/// [`is_aborted()`](AbortSignal::is_aborted), awaited with
/// [`aborted()`](AbortSignal::aborted), or observed with a one-shot
/// [`on_abort()`](AbortSignal::on_abort) listener. It cannot be used to
/// trigger an abort; that is reserved to the [`AbortController`].
///
/// The signal handed to a [`CancellableFuture`](crate::CancellableFuture)
/// body is tied to that future: listeners registered through it are
/// dropped, unrun, once the future settles.
pub struct AbortSignal<R> {
    inner: Arc<Inner<R>>,
    scope: Option<Arc<Scope<R>>>,
}

impl<R> AbortSignal<R> {
    fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                token: CancellationToken::new(),
                reason: OnceLock::new(),
                listeners: spin::Mutex::new(Listeners {
                    next_id: 0,
                    entries: Vec::new(),
                    drained: false,
                }),
            }),
            scope: None,
        }
    }

    /// Creates a signal that is already aborted with `reason`.
    pub fn aborted_with(reason: R) -> Self {
        let controller = AbortController::new();
        controller.abort(reason);
        controller.signal()
    }

    /// Returns a view of this signal whose listeners are removed when the
    /// returned [`Scope`] is released.
    pub(crate) fn scoped(&self) -> (Self, Arc<Scope<R>>) {
        let scope = Arc::new(Scope {
            inner: Arc::downgrade(&self.inner),
            ids: spin::Mutex::new(Some(Vec::new())),
        });
        (
            Self {
                inner: self.inner.clone(),
                scope: Some(scope.clone()),
            },
            scope,
        )
    }

    /// Checks if an abort has been requested.
    pub fn is_aborted(&self) -> bool {
        self.inner.reason.get().is_some()
    }

    /// The reason given to [`AbortController::abort()`], or `None` if the
    /// signal has not been aborted.
    pub fn reason(&self) -> Option<&R> {
        self.inner.reason.get()
    }

    /// Completes once the signal is aborted.
    ///
    /// Returns immediately if the abort has already happened. If the
    /// controller is dropped without aborting, this never completes.
    pub async fn aborted(&self) {
        self.inner.token.cancelled().await
    }

    /// Registers a listener that is called exactly once with the abort reason.
    ///
    /// Listeners run on the thread that calls [`AbortController::abort()`],
    /// in registration order. A listener registered while an abort is still
    /// notifying, from a listener or from another thread, is queued behind
    /// the ones already registered. Once the abort has finished notifying,
    /// new listeners run immediately on the calling thread.
    ///
    /// The returned [`AbortRegistration`] can remove the listener before it
    /// runs. Dropping it leaves the listener registered.
    pub fn on_abort<F>(&self, listener: F) -> AbortRegistration<R>
    where
        F: FnOnce(&R) + Send + 'static,
    {
        let mut listeners = self.inner.listeners.lock();
        if listeners.drained {
            drop(listeners);
            if let Some(reason) = self.inner.reason.get() {
                listener(reason);
            }
            return AbortRegistration::inert();
        }

        let id = listeners.next_id;
        if let Some(scope) = &self.scope {
            if !scope.track(id) {
                drop(listeners);
                trace!("Dropping abort listener registered after its future settled");
                return AbortRegistration::inert();
            }
        }
        listeners.next_id += 1;
        listeners.entries.push((id, Box::new(listener)));

        AbortRegistration {
            inner: Arc::downgrade(&self.inner),
            id: Some(id),
        }
    }

    /// Returns a child cancellation token that is cancelled when this signal
    /// is aborted.
    ///
    /// Cancelling the returned token does not abort the signal.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.inner.token.child_token()
    }

    #[cfg(test)]
    pub(crate) fn listener_count(&self) -> usize {
        self.inner.listeners.lock().entries.len()
    }
}

impl<R> Clone for AbortSignal<R> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            scope: self.scope.clone(),
        }
    }
}

impl<R> core::fmt::Debug for AbortSignal<R> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AbortSignal")
            .field("aborted", &self.is_aborted())
            .finish()
    }
}

/// A listener registered with [`AbortSignal::on_abort()`].
pub struct AbortRegistration<R> {
    inner: Weak<Inner<R>>,
    // `None` when the listener ran, or was dropped, during registration
    id: Option<u64>,
}

impl<R> AbortRegistration<R> {
    fn inert() -> Self {
        Self {
            inner: Weak::new(),
            id: None,
        }
    }

    /// Removes the listener without running it.
    ///
    /// Returns `false` if the listener has already run or been removed.
    pub fn remove(self) -> bool {
        match (self.id, self.inner.upgrade()) {
            (Some(id), Some(inner)) => inner.remove(&[id]) > 0,
            _ => false,
        }
    }
}

impl<R> core::fmt::Debug for AbortRegistration<R> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AbortRegistration")
            .field("id", &self.id)
            .finish()
    }
}

/// Tracks the listeners registered through one scoped [`AbortSignal`].
pub(crate) struct Scope<R> {
    inner: Weak<Inner<R>>,
    // `None` once released
    ids: spin::Mutex<Option<Vec<u64>>>,
}

impl<R> Scope<R> {
    fn track(&self, id: u64) -> bool {
        match self.ids.lock().as_mut() {
            Some(ids) => {
                ids.push(id);
                true
            }
            None => false,
        }
    }

    /// Removes every listener registered through the scoped signal, and
    /// drops any registered later.
    pub fn release(&self) {
        let Some(ids) = self.ids.lock().take() else {
            return;
        };
        if let Some(inner) = self.inner.upgrade() {
            let removed = inner.remove(&ids);
            if removed > 0 {
                trace!("Released {removed} abort listeners of a settled future");
            }
        }
    }
}

/// The trigger side of an abort.
///
/// A controller is not `Clone`: whoever holds it, or borrows it, is the
/// only party able to abort. Hand out [`signal()`](AbortController::signal)
/// to everyone else.
///
/// # Key Methods
///
/// - [`new()`](AbortController::new) - Create a controller with a fresh signal
/// - [`signal()`](AbortController::signal) - Get the signal to hand out
/// - [`abort()`](AbortController::abort) - Abort the signal with a reason
pub struct AbortController<R> {
    signal: AbortSignal<R>,
}

impl<R> AbortController<R> {
    /// Creates a new controller with a signal that is not aborted.
    pub fn new() -> Self {
        Self {
            signal: AbortSignal::new(),
        }
    }

    /// Returns the signal controlled by this controller.
    pub fn signal(&self) -> AbortSignal<R> {
        self.signal.clone()
    }

    /// Aborts the signal with `reason`.
    ///
    /// The first call records the reason, wakes everything waiting in
    /// [`AbortSignal::aborted()`] and runs the registered listeners in order.
    /// Later calls are no-ops; the first reason is kept and `false` is
    /// returned.
    pub fn abort(&self, reason: R) -> bool {
        let inner = &self.signal.inner;
        let listeners = {
            let mut listeners = inner.listeners.lock();
            if inner.reason.set(reason).is_err() {
                trace!("Ignoring abort of an already aborted signal");
                return false;
            }
            core::mem::take(&mut listeners.entries)
        };

        inner.token.cancel();

        trace!("Signal aborted, notifying {} listeners", listeners.len());
        inner.drain(listeners);
        true
    }

    /// Checks if [`abort()`](AbortController::abort) has been called.
    pub fn is_aborted(&self) -> bool {
        self.signal.is_aborted()
    }
}

impl<R> Default for AbortController<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> core::fmt::Debug for AbortController<R> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AbortController")
            .field("signal", &self.signal)
            .finish()
    }
}
