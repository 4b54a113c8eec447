//! Settle-once storage for the outcome of a computation.
//!
//! A [`Slot`] is written at most once, with either the success or the
//! failure payload, and wakes every task that polled it while it was empty.
//! The outcome is published before any waker runs, so a woken task always
//! finds it populated.
//!
//! A slot whose computation panicked is finished too: it holds the panic
//! payload instead of an outcome and hands it to the first poller.

use alloc::{boxed::Box, sync::Arc, vec::Vec};
use core::{
    any::Any,
    task::{Context, Poll, Waker},
};
use std::sync::OnceLock;
use tracing::trace;

pub(crate) type PanicPayload = Box<dyn Any + Send>;

type Hook = Box<dyn FnOnce() + Send>;

enum Terminal<T, E> {
    Settled(Result<T, E>),
    Panicked,
}

/// What a poller finds once the slot is finished.
pub(crate) enum Finished<'a, T, E> {
    Settled(&'a Result<T, E>),
    /// The payload goes to the first poller only.
    Panicked(Option<PanicPayload>),
}

pub(crate) struct Slot<T, E> {
    terminal: OnceLock<Terminal<T, E>>,
    panic: spin::Mutex<Option<PanicPayload>>,
    // Drained by the first settle; the terminal is published while this is held
    wakers: spin::Mutex<Vec<Waker>>,
    on_settled: spin::Mutex<Option<Hook>>,
}

impl<T, E> Slot<T, E> {
    pub fn new() -> Self {
        Self {
            terminal: OnceLock::new(),
            panic: spin::Mutex::new(None),
            wakers: spin::Mutex::new(Vec::new()),
            on_settled: spin::Mutex::new(None),
        }
    }

    pub fn get(&self) -> Option<&Result<T, E>> {
        match self.terminal.get() {
            Some(Terminal::Settled(outcome)) => Some(outcome),
            _ => None,
        }
    }

    pub fn is_panicked(&self) -> bool {
        matches!(self.terminal.get(), Some(Terminal::Panicked))
    }

    pub fn is_finished(&self) -> bool {
        self.terminal.get().is_some()
    }

    /// Runs `hook` once the slot is finished, or straight away if it already is.
    pub fn on_settled<F>(&self, hook: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut on_settled = self.on_settled.lock();
        if self.terminal.get().is_none() {
            *on_settled = Some(Box::new(hook));
            return;
        }
        drop(on_settled);
        hook();
    }

    /// Publishes `outcome` and wakes pending pollers in registration order.
    ///
    /// Returns `false`, leaving the slot untouched, if it has already settled.
    pub fn settle(&self, outcome: Result<T, E>) -> bool {
        self.finish(Terminal::Settled(outcome))
    }

    /// Records that the computation panicked with `payload`, and wakes
    /// pending pollers so they can resume the panic.
    pub fn poison(&self, payload: PanicPayload) -> bool {
        *self.panic.lock() = Some(payload);
        if self.finish(Terminal::Panicked) {
            return true;
        }
        let payload = self.panic.lock().take();
        drop(payload);
        false
    }

    fn finish(&self, terminal: Terminal<T, E>) -> bool {
        let wakers = {
            let mut wakers = self.wakers.lock();
            if self.terminal.set(terminal).is_err() {
                trace!("Ignoring settlement of an already settled future");
                return false;
            }
            core::mem::take(&mut *wakers)
        };

        for waker in wakers {
            waker.wake();
        }

        let hook = self.on_settled.lock().take();
        if let Some(hook) = hook {
            hook();
        }
        true
    }

    pub fn poll_settled(&self, cx: &mut Context<'_>) -> Poll<Finished<'_, T, E>> {
        if let Some(terminal) = self.terminal.get() {
            return Poll::Ready(self.finished(terminal));
        }

        let mut wakers = self.wakers.lock();

        // Settlement may have raced us to the lock
        if let Some(terminal) = self.terminal.get() {
            drop(wakers);
            return Poll::Ready(self.finished(terminal));
        }

        if !wakers.iter().any(|w| w.will_wake(cx.waker())) {
            wakers.push(cx.waker().clone());
        }
        Poll::Pending
    }

    fn finished<'a>(&self, terminal: &'a Terminal<T, E>) -> Finished<'a, T, E> {
        match terminal {
            Terminal::Settled(outcome) => Finished::Settled(outcome),
            Terminal::Panicked => Finished::Panicked(self.panic.lock().take()),
        }
    }
}

/// The success callback handed to a callback-style body.
///
/// Cloneable, so it can be moved into timers, tasks or abort listeners.
/// Only the first call to either this or the matching [`Fail`] has any
/// effect.
pub struct Settle<T, E>(pub(crate) Arc<Slot<T, E>>);

impl<T, E> Settle<T, E> {
    /// Fulfills the future with `value`.
    ///
    /// Returns `false` if the future had already settled, in which case
    /// `value` is dropped.
    pub fn settle(&self, value: T) -> bool {
        self.0.settle(Ok(value))
    }
}

impl<T, E> Clone for Settle<T, E> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T, E> core::fmt::Debug for Settle<T, E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Settle")
            .field("settled", &self.0.is_finished())
            .finish()
    }
}

/// The failure callback handed to a callback-style body.
///
/// See [`Settle`].
pub struct Fail<T, E>(pub(crate) Arc<Slot<T, E>>);

impl<T, E> Fail<T, E> {
    /// Rejects the future with `error`.
    ///
    /// Returns `false` if the future had already settled, in which case
    /// `error` is dropped.
    pub fn fail(&self, error: E) -> bool {
        self.0.settle(Err(error))
    }
}

impl<T, E> Clone for Fail<T, E> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T, E> core::fmt::Debug for Fail<T, E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Fail")
            .field("settled", &self.0.is_finished())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::task::{ArcWake, waker};
    use std::sync::Mutex;

    struct Recorder {
        id: usize,
        woken: Arc<Mutex<Vec<usize>>>,
    }

    impl ArcWake for Recorder {
        fn wake_by_ref(arc_self: &Arc<Self>) {
            arc_self.woken.lock().unwrap().push(arc_self.id);
        }
    }

    fn recorder(id: usize, woken: &Arc<Mutex<Vec<usize>>>) -> Waker {
        waker(Arc::new(Recorder {
            id,
            woken: woken.clone(),
        }))
    }

    #[test]
    fn settles_once() {
        let slot = Slot::<u8, &str>::new();
        assert!(slot.get().is_none());

        assert!(slot.settle(Ok(7)));
        assert!(!slot.settle(Err("late")));
        assert!(!slot.settle(Ok(8)));

        assert_eq!(slot.get(), Some(&Ok(7)));
    }

    #[test]
    fn wakes_pollers_in_order() {
        let slot = Slot::<u8, ()>::new();
        let woken = Arc::new(Mutex::new(Vec::new()));

        for id in 0..3 {
            let waker = recorder(id, &woken);
            let mut cx = Context::from_waker(&waker);
            assert!(slot.poll_settled(&mut cx).is_pending());
        }
        assert!(woken.lock().unwrap().is_empty());

        slot.settle(Ok(1));
        assert_eq!(*woken.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn same_waker_is_registered_once() {
        let slot = Slot::<u8, ()>::new();
        let woken = Arc::new(Mutex::new(Vec::new()));
        let waker = recorder(0, &woken);
        let mut cx = Context::from_waker(&waker);

        assert!(slot.poll_settled(&mut cx).is_pending());
        assert!(slot.poll_settled(&mut cx).is_pending());

        slot.settle(Err(()));
        assert_eq!(*woken.lock().unwrap(), vec![0]);
        assert!(matches!(
            slot.poll_settled(&mut cx),
            Poll::Ready(Finished::Settled(Err(())))
        ));
    }

    #[test]
    fn panic_payload_goes_to_first_poller() {
        let slot = Slot::<u8, ()>::new();
        let woken = Arc::new(Mutex::new(Vec::new()));
        for id in 0..2 {
            let waker = recorder(id, &woken);
            let mut cx = Context::from_waker(&waker);
            assert!(slot.poll_settled(&mut cx).is_pending());
        }

        assert!(slot.poison(Box::new("body exploded")));
        assert!(!slot.settle(Ok(1)));
        assert_eq!(*woken.lock().unwrap(), vec![0, 1]);
        assert!(slot.is_panicked());
        assert!(slot.get().is_none());

        let waker = recorder(2, &woken);
        let mut cx = Context::from_waker(&waker);
        match slot.poll_settled(&mut cx) {
            Poll::Ready(Finished::Panicked(Some(payload))) => {
                assert_eq!(payload.downcast_ref::<&str>(), Some(&"body exploded"));
            }
            _ => panic!("expected the panic payload"),
        }
        assert!(matches!(
            slot.poll_settled(&mut cx),
            Poll::Ready(Finished::Panicked(None))
        ));
    }

    #[test]
    fn settled_hook_runs_once() {
        let slot = Slot::<u8, ()>::new();
        let runs = Arc::new(Mutex::new(0));

        let runs2 = runs.clone();
        slot.on_settled(move || *runs2.lock().unwrap() += 1);
        assert_eq!(*runs.lock().unwrap(), 0);

        slot.settle(Ok(1));
        slot.settle(Ok(2));
        assert_eq!(*runs.lock().unwrap(), 1);

        // Already settled, so this one runs straight away
        let runs2 = runs.clone();
        slot.on_settled(move || *runs2.lock().unwrap() += 1);
        assert_eq!(*runs.lock().unwrap(), 2);
    }

    #[test]
    fn callbacks_share_the_slot() {
        let slot = Arc::new(Slot::<u8, u16>::new());
        let settle = Settle(slot.clone());
        let fail = Fail(slot.clone());

        assert!(fail.clone().fail(404));
        assert!(!settle.settle(200));
        assert_eq!(slot.get(), Some(&Err(404)));
    }
}
