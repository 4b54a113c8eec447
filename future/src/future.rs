//! The cancellable, observable future.
//!
//! A [`CancellableFuture`] runs a computation [`Body`] as soon as it is
//! constructed and caches whatever the body settles with. The cached outcome
//! can be read synchronously through [`value()`](CancellableFuture::value)
//! at any time, and the handle can also be awaited, cloned and chained like
//! any other future.
//!
//! Cancellation is cooperative. Every body receives an [`AbortSignal`];
//! aborting it only records a reason and notifies observers. Turning that
//! into a failure is up to the body.

use crate::{
    body::Body,
    error::{self, Aborted, Error},
    options::Options,
    signal::{AbortController, AbortSignal},
    slot::{Fail, Finished, Settle, Slot},
    spawn,
};
use alloc::sync::Arc;
use core::{
    future::Future,
    pin::Pin,
    task::{Context, Poll, ready},
};
use futures::future;
use tracing::{debug, trace};

#[cfg(feature = "instrument")]
use tracing::instrument;

/// The settlement state of a [`CancellableFuture`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Pending,
    Fulfilled,
    Rejected,
    /// A direct-style body panicked; awaiting the future resumes the panic.
    Panicked,
}

/// What a [`CancellableFuture`] offers for aborting its body.
///
/// A trigger is a snapshot taken when [`trigger()`](CancellableFuture::trigger)
/// is called. [`CancellableFuture::abort()`] re-checks the state instead.
pub enum Trigger<'a, E> {
    /// The future owns its signal and has not settled yet.
    ///
    /// The controller is only borrowed and cannot be cloned, so it cannot
    /// outlive the future. A future that settles while the borrow is held
    /// still accepts an abort through it: the signal records the reason,
    /// but the outcome is already fixed and the body's listeners are gone.
    Available(&'a AbortController<E>),
    /// The signal was supplied by the caller, who must abort it themselves.
    Unavailable,
    /// The future owns its signal but has already settled.
    Spent,
}

impl<E> core::fmt::Debug for Trigger<'_, E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Available(controller) => {
                f.debug_tuple("Available").field(controller).finish()
            }
            Self::Unavailable => f.write_str("Unavailable"),
            Self::Spent => f.write_str("Spent"),
        }
    }
}

enum Source<E> {
    Owned(AbortController<E>),
    Borrowed,
}

/// A future that caches its outcome and can be aborted cooperatively.
///
/// Clones share the same computation and cache; awaiting any of them yields
/// a clone of the same outcome, as many times as needed.
pub struct CancellableFuture<T, E> {
    slot: Arc<Slot<T, E>>,
    signal: AbortSignal<E>,
    source: Arc<Source<E>>,
}

impl<T, E> CancellableFuture<T, E>
where
    T: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    /// Runs `body` with a freshly created abort signal.
    ///
    /// # Panics
    ///
    /// Direct-style bodies are driven by a task on the current tokio runtime,
    /// so constructing one from outside a runtime panics.
    pub fn new(body: Body<T, E>) -> Self {
        Self::with_args(body, Options::default(), ())
    }

    /// Runs `body` configured by `options`.
    pub fn with_options(body: Body<T, E>, options: Options<E>) -> Self {
        Self::with_args(body, options, ())
    }

    /// Runs `body` configured by `options`, passing `args` through to it.
    ///
    /// The body is invoked before this returns. A callback-style body that
    /// settles synchronously, or returns `Err`, leaves the future already
    /// settled; otherwise it settles whenever the body gets round to it.
    ///
    /// Abort listeners the body registers through its signal are removed
    /// when the future settles, so a long-lived borrowed signal does not
    /// accumulate them.
    #[cfg_attr(feature = "instrument", instrument(skip_all, fields(name = options.name)))]
    pub fn with_args<A>(body: Body<T, E, A>, options: Options<E>, args: A) -> Self {
        let (source, signal) = match options.signal {
            Some(signal) => {
                trace!("Using caller-supplied abort signal");
                (Source::Borrowed, signal)
            }
            None => {
                let controller = AbortController::new();
                let signal = controller.signal();
                (Source::Owned(controller), signal)
            }
        };

        let slot = Arc::new(Slot::new());
        let (scoped, scope) = signal.scoped();
        slot.on_settled(move || scope.release());

        match body {
            Body::Direct(f) => {
                let computation = f(scoped, args);
                spawn::settle_with(options.name, slot.clone(), computation);
            }
            Body::Callback(f) => {
                if let Err(e) = f(Settle(slot.clone()), Fail(slot.clone()), scoped, args) {
                    debug!("Callback-style body failed during invocation");
                    slot.settle(Err(e));
                }
            }
        }

        Self {
            slot,
            signal,
            source: Arc::new(source),
        }
    }
}

impl<T, E> CancellableFuture<T, E> {
    /// The current settlement state.
    pub fn state(&self) -> State {
        match self.slot.get() {
            Some(Ok(_)) => State::Fulfilled,
            Some(Err(_)) => State::Rejected,
            None if self.slot.is_panicked() => State::Panicked,
            None => State::Pending,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.state() == State::Pending
    }

    /// The cached outcome: `None` until the body settles, then the success or
    /// failure payload for the rest of the future's life.
    ///
    /// A future whose body panicked has no outcome and stays at `None`.
    pub fn value(&self) -> Option<&Result<T, E>> {
        self.slot.get()
    }

    /// The abort trigger, if this future owns one and has not settled.
    pub fn trigger(&self) -> Trigger<'_, E> {
        match self.source.as_ref() {
            Source::Borrowed => Trigger::Unavailable,
            Source::Owned(_) if !self.is_pending() => Trigger::Spent,
            Source::Owned(controller) => Trigger::Available(controller),
        }
    }

    /// The signal handed to the body.
    ///
    /// Listeners registered through this handle, unlike the body's, are not
    /// removed when the future settles.
    pub fn signal(&self) -> &AbortSignal<E> {
        &self.signal
    }

    /// Aborts the body's signal with `reason`.
    ///
    /// Only the signal is touched: the body decides what, if anything, to do
    /// about it. Aborting an already aborted signal is a no-op that still
    /// returns `Ok`.
    ///
    /// # Errors
    ///
    /// Nothing is aborted and an error is returned if the signal belongs to
    /// the caller ([`Error::TriggerUnavailable`]) or if the future has
    /// already settled ([`Error::TriggerSpent`]).
    pub fn abort(&self, reason: E) -> error::Result<()> {
        match self.trigger() {
            Trigger::Available(controller) => {
                controller.abort(reason);
                Ok(())
            }
            Trigger::Unavailable => Err(Error::TriggerUnavailable),
            Trigger::Spent => {
                trace!("Ignoring abort of a settled future");
                Err(Error::TriggerSpent)
            }
        }
    }

    /// Aborts with the generic [`Aborted`] reason.
    pub fn cancel(&self) -> error::Result<()>
    where
        E: From<Aborted>,
    {
        self.abort(Aborted.into())
    }
}

impl<T, E> CancellableFuture<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Chains continuations for both outcomes, like `then(onFulfilled, onRejected)`.
    ///
    /// The returned future is a new [`CancellableFuture`] settled by whichever
    /// continuation runs. Continuations receive clones of the cached payload,
    /// so any number of chains can hang off the same future.
    pub fn chain<U, X, OnOk, FutOk, OnErr, FutErr>(
        &self,
        on_fulfilled: OnOk,
        on_rejected: OnErr,
    ) -> CancellableFuture<U, X>
    where
        U: Send + Sync + 'static,
        X: Send + Sync + 'static,
        OnOk: FnOnce(T) -> FutOk + Send + 'static,
        FutOk: Future<Output = Result<U, X>> + Send + 'static,
        OnErr: FnOnce(E) -> FutErr + Send + 'static,
        FutErr: Future<Output = Result<U, X>> + Send + 'static,
    {
        let source = self.clone();
        CancellableFuture::new(Body::direct(move |_, ()| async move {
            match source.await {
                Ok(value) => on_fulfilled(value).await,
                Err(e) => on_rejected(e).await,
            }
        }))
    }

    /// Chains a continuation for failure only, like `catch(onRejected)`.
    ///
    /// Success passes through untouched.
    pub fn catch<X, OnErr, FutErr>(&self, on_rejected: OnErr) -> CancellableFuture<T, X>
    where
        X: Send + Sync + 'static,
        OnErr: FnOnce(E) -> FutErr + Send + 'static,
        FutErr: Future<Output = Result<T, X>> + Send + 'static,
    {
        self.chain(|value| future::ready(Ok(value)), on_rejected)
    }

    /// Runs `on_settled` once this future settles either way, then passes the
    /// original outcome through, like `finally(onFinally)`.
    pub fn finally<OnSettled, Fut>(&self, on_settled: OnSettled) -> CancellableFuture<T, E>
    where
        OnSettled: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let source = self.clone();
        CancellableFuture::new(Body::direct(move |_, ()| async move {
            let outcome = source.await;
            on_settled().await;
            outcome
        }))
    }
}

/// # Panics
///
/// If a direct-style body panicked, polling resumes that panic. Only the
/// first poll to find it gets the original payload; later ones panic with a
/// fresh message.
impl<T: Clone, E: Clone> Future for CancellableFuture<T, E> {
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match ready!(self.slot.poll_settled(cx)) {
            Finished::Settled(outcome) => Poll::Ready(outcome.clone()),
            Finished::Panicked(Some(payload)) => std::panic::resume_unwind(payload),
            Finished::Panicked(None) => panic!("the body of this future panicked"),
        }
    }
}

impl<T, E> Clone for CancellableFuture<T, E> {
    fn clone(&self) -> Self {
        Self {
            slot: self.slot.clone(),
            signal: self.signal.clone(),
            source: self.source.clone(),
        }
    }
}

impl<T, E> core::fmt::Debug for CancellableFuture<T, E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CancellableFuture")
            .field("state", &self.state())
            .field("trigger", &self.trigger())
            .field("signal", &self.signal)
            .finish()
    }
}
