//! The two shapes of computation a [`CancellableFuture`](crate::CancellableFuture) can run.
//!
//! The shape is chosen by the caller when the body is built, never guessed
//! from the closure itself:
//!
//! - [`Body::direct`] wraps a function that produces its own future. The
//!   future's output settles the handle.
//! - [`Body::callback`] wraps a function that is handed explicit
//!   [`Settle`] and [`Fail`] callbacks and must call one of them, now or
//!   later. Returning `Err` from the function itself counts as failing
//!   immediately.
//!
//! Both shapes receive the [`AbortSignal`] of the handle and any extra
//! arguments given to
//! [`CancellableFuture::with_args()`](crate::CancellableFuture::with_args).

use crate::{
    signal::AbortSignal,
    slot::{Fail, Settle},
};
use alloc::boxed::Box;
use core::future::Future;
use futures::{FutureExt, future::BoxFuture};

pub type DirectFn<T, E, A> =
    Box<dyn FnOnce(AbortSignal<E>, A) -> BoxFuture<'static, Result<T, E>> + Send>;

pub type CallbackFn<T, E, A> =
    Box<dyn FnOnce(Settle<T, E>, Fail<T, E>, AbortSignal<E>, A) -> Result<(), E> + Send>;

/// A computation body, tagged with its calling convention.
pub enum Body<T, E, A = ()> {
    /// Produces its own future; see [`Body::direct`].
    Direct(DirectFn<T, E, A>),
    /// Settles through callbacks; see [`Body::callback`].
    Callback(CallbackFn<T, E, A>),
}

impl<T, E, A> Body<T, E, A> {
    /// Wraps a function returning a future of `Result<T, E>`.
    ///
    /// ```
    /// use hardy_future::Body;
    ///
    /// let body: Body<u32, String> = Body::direct(|signal, ()| async move {
    ///     if signal.is_aborted() {
    ///         return Err("aborted before starting".to_string());
    ///     }
    ///     Ok(200)
    /// });
    /// ```
    pub fn direct<F, Fut>(f: F) -> Self
    where
        F: FnOnce(AbortSignal<E>, A) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        Self::Direct(Box::new(move |signal, args| f(signal, args).boxed()))
    }

    /// Wraps a function that settles through the [`Settle`] and [`Fail`]
    /// callbacks it is given.
    ///
    /// ```
    /// use hardy_future::Body;
    ///
    /// let body: Body<u32, &str> = Body::callback(|settle, fail, signal, ()| {
    ///     signal.on_abort(move |reason| {
    ///         fail.fail(*reason);
    ///     });
    ///     settle.settle(200);
    ///     Ok(())
    /// });
    /// ```
    pub fn callback<F>(f: F) -> Self
    where
        F: FnOnce(Settle<T, E>, Fail<T, E>, AbortSignal<E>, A) -> Result<(), E> + Send + 'static,
    {
        Self::Callback(Box::new(f))
    }
}

impl<T, E, A> core::fmt::Debug for Body<T, E, A> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Direct(_) => f.write_str("Body::Direct"),
            Self::Callback(_) => f.write_str("Body::Callback"),
        }
    }
}
