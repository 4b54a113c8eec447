//! Cancellable, observable futures for Hardy DTN.
//!
//! This crate provides [`CancellableFuture`], a future that starts its
//! computation as soon as it is created, remembers how it settled, and hands
//! its computation an [`AbortSignal`] for cooperative cancellation.
//!
//! # Features
//!
//! - **CancellableFuture**: Awaitable, cloneable handle with a synchronously
//!   readable cached outcome
//! - **Body**: Explicit choice between direct-style (returns a future) and
//!   callback-style (settles through [`Settle`] / [`Fail`]) computations
//! - **AbortController / AbortSignal**: Cooperative cancellation with a
//!   reason, built on `tokio_util`'s cancellation token
//!
//! # Example
//!
//! ```no_run
//! use hardy_future::{Body, CancellableFuture, State};
//! use std::time::Duration;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let response: CancellableFuture<u16, String> =
//!     CancellableFuture::new(Body::callback(|settle, fail, signal, ()| {
//!         // Give up when asked to
//!         signal.on_abort(move |reason: &String| {
//!             fail.fail(reason.clone());
//!         });
//!
//!         tokio::spawn(async move {
//!             tokio::time::sleep(Duration::from_millis(1500)).await;
//!             settle.settle(200);
//!         });
//!         Ok(())
//!     }));
//!
//! assert_eq!(response.value(), None);
//!
//! response.abort("no longer needed".to_string()).unwrap();
//! assert_eq!(response.clone().await, Err("no longer needed".to_string()));
//! assert_eq!(response.state(), State::Rejected);
//! # });
//! ```

extern crate alloc;

mod options;
mod slot;
mod spawn;

pub mod body;
pub mod error;
pub mod future;
pub mod signal;

// Re-export commonly used types at crate root
pub use body::Body;
pub use error::{Aborted, Error};
pub use future::{CancellableFuture, State, Trigger};
pub use options::Options;
pub use signal::{AbortController, AbortRegistration, AbortSignal};
pub use slot::{Fail, Settle};
