//! Drives direct-style bodies on the host executor.

use crate::slot::Slot;
use alloc::sync::Arc;
use core::future::Future;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use tracing::{Instrument, error, trace};

/// A handle to the task settling a direct-style body.
pub type JoinHandle = tokio::task::JoinHandle<()>;

/// Settles `slot` with the output of `computation` on a new task.
///
/// The task runs inside a trace span named `settle` carrying `name`, which
/// follows from the span that constructed the future. A panic in
/// `computation` is caught and parked in the slot, so awaiting the future
/// resumes it instead of waiting forever.
///
/// # Panics
///
/// Panics if called from outside of a tokio runtime.
pub(crate) fn settle_with<T, E, F>(
    name: &'static str,
    slot: Arc<Slot<T, E>>,
    computation: F,
) -> JoinHandle
where
    T: Send + Sync + 'static,
    E: Send + Sync + 'static,
    F: Future<Output = Result<T, E>> + Send + 'static,
{
    let guard = SettleGuard { name, slot };
    let task = async move {
        match AssertUnwindSafe(computation).catch_unwind().await {
            Ok(outcome) => {
                trace!(
                    "Direct-style body completed as {}",
                    if outcome.is_ok() { "fulfilled" } else { "rejected" }
                );
                guard.slot.settle(outcome);
            }
            Err(payload) => {
                error!(
                    "Direct-style body '{}' panicked, awaiting its future will resume the panic",
                    guard.name
                );
                guard.slot.poison(payload);
            }
        }
    };

    let span = tracing::trace_span!(parent: None, "settle", name);
    span.follows_from(tracing::Span::current());
    tokio::spawn(task.instrument(span))
}

// Reports bodies dropped before they finish, e.g. by a runtime shutdown
struct SettleGuard<T, E> {
    name: &'static str,
    slot: Arc<Slot<T, E>>,
}

impl<T, E> Drop for SettleGuard<T, E> {
    fn drop(&mut self) {
        if !self.slot.is_finished() {
            error!(
                "Direct-style body '{}' was dropped without settling, the future will stay pending",
                self.name
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slot::Finished;
    use core::task::{Context, Poll};

    #[tokio::test]
    async fn settles_from_task() {
        let slot = Arc::new(Slot::<u8, ()>::new());
        settle_with("test", slot.clone(), async { Ok(7) })
            .await
            .unwrap();
        assert_eq!(slot.get(), Some(&Ok(7)));
    }

    #[tokio::test]
    async fn panicking_body_poisons_slot() {
        let slot = Arc::new(Slot::<u8, ()>::new());
        settle_with("test", slot.clone(), async {
            let exploded = true;
            if exploded {
                panic!("body exploded");
            }
            Ok(0)
        })
        .await
        .unwrap();

        assert!(slot.get().is_none());
        assert!(slot.is_panicked());

        let waker = futures::task::noop_waker();
        let mut cx = Context::from_waker(&waker);
        match slot.poll_settled(&mut cx) {
            Poll::Ready(Finished::Panicked(Some(payload))) => {
                assert_eq!(payload.downcast_ref::<&str>(), Some(&"body exploded"));
            }
            _ => panic!("expected the panic payload"),
        }
    }
}
