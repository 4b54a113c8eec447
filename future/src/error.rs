use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

/// Misuse of the abort trigger exposed by a
/// [`CancellableFuture`](crate::CancellableFuture).
///
/// Neither variant has any effect on the state or the cached value of the
/// future; they only report that the abort request was ignored.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    #[error("The abort signal was supplied by the caller, abort it through its own controller")]
    TriggerUnavailable,

    #[error("The future has already settled, aborting it has no effect")]
    TriggerSpent,
}

/// A reason for callers that abort without a domain-specific one.
#[derive(Error, Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[error("The operation was aborted")]
pub struct Aborted;
