use crate::signal::AbortSignal;

/// Construction options for a [`CancellableFuture`](crate::CancellableFuture).
pub struct Options<E> {
    /// A caller-owned signal to hand to the body instead of creating one.
    ///
    /// When set, the future exposes no abort trigger of its own: the caller
    /// aborts through the controller that owns this signal.
    pub signal: Option<AbortSignal<E>>,

    /// Label for the trace span that wraps a direct-style body.
    pub name: &'static str,
}

fn default_name() -> &'static str {
    "cancellable_future"
}

impl<E> Options<E> {
    /// Options that borrow `signal` rather than creating a new one.
    pub fn with_signal(signal: AbortSignal<E>) -> Self {
        Self {
            signal: Some(signal),
            ..Self::default()
        }
    }

    /// Replaces the trace span label.
    pub fn named(self, name: &'static str) -> Self {
        Self { name, ..self }
    }
}

impl<E> Default for Options<E> {
    fn default() -> Self {
        Self {
            signal: None,
            name: default_name(),
        }
    }
}

impl<E> core::fmt::Debug for Options<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Options")
            .field("signal", &self.signal.is_some())
            .field("name", &self.name)
            .finish()
    }
}
