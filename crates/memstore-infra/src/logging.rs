//! Explicit logger handed to each storage component.
//!
//! Components never reach for the process-global subscriber. They hold a
//! [`Logger`] built from a `tracing::Dispatch` chosen by the caller and emit
//! inside it. [`Logger::none`] discards everything.

use std::future::Future;

use tracing::instrument::WithSubscriber;
use tracing::Dispatch;

#[derive(Clone)]
pub struct Logger {
    dispatch: Dispatch,
}

impl Logger {
    pub fn new(dispatch: Dispatch) -> Self {
        Self { dispatch }
    }

    /// A logger that records nothing.
    pub fn none() -> Self {
        Self::new(Dispatch::none())
    }

    /// Run `f` with this logger as the current dispatcher.
    pub fn scope<R>(&self, f: impl FnOnce() -> R) -> R {
        tracing::dispatcher::with_default(&self.dispatch, f)
    }

    /// Poll `fut` with this logger as the current dispatcher, so events from
    /// the driver land here too.
    pub fn attach<F: Future>(&self, fut: F) -> impl Future<Output = F::Output> {
        fut.with_subscriber(self.dispatch.clone())
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::none()
    }
}

impl From<Dispatch> for Logger {
    fn from(dispatch: Dispatch) -> Self {
        Self::new(dispatch)
    }
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger").finish_non_exhaustive()
    }
}
