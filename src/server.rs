//! Background side of an asynchronous handle
//!
//! The background thread holds a server object, which is in charge of
//! publishing the outcome of the work function exactly once and of resolving
//! the scope that was derived for it.
//!
//! Note that this raw abstraction is not exposed to clients, as doing so would
//! allow them to publish outcomes on behalf of the work function.

use crate::handle::{Outcome, SharedState};
use crate::scope::Canceller;
use std::sync::Arc;
use std::time::Instant;


/// Server interface, used to publish the outcome of a work function
pub(crate) struct HandleServer<T, E> {
    /// State shared with the client handles
    shared: Arc<SharedState<T, E>>,

    /// Scope handed to the work function, resolved upon completion
    canceller: Canceller,

    /// Flag indicating that the outcome has been published
    completed: bool,
}
//
impl<T, E> HandleServer<T, E> {
    /// Create a server for a computation which has not completed yet
    pub(crate) fn new(shared: Arc<SharedState<T, E>>,
                      canceller: Canceller) -> Self {
        HandleServer {
            shared,
            canceller,
            completed: false,
        }
    }

    /// Publish the value returned by the work function
    pub(crate) fn complete(mut self, result: Result<T, E>) {
        tracing::trace!(failed = result.is_err(), "background work completed");
        self.finish(Outcome::Returned(result));
    }

    fn finish(&mut self, outcome: Outcome<T, E>) {
        // This should only happen once per computation
        debug_assert!(!self.completed);
        self.completed = true;

        // The scope is resolved before waiters get to see the outcome
        let finish = Instant::now();
        self.canceller.resolve();
        self.shared.publish(outcome, finish);
    }
}
//
impl<T, E> Drop for HandleServer<T, E> {
    /// If the background thread unwinds before the work function returns,
    /// notify the clients in order to prevent them from hanging
    fn drop(&mut self) {
        if !self.completed {
            tracing::warn!("background work ended without producing a result");
            self.finish(Outcome::Killed);
        }
    }
}


/// Unit tests
#[cfg(test)]
mod tests {
    use crate::error::ScopeError;
    use crate::handle::AsyncHandle;
    use crate::scope::Scope;
    use std::sync::mpsc;

    /// The scope handed to the work function is resolved once it returns
    #[test]
    fn scope_resolved() {
        let handle = AsyncHandle::new(&Scope::background(), |scope| {
            assert!(!scope.is_cancelled());
            Ok::<_, String>(scope)
        });
        let scope = handle.wait().unwrap();
        assert_eq!(scope.cancelled(), ScopeError::Cancelled);
    }

    /// The scope is already resolved by the time wait() returns
    #[test]
    fn scope_resolved_before_wait() {
        let background = Scope::background();
        for _ in 0..1000 {
            let handle = AsyncHandle::new(&background, |scope| {
                Ok::<_, String>(scope)
            });
            let scope = handle.wait().unwrap();
            assert_eq!(scope.err(), Some(ScopeError::Cancelled));
        }
    }

    /// The scope is also resolved when the work function panics
    #[test]
    fn scope_resolved_on_panic() {
        let (tx, rx) = mpsc::channel();
        let handle = AsyncHandle::new(&Scope::background(), move |scope| {
            tx.send(scope).unwrap();
            if true {
                panic!("work function exploded");
            }
            Ok::<u32, String>(0)
        });
        let scope = rx.recv().unwrap();
        assert_eq!(scope.cancelled(), ScopeError::Cancelled);
        assert!(handle.done());
    }
}
