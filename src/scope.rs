//! Cancellable, deadline-aware execution scopes
//!
//! A scope is the capability handed to a work function so that it can find
//! out whether its result is still wanted. Scopes form a tree: deriving a
//! child from a parent means that cancelling the parent (or letting its
//! deadline pass) also cancels the child, whereas cancelling the child leaves
//! the parent untouched.
//!
//! Cancellation is purely cooperative. Nothing in this module interrupts a
//! running computation: work functions are expected to poll the scope at
//! reasonable intervals, via `check()`, `err()` or an interruptible `sleep()`,
//! and to return early when asked to.

use crate::error::ScopeError;
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::mem;
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};


/// Capability used by work functions to observe cancellation
#[derive(Clone)]
pub struct Scope {
    inner: Arc<ScopeInner>,
}
//
impl Scope {
    /// Root scope which is never cancelled and has no deadline
    pub fn background() -> Self {
        Scope {
            inner: Arc::new(ScopeInner::new(None, None, false)),
        }
    }

    /// Derive a child scope which can be cancelled independently
    pub fn with_cancel(&self) -> (Scope, Canceller) {
        self.derive(None)
    }

    /// Derive a child scope which expires at the given instant
    ///
    /// If the parent has an earlier deadline, that one is kept.
    ///
    pub fn with_deadline(&self, deadline: Instant) -> (Scope, Canceller) {
        self.derive(Some(deadline))
    }

    /// Derive a child scope which expires after the given duration
    pub fn with_timeout(&self, timeout: Duration) -> (Scope, Canceller) {
        self.derive(Some(Instant::now() + timeout))
    }

    /// Deadline after which this scope is considered expired, if any
    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Reason why this scope was cancelled, or None if it is still live
    pub fn err(&self) -> Option<ScopeError> {
        let state = self.inner.state.lock();
        if let Some(err) = *state {
            return Some(err);
        }
        if !self.inner.expired(Instant::now()) {
            return None;
        }
        drop(state);
        Some(self.inner.cancel(ScopeError::DeadlineExceeded))
    }

    /// Truth that this scope was cancelled or has expired
    pub fn is_cancelled(&self) -> bool {
        self.err().is_some()
    }

    /// Same as err(), but shaped for use with the ? operator
    pub fn check(&self) -> Result<(), ScopeError> {
        match self.err() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Block until this scope is cancelled or expires
    ///
    /// Waiting on a scope which has neither a deadline nor a canceller, such
    /// as the background scope, never returns.
    ///
    pub fn cancelled(&self) -> ScopeError {
        loop {
            if let Some(err) = self.wait_until(None) {
                return err;
            }
        }
    }

    /// Sleep for some duration, waking up early if the scope is cancelled
    pub fn sleep(&self, duration: Duration) -> Result<(), ScopeError> {
        match self.wait_until(Some(Instant::now() + duration)) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Wait for cancellation, up to an optional wake-up time
    fn wait_until(&self, wake_up: Option<Instant>) -> Option<ScopeError> {
        let mut state = self.inner.state.lock();
        loop {
            if let Some(err) = *state {
                return Some(err);
            }

            let now = Instant::now();
            if self.inner.expired(now) {
                drop(state);
                return Some(self.inner.cancel(ScopeError::DeadlineExceeded));
            }
            if wake_up.is_some_and(|t| now >= t) {
                return None;
            }

            let limit = match (wake_up, self.inner.deadline) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            };
            match limit {
                Some(limit) => {
                    self.inner.cancelled_cv.wait_until(&mut state, limit);
                }
                None => self.inner.cancelled_cv.wait(&mut state),
            }
        }
    }

    /// Cancellation reason, without recording a deadline that has passed
    fn peek(&self) -> Option<ScopeError> {
        let state = self.inner.state.lock();
        match *state {
            Some(err) => Some(err),
            None if self.inner.expired(Instant::now()) =>
                Some(ScopeError::DeadlineExceeded),
            None => None,
        }
    }

    /// Build a child scope and attach it to this one
    fn derive(&self, deadline: Option<Instant>) -> (Scope, Canceller) {
        let parent = &self.inner;
        let deadline = match (parent.deadline, deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        let link = if parent.cancellable {
            Some(Arc::downgrade(parent))
        } else {
            None
        };
        let child = Arc::new(ScopeInner::new(deadline, link, true));

        // Parents which can never be cancelled need not track their children
        if parent.cancellable {
            let state = parent.state.lock();
            let recorded = *state;
            match recorded {
                Some(err) => {
                    drop(state);
                    child.cancel(err);
                }
                None => {
                    let mut children = parent.children.lock();
                    children.retain(|c| c.strong_count() > 0);
                    children.push(Arc::downgrade(&child));
                }
            }
        }

        (Scope { inner: child.clone() }, Canceller { inner: child })
    }
}
//
impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Scope")
         .field("deadline", &self.inner.deadline)
         .field("err", &self.peek())
         .finish()
    }
}


/// Control used to cancel one scope and, transitively, all its children
#[derive(Clone)]
pub struct Canceller {
    inner: Arc<ScopeInner>,
}
//
impl Canceller {
    /// Cancel the associated scope
    ///
    /// Cancelling a scope which is already cancelled or expired does nothing.
    ///
    pub fn cancel(&self) {
        self.inner.cancel(ScopeError::Cancelled);
    }

    /// Truth that the associated scope is cancelled or expired
    pub fn is_cancelled(&self) -> bool {
        self.scope().is_cancelled()
    }

    /// Scope controlled by this canceller
    pub fn scope(&self) -> Scope {
        Scope { inner: self.inner.clone() }
    }

    /// Cancel the associated scope because the work it was handed to is
    /// over, rather than because someone asked for it
    pub(crate) fn resolve(&self) {
        self.inner.cancel_with(ScopeError::Cancelled, true);
    }

    /// Truth that the associated scope was cancelled or has expired for any
    /// reason other than resolve()
    ///
    /// Unlike is_cancelled(), this does not record an expired deadline.
    ///
    pub(crate) fn cancel_requested(&self) -> bool {
        let state = self.inner.state.lock();
        match *state {
            Some(_) => !self.inner.resolved.load(Ordering::Relaxed),
            None => self.inner.expired(Instant::now()),
        }
    }
}
//
impl fmt::Debug for Canceller {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Canceller")
         .field("scope", &self.scope())
         .finish()
    }
}


/// State of one node in the scope tree
struct ScopeInner {
    /// Instant after which the scope counts as expired
    deadline: Option<Instant>,

    /// First cancellation reason recorded on this scope (never overwritten)
    state: Mutex<Option<ScopeError>>,

    /// Used to wake up threads blocked in cancelled() or sleep()
    cancelled_cv: Condvar,

    /// Live children, cancelled together with this scope
    children: Mutex<Vec<Weak<ScopeInner>>>,

    /// Parent from which this scope must unregister once cancelled
    parent: Option<Weak<ScopeInner>>,

    /// Whether this scope can ever be cancelled
    cancellable: bool,

    /// Set, under the state lock, when the first cancellation came from
    /// the completion of the work rather than from a request
    resolved: AtomicBool,
}
//
impl ScopeInner {
    fn new(deadline: Option<Instant>,
           parent: Option<Weak<ScopeInner>>,
           cancellable: bool) -> Self {
        ScopeInner {
            deadline,
            state: Mutex::new(None),
            cancelled_cv: Condvar::new(),
            children: Mutex::new(Vec::new()),
            parent,
            cancellable,
            resolved: AtomicBool::new(false),
        }
    }

    fn expired(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| now >= deadline)
    }

    /// Record a cancellation reason, propagate it downwards, and return the
    /// reason that ended up being recorded
    fn cancel(&self, err: ScopeError) -> ScopeError {
        self.cancel_with(err, false)
    }

    fn cancel_with(&self, err: ScopeError, resolution: bool) -> ScopeError {
        // Lock order is state, then children, everywhere in this module
        let children = {
            let mut state = self.state.lock();
            if let Some(existing) = *state {
                return existing;
            }
            *state = Some(err);
            self.resolved.store(resolution, Ordering::Relaxed);
            self.cancelled_cv.notify_all();
            mem::take(&mut *self.children.lock())
        };
        tracing::debug!(reason = %err, children = children.len(),
                        "execution scope cancelled");

        for child in children.iter().filter_map(Weak::upgrade) {
            child.cancel(err);
        }
        if let Some(parent) = self.parent.as_ref().and_then(Weak::upgrade) {
            parent.children.lock().retain(|c| {
                c.strong_count() > 0 && !ptr::eq(c.as_ptr(), self)
            });
        }
        err
    }
}


/// Unit tests
#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    /// The background scope is never cancelled
    #[test]
    fn background() {
        let scope = Scope::background();
        assert_eq!(scope.err(), None);
        assert_eq!(scope.check(), Ok(()));
        assert_eq!(scope.deadline(), None);
        assert_eq!(scope.sleep(Duration::from_millis(1)), Ok(()));
    }

    /// Cancelling a scope is idempotent and visible through all accessors
    #[test]
    fn cancel() {
        let (scope, canceller) = Scope::background().with_cancel();
        assert!(!scope.is_cancelled());
        assert!(!canceller.is_cancelled());

        canceller.cancel();
        canceller.cancel();
        assert_eq!(scope.err(), Some(ScopeError::Cancelled));
        assert_eq!(scope.check(), Err(ScopeError::Cancelled));
        assert_eq!(scope.cancelled(), ScopeError::Cancelled);
        assert!(canceller.is_cancelled());
    }

    /// Cancellation flows from parents to children, never the other way
    #[test]
    fn propagation() {
        let (parent, parent_canceller) = Scope::background().with_cancel();
        let (child, child_canceller) = parent.with_cancel();
        let (grandchild, _) = child.with_cancel();

        child_canceller.cancel();
        assert!(!parent.is_cancelled());
        assert!(grandchild.is_cancelled());

        let (sibling, _) = parent.with_cancel();
        parent_canceller.cancel();
        assert_eq!(sibling.err(), Some(ScopeError::Cancelled));
    }

    /// Children of a dead parent are born dead
    #[test]
    fn derive_from_cancelled() {
        let (parent, canceller) = Scope::background().with_cancel();
        canceller.cancel();
        let (child, _) = parent.with_cancel();
        assert_eq!(child.err(), Some(ScopeError::Cancelled));
    }

    /// Cancelled children do not linger in their parent's child list
    #[test]
    fn unregister() {
        let (parent, _) = Scope::background().with_cancel();
        let (_child, canceller) = parent.with_cancel();
        assert_eq!(parent.inner.children.lock().len(), 1);
        canceller.cancel();
        assert!(parent.inner.children.lock().is_empty());
    }

    /// Deadlines expire lazily and are inherited by children
    #[test]
    fn deadline() {
        let (scope, _) =
            Scope::background().with_timeout(Duration::from_millis(20));
        assert_eq!(scope.err(), None);

        let (child, _) = scope.with_timeout(Duration::from_secs(3600));
        assert_eq!(child.deadline(), scope.deadline());

        assert_eq!(scope.sleep(Duration::from_secs(10)),
                   Err(ScopeError::DeadlineExceeded));
        assert_eq!(child.err(), Some(ScopeError::DeadlineExceeded));
    }

    /// An explicit cancellation is not overwritten by a later expiry
    #[test]
    fn first_error_wins() {
        let (scope, canceller) =
            Scope::background().with_timeout(Duration::from_millis(1));
        canceller.cancel();
        thread::sleep(Duration::from_millis(5));
        assert_eq!(scope.err(), Some(ScopeError::Cancelled));
    }

    /// Resolving a scope cancels it and its children, but does not count as
    /// a cancellation request
    #[test]
    fn resolve() {
        let (scope, canceller) = Scope::background().with_cancel();
        let (child, child_canceller) = scope.with_cancel();
        assert!(!canceller.cancel_requested());

        canceller.resolve();
        assert_eq!(scope.err(), Some(ScopeError::Cancelled));
        assert!(!canceller.cancel_requested());
        assert!(child_canceller.cancel_requested());
        assert!(child.is_cancelled());

        canceller.cancel();
        assert!(!canceller.cancel_requested());
    }

    /// A request which comes first is not turned into a resolution
    #[test]
    fn cancel_then_resolve() {
        let (_, canceller) = Scope::background().with_cancel();
        canceller.cancel();
        canceller.resolve();
        assert!(canceller.cancel_requested());
    }

    /// Expired deadlines count as requests without being recorded
    #[test]
    fn peek_expired() {
        let (scope, canceller) =
            Scope::background().with_timeout(Duration::from_millis(1));
        thread::sleep(Duration::from_millis(5));
        assert!(canceller.cancel_requested());
        assert_eq!(scope.peek(), Some(ScopeError::DeadlineExceeded));
        assert_eq!(*scope.inner.state.lock(), None);
        assert!(format!("{:?}", scope).contains("DeadlineExceeded"));
        assert_eq!(*scope.inner.state.lock(), None);
    }

    /// Scopes show their deadline and cancellation status when debugged
    #[test]
    fn debug() {
        let (scope, canceller) = Scope::background().with_cancel();
        assert_eq!(format!("{:?}", scope), "Scope { deadline: None, err: None }");
        canceller.cancel();
        assert_eq!(format!("{:?}", canceller),
                   "Canceller { scope: Scope { deadline: None, err: Some(Cancelled) } }");
    }

    /// Sleeping threads are woken up by cancellation from another thread
    #[test]
    fn interrupted_sleep() {
        let (scope, canceller) = Scope::background().with_cancel();
        let sleeper = thread::spawn(move || {
            let start = Instant::now();
            let result = scope.sleep(Duration::from_secs(30));
            (result, start.elapsed())
        });

        thread::sleep(Duration::from_millis(10));
        canceller.cancel();

        let (result, slept) = sleeper.join().unwrap();
        assert_eq!(result, Err(ScopeError::Cancelled));
        assert!(slept < Duration::from_secs(30));
    }
}
