//! Handles to computations running on a background thread
//!
//! An `AsyncHandle` is created together with the computation it monitors: the
//! constructor derives a cancellable scope from the caller's, launches the
//! work function on a dedicated thread, and returns immediately. Callers may
//! then block until the result is available, query the status and elapsed
//! time of the computation without blocking, or request its cancellation.
//!
//! The result of the computation is published exactly once, together with its
//! completion time, through a single-assignment cell. Any number of threads
//! can wait for it concurrently, and all of them observe the same outcome.

use crate::builder::Builder;
use crate::error::SpawnError;
use crate::scope::{Canceller, Scope};
use crate::server::HandleServer;
use crate::status::HandleStatus;
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::{Duration, Instant};


/// Handle to a computation running in the background
pub struct AsyncHandle<T, E> {
    /// State shared with the background thread
    shared: Arc<SharedState<T, E>>,

    /// Cancels the scope that was handed to the work function
    canceller: Canceller,
}
//
impl<T, E> AsyncHandle<T, E>
    where T: Send + Sync + 'static,
          E: Send + Sync + 'static
{
    /// Start running a work function in the background
    ///
    /// The work function receives a child of the provided scope, which gets
    /// cancelled whenever the parent scope is or cancel() is called.
    ///
    /// # Panics
    ///
    /// Panics if the operating system fails to create a thread, like
    /// `std::thread::spawn` does. Use a `Builder` to handle that case.
    ///
    pub fn new<F>(scope: &Scope, work: F) -> Self
        where F: FnOnce(Scope) -> Result<T, E> + Send + 'static
    {
        match Builder::new().spawn(scope, work) {
            Ok(handle) => handle,
            Err(err) => panic!("{}", err),
        }
    }

    /// Launch a work function on a thread configured by the caller
    pub(crate) fn launch<F>(scope: &Scope,
                            work: F,
                            config: thread::Builder) -> Result<Self, SpawnError>
        where F: FnOnce(Scope) -> Result<T, E> + Send + 'static
    {
        let (child, canceller) = scope.with_cancel();
        let shared = Arc::new(SharedState::new());
        let server = HandleServer::new(shared.clone(), canceller.clone());

        config.spawn(move || {
            let result = work(child);
            server.complete(result);
        }).map_err(SpawnError::Thread)?;
        tracing::trace!("background work launched");

        Ok(AsyncHandle { shared, canceller })
    }
}
//
impl<T, E> AsyncHandle<T, E> {
    /// Block until the work function has returned, then give out its result
    ///
    /// # Panics
    ///
    /// Panics if the work function panicked instead of returning.
    ///
    pub fn wait(&self) -> Result<&T, &E> {
        self.shared.wait().outcome.as_result()
    }

    /// Same as wait(), but returns owned copies of the result
    pub fn wait_cloned(&self) -> Result<T, E>
        where T: Clone,
              E: Clone
    {
        self.wait().map(T::clone).map_err(E::clone)
    }

    /// Give out the result if the work function has returned, without
    /// blocking otherwise
    ///
    /// Panics in the same circumstances as wait().
    ///
    pub fn try_wait(&self) -> Option<Result<&T, &E>> {
        self.shared.completion.get().map(|c| c.outcome.as_result())
    }

    /// Wait for the result of a work function which is known not to fail
    ///
    /// # Panics
    ///
    /// Panics with the error's message if the work function returned an error
    /// after all. Only use this where errors are impossible by construction.
    ///
    pub fn must_wait(&self) -> &T
        where E: fmt::Display
    {
        match self.wait() {
            Ok(result) => result,
            Err(err) => panic!("{}", err),
        }
    }

    /// Request the cancellation of the work function's scope
    ///
    /// This is only a request: the work function must observe its scope in
    /// order to stop early, and will otherwise run to completion. Calling this
    /// repeatedly, or after completion, has no further effect.
    ///
    pub fn cancel(&self) {
        if !self.done() {
            tracing::debug!("cancellation requested");
        }
        self.canceller.cancel();
    }

    /// Time spent running the work function
    ///
    /// This keeps growing until the work function returns, and is fixed to
    /// the total execution time afterwards.
    ///
    pub fn elapsed(&self) -> Duration {
        match self.shared.completion.get() {
            Some(completion) =>
                completion.finish.saturating_duration_since(self.shared.start),
            None => self.shared.start.elapsed(),
        }
    }

    /// Truth that the work function has finished running
    pub fn done(&self) -> bool {
        self.shared.completion.get().is_some()
    }

    /// Current status of the computation
    ///
    /// The scope's own resolution upon completion is not reported as a
    /// cancellation request, and an expired deadline is not recorded.
    ///
    pub fn status(&self) -> HandleStatus {
        match self.shared.completion.get() {
            Some(completion) => match completion.outcome {
                Outcome::Returned(Ok(_)) => HandleStatus::Succeeded,
                Outcome::Returned(Err(_)) => HandleStatus::Failed,
                Outcome::Killed => HandleStatus::Panicked,
            },
            None if self.canceller.cancel_requested() =>
                HandleStatus::CancelRequested,
            None => HandleStatus::Running,
        }
    }
}
//
impl<T, E> Clone for AsyncHandle<T, E> {
    fn clone(&self) -> Self {
        AsyncHandle {
            shared: self.shared.clone(),
            canceller: self.canceller.clone(),
        }
    }
}
//
impl<T, E> fmt::Debug for AsyncHandle<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("AsyncHandle")
         .field("status", &self.status())
         .field("elapsed", &self.elapsed())
         .finish()
    }
}


/// Final outcome of the background execution
pub(crate) enum Outcome<T, E> {
    /// The work function returned normally
    Returned(Result<T, E>),

    /// The background thread unwound before the work function returned
    Killed,
}
//
impl<T, E> Outcome<T, E> {
    fn as_result(&self) -> Result<&T, &E> {
        match self {
            Outcome::Returned(result) => result.as_ref(),
            Outcome::Killed =>
                panic!("background work panicked before producing a result"),
        }
    }
}


/// Outcome and completion time, published together
struct Completion<T, E> {
    outcome: Outcome<T, E>,
    finish: Instant,
}


/// State shared between the handle and the background thread
pub(crate) struct SharedState<T, E> {
    /// Time at which the background execution was started
    start: Instant,

    /// Written once by the background thread, read by everyone afterwards
    completion: OnceLock<Completion<T, E>>,

    /// Lock used by waiters to sleep on done_cv without missing a wake-up
    wait_lock: Mutex<()>,

    /// Condition variable used to wake up waiters upon completion
    done_cv: Condvar,
}
//
impl<T, E> SharedState<T, E> {
    fn new() -> Self {
        SharedState {
            start: Instant::now(),
            completion: OnceLock::new(),
            wait_lock: Mutex::new(()),
            done_cv: Condvar::new(),
        }
    }

    /// Publish the outcome of the computation and wake up all waiters
    pub(crate) fn publish(&self, outcome: Outcome<T, E>, finish: Instant) {
        let first = self.completion.set(Completion { outcome, finish }).is_ok();
        debug_assert!(first, "a handle's outcome may only be published once");

        let _lock = self.wait_lock.lock();
        self.done_cv.notify_all();
    }

    /// Block until the outcome has been published
    fn wait(&self) -> &Completion<T, E> {
        if let Some(completion) = self.completion.get() {
            return completion;
        }
        let mut lock = self.wait_lock.lock();
        loop {
            if let Some(completion) = self.completion.get() {
                return completion;
            }
            self.done_cv.wait(&mut lock);
        }
    }
}
