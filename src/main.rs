//! Tour of the background computation handles
//!
//! This binary walks through the typical ways of using a handle: fetching a
//! result, cancelling a cooperative computation, and asserting that a
//! computation cannot fail. Set RUST_LOG=trace to see the handles' own events.

use std::panic::{self, AssertUnwindSafe};
use std::thread;
use std::time::Duration;
use thiserror::Error;
use threaded_future::{AsyncHandle, Builder, ScopeError, Scope};
use tracing_subscriber::EnvFilter;


/// Errors which the demo work functions may return
#[derive(Debug, Error)]
enum DemoError {
    #[error(transparent)]
    Scope(#[from] ScopeError),

    #[error("whoops")]
    Whoops,
}


fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let background = Scope::background();

    // Fetching a result
    let hello = AsyncHandle::new(&background, |_| {
        Ok::<_, DemoError>("Hello, world")
    });
    match hello.wait() {
        Ok(greeting) => tracing::info!("{}", greeting),
        Err(err) => tracing::error!(%err, "greeting failed"),
    }

    // Cancelling a computation which checks its scope
    let cancelled = AsyncHandle::new(&background, |scope| {
        thread::sleep(Duration::from_millis(20));
        scope.check()?;
        Ok::<u32, DemoError>(42)
    });
    cancelled.cancel();
    match cancelled.wait() {
        Ok(answer) => tracing::info!(answer, "computation was not cancelled"),
        Err(err) => tracing::info!(%err, elapsed = ?cancelled.elapsed(),
                                   "computation was cancelled"),
    }

    // Asserting that a computation cannot fail
    let infallible = Builder::new()
        .name("infallible")
        .spawn(&background, |_| Ok::<i32, DemoError>(42));
    match infallible {
        Ok(handle) => tracing::info!(sum = 22 + handle.must_wait(),
                                     "infallible computation"),
        Err(err) => tracing::error!(%err, "could not spawn computation"),
    }

    // ...and being proven wrong
    let fallible = AsyncHandle::new(&background, |_| {
        Err::<i32, _>(DemoError::Whoops)
    });
    let escalated = panic::catch_unwind(AssertUnwindSafe(|| {
        22 + fallible.must_wait()
    }));
    if escalated.is_err() {
        tracing::info!(status = %fallible.status(),
                       "must_wait() escalated the error into a panic");
    }
}
