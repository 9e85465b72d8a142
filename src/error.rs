//! Errors produced by the handle machinery itself
//!
//! Work functions bring their own error type, which the handle stores and
//! hands back verbatim. The errors below are the only ones the crate ever
//! synthesizes: the reason a scope was cancelled, which a work function may
//! choose to return, and the failure to start a background thread.

use std::io;
use thiserror::Error;


/// Reason why an execution scope stopped accepting work
#[derive(Clone, Copy, Debug, Error, Eq, PartialEq)]
pub enum ScopeError {
    /// The scope, or one of its ancestors, was explicitly cancelled
    #[error("context canceled")]
    Cancelled,

    /// The deadline of the scope, or of one of its ancestors, has passed
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}


/// Failure to launch the background execution of a handle
#[derive(Debug, Error)]
pub enum SpawnError {
    /// The operating system refused to create a new thread
    #[error("failed to spawn background thread")]
    Thread(#[source] io::Error),
}
