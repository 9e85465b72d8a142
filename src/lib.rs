//! Background computations with blocking result retrieval
//!
//! Picture yourself in a situation where: you have a piece of work that is
//! going to take some time, and other things to do meanwhile, so you would
//! rather run it in the background. Later on, you want its result, or at
//! least to know whether it is done, how long it took, or to tell it that its
//! result is not needed anymore.
//!
//! This crate provides a minimal primitive for that. An `AsyncHandle` starts
//! its work function on a dedicated thread as soon as it is created, and
//! gives the caller blocking retrieval of the result, non-blocking status and
//! timing queries, and cooperative cancellation through an execution `Scope`.
//!
//! ```
//! use threaded_future::{AsyncHandle, Scope};
//!
//! let handle = AsyncHandle::new(&Scope::background(), |_| {
//!     Ok::<i32, String>(42)
//! });
//! assert_eq!(22 + handle.must_wait(), 64);
//! ```
//!
//! Scheduling many computations, pooling threads and retrying failed work are
//! all left to the caller, who can compose as many handles as needed.

pub mod builder;
pub mod error;
pub mod handle;
pub mod scope;
mod server;
pub mod status;

pub use builder::Builder;
pub use error::{ScopeError, SpawnError};
pub use handle::AsyncHandle;
pub use scope::{Canceller, Scope};
pub use status::HandleStatus;
