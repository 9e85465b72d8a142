//! Status of a background computation, as seen from the caller side
//!
//! The status of a handle follows a small state machine. It starts out
//! running, may receive a cancellation request along the way, and ends up in
//! exactly one final state once the work function returns (or unwinds).

use std::fmt;


/// Representation of a handle's status
///
/// Here are the possible state transitions:
///
/// - Running -> CancelRequested / Succeeded / Failed / Panicked
/// - CancelRequested -> Succeeded / Failed / Panicked
///
/// Note that a cancellation request does not by itself end the computation:
/// a work function which ignores it will still succeed or fail normally.
/// Once the handle is in either of the Succeeded, Failed or Panicked states,
/// its state won't change anymore.
///
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HandleStatus {
    /// The work function is executing
    Running,

    /// The work function is executing, but its scope has been cancelled
    CancelRequested,

    /// The work function has returned a value
    Succeeded,

    /// The work function has returned an error
    Failed,

    /// The work function panicked before returning
    Panicked,
}
//
impl HandleStatus {
    /// Check if a status is final (i.e. won't change anymore)
    pub fn is_final(self) -> bool {
        use self::HandleStatus::*;
        match self {
            Running | CancelRequested => false,
            Succeeded | Failed | Panicked => true,
        }
    }
}
//
impl fmt::Display for HandleStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match *self {
            HandleStatus::Running => "running",
            HandleStatus::CancelRequested => "cancel requested",
            HandleStatus::Succeeded => "succeeded",
            HandleStatus::Failed => "failed",
            HandleStatus::Panicked => "panicked",
        };
        f.write_str(name)
    }
}
