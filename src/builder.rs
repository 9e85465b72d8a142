//! Configuration of the thread running a handle's work function

use crate::error::SpawnError;
use crate::handle::AsyncHandle;
use crate::scope::Scope;
use std::thread;


/// Builder for handles whose background thread needs custom settings
#[derive(Clone, Debug, Default)]
pub struct Builder {
    /// Name given to the background thread, shown in panic messages
    name: Option<String>,

    /// Stack size of the background thread, in bytes
    stack_size: Option<usize>,
}
//
impl Builder {
    /// Create a builder with the platform's default thread settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Name the background thread
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the stack size of the background thread, in bytes
    pub fn stack_size(mut self, size: usize) -> Self {
        assert!(size > 0, "stack_size must be > 0");

        self.stack_size = Some(size);
        self
    }

    /// Start running a work function in the background
    ///
    /// This is the fallible counterpart of `AsyncHandle::new()`.
    ///
    pub fn spawn<T, E, F>(self,
                          scope: &Scope,
                          work: F) -> Result<AsyncHandle<T, E>, SpawnError>
        where T: Send + Sync + 'static,
              E: Send + Sync + 'static,
              F: FnOnce(Scope) -> Result<T, E> + Send + 'static
    {
        let mut thread = thread::Builder::new();
        if let Some(name) = self.name {
            thread = thread.name(name);
        }
        if let Some(size) = self.stack_size {
            thread = thread.stack_size(size);
        }
        AsyncHandle::launch(scope, work, thread)
    }
}
