//! Advisory lock contract
//!
//! Locks guard directory-level invariants (one writer per directory), not file
//! contents. Implementations are free to be purely in-process.

use std::fmt;

use crate::error::Result;

/// A named advisory lock
pub trait Lock: Send + fmt::Debug {
    /// Try to obtain the lock without blocking
    ///
    /// Returns `false` if someone else holds it.
    fn obtain(&mut self) -> Result<bool>;

    /// Release the lock if this instance holds it
    fn release(&mut self) -> Result<()>;

    /// Whether anyone currently holds the lock
    fn is_locked(&self) -> Result<bool>;
}

/// Creates and force-clears locks for a directory
pub trait LockFactory: Send + Sync + fmt::Debug {
    /// Create an (unobtained) lock instance for `name`
    fn make_lock(&self, name: &str) -> Box<dyn Lock>;

    /// Forcefully release `name`, whoever holds it
    fn clear_lock(&self, name: &str) -> Result<()>;
}
