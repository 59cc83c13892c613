//! Idempotent dispose for directory wrappers
//!
//! A wrapper moves `Open -> Disposing -> Disposed` exactly once. The first
//! caller of [`Lifecycle::dispose_once`] runs the release logic; concurrent
//! and later callers return `Ok(())` without running it again.

use std::sync::atomic::{AtomicU8, Ordering};

use faultline_core::{Error, Result};

/// Lifecycle state of a wrapper
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Accepting operations
    Open,
    /// Release logic is running
    Disposing,
    /// Release logic finished
    Disposed,
}

impl LifecycleState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => LifecycleState::Open,
            1 => LifecycleState::Disposing,
            _ => LifecycleState::Disposed,
        }
    }
}

/// One-shot dispose flag shared by the directory wrappers
#[derive(Debug, Default)]
pub struct Lifecycle {
    state: AtomicU8,
}

impl Lifecycle {
    /// New lifecycle in the `Open` state
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state
    pub fn state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// True until dispose starts
    pub fn is_open(&self) -> bool {
        self.state() == LifecycleState::Open
    }

    /// Fail with `AlreadyClosed` once dispose has started
    pub fn ensure_open(&self) -> Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(Error::AlreadyClosed)
        }
    }

    /// Run `release` if and only if this is the first dispose call
    ///
    /// The state reaches `Disposed` whether or not `release` succeeds; its
    /// error is returned to the first caller only.
    pub fn dispose_once<F>(&self, release: F) -> Result<()>
    where
        F: FnOnce() -> Result<()>,
    {
        if self
            .state
            .compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(());
        }
        let result = release();
        self.state.store(2, Ordering::Release);
        result
    }
}
