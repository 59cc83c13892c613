//! In-process lock factories

use std::collections::HashSet;
use std::sync::Arc;

use faultline_core::{Lock, LockFactory, Result};
use parking_lot::Mutex;

/// Locks shared by every directory holding the same factory instance
///
/// Correct only within one process; the default for `RamDirectory` and
/// `FsDirectory`.
#[derive(Debug, Default)]
pub struct SingleInstanceLockFactory {
    locks: Arc<Mutex<HashSet<String>>>,
}

impl SingleInstanceLockFactory {
    /// Create a factory with no held locks
    pub fn new() -> Self {
        Self::default()
    }
}

impl LockFactory for SingleInstanceLockFactory {
    fn make_lock(&self, name: &str) -> Box<dyn Lock> {
        Box::new(SingleInstanceLock {
            name: name.to_string(),
            locks: Arc::clone(&self.locks),
            held: false,
        })
    }

    fn clear_lock(&self, name: &str) -> Result<()> {
        self.locks.lock().remove(name);
        Ok(())
    }
}

#[derive(Debug)]
struct SingleInstanceLock {
    name: String,
    locks: Arc<Mutex<HashSet<String>>>,
    held: bool,
}

impl Lock for SingleInstanceLock {
    fn obtain(&mut self) -> Result<bool> {
        if self.held {
            return Ok(true);
        }
        self.held = self.locks.lock().insert(self.name.clone());
        Ok(self.held)
    }

    fn release(&mut self) -> Result<()> {
        if self.held {
            self.locks.lock().remove(&self.name);
            self.held = false;
        }
        Ok(())
    }

    fn is_locked(&self) -> Result<bool> {
        Ok(self.locks.lock().contains(&self.name))
    }
}

/// Factory whose locks always succeed and are never reported as held
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLockFactory;

impl LockFactory for NoLockFactory {
    fn make_lock(&self, _name: &str) -> Box<dyn Lock> {
        Box::new(NoLock)
    }

    fn clear_lock(&self, _name: &str) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug)]
struct NoLock;

impl Lock for NoLock {
    fn obtain(&mut self) -> Result<bool> {
        Ok(true)
    }

    fn release(&mut self) -> Result<()> {
        Ok(())
    }

    fn is_locked(&self) -> Result<bool> {
        Ok(false)
    }
}
