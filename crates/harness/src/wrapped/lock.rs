//! Lock factory wrapper that tracks held locks

use std::fmt;
use std::sync::Arc;

use faultline_core::{Lock, LockFactory, Result};

use crate::state::Shared;

/// Lock factory that records obtained locks in the directory's held set
pub struct MockLockFactory {
    shared: Arc<Shared>,
    delegate: Arc<dyn LockFactory>,
}

impl MockLockFactory {
    pub(crate) fn new(shared: Arc<Shared>, delegate: Arc<dyn LockFactory>) -> Self {
        MockLockFactory { shared, delegate }
    }

    /// The wrapped factory
    pub fn delegate(&self) -> &Arc<dyn LockFactory> {
        &self.delegate
    }
}

impl fmt::Debug for MockLockFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockLockFactory")
            .field("delegate", &self.delegate)
            .finish()
    }
}

impl LockFactory for MockLockFactory {
    fn make_lock(&self, name: &str) -> Box<dyn Lock> {
        Box::new(MockLock {
            shared: Arc::clone(&self.shared),
            name: name.to_string(),
            delegate: self.delegate.make_lock(name),
        })
    }

    fn clear_lock(&self, name: &str) -> Result<()> {
        self.delegate.clear_lock(name)?;
        self.shared.open_locks.remove(name);
        Ok(())
    }
}

/// Lock tracked in the directory's held-lock set while obtained
pub struct MockLock {
    shared: Arc<Shared>,
    name: String,
    delegate: Box<dyn Lock>,
}

impl fmt::Debug for MockLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockLock")
            .field("name", &self.name)
            .field("delegate", &self.delegate)
            .finish()
    }
}

impl Lock for MockLock {
    fn obtain(&mut self) -> Result<bool> {
        let obtained = self.delegate.obtain()?;
        if obtained {
            self.shared.open_locks.insert(self.name.clone());
        }
        Ok(obtained)
    }

    fn release(&mut self) -> Result<()> {
        self.delegate.release()?;
        self.shared.open_locks.remove(&self.name);
        Ok(())
    }

    fn is_locked(&self) -> Result<bool> {
        self.delegate.is_locked()
    }
}
