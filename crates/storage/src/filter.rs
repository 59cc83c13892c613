//! Pass-through directory
//!
//! `FilterDirectory` forwards every call, including the capability queries,
//! to its delegate. It is the base shape for layered wrappers and proves that
//! `requires_sync` / `is_throttled` survive layering.

use std::sync::Arc;

use faultline_core::{
    Directory, IndexInput, IndexOutput, IoContext, Lock, LockFactory, Result, Slicer,
};

/// Directory that delegates everything
#[derive(Debug, Clone)]
pub struct FilterDirectory {
    inner: Arc<dyn Directory>,
}

impl FilterDirectory {
    /// Wrap `inner`
    pub fn new(inner: Arc<dyn Directory>) -> Self {
        FilterDirectory { inner }
    }

    /// The wrapped directory
    pub fn delegate(&self) -> &Arc<dyn Directory> {
        &self.inner
    }
}

impl Directory for FilterDirectory {
    fn list_all(&self) -> Result<Vec<String>> {
        self.inner.list_all()
    }

    fn file_exists(&self, name: &str) -> Result<bool> {
        self.inner.file_exists(name)
    }

    fn file_length(&self, name: &str) -> Result<u64> {
        self.inner.file_length(name)
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        self.inner.delete_file(name)
    }

    fn create_output(&self, name: &str, context: IoContext) -> Result<Box<dyn IndexOutput>> {
        self.inner.create_output(name, context)
    }

    fn open_input(&self, name: &str, context: IoContext) -> Result<Box<dyn IndexInput>> {
        self.inner.open_input(name, context)
    }

    fn sync(&self, names: &[String]) -> Result<()> {
        self.inner.sync(names)
    }

    fn make_lock(&self, name: &str) -> Result<Box<dyn Lock>> {
        self.inner.make_lock(name)
    }

    fn clear_lock(&self, name: &str) -> Result<()> {
        self.inner.clear_lock(name)
    }

    fn lock_factory(&self) -> Arc<dyn LockFactory> {
        self.inner.lock_factory()
    }

    fn set_lock_factory(&self, factory: Arc<dyn LockFactory>) -> Result<()> {
        self.inner.set_lock_factory(factory)
    }

    fn copy(&self, to: &dyn Directory, src: &str, dest: &str, context: IoContext) -> Result<()> {
        self.inner.copy(to, src, dest, context)
    }

    fn create_slicer(&self, name: &str, context: IoContext) -> Result<Box<dyn Slicer>> {
        self.inner.create_slicer(name, context)
    }

    fn size_in_bytes(&self) -> Result<u64> {
        self.inner.size_in_bytes()
    }

    fn requires_sync(&self) -> bool {
        self.inner.requires_sync()
    }

    fn is_throttled(&self) -> bool {
        self.inner.is_throttled()
    }

    fn close(&self) -> Result<()> {
        self.inner.close()
    }
}
