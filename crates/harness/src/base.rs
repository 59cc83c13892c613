//! Pass-through directory wrapper with idempotent close
//!
//! [`BaseDirectoryWrapper`] adds nothing but the dispose-once lifecycle and an
//! optional structural check on close. Tests use it where a plain delegate is
//! wanted but the close discipline should match the fault-injecting wrapper.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use faultline_core::{
    Directory, IndexInput, IndexOutput, IoContext, Lock, LockFactory, Result, Slicer,
};
use tracing::info;

use crate::lifecycle::Lifecycle;
use crate::verify::{IndexVerifier, NoopVerifier};

/// Delegating directory that closes exactly once
#[derive(Debug)]
pub struct BaseDirectoryWrapper {
    inner: Arc<dyn Directory>,
    lifecycle: Lifecycle,
    check_index_on_close: AtomicBool,
    verifier: Arc<dyn IndexVerifier>,
}

impl BaseDirectoryWrapper {
    /// Wrap `inner`, checking on close with a [`NoopVerifier`]
    pub fn new(inner: Arc<dyn Directory>) -> Self {
        Self::with_verifier(inner, Arc::new(NoopVerifier))
    }

    /// Wrap `inner`, checking on close with `verifier`
    pub fn with_verifier(inner: Arc<dyn Directory>, verifier: Arc<dyn IndexVerifier>) -> Self {
        BaseDirectoryWrapper {
            inner,
            lifecycle: Lifecycle::new(),
            check_index_on_close: AtomicBool::new(true),
            verifier,
        }
    }

    /// The wrapped directory
    pub fn delegate(&self) -> &Arc<dyn Directory> {
        &self.inner
    }

    /// Whether close runs the verifier
    pub fn check_index_on_close(&self) -> bool {
        self.check_index_on_close.load(Ordering::Relaxed)
    }

    /// Enable or disable the check on close
    pub fn set_check_index_on_close(&self, value: bool) {
        self.check_index_on_close.store(value, Ordering::Relaxed);
    }

    /// True until `close` is called
    pub fn is_open(&self) -> bool {
        self.lifecycle.is_open()
    }

    fn verify(&self) -> Result<()> {
        if self.check_index_on_close() && self.verifier.index_exists(&*self.inner)? {
            self.verifier.check_index(&*self.inner)?;
        }
        Ok(())
    }
}

impl Directory for BaseDirectoryWrapper {
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
        self.lifecycle.dispose_once(|| {
            let checked = self.verify();
            let closed = self.inner.close();
            info!(target: "faultline::lifecycle", ok = checked.is_ok() && closed.is_ok(), "Closed base directory wrapper");
            checked.and(closed)
        })
    }
}
