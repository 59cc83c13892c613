//! Instrumented read handles and their slow variants

use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use faultline_core::{HandleKind, IndexInput, Result};

use super::slot::HandleSlot;
use crate::registry::HandleId;
use crate::state::Shared;

/// Read handle handed out by the fault-injecting directory
///
/// Handles from `open_input` (and slicer slices) are registered and must be
/// closed before the directory is. Clones and slices taken from a
/// `MockInput` are counted but not registered, so they may be dropped
/// without closing.
pub struct MockInput {
    shared: Arc<Shared>,
    slot: Arc<HandleSlot<Box<dyn IndexInput>>>,
    id: Option<HandleId>,
}

impl MockInput {
    pub(crate) fn new(
        shared: Arc<Shared>,
        slot: Arc<HandleSlot<Box<dyn IndexInput>>>,
        id: Option<HandleId>,
    ) -> Self {
        MockInput { shared, slot, id }
    }

    /// File this input reads
    pub fn name(&self) -> &str {
        self.slot.name()
    }

    /// Whether the input was closed (by its owner or by a crash)
    pub fn is_closed(&self) -> bool {
        self.slot.is_closed()
    }

    /// Whether this is an unregistered clone or slice
    pub fn is_clone(&self) -> bool {
        self.id.is_none()
    }

    fn derived(&self, delegate: Box<dyn IndexInput>) -> MockInput {
        MockInput {
            shared: Arc::clone(&self.shared),
            slot: Arc::new(HandleSlot::new(self.name(), HandleKind::Input, delegate)),
            id: None,
        }
    }
}

impl fmt::Debug for MockInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockInput")
            .field("name", &self.name())
            .field("clone", &self.is_clone())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl IndexInput for MockInput {
    fn read_byte(&mut self) -> Result<u8> {
        self.slot.with(|d| d.read_byte())
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<()> {
        self.slot.with(|d| d.read_bytes(buf))
    }

    fn position(&self) -> Result<u64> {
        self.slot.with(|d| d.position())
    }

    fn seek(&mut self, pos: u64) -> Result<()> {
        self.slot.with(|d| d.seek(pos))
    }

    fn length(&self) -> Result<u64> {
        self.slot.with(|d| d.length())
    }

    fn clone_input(&self) -> Result<Box<dyn IndexInput>> {
        let delegate = self.slot.with(|d| d.clone_input())?;
        self.shared.input_clones.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(self.derived(delegate)))
    }

    fn slice(&self, description: &str, offset: u64, length: u64) -> Result<Box<dyn IndexInput>> {
        let delegate = self.slot.with(|d| d.slice(description, offset, length))?;
        Ok(Box::new(self.derived(delegate)))
    }

    fn close(&mut self) -> Result<()> {
        let Some(mut delegate) = self.slot.take() else {
            return Ok(());
        };
        let closed = delegate.close();
        if let Some(id) = self.id {
            self.shared.remove_handle(id);
        }
        closed
    }
}

macro_rules! forward_input {
    () => {
        fn read_byte(&mut self) -> Result<u8> {
            self.inner.read_byte()
        }

        fn read_bytes(&mut self, buf: &mut [u8]) -> Result<()> {
            self.inner.read_bytes(buf)
        }

        fn position(&self) -> Result<u64> {
            self.inner.position()
        }

        fn seek(&mut self, pos: u64) -> Result<()> {
            self.inner.seek(pos)
        }

        fn length(&self) -> Result<u64> {
            self.inner.length()
        }

        fn clone_input(&self) -> Result<Box<dyn IndexInput>> {
            self.inner.clone_input()
        }

        fn slice(
            &self,
            description: &str,
            offset: u64,
            length: u64,
        ) -> Result<Box<dyn IndexInput>> {
            self.inner.slice(description, offset, length)
        }
    };
}

/// Input that took `delay` to open
#[derive(Debug)]
pub struct SlowOpeningInput {
    inner: MockInput,
}

impl SlowOpeningInput {
    /// Sleep for `delay`, then hand out `inner`
    pub fn new(inner: MockInput, delay: Duration) -> Self {
        thread::sleep(delay);
        SlowOpeningInput { inner }
    }
}

impl IndexInput for SlowOpeningInput {
    forward_input!();

    fn close(&mut self) -> Result<()> {
        self.inner.close()
    }
}

/// Input whose close sleeps for `delay` before releasing the handle
#[derive(Debug)]
pub struct SlowClosingInput {
    inner: MockInput,
    delay: Duration,
}

impl SlowClosingInput {
    /// Wrap `inner`
    pub fn new(inner: MockInput, delay: Duration) -> Self {
        SlowClosingInput { inner, delay }
    }
}

impl IndexInput for SlowClosingInput {
    forward_input!();

    fn close(&mut self) -> Result<()> {
        if !self.inner.is_closed() {
            thread::sleep(self.delay);
        }
        self.inner.close()
    }
}
