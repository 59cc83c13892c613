//! Slicer wrapper whose slices are registered as inputs

use std::fmt;
use std::sync::Arc;

use faultline_core::{IndexInput, Result, Slicer};

use super::slot::HandleSlot;
use crate::registry::HandleId;
use crate::state::Shared;

/// Registered slicer; every slice it opens is a registered input
pub struct MockSlicer {
    shared: Arc<Shared>,
    slot: Arc<HandleSlot<Box<dyn Slicer>>>,
    id: HandleId,
}

impl MockSlicer {
    pub(crate) fn new(
        shared: Arc<Shared>,
        slot: Arc<HandleSlot<Box<dyn Slicer>>>,
        id: HandleId,
    ) -> Self {
        MockSlicer { shared, slot, id }
    }
}

impl fmt::Debug for MockSlicer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockSlicer")
            .field("name", &self.slot.name())
            .field("closed", &self.slot.is_closed())
            .finish()
    }
}

impl Slicer for MockSlicer {
    fn open_slice(
        &mut self,
        description: &str,
        offset: u64,
        length: u64,
    ) -> Result<Box<dyn IndexInput>> {
        self.shared.maybe_yield();
        let delegate = self
            .slot
            .with(|s| s.open_slice(description, offset, length))?;
        Ok(Box::new(self.shared.register_input(self.slot.name(), delegate)))
    }

    fn open_full_slice(&mut self) -> Result<Box<dyn IndexInput>> {
        self.shared.maybe_yield();
        let delegate = self.slot.with(|s| s.open_full_slice())?;
        Ok(Box::new(self.shared.register_input(self.slot.name(), delegate)))
    }

    fn close(&mut self) -> Result<()> {
        let Some(mut delegate) = self.slot.take() else {
            return Ok(());
        };
        let closed = delegate.close();
        self.shared.remove_handle(self.id);
        closed
    }
}
