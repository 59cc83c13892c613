//! Instrumented write handle with disk quota and fault checks

use std::fmt;
use std::sync::Arc;
use std::thread;

use faultline_core::{Error, IndexOutput, Result};
use tracing::debug;

use super::slot::HandleSlot;
use crate::failure::Operation;
use crate::registry::HandleId;
use crate::state::Shared;

/// Write handle handed out by the fault-injecting directory
///
/// Every write checks, in order: crash state, the disk quota (writing the
/// bytes that still fit before failing), an occasional split around a
/// yield, the failure hooks, and on the first write to the file the
/// random I/O error rate.
pub struct MockOutput {
    shared: Arc<Shared>,
    slot: Arc<HandleSlot<Box<dyn IndexOutput>>>,
    id: HandleId,
    first_write: bool,
}

impl MockOutput {
    pub(crate) fn new(
        shared: Arc<Shared>,
        slot: Arc<HandleSlot<Box<dyn IndexOutput>>>,
        id: HandleId,
    ) -> Self {
        MockOutput {
            shared,
            slot,
            id,
            first_write: true,
        }
    }

    /// File this output writes
    pub fn name(&self) -> &str {
        self.slot.name()
    }

    fn disk_full(&self, free: u64, requested: u64, partial: &[u8]) -> Result<Error> {
        self.slot.with(|d| {
            if !partial.is_empty() {
                d.write_bytes(partial)?;
            }
            d.flush()
        })?;
        let usage = self.shared.recomputed_actual_size()?;
        let file_length = self.slot.with(|d| d.length())?;
        debug!(
            target: "faultline::disk",
            name = self.name(),
            usage,
            file_length,
            written = free,
            requested,
            "Fake disk full"
        );
        Ok(Error::DiskFull {
            name: self.name().to_string(),
            usage,
            file_length,
            written: free,
            requested,
        })
    }
}

impl fmt::Debug for MockOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockOutput")
            .field("name", &self.name())
            .field("closed", &self.slot.is_closed())
            .finish()
    }
}

impl IndexOutput for MockOutput {
    fn write_byte(&mut self, b: u8) -> Result<()> {
        self.write_bytes(&[b])
    }

    fn write_bytes(&mut self, buf: &[u8]) -> Result<()> {
        self.shared.check_not_crashed("write to", self.name())?;

        // a quota set after create may face a buffering delegate
        if self.shared.quota_enabled() {
            self.slot.with(|d| d.flush())?;
        }
        let requested = buf.len() as u64;
        if let Some(free) = self.shared.disk_quota(requested)? {
            let partial = &buf[..free as usize];
            return Err(self.disk_full(free, requested, partial)?);
        }

        if buf.len() > 1 && self.shared.split_write() {
            let half = buf.len() / 2;
            self.slot.with(|d| d.write_bytes(&buf[..half]))?;
            thread::yield_now();
            self.slot.with(|d| d.write_bytes(&buf[half..]))?;
        } else {
            self.slot.with(|d| d.write_bytes(buf))?;
        }

        self.shared.eval_hooks(Operation::Write, self.name())?;

        if self.first_write {
            self.first_write = false;
            self.shared.first_write_fault(self.name())?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        let hooks = self.shared.eval_hooks(Operation::Flush, self.name());
        let flushed = self.slot.with(|d| d.flush());
        hooks.and(flushed)
    }

    fn position(&self) -> Result<u64> {
        self.slot.with(|d| d.position())
    }

    fn length(&self) -> Result<u64> {
        self.slot.with(|d| d.length())
    }

    fn set_length(&mut self, len: u64) -> Result<()> {
        self.shared.check_not_crashed("truncate", self.name())?;
        self.slot.with(|d| d.set_length(len))
    }

    fn seek(&mut self, pos: u64) -> Result<()> {
        self.slot.with(|d| d.seek(pos))
    }

    fn checksum(&mut self) -> Result<u32> {
        self.slot.with(|d| d.checksum())
    }

    fn close(&mut self) -> Result<()> {
        let Some(mut delegate) = self.slot.take() else {
            return Ok(());
        };
        let hooks = self.shared.eval_hooks(Operation::CloseOutput, self.name());
        let closed = delegate.close();
        self.shared.output_closed(self.id, self.name());
        hooks.and(closed)
    }
}
