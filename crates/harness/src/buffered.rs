//! Random-size write buffering
//!
//! Some outputs are wrapped in a [`BufferedOutput`] with a capacity drawn per
//! handle, so code under test sees writes reach the backend at varying
//! granularity.

use faultline_core::{IndexOutput, Result};

/// Output wrapper that batches writes in a fixed-capacity buffer
#[derive(Debug)]
pub struct BufferedOutput {
    delegate: Box<dyn IndexOutput>,
    buffer: Vec<u8>,
    capacity: usize,
    closed: bool,
}

impl BufferedOutput {
    /// Wrap `delegate` with a buffer of `capacity` bytes (at least 1)
    pub fn new(delegate: Box<dyn IndexOutput>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        BufferedOutput {
            delegate,
            buffer: Vec::with_capacity(capacity),
            capacity,
            closed: false,
        }
    }

    /// Buffer capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn flush_buffer(&mut self) -> Result<()> {
        if !self.buffer.is_empty() {
            self.delegate.write_bytes(&self.buffer)?;
            self.buffer.clear();
        }
        Ok(())
    }
}

impl IndexOutput for BufferedOutput {
    fn write_byte(&mut self, b: u8) -> Result<()> {
        self.write_bytes(&[b])
    }

    fn write_bytes(&mut self, buf: &[u8]) -> Result<()> {
        if self.closed {
            // surface the delegate's closed-handle error
            return self.delegate.write_bytes(buf);
        }
        if self.buffer.len() + buf.len() > self.capacity {
            self.flush_buffer()?;
            if buf.len() >= self.capacity {
                return self.delegate.write_bytes(buf);
            }
        }
        self.buffer.extend_from_slice(buf);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.flush_buffer()?;
        self.delegate.flush()
    }

    fn position(&self) -> Result<u64> {
        Ok(self.delegate.position()? + self.buffer.len() as u64)
    }

    fn length(&self) -> Result<u64> {
        let end = self.position()?;
        Ok(self.delegate.length()?.max(end))
    }

    fn set_length(&mut self, len: u64) -> Result<()> {
        self.flush_buffer()?;
        self.delegate.set_length(len)
    }

    fn seek(&mut self, pos: u64) -> Result<()> {
        self.flush_buffer()?;
        self.delegate.seek(pos)
    }

    fn checksum(&mut self) -> Result<u32> {
        self.flush_buffer()?;
        self.delegate.checksum()
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let flushed = self.flush_buffer();
        let closed = self.delegate.close();
        flushed.and(closed)
    }
}
