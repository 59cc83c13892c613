//! The Directory contract
//!
//! A [`Directory`] is a flat, named set of write-once byte files plus advisory
//! locks. Files are produced by an [`IndexOutput`] (append, then immutable
//! once closed) and read back through any number of [`IndexInput`]s.
//!
//! All methods take `&self`; implementations use interior mutability and must
//! be safe to call from several threads at once. Handles are closed
//! explicitly with `close()`; dropping a handle without closing it is a leak
//! that checking wrappers are entitled to report.

use std::fmt;
use std::sync::Arc;

use tracing::warn;

use crate::context::IoContext;
use crate::error::{Error, Result};
use crate::lock::{Lock, LockFactory};
use crate::trace::HandleKind;

/// Chunk size used by the default `copy_bytes`
pub const COPY_BUFFER_SIZE: usize = 16 * 1024;

/// Storage abstraction wrapped and re-exposed by the harness
pub trait Directory: Send + Sync + fmt::Debug {
    /// Names of all files, in no particular order
    fn list_all(&self) -> Result<Vec<String>>;

    /// Whether `name` exists
    fn file_exists(&self, name: &str) -> Result<bool>;

    /// Length of `name` in bytes
    ///
    /// # Errors
    ///
    /// `Error::FileNotFound` if the file does not exist.
    fn file_length(&self, name: &str) -> Result<u64>;

    /// Remove `name`
    ///
    /// # Errors
    ///
    /// `Error::FileNotFound` if the file does not exist.
    fn delete_file(&self, name: &str) -> Result<()>;

    /// Create (or replace) `name` and return a handle to write it
    fn create_output(&self, name: &str, context: IoContext) -> Result<Box<dyn IndexOutput>>;

    /// Open `name` for reading
    ///
    /// # Errors
    ///
    /// `Error::FileNotFound` if the file does not exist.
    fn open_input(&self, name: &str, context: IoContext) -> Result<Box<dyn IndexInput>>;

    /// Make the current contents of `names` durable
    fn sync(&self, names: &[String]) -> Result<()>;

    /// Create a lock instance through the current lock factory
    fn make_lock(&self, name: &str) -> Result<Box<dyn Lock>> {
        Ok(self.lock_factory().make_lock(name))
    }

    /// Forcefully release `name` through the current lock factory
    fn clear_lock(&self, name: &str) -> Result<()> {
        self.lock_factory().clear_lock(name)
    }

    /// Current lock factory
    fn lock_factory(&self) -> Arc<dyn LockFactory>;

    /// Replace the lock factory
    fn set_lock_factory(&self, factory: Arc<dyn LockFactory>) -> Result<()>;

    /// Copy `src` from this directory to `dest` in `to`
    ///
    /// On failure the partially written destination is removed.
    fn copy(&self, to: &dyn Directory, src: &str, dest: &str, context: IoContext) -> Result<()> {
        let mut input = self.open_input(src, context)?;
        let copied = copy_into(to, input.as_mut(), dest, context);
        let closed = input.close();
        if copied.is_err() {
            if let Err(e) = to.delete_file(dest) {
                warn!(target: "faultline::directory", dest, error = %e, "Failed to remove partial copy");
            }
        }
        copied.and(closed)
    }

    /// Open `name` once and hand out slices of it
    fn create_slicer(&self, name: &str, context: IoContext) -> Result<Box<dyn Slicer>> {
        let base = self.open_input(name, context)?;
        Ok(Box::new(InputSlicer::new(name, base)))
    }

    /// Bytes currently used by all files
    fn size_in_bytes(&self) -> Result<u64> {
        let mut total = 0;
        for name in self.list_all()? {
            match self.file_length(&name) {
                Ok(len) => total += len,
                // raced with a delete
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }
        Ok(total)
    }

    /// Whether `sync` must really reach stable storage
    ///
    /// Layered wrappers forward the query to their delegate.
    fn requires_sync(&self) -> bool {
        false
    }

    /// Whether outputs created here are already rate limited
    ///
    /// Layered wrappers forward the query to their delegate.
    fn is_throttled(&self) -> bool {
        false
    }

    /// Release the directory's resources
    fn close(&self) -> Result<()>;
}

fn copy_into(
    to: &dyn Directory,
    input: &mut dyn IndexInput,
    dest: &str,
    context: IoContext,
) -> Result<()> {
    let mut output = to.create_output(dest, context)?;
    let len = input.length()?;
    let copied = output.copy_bytes(input, len);
    let closed = output.close();
    copied.and(closed)
}

/// Write handle for one file
pub trait IndexOutput: Send + fmt::Debug {
    /// Write one byte at the current position
    fn write_byte(&mut self, b: u8) -> Result<()>;

    /// Write `buf` at the current position
    fn write_bytes(&mut self, buf: &[u8]) -> Result<()>;

    /// Push buffered bytes to the backend (not a durability barrier)
    fn flush(&mut self) -> Result<()>;

    /// Current write position
    fn position(&self) -> Result<u64>;

    /// Current file length
    fn length(&self) -> Result<u64>;

    /// Truncate or extend the file
    fn set_length(&mut self, len: u64) -> Result<()>;

    /// Move the write position
    fn seek(&mut self, pos: u64) -> Result<()>;

    /// CRC-32 over all bytes written through this handle
    fn checksum(&mut self) -> Result<u32>;

    /// Copy `num_bytes` from `input`'s current position
    fn copy_bytes(&mut self, input: &mut dyn IndexInput, num_bytes: u64) -> Result<()> {
        let mut buf = vec![0u8; COPY_BUFFER_SIZE.min(num_bytes as usize)];
        let mut remaining = num_bytes;
        while remaining > 0 {
            let chunk = remaining.min(buf.len() as u64) as usize;
            input.read_bytes(&mut buf[..chunk])?;
            self.write_bytes(&buf[..chunk])?;
            remaining -= chunk as u64;
        }
        Ok(())
    }

    /// Close the handle; closing twice is a no-op
    fn close(&mut self) -> Result<()>;
}

/// Read handle for one file (or a slice of one)
pub trait IndexInput: Send + fmt::Debug {
    /// Read one byte
    fn read_byte(&mut self) -> Result<u8>;

    /// Fill `buf` completely
    ///
    /// # Errors
    ///
    /// `Error::Eof` if fewer than `buf.len()` bytes remain.
    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<()>;

    /// Current read position
    fn position(&self) -> Result<u64>;

    /// Move the read position; `pos == length()` is legal
    fn seek(&mut self, pos: u64) -> Result<()>;

    /// Length of the file (or slice)
    fn length(&self) -> Result<u64>;

    /// Independent cursor over the same bytes, starting at the same position
    fn clone_input(&self) -> Result<Box<dyn IndexInput>>;

    /// Sub-range `[offset, offset + length)` as its own input, positioned at 0
    fn slice(&self, description: &str, offset: u64, length: u64) -> Result<Box<dyn IndexInput>>;

    /// Close the handle; closing twice is a no-op
    fn close(&mut self) -> Result<()>;
}

/// Hands out slices of a single opened file
pub trait Slicer: Send + fmt::Debug {
    /// Slice `[offset, offset + length)`
    fn open_slice(
        &mut self,
        description: &str,
        offset: u64,
        length: u64,
    ) -> Result<Box<dyn IndexInput>>;

    /// Slice covering the whole file
    fn open_full_slice(&mut self) -> Result<Box<dyn IndexInput>>;

    /// Close the slicer; slices already handed out stay usable
    fn close(&mut self) -> Result<()>;
}

/// Default [`Slicer`]: one opened input, sliced on demand
#[derive(Debug)]
pub struct InputSlicer {
    name: String,
    base: Option<Box<dyn IndexInput>>,
}

impl InputSlicer {
    /// Wrap an already opened input
    pub fn new(name: impl Into<String>, base: Box<dyn IndexInput>) -> Self {
        InputSlicer {
            name: name.into(),
            base: Some(base),
        }
    }

    fn base(&self) -> Result<&dyn IndexInput> {
        self.base.as_deref().ok_or_else(|| Error::UseAfterClose {
            kind: HandleKind::Slice,
            name: self.name.clone(),
        })
    }
}

impl Slicer for InputSlicer {
    fn open_slice(
        &mut self,
        description: &str,
        offset: u64,
        length: u64,
    ) -> Result<Box<dyn IndexInput>> {
        self.base()?.slice(description, offset, length)
    }

    fn open_full_slice(&mut self) -> Result<Box<dyn IndexInput>> {
        let base = self.base()?;
        base.slice("full-slice", 0, base.length()?)
    }

    fn close(&mut self) -> Result<()> {
        match self.base.take() {
            Some(mut base) => base.close(),
            None => Ok(()),
        }
    }
}
