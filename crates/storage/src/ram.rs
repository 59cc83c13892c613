//! In-memory directory
//!
//! Files live in a `FxHashMap<String, Arc<RamFile>>`. Creating an output
//! replaces the map entry with a fresh file, so inputs opened earlier keep
//! reading the old bytes (POSIX unlink semantics). Outputs write straight into
//! the shared buffer, which keeps `file_length` and `size_in_bytes` exact while
//! a file is still being written.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use faultline_core::{
    Directory, Error, HandleKind, IndexInput, IndexOutput, IoContext, LockFactory, Result,
};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::lock::SingleInstanceLockFactory;

#[derive(Debug, Default)]
struct RamFile {
    data: RwLock<Vec<u8>>,
}

impl RamFile {
    fn len(&self) -> u64 {
        self.data.read().len() as u64
    }
}

/// Directory keeping every file in memory
pub struct RamDirectory {
    files: RwLock<FxHashMap<String, Arc<RamFile>>>,
    lock_factory: RwLock<Arc<dyn LockFactory>>,
    closed: AtomicBool,
}

impl Default for RamDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RamDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RamDirectory")
            .field("files", &self.files.read().len())
            .field("closed", &self.closed.load(Ordering::Acquire))
            .finish()
    }
}

impl RamDirectory {
    /// Create an empty directory with a `SingleInstanceLockFactory`
    pub fn new() -> Self {
        RamDirectory {
            files: RwLock::new(FxHashMap::default()),
            lock_factory: RwLock::new(Arc::new(SingleInstanceLockFactory::new())),
            closed: AtomicBool::new(false),
        }
    }

    /// Copy the bytes of `name` out of the directory (test helper)
    pub fn read_file(&self, name: &str) -> Result<Vec<u8>> {
        self.ensure_open()?;
        Ok(self.file(name)?.data.read().clone())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::AlreadyClosed);
        }
        Ok(())
    }

    fn file(&self, name: &str) -> Result<Arc<RamFile>> {
        self.files
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::not_found(name))
    }
}

impl Directory for RamDirectory {
    fn list_all(&self) -> Result<Vec<String>> {
        self.ensure_open()?;
        Ok(self.files.read().keys().cloned().collect())
    }

    fn file_exists(&self, name: &str) -> Result<bool> {
        self.ensure_open()?;
        Ok(self.files.read().contains_key(name))
    }

    fn file_length(&self, name: &str) -> Result<u64> {
        self.ensure_open()?;
        Ok(self.file(name)?.len())
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        self.ensure_open()?;
        match self.files.write().remove(name) {
            Some(_) => Ok(()),
            None => Err(Error::not_found(name)),
        }
    }

    fn create_output(&self, name: &str, _context: IoContext) -> Result<Box<dyn IndexOutput>> {
        self.ensure_open()?;
        let file = Arc::new(RamFile::default());
        self.files.write().insert(name.to_string(), Arc::clone(&file));
        Ok(Box::new(RamOutput {
            name: name.to_string(),
            file,
            pos: 0,
            hasher: crc32fast::Hasher::new(),
            closed: false,
        }))
    }

    fn open_input(&self, name: &str, _context: IoContext) -> Result<Box<dyn IndexInput>> {
        self.ensure_open()?;
        let file = self.file(name)?;
        let len = file.len();
        Ok(Box::new(RamInput {
            name: name.to_string(),
            file,
            base: 0,
            len,
            pos: 0,
            closed: false,
        }))
    }

    fn sync(&self, names: &[String]) -> Result<()> {
        self.ensure_open()?;
        let files = self.files.read();
        match names.iter().find(|name| !files.contains_key(name.as_str())) {
            Some(missing) => Err(Error::not_found(missing.as_str())),
            None => Ok(()),
        }
    }

    fn lock_factory(&self) -> Arc<dyn LockFactory> {
        Arc::clone(&self.lock_factory.read())
    }

    fn set_lock_factory(&self, factory: Arc<dyn LockFactory>) -> Result<()> {
        *self.lock_factory.write() = factory;
        Ok(())
    }

    fn size_in_bytes(&self) -> Result<u64> {
        self.ensure_open()?;
        Ok(self.files.read().values().map(|f| f.len()).sum())
    }

    fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        self.files.write().clear();
        Ok(())
    }
}

struct RamOutput {
    name: String,
    file: Arc<RamFile>,
    pos: u64,
    hasher: crc32fast::Hasher,
    closed: bool,
}

impl fmt::Debug for RamOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RamOutput")
            .field("name", &self.name)
            .field("pos", &self.pos)
            .field("closed", &self.closed)
            .finish()
    }
}

impl RamOutput {
    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::UseAfterClose {
                kind: HandleKind::Output,
                name: self.name.clone(),
            });
        }
        Ok(())
    }
}

impl IndexOutput for RamOutput {
    fn write_byte(&mut self, b: u8) -> Result<()> {
        self.write_bytes(&[b])
    }

    fn write_bytes(&mut self, buf: &[u8]) -> Result<()> {
        self.ensure_open()?;
        let start = self.pos as usize;
        let end = start + buf.len();
        {
            let mut data = self.file.data.write();
            if data.len() < end {
                data.resize(end, 0);
            }
            data[start..end].copy_from_slice(buf);
        }
        self.pos = end as u64;
        self.hasher.update(buf);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.ensure_open()
    }

    fn position(&self) -> Result<u64> {
        self.ensure_open()?;
        Ok(self.pos)
    }

    fn length(&self) -> Result<u64> {
        self.ensure_open()?;
        Ok(self.file.len())
    }

    fn set_length(&mut self, len: u64) -> Result<()> {
        self.ensure_open()?;
        self.file.data.write().resize(len as usize, 0);
        Ok(())
    }

    fn seek(&mut self, pos: u64) -> Result<()> {
        self.ensure_open()?;
        self.pos = pos;
        Ok(())
    }

    fn checksum(&mut self) -> Result<u32> {
        self.ensure_open()?;
        Ok(self.hasher.clone().finalize())
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

#[derive(Clone)]
struct RamInput {
    name: String,
    file: Arc<RamFile>,
    base: u64,
    len: u64,
    pos: u64,
    closed: bool,
}

impl fmt::Debug for RamInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RamInput")
            .field("name", &self.name)
            .field("base", &self.base)
            .field("len", &self.len)
            .field("pos", &self.pos)
            .finish()
    }
}

impl RamInput {
    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::UseAfterClose {
                kind: HandleKind::Input,
                name: self.name.clone(),
            });
        }
        Ok(())
    }

    fn eof(&self) -> Error {
        Error::Eof {
            name: self.name.clone(),
        }
    }
}

impl IndexInput for RamInput {
    fn read_byte(&mut self) -> Result<u8> {
        let mut b = [0u8; 1];
        self.read_bytes(&mut b)?;
        Ok(b[0])
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<()> {
        self.ensure_open()?;
        let n = buf.len() as u64;
        if self.pos + n > self.len {
            return Err(self.eof());
        }
        let start = (self.base + self.pos) as usize;
        let data = self.file.data.read();
        // a concurrent set_length may have shrunk the file
        let src = data.get(start..start + buf.len()).ok_or_else(|| self.eof())?;
        buf.copy_from_slice(src);
        self.pos += n;
        Ok(())
    }

    fn position(&self) -> Result<u64> {
        self.ensure_open()?;
        Ok(self.pos)
    }

    fn seek(&mut self, pos: u64) -> Result<()> {
        self.ensure_open()?;
        if pos > self.len {
            return Err(self.eof());
        }
        self.pos = pos;
        Ok(())
    }

    fn length(&self) -> Result<u64> {
        self.ensure_open()?;
        Ok(self.len)
    }

    fn clone_input(&self) -> Result<Box<dyn IndexInput>> {
        self.ensure_open()?;
        Ok(Box::new(self.clone()))
    }

    fn slice(&self, description: &str, offset: u64, length: u64) -> Result<Box<dyn IndexInput>> {
        self.ensure_open()?;
        if offset + length > self.len {
            return Err(Error::Eof {
                name: format!("{} [slice={}]", self.name, description),
            });
        }
        Ok(Box::new(RamInput {
            name: self.name.clone(),
            file: Arc::clone(&self.file),
            base: self.base + offset,
            len: length,
            pos: 0,
            closed: false,
        }))
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}
