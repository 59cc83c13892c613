//! Filesystem-backed directory
//!
//! One regular file per name under a root path. `sync` calls `fsync` on each
//! file (and on the root directory on unix), so `requires_sync` is `true`:
//! the harness must not skip real syncs on top of this backend.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use faultline_core::{
    Directory, Error, HandleKind, IndexInput, IndexOutput, IoContext, LockFactory, Result,
};
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::lock::SingleInstanceLockFactory;

fn io_error(name: &str, err: io::Error) -> Error {
    if err.kind() == io::ErrorKind::NotFound {
        Error::not_found(name)
    } else {
        Error::Io(err)
    }
}

/// Directory storing each file as a regular file under `root`
pub struct FsDirectory {
    root: PathBuf,
    lock_factory: RwLock<Arc<dyn LockFactory>>,
}

impl fmt::Debug for FsDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FsDirectory")
            .field("root", &self.root)
            .finish()
    }
}

impl FsDirectory {
    /// Open (creating if needed) a directory rooted at `root`
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        debug!(root = %root.display(), "Opened filesystem directory");
        Ok(FsDirectory {
            root,
            lock_factory: RwLock::new(Arc::new(SingleInstanceLockFactory::new())),
        })
    }

    /// Root path
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    #[cfg(unix)]
    fn sync_root(&self) -> Result<()> {
        File::open(&self.root)?.sync_all()?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_root(&self) -> Result<()> {
        Ok(())
    }
}

impl Directory for FsDirectory {
    fn list_all(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                if let Ok(name) = entry.file_name().into_string() {
                    names.push(name);
                }
            }
        }
        Ok(names)
    }

    fn file_exists(&self, name: &str) -> Result<bool> {
        Ok(self.path(name).is_file())
    }

    fn file_length(&self, name: &str) -> Result<u64> {
        let meta = fs::metadata(self.path(name)).map_err(|e| io_error(name, e))?;
        Ok(meta.len())
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        fs::remove_file(self.path(name)).map_err(|e| io_error(name, e))
    }

    fn create_output(&self, name: &str, _context: IoContext) -> Result<Box<dyn IndexOutput>> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(self.path(name))
            .map_err(|e| io_error(name, e))?;
        Ok(Box::new(FsOutput {
            name: name.to_string(),
            file: Some(file),
            pos: 0,
            hasher: crc32fast::Hasher::new(),
        }))
    }

    fn open_input(&self, name: &str, _context: IoContext) -> Result<Box<dyn IndexInput>> {
        let file = File::open(self.path(name)).map_err(|e| io_error(name, e))?;
        let len = file.metadata()?.len();
        Ok(Box::new(FsInput {
            name: name.to_string(),
            file: Arc::new(Mutex::new(file)),
            base: 0,
            len,
            pos: 0,
            closed: false,
        }))
    }

    fn sync(&self, names: &[String]) -> Result<()> {
        for name in names {
            let file = File::open(self.path(name)).map_err(|e| io_error(name, e))?;
            file.sync_all()?;
        }
        self.sync_root()
    }

    fn lock_factory(&self) -> Arc<dyn LockFactory> {
        Arc::clone(&self.lock_factory.read())
    }

    fn set_lock_factory(&self, factory: Arc<dyn LockFactory>) -> Result<()> {
        *self.lock_factory.write() = factory;
        Ok(())
    }

    fn requires_sync(&self) -> bool {
        true
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

struct FsOutput {
    name: String,
    file: Option<File>,
    pos: u64,
    hasher: crc32fast::Hasher,
}

impl fmt::Debug for FsOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FsOutput")
            .field("name", &self.name)
            .field("pos", &self.pos)
            .finish()
    }
}

impl FsOutput {
    fn file(&self) -> Result<&File> {
        self.file.as_ref().ok_or_else(|| Error::UseAfterClose {
            kind: HandleKind::Output,
            name: self.name.clone(),
        })
    }

    fn file_mut(&mut self) -> Result<&mut File> {
        match self.file.as_mut() {
            Some(file) => Ok(file),
            None => Err(Error::UseAfterClose {
                kind: HandleKind::Output,
                name: self.name.clone(),
            }),
        }
    }
}

impl IndexOutput for FsOutput {
    fn write_byte(&mut self, b: u8) -> Result<()> {
        self.write_bytes(&[b])
    }

    fn write_bytes(&mut self, buf: &[u8]) -> Result<()> {
        self.file_mut()?.write_all(buf)?;
        self.pos += buf.len() as u64;
        self.hasher.update(buf);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.file_mut()?.flush()?;
        Ok(())
    }

    fn position(&self) -> Result<u64> {
        self.file()?;
        Ok(self.pos)
    }

    fn length(&self) -> Result<u64> {
        Ok(self.file()?.metadata()?.len())
    }

    fn set_length(&mut self, len: u64) -> Result<()> {
        self.file()?.set_len(len)?;
        Ok(())
    }

    fn seek(&mut self, pos: u64) -> Result<()> {
        self.file_mut()?.seek(SeekFrom::Start(pos))?;
        self.pos = pos;
        Ok(())
    }

    fn checksum(&mut self) -> Result<u32> {
        self.file()?;
        Ok(self.hasher.clone().finalize())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
        }
        Ok(())
    }
}

/// Clones and slices share one descriptor; every read seeks first.
struct FsInput {
    name: String,
    file: Arc<Mutex<File>>,
    base: u64,
    len: u64,
    pos: u64,
    closed: bool,
}

impl fmt::Debug for FsInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FsInput")
            .field("name", &self.name)
            .field("base", &self.base)
            .field("len", &self.len)
            .field("pos", &self.pos)
            .finish()
    }
}

impl FsInput {
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

    fn view(&self, base: u64, len: u64, pos: u64) -> FsInput {
        FsInput {
            name: self.name.clone(),
            file: Arc::clone(&self.file),
            base,
            len,
            pos,
            closed: false,
        }
    }
}

impl IndexInput for FsInput {
    fn read_byte(&mut self) -> Result<u8> {
        let mut b = [0u8; 1];
        self.read_bytes(&mut b)?;
        Ok(b[0])
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<()> {
        self.ensure_open()?;
        if self.pos + buf.len() as u64 > self.len {
            return Err(self.eof());
        }
        {
            let mut file = self.file.lock();
            file.seek(SeekFrom::Start(self.base + self.pos))?;
            file.read_exact(buf).map_err(|e| match e.kind() {
                io::ErrorKind::UnexpectedEof => self.eof(),
                _ => Error::Io(e),
            })?;
        }
        self.pos += buf.len() as u64;
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
        Ok(Box::new(self.view(self.base, self.len, self.pos)))
    }

    fn slice(&self, description: &str, offset: u64, length: u64) -> Result<Box<dyn IndexInput>> {
        self.ensure_open()?;
        if offset + length > self.len {
            return Err(Error::Eof {
                name: format!("{} [slice={}]", self.name, description),
            });
        }
        Ok(Box::new(self.view(self.base + offset, length, 0)))
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}
