//! Error types for faultline
//!
//! Every directory, handle and harness operation returns [`Result`]. The
//! variants distinguish injected faults (which code under test is expected to
//! survive) from harness-detected caller bugs (leaks, use after close, deleting
//! open files) which should fail the test.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::io;
use thiserror::Error;

use crate::trace::{HandleKind, OpenTrace};

/// Result type alias for faultline operations
pub type Result<T> = std::result::Result<T, Error>;

/// What a caller tried to do with a file that is still open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileAction {
    /// `delete_file`
    Delete,
    /// `create_output` over an existing open name
    Overwrite,
    /// `open_input` / `create_slicer` on a file still open for writing
    Read,
}

impl fmt::Display for FileAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FileAction::Delete => "delete",
            FileAction::Overwrite => "overwrite",
            FileAction::Read => "read",
        })
    }
}

/// Error types for directories and the fault-injecting harness
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from a real backend
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Probability- or hook-driven fault; recoverable from the caller's side
    #[error("{message}")]
    Injected {
        /// Description of the injected fault
        message: String,
    },

    /// Configured quota would be exceeded by a write
    #[error(
        "fake disk full at {usage} bytes when writing {name} (file length={file_length}; wrote {written} of {requested} bytes)"
    )]
    DiskFull {
        /// File being written
        name: String,
        /// Recomputed directory usage after the partial write
        usage: u64,
        /// Length of the file after the partial write
        file_length: u64,
        /// Bytes of the request that were written before the limit
        written: u64,
        /// Bytes requested
        requested: u64,
    },

    /// File does not exist (or a not-found fault was injected on open)
    #[error("file not found: {name}")]
    FileNotFound {
        /// Missing file name
        name: String,
    },

    /// Write-once policy violated
    #[error("file \"{name}\" was already written to")]
    AlreadyExists {
        /// File name
        name: String,
    },

    /// Delete/overwrite/read refused because the file is still open
    #[error("file \"{name}\" is still open: cannot {action}")]
    FileInUse {
        /// File name
        name: String,
        /// Refused action
        action: FileAction,
        /// Context of the handle that holds the file open
        #[source]
        cause: Option<OpenTrace>,
    },

    /// Mutating call on a crashed directory
    #[error("directory was crashed: cannot {action} {name}")]
    Crashed {
        /// Refused action
        action: &'static str,
        /// File name
        name: String,
    },

    /// Handle used after its own close; a caller bug, never retry
    #[error("use of closed {kind} handle: {name}")]
    UseAfterClose {
        /// Handle kind
        kind: HandleKind,
        /// File name
        name: String,
    },

    /// Handles still open when the directory was closed
    #[error("cannot close: there are still open files: {files:?}")]
    LeakedHandles {
        /// Open files and their open counts
        files: BTreeMap<String, usize>,
        /// Context of the first leaked handle
        #[source]
        cause: Option<OpenTrace>,
    },

    /// Locks still held when the directory was closed
    #[error("cannot close: there are still open locks: {locks:?}")]
    LeakedLocks {
        /// Held lock names
        locks: BTreeSet<String>,
    },

    /// Assertion-style failure, raised instead of `FileInUse` under the assert policy
    #[error("invariant violation: {message}")]
    InvariantViolation {
        /// What was violated
        message: String,
        /// Context of the offending handle, if any
        #[source]
        cause: Option<OpenTrace>,
    },

    /// Read or seek past the end of a file
    #[error("read past EOF: {name}")]
    Eof {
        /// File name
        name: String,
    },

    /// Operation on a closed directory
    #[error("this directory is closed")]
    AlreadyClosed,

    /// Structural verification of the directory contents failed
    #[error("index check failed: {0}")]
    IndexCheck(String),

    /// Replaying the directory deleted files nobody referenced
    #[error("unreferenced files: before delete {before:?}, after delete {after:?}")]
    UnreferencedFiles {
        /// Files present before the replay (minus blocked deletions)
        before: Vec<String>,
        /// Files present after the replay
        after: Vec<String>,
    },

    /// Lock could not be obtained
    #[error("lock obtain failed: {0}")]
    LockObtainFailed(String),

    /// Configuration rejected by validation
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Create an injected fault
    pub fn injected(message: impl Into<String>) -> Self {
        Error::Injected {
            message: message.into(),
        }
    }

    /// Create a not-found error
    pub fn not_found(name: impl Into<String>) -> Self {
        Error::FileNotFound { name: name.into() }
    }

    /// Whether this is an injected fault
    pub fn is_injected(&self) -> bool {
        matches!(self, Error::Injected { .. })
    }

    /// Whether this reports a missing file
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::FileNotFound { .. } => true,
            Error::Io(e) => e.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }

    /// Whether this is a fake disk-full
    pub fn is_disk_full(&self) -> bool {
        matches!(self, Error::DiskFull { .. })
    }

    /// Whether this flags a caller bug rather than an I/O condition
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::UseAfterClose { .. }
                | Error::LeakedHandles { .. }
                | Error::LeakedLocks { .. }
                | Error::InvariantViolation { .. }
        )
    }
}
