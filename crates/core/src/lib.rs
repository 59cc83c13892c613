//! Core contract for faultline
//!
//! This crate defines the storage abstraction the fault-injecting harness
//! wraps and re-exposes:
//! - Directory: named set of write-once byte files plus advisory locks
//! - IndexInput / IndexOutput / Slicer: file handles
//! - Lock / LockFactory: advisory locks
//! - IoContext: open-time access hints
//! - Error: error type hierarchy, including harness-detected caller bugs
//! - OpenTrace: allocation context recorded for every open handle

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod context;
pub mod directory;
pub mod error;
pub mod lock;
pub mod names;
pub mod trace;

pub use context::IoContext;
pub use directory::{
    Directory, IndexInput, IndexOutput, InputSlicer, Slicer, COPY_BUFFER_SIZE,
};
pub use error::{Error, FileAction, Result};
pub use lock::{Lock, LockFactory};
pub use names::{is_segments_file, GENERATION_MARKER, SEGMENTS_PREFIX};
pub use trace::{HandleKind, OpenTrace};
