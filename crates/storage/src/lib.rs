//! Reference directory backends for faultline
//!
//! This crate implements the storage side of the Directory contract:
//! - RamDirectory: in-memory files, exact sizes while writing
//! - FsDirectory: one regular file per name, real fsync (`requires_sync`)
//! - FilterDirectory: pure pass-through, forwards capability queries
//! - SingleInstanceLockFactory / NoLockFactory: in-process advisory locks
//!
//! These are the collaborators the fault-injecting harness wraps; they do
//! no fault injection themselves.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod filter;
pub mod fs;
pub mod lock;
pub mod ram;

pub use filter::FilterDirectory;
pub use fs::FsDirectory;
pub use lock::{NoLockFactory, SingleInstanceLockFactory};
pub use ram::RamDirectory;
