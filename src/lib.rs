//! Faultline - deterministic fault injection for storage code
//!
//! Faultline wraps a storage `Directory` (a flat set of write-once files plus
//! advisory locks) in a [`MockDirectory`] that injects I/O errors, simulates
//! a full disk, refuses to delete open files, throttles writes and simulates
//! crashes that damage exactly the data nobody synced. Handles are tracked so
//! leaks and use-after-close fail the test that caused them.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use faultline::{Directory, HarnessConfig, IoContext, MockDirectory, RamDirectory};
//!
//! let dir = MockDirectory::with_config(
//!     Arc::new(RamDirectory::new()),
//!     7,
//!     HarnessConfig::default().with_random_io_exception_rate(0.1),
//! )?;
//!
//! let mut out = dir.create_output("_0.dat", IoContext::Default)?;
//! out.write_bytes(b"hello")?; // may fail with an injected error
//! out.close()?;
//! dir.sync(&["_0.dat".to_string()])?;
//! dir.close()?;
//! # Ok::<(), faultline::Error>(())
//! ```
//!
//! # Crates
//!
//! - `faultline-core`: the Directory contract, errors and handle traces
//! - `faultline-storage`: RAM, filesystem and pass-through backends
//! - `faultline-harness`: the fault-injecting wrapper

pub use faultline_core::{
    is_segments_file, Directory, Error, FileAction, HandleKind, IndexInput, IndexOutput,
    InputSlicer, IoContext, Lock, LockFactory, OpenTrace, Result, Slicer, GENERATION_MARKER,
    SEGMENTS_PREFIX,
};
pub use faultline_harness::{
    BaseDirectoryWrapper, CorruptionAction, CrashReport, FailureHook, FailureHookChain,
    FailurePoint, HarnessConfig, IndexVerifier, MockDirectory, NoopFailure, NoopVerifier,
    Operation, OperationFailure, ThrottlePolicy, Throttling,
};
pub use faultline_storage::{
    FilterDirectory, FsDirectory, NoLockFactory, RamDirectory, SingleInstanceLockFactory,
};

