//! Fault-injecting directory harness
//!
//! This crate wraps any `Directory` in a [`MockDirectory`] that deliberately
//! perturbs I/O so storage code built on top of it can be tested against:
//! - random I/O errors on open and on the first write of a file
//! - a simulated disk quota with partial writes
//! - "cannot delete or overwrite an open file" semantics
//! - crashes that damage exactly the data that was never synced
//! - throttled outputs and slow input open/close
//!
//! Every handle is tracked with the context it was opened in, so leaks and
//! use-after-close are reported deterministically. All random decisions come
//! from one seeded generator per directory.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod base;
pub mod buffered;
pub mod config;
pub mod crash;
pub mod directory;
pub mod failure;
pub mod lifecycle;
pub mod registry;
mod state;
pub mod throttle;
pub mod verify;
pub mod wrapped;

pub use base::BaseDirectoryWrapper;
pub use buffered::BufferedOutput;
pub use config::{HarnessConfig, ThrottlePolicy, Throttling};
pub use crash::{CorruptionAction, CrashReport};
pub use directory::MockDirectory;
pub use failure::{
    FailureHook, FailureHookChain, FailurePoint, NoopFailure, Operation, OperationFailure,
};
pub use lifecycle::{Lifecycle, LifecycleState};
pub use registry::{HandleId, HandleRegistry};
pub use throttle::{ThrottleController, ThrottledOutput};
pub use verify::{IndexVerifier, NoopVerifier};
pub use wrapped::{
    MockInput, MockLock, MockLockFactory, MockOutput, MockSlicer, SlowClosingInput,
    SlowOpeningInput,
};
