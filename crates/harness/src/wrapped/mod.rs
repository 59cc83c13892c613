//! Wrapped handles returned by the fault-injecting directory
//!
//! - MockInput: registered read handle; clones and slices are tracked but
//!   not registered
//! - SlowOpeningInput / SlowClosingInput: inputs with an added open or close
//!   delay
//! - MockOutput: write handle enforcing crash state, disk quota and hooks
//! - MockSlicer: slicer whose slices are registered inputs
//! - MockLockFactory / MockLock: locks tracked in the held-lock set

mod input;
mod lock;
mod output;
mod slicer;
mod slot;

pub use input::{MockInput, SlowClosingInput, SlowOpeningInput};
pub use lock::{MockLock, MockLockFactory};
pub use output::MockOutput;
pub use slicer::MockSlicer;

pub(crate) use slot::HandleSlot;
