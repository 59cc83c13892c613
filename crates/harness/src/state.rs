//! State shared by the directory and every handle it hands out
//!
//! One coarse `parking_lot::Mutex` guards the policy state, the random
//! generator and the registry, so the sequence of random draws is a pure
//! function of the seed and the order of operations. Handle delegates are
//! guarded separately (see `wrapped::slot`); code holding a slot lock never
//! takes the state lock.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::thread;

use dashmap::DashSet;
use faultline_core::{Directory, Error, FileAction, HandleKind, IndexInput, Result};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::config::HarnessConfig;
use crate::failure::{FailureHookChain, FailurePoint, Operation};
use crate::registry::{HandleId, HandleRegistry};
use crate::throttle::ThrottleController;
use crate::wrapped::{HandleSlot, MockInput};

pub(crate) struct HarnessState {
    pub(crate) config: HarnessConfig,
    pub(crate) rng: StdRng,
    pub(crate) registry: HandleRegistry,
    pub(crate) hooks: FailureHookChain,
    pub(crate) throttle: ThrottleController,
    /// Names written (or created) since their last sync, in name order
    pub(crate) unsynced: BTreeSet<String>,
    /// Every name ever created, for the write-once policy
    pub(crate) created: HashSet<String>,
    pub(crate) open_for_write: HashSet<String>,
    /// Names whose delete was refused because they were open
    pub(crate) open_deleted: BTreeSet<String>,
    pub(crate) crashed: bool,
    pub(crate) max_used_size: u64,
}

impl HarnessState {
    pub(crate) fn new(config: HarnessConfig, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let throttle = ThrottleController::from_policy(&config.throttle, &mut rng);
        HarnessState {
            config,
            rng,
            registry: HandleRegistry::new(),
            hooks: FailureHookChain::new(),
            throttle,
            unsynced: BTreeSet::new(),
            created: HashSet::new(),
            open_for_write: HashSet::new(),
            open_deleted: BTreeSet::new(),
            crashed: false,
            max_used_size: 0,
        }
    }

    /// "1 in n" draw; `n == 0` never hits and consumes nothing
    pub(crate) fn one_in(&mut self, n: u32) -> bool {
        n > 0 && self.rng.gen_range(0..n) == 0
    }

    /// Draw with probability `p`; `p <= 0` never hits and consumes nothing
    pub(crate) fn chance(&mut self, p: f64) -> bool {
        p > 0.0 && self.rng.gen::<f64>() < p
    }

    pub(crate) fn check_not_crashed(&self, action: &'static str, name: &str) -> Result<()> {
        if self.crashed {
            return Err(Error::Crashed {
                action,
                name: name.to_string(),
            });
        }
        Ok(())
    }

    pub(crate) fn eval_hooks(&self, point: FailurePoint<'_>) -> Result<()> {
        self.hooks.eval(&point).map_err(|e| {
            debug!(target: "faultline::failure", op = %point.op, name = point.name.unwrap_or(""), error = %e, "Failure hook fired");
            e
        })
    }

    /// Injected fault on the first write to a new file
    pub(crate) fn maybe_throw_io_exception(&mut self, name: &str) -> Result<()> {
        let rate = self.config.random_io_exception_rate;
        if self.chance(rate) {
            debug!(target: "faultline::failure", name, "Injecting random write failure");
            return Err(Error::injected(format!("a random I/O error ({})", name)));
        }
        Ok(())
    }

    /// Injected fault on create/open; may surface as not-found
    pub(crate) fn maybe_throw_io_exception_on_open(&mut self, name: &str) -> Result<()> {
        let rate = self.config.random_io_exception_rate_on_open;
        if !self.chance(rate) {
            return Ok(());
        }
        if self.config.allow_random_file_not_found && self.rng.gen_bool(0.5) {
            debug!(target: "faultline::failure", name, "Injecting random not-found on open");
            return Err(Error::not_found(format!("{} (random file not found)", name)));
        }
        debug!(target: "faultline::failure", name, "Injecting random failure on open");
        Err(Error::injected(format!("a random I/O error during open ({})", name)))
    }

    /// Error for touching a file that is still open
    ///
    /// Delete and overwrite honour the assert policy; reading a file still
    /// open for write is always a plain `FileInUse`.
    pub(crate) fn in_use_error(&self, name: &str, action: FileAction) -> Error {
        let kind = match action {
            FileAction::Read => Some(HandleKind::Output),
            FileAction::Delete | FileAction::Overwrite => None,
        };
        let cause = self.registry.trace_for(name, kind);
        if self.config.assert_no_delete_open_file && action != FileAction::Read {
            return Error::InvariantViolation {
                message: format!("file \"{}\" is still open: cannot {}", name, action),
                cause,
            };
        }
        Error::FileInUse {
            name: name.to_string(),
            action,
            cause,
        }
    }
}

pub(crate) struct Shared {
    pub(crate) inner: Arc<dyn Directory>,
    pub(crate) state: Mutex<HarnessState>,
    pub(crate) open_locks: DashSet<String>,
    pub(crate) input_clones: AtomicU64,
}

impl fmt::Debug for Shared {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Shared")
            .field("inner", &self.inner)
            .field("registry", &state.registry)
            .field("crashed", &state.crashed)
            .field("open_locks", &self.open_locks.len())
            .finish()
    }
}

impl Shared {
    pub(crate) fn new(inner: Arc<dyn Directory>, config: HarnessConfig, seed: u64) -> Arc<Self> {
        Arc::new(Shared {
            inner,
            state: Mutex::new(HarnessState::new(config, seed)),
            open_locks: DashSet::new(),
            input_clones: AtomicU64::new(0),
        })
    }

    /// Randomly give up the time slice
    pub(crate) fn maybe_yield(&self) {
        let yield_now = {
            let mut state = self.state.lock();
            state.config.maybe_yield && state.rng.gen_bool(0.5)
        };
        if yield_now {
            thread::yield_now();
        }
    }

    pub(crate) fn check_not_crashed(&self, action: &'static str, name: &str) -> Result<()> {
        self.state.lock().check_not_crashed(action, name)
    }

    pub(crate) fn eval_hooks(&self, op: Operation, name: &str) -> Result<()> {
        self.state.lock().eval_hooks(FailurePoint::new(op, name))
    }

    /// Sum of the lengths of every file in the delegate
    pub(crate) fn recomputed_actual_size(&self) -> Result<u64> {
        let mut total = 0;
        for name in self.inner.list_all()? {
            match self.inner.file_length(&name) {
                Ok(len) => total += len,
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }
        Ok(total)
    }

    pub(crate) fn quota_enabled(&self) -> bool {
        self.state.lock().config.max_size_in_bytes > 0
    }

    /// Free bytes left if writing `len` more would exceed the quota
    ///
    /// `None` means the write fits (or no quota is set). Otherwise the
    /// high-water mark is raised to the usage the partial write will reach.
    pub(crate) fn disk_quota(&self, len: u64) -> Result<Option<u64>> {
        let mut state = self.state.lock();
        let max = state.config.max_size_in_bytes;
        if max == 0 || len == 0 {
            return Ok(None);
        }
        let mut free = max.saturating_sub(self.inner.size_in_bytes()?);
        let mut real_usage = 0;
        if free < len {
            real_usage = self.recomputed_actual_size()?;
            free = max.saturating_sub(real_usage);
        }
        if len <= free {
            return Ok(None);
        }
        state.max_used_size = state.max_used_size.max(real_usage + free);
        Ok(Some(free))
    }

    /// Draw for splitting a write around a yield
    pub(crate) fn split_write(&self) -> bool {
        let mut state = self.state.lock();
        let one_in = state.config.split_write_one_in;
        state.one_in(one_in)
    }

    pub(crate) fn first_write_fault(&self, name: &str) -> Result<()> {
        self.state.lock().maybe_throw_io_exception(name)
    }

    pub(crate) fn remove_handle(&self, id: HandleId) {
        self.state.lock().registry.remove(id);
    }

    pub(crate) fn output_closed(&self, id: HandleId, name: &str) {
        let mut state = self.state.lock();
        state.registry.remove(id);
        state.open_for_write.remove(name);
        if state.config.track_disk_usage {
            match self.recomputed_actual_size() {
                Ok(size) => state.max_used_size = state.max_used_size.max(size),
                Err(e) => debug!(target: "faultline::disk", error = %e, "Disk usage recompute failed"),
            }
        }
    }

    /// Register `delegate` as an input on `name` and wrap it
    pub(crate) fn register_input(
        self: &Arc<Self>,
        name: &str,
        delegate: Box<dyn IndexInput>,
    ) -> MockInput {
        let slot = Arc::new(HandleSlot::new(name, HandleKind::Input, delegate));
        let id = self
            .state
            .lock()
            .registry
            .add(name, HandleKind::Input, slot.clone());
        MockInput::new(Arc::clone(self), slot, Some(id))
    }
}
