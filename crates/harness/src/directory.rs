//! The fault-injecting directory
//!
//! [`MockDirectory`] wraps any [`Directory`] and is itself a `Directory`, so
//! it can be handed to code under test in place of the real one. Every
//! operation runs under one directory-wide lock and draws from one seeded
//! generator: the same seed and the same sequence of calls reproduce the same
//! injected faults, the same throttled outputs and the same crash damage.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use faultline_core::{Directory, IoContext};
//! use faultline_harness::MockDirectory;
//! use faultline_storage::RamDirectory;
//!
//! let dir = MockDirectory::new(Arc::new(RamDirectory::new()), 42);
//! let mut out = dir.create_output("_0.dat", IoContext::Default)?;
//! out.write_bytes(b"payload")?;
//! out.close()?;
//! dir.sync(&["_0.dat".to_string()])?;
//! let report = dir.crash()?;
//! assert!(report.corrupted.is_empty());
//! # Ok::<(), faultline_core::Error>(())
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use faultline_core::{
    Directory, Error, FileAction, HandleKind, IndexInput, IndexOutput, IoContext, Lock,
    LockFactory, Result, Slicer, GENERATION_MARKER, SEGMENTS_PREFIX,
};
use parking_lot::RwLock;
use rand::Rng;
use tracing::{debug, info};

use crate::buffered::BufferedOutput;
use crate::config::{HarnessConfig, Throttling};
use crate::crash::{CrashReport, CrashSimulator};
use crate::failure::{FailureHook, FailurePoint, Operation};
use crate::lifecycle::Lifecycle;
use crate::state::{HarnessState, Shared};
use crate::throttle::ThrottleController;
use crate::verify::{IndexVerifier, NoopVerifier};
use crate::wrapped::{
    HandleSlot, MockInput, MockLockFactory, MockOutput, MockSlicer, SlowClosingInput,
    SlowOpeningInput,
};

/// Fault-injecting wrapper around a [`Directory`]
pub struct MockDirectory {
    shared: Arc<Shared>,
    lifecycle: Lifecycle,
    verifier: RwLock<Arc<dyn IndexVerifier>>,
}

impl fmt::Debug for MockDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockDirectory")
            .field("shared", &self.shared)
            .field("state", &self.lifecycle.state())
            .finish()
    }
}

impl MockDirectory {
    /// Wrap `inner` with the default configuration
    pub fn new(inner: Arc<dyn Directory>, seed: u64) -> Self {
        Self::from_parts(inner, seed, HarnessConfig::default())
    }

    /// Wrap `inner` with `config`
    pub fn with_config(inner: Arc<dyn Directory>, seed: u64, config: HarnessConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_parts(inner, seed, config))
    }

    fn from_parts(inner: Arc<dyn Directory>, seed: u64, config: HarnessConfig) -> Self {
        debug!(target: "faultline::directory", seed, ?config, "Created fault-injecting directory");
        MockDirectory {
            shared: Shared::new(inner, config, seed),
            lifecycle: Lifecycle::new(),
            verifier: RwLock::new(Arc::new(NoopVerifier)),
        }
    }

    /// The wrapped directory
    pub fn delegate(&self) -> &Arc<dyn Directory> {
        &self.shared.inner
    }

    /// Replace the verifier used on close
    pub fn set_verifier(&self, verifier: Arc<dyn IndexVerifier>) {
        *self.verifier.write() = verifier;
    }

    // ========================================================================
    // Configuration
    // ========================================================================

    /// Snapshot of the current configuration
    pub fn config(&self) -> HarnessConfig {
        self.shared.state.lock().config.clone()
    }

    /// Edit the configuration; rejected edits leave it unchanged
    ///
    /// Changing the throttle policy redraws the throttle rate and delay.
    pub fn update_config<F>(&self, edit: F) -> Result<()>
    where
        F: FnOnce(&mut HarnessConfig),
    {
        let mut state = self.shared.state.lock();
        let mut next = state.config.clone();
        edit(&mut next);
        next.validate()?;
        if next.throttle != state.config.throttle {
            let HarnessState { rng, throttle, .. } = &mut *state;
            *throttle = ThrottleController::from_policy(&next.throttle, rng);
        }
        state.config = next;
        Ok(())
    }

    fn set<F: FnOnce(&mut HarnessConfig)>(&self, edit: F) {
        edit(&mut self.shared.state.lock().config);
    }

    /// Simulated disk quota (0 = unlimited)
    pub fn max_size_in_bytes(&self) -> u64 {
        self.shared.state.lock().config.max_size_in_bytes
    }

    /// Set the simulated disk quota (0 = unlimited)
    pub fn set_max_size_in_bytes(&self, bytes: u64) {
        self.set(|c| c.max_size_in_bytes = bytes);
    }

    /// First-write injection rate
    pub fn random_io_exception_rate(&self) -> f64 {
        self.shared.state.lock().config.random_io_exception_rate
    }

    /// Set the first-write injection rate
    pub fn set_random_io_exception_rate(&self, rate: f64) -> Result<()> {
        self.update_config(|c| c.random_io_exception_rate = rate)
    }

    /// Open-time injection rate
    pub fn random_io_exception_rate_on_open(&self) -> f64 {
        self.shared.state.lock().config.random_io_exception_rate_on_open
    }

    /// Set the open-time injection rate
    pub fn set_random_io_exception_rate_on_open(&self, rate: f64) -> Result<()> {
        self.update_config(|c| c.random_io_exception_rate_on_open = rate)
    }

    /// Output throttling mode
    pub fn throttling(&self) -> Throttling {
        self.shared.state.lock().config.throttling
    }

    /// Set the output throttling mode
    pub fn set_throttling(&self, throttling: Throttling) {
        self.set(|c| c.throttling = throttling);
    }

    /// Refuse deletes/overwrites of open files
    pub fn set_no_delete_open_file(&self, value: bool) {
        self.set(|c| c.no_delete_open_file = value);
    }

    /// Raise invariant violations (not I/O errors) for deletes/overwrites of open files
    pub fn set_assert_no_delete_open_file(&self, value: bool) {
        self.set(|c| c.assert_no_delete_open_file = value);
    }

    /// Refuse to create a name twice
    pub fn set_prevent_double_write(&self, value: bool) {
        self.set(|c| c.prevent_double_write = value);
    }

    /// Let open-time injection report not-found
    pub fn set_allow_random_file_not_found(&self, value: bool) {
        self.set(|c| c.allow_random_file_not_found = value);
    }

    /// Allow reading files that are still open for write
    pub fn set_allow_reading_files_still_open_for_write(&self, value: bool) {
        self.set(|c| c.allow_reading_files_still_open_for_write = value);
    }

    /// Recompute disk usage on every output close
    pub fn set_track_disk_usage(&self, value: bool) {
        self.set(|c| c.track_disk_usage = value);
    }

    /// Wrap the lock factory to track held locks
    pub fn set_wrap_lock_factory(&self, value: bool) {
        self.set(|c| c.wrap_lock_factory = value);
    }

    /// Evaluate hooks a second time on create
    pub fn set_fail_on_create_output(&self, value: bool) {
        self.set(|c| c.fail_on_create_output = value);
    }

    /// Evaluate hooks a second time on open
    pub fn set_fail_on_open_input(&self, value: bool) {
        self.set(|c| c.fail_on_open_input = value);
    }

    /// Run the unreferenced-files check on close
    pub fn set_assert_no_unreferenced_files_on_close(&self, value: bool) {
        self.set(|c| c.assert_no_unreferenced_files_on_close = value);
    }

    /// Crash and verify on close
    pub fn set_check_index_on_close(&self, value: bool) {
        self.set(|c| c.check_index_on_close = value);
    }

    /// Throttle parameters drawn for this directory
    pub fn throttle(&self) -> ThrottleController {
        self.shared.state.lock().throttle.clone()
    }

    // ========================================================================
    // Failure hooks
    // ========================================================================

    /// Add a failure hook; it is reset before it is installed
    pub fn fail_on(&self, hook: Arc<dyn FailureHook>) {
        self.shared.state.lock().hooks.push(hook);
    }

    /// Reset every installed hook
    pub fn reset_failures(&self) {
        self.shared.state.lock().hooks.reset_all();
    }

    /// Remove every installed hook
    pub fn clear_failures(&self) {
        self.shared.state.lock().hooks.clear();
    }

    // ========================================================================
    // Crash
    // ========================================================================

    /// Simulate a process crash
    ///
    /// Marks the directory crashed, force-closes every open handle and
    /// damages every file not synced since it was written. Synced files are
    /// left alone.
    pub fn crash(&self) -> Result<CrashReport> {
        let mut state = self.shared.state.lock();
        state.crashed = true;
        let handles = state.registry.drain();
        state.open_for_write.clear();
        state.open_deleted.clear();
        let unsynced = std::mem::take(&mut state.unsynced);

        let close_failures = CrashSimulator::force_close(handles);
        let corrupted = CrashSimulator::new(&*self.shared.inner, &mut state.rng).corrupt_all(unsynced)?;
        info!(
            target: "faultline::crash",
            corrupted = corrupted.len(),
            close_failures,
            "Simulated crash"
        );
        Ok(CrashReport {
            corrupted,
            close_failures,
        })
    }

    /// Leave the crashed state and forget held locks (a reboot)
    pub fn clear_crash(&self) {
        self.shared.state.lock().crashed = false;
        self.shared.open_locks.clear();
    }

    /// Whether the directory is crashed
    pub fn is_crashed(&self) -> bool {
        self.shared.state.lock().crashed
    }

    // ========================================================================
    // Observability
    // ========================================================================

    /// Sum of the real lengths of every file
    pub fn recomputed_actual_size_in_bytes(&self) -> Result<u64> {
        self.shared.recomputed_actual_size()
    }

    /// High-water mark of disk usage
    pub fn max_used_size_in_bytes(&self) -> u64 {
        self.shared.state.lock().max_used_size
    }

    /// Reset the high-water mark to the current actual usage
    pub fn reset_max_used_size_in_bytes(&self) -> Result<()> {
        let mut state = self.shared.state.lock();
        state.max_used_size = self.shared.recomputed_actual_size()?;
        Ok(())
    }

    /// Names written since their last sync
    pub fn unsynced_files(&self) -> BTreeSet<String> {
        self.shared.state.lock().unsynced.clone()
    }

    /// Names whose delete was refused because they were open
    pub fn open_deleted_files(&self) -> BTreeSet<String> {
        self.shared.state.lock().open_deleted.clone()
    }

    /// Registered handles open on `name`
    pub fn open_file_count(&self, name: &str) -> usize {
        self.shared.state.lock().registry.open_count(name)
    }

    /// Every open name with its handle count
    pub fn open_files(&self) -> BTreeMap<String, usize> {
        self.shared.state.lock().registry.open_files()
    }

    /// Number of input clones taken since creation
    pub fn input_clone_count(&self) -> u64 {
        self.shared.input_clones.load(Ordering::Relaxed)
    }

    /// Locks currently obtained through the wrapped factory
    pub fn held_locks(&self) -> BTreeSet<String> {
        self.shared.open_locks.iter().map(|l| l.key().clone()).collect()
    }

    /// True until `close` is called
    pub fn is_open(&self) -> bool {
        self.lifecycle.is_open()
    }

    // ========================================================================
    // Close
    // ========================================================================

    fn check_on_close(&self) -> Result<()> {
        let (check_index, check_unreferenced, blocked) = {
            let state = self.shared.state.lock();
            if !state.registry.is_empty() {
                return Err(Error::LeakedHandles {
                    files: state.registry.open_files(),
                    cause: state.registry.first_trace(),
                });
            }
            (
                state.config.check_index_on_close,
                state.config.assert_no_unreferenced_files_on_close,
                state.open_deleted.clone(),
            )
        };
        if !self.shared.open_locks.is_empty() {
            return Err(Error::LeakedLocks {
                locks: self.held_locks(),
            });
        }
        if !check_index {
            return Ok(());
        }

        let inner = &*self.shared.inner;
        let verifier = self.verifier.read().clone();
        if !verifier.index_exists(inner)? {
            return Ok(());
        }
        self.crash()?;
        verifier.check_index(inner)?;

        if check_unreferenced {
            let live = |names: Vec<String>| -> Vec<String> {
                let mut names: Vec<String> =
                    names.into_iter().filter(|n| !blocked.contains(n)).collect();
                names.sort();
                names
            };
            let before = live(inner.list_all()?);
            verifier.delete_unreferenced_files(inner)?;
            let after = live(inner.list_all()?);
            if before != after {
                return Err(Error::UnreferencedFiles { before, after });
            }
        }
        Ok(())
    }

    fn wrap_input(&self, input: MockInput, slow_draw: Option<u32>) -> Box<dyn IndexInput> {
        let delay = std::time::Duration::from_millis(self.shared.state.lock().config.slow_handle_delay_ms);
        match slow_draw {
            Some(0) => {
                debug!(target: "faultline::directory", name = input.name(), "Slow-closing input");
                Box::new(SlowClosingInput::new(input, delay))
            }
            Some(1) => {
                debug!(target: "faultline::directory", name = input.name(), "Slow-opening input");
                Box::new(SlowOpeningInput::new(input, delay))
            }
            _ => Box::new(input),
        }
    }
}

impl Directory for MockDirectory {
    fn list_all(&self) -> Result<Vec<String>> {
        self.lifecycle.ensure_open()?;
        self.shared.maybe_yield();
        self.shared.inner.list_all()
    }

    fn file_exists(&self, name: &str) -> Result<bool> {
        self.lifecycle.ensure_open()?;
        self.shared.inner.file_exists(name)
    }

    fn file_length(&self, name: &str) -> Result<u64> {
        self.lifecycle.ensure_open()?;
        self.shared.inner.file_length(name)
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        self.lifecycle.ensure_open()?;
        self.shared.maybe_yield();
        let mut state = self.shared.state.lock();
        state.eval_hooks(FailurePoint::new(Operation::DeleteFile, name))?;
        state.check_not_crashed("delete", name)?;
        if state.registry.is_open(name) {
            state.open_deleted.insert(name.to_string());
            if state.config.no_delete_open_file || state.config.assert_no_delete_open_file {
                return Err(state.in_use_error(name, FileAction::Delete));
            }
        } else {
            state.open_deleted.remove(name);
        }
        self.shared.inner.delete_file(name)?;
        state.unsynced.remove(name);
        state.created.remove(name);
        Ok(())
    }

    fn create_output(&self, name: &str, context: IoContext) -> Result<Box<dyn IndexOutput>> {
        self.lifecycle.ensure_open()?;
        self.shared.maybe_yield();
        let mut state = self.shared.state.lock();
        state.eval_hooks(FailurePoint::new(Operation::CreateOutput, name))?;
        state.maybe_throw_io_exception_on_open(name)?;
        if state.config.fail_on_create_output {
            state.eval_hooks(FailurePoint::new(Operation::CreateOutput, name).on_open())?;
        }
        state.check_not_crashed("create", name)?;
        if state.config.prevent_double_write
            && state.created.contains(name)
            && name != GENERATION_MARKER
        {
            return Err(Error::AlreadyExists {
                name: name.to_string(),
            });
        }
        if (state.config.no_delete_open_file || state.config.assert_no_delete_open_file)
            && state.registry.is_open(name)
        {
            return Err(state.in_use_error(name, FileAction::Overwrite));
        }

        let mut delegate = self.shared.inner.create_output(name, context)?;
        let buffered_one_in = state.config.buffered_output_one_in;
        if state.one_in(buffered_one_in) && state.config.max_size_in_bytes == 0 {
            let max_buffer = state.config.max_buffer_size;
            let capacity = state.rng.gen_range(1..=max_buffer);
            debug!(target: "faultline::directory", name, capacity, "Buffering output");
            delegate = Box::new(BufferedOutput::new(delegate, capacity));
        }

        let slot = Arc::new(HandleSlot::new(name, HandleKind::Output, delegate));
        let id = state.registry.add(name, HandleKind::Output, slot.clone());
        state.open_for_write.insert(name.to_string());
        state.unsynced.insert(name.to_string());
        state.created.insert(name.to_string());
        let output = MockOutput::new(Arc::clone(&self.shared), slot, id);

        let mode = state.config.throttling;
        let one_in = state.config.throttle.sometimes_one_in;
        let inner_throttled = self.shared.inner.is_throttled();
        if ThrottleController::should_throttle(mode, one_in, &mut state.rng, inner_throttled) {
            debug!(target: "faultline::directory", name, "Throttling output");
            return Ok(Box::new(state.throttle.wrap(Box::new(output))));
        }
        Ok(Box::new(output))
    }

    fn open_input(&self, name: &str, context: IoContext) -> Result<Box<dyn IndexInput>> {
        self.lifecycle.ensure_open()?;
        self.shared.maybe_yield();
        let (input, slow_draw) = {
            let mut state = self.shared.state.lock();
            state.eval_hooks(FailurePoint::new(Operation::OpenInput, name))?;
            state.maybe_throw_io_exception_on_open(name)?;
            if state.config.fail_on_open_input {
                state.eval_hooks(FailurePoint::new(Operation::OpenInput, name).on_open())?;
            }
            if !self.shared.inner.file_exists(name)? {
                return Err(Error::not_found(name));
            }
            if !state.config.allow_reading_files_still_open_for_write
                && state.open_for_write.contains(name)
                && !name.starts_with(SEGMENTS_PREFIX)
            {
                return Err(state.in_use_error(name, FileAction::Read));
            }

            let delegate = self.shared.inner.open_input(name, context)?;
            let slow_one_in = state.config.slow_input_one_in;
            let slow_draw = (slow_one_in > 0).then(|| state.rng.gen_range(0..slow_one_in));
            let slot = Arc::new(HandleSlot::new(name, HandleKind::Input, delegate));
            let id = state.registry.add(name, HandleKind::Input, slot.clone());
            (MockInput::new(Arc::clone(&self.shared), slot, Some(id)), slow_draw)
        };
        Ok(self.wrap_input(input, slow_draw))
    }

    fn create_slicer(&self, name: &str, context: IoContext) -> Result<Box<dyn Slicer>> {
        self.lifecycle.ensure_open()?;
        self.shared.maybe_yield();
        let mut state = self.shared.state.lock();
        if !self.shared.inner.file_exists(name)? {
            return Err(Error::not_found(name));
        }
        let delegate = self.shared.inner.create_slicer(name, context)?;
        let slot = Arc::new(HandleSlot::new(name, HandleKind::Slice, delegate));
        let id = state.registry.add(name, HandleKind::Slice, slot.clone());
        Ok(Box::new(MockSlicer::new(Arc::clone(&self.shared), slot, id)))
    }

    fn sync(&self, names: &[String]) -> Result<()> {
        self.lifecycle.ensure_open()?;
        self.shared.maybe_yield();
        let mut state = self.shared.state.lock();
        for name in names {
            state.eval_hooks(FailurePoint::new(Operation::Sync, name))?;
        }
        if state.crashed {
            return Err(Error::Crashed {
                action: "sync",
                name: names.join(", "),
            });
        }
        let probability = state.config.sync_probability;
        let real = self.shared.inner.requires_sync() || state.chance(probability);
        for name in names {
            if real {
                self.shared.inner.sync(std::slice::from_ref(name))?;
            }
            state.unsynced.remove(name);
        }
        Ok(())
    }

    fn make_lock(&self, name: &str) -> Result<Box<dyn Lock>> {
        self.lifecycle.ensure_open()?;
        self.shared.maybe_yield();
        Ok(self.lock_factory().make_lock(name))
    }

    fn clear_lock(&self, name: &str) -> Result<()> {
        self.lifecycle.ensure_open()?;
        self.shared.maybe_yield();
        self.lock_factory().clear_lock(name)
    }

    fn lock_factory(&self) -> Arc<dyn LockFactory> {
        let wrap = self.shared.state.lock().config.wrap_lock_factory;
        let delegate = self.shared.inner.lock_factory();
        if wrap {
            Arc::new(MockLockFactory::new(Arc::clone(&self.shared), delegate))
        } else {
            delegate
        }
    }

    fn set_lock_factory(&self, factory: Arc<dyn LockFactory>) -> Result<()> {
        self.lifecycle.ensure_open()?;
        self.shared.inner.set_lock_factory(factory)
    }

    fn size_in_bytes(&self) -> Result<u64> {
        self.lifecycle.ensure_open()?;
        self.shared.inner.size_in_bytes()
    }

    fn requires_sync(&self) -> bool {
        self.shared.inner.requires_sync()
    }

    fn is_throttled(&self) -> bool {
        self.shared.inner.is_throttled()
    }

    /// Verify and release the directory
    ///
    /// Fails with `LeakedHandles` / `LeakedLocks` if anything is still open.
    /// Otherwise, with `check_index_on_close` and an existing index, crashes
    /// the directory (so unsynced data is damaged) and runs the verifier.
    /// The wrapped directory is closed in every case; a second call does
    /// nothing.
    fn close(&self) -> Result<()> {
        self.lifecycle.dispose_once(|| {
            let checked = self.check_on_close();
            let closed = self.shared.inner.close();
            match &checked {
                Ok(()) => info!(target: "faultline::directory", "Closed fault-injecting directory"),
                Err(e) => info!(target: "faultline::directory", error = %e, "Closed fault-injecting directory with errors"),
            }
            checked.and(closed)
        })
    }
}
