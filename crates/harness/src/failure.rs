//! Deterministic failure hooks
//!
//! Tests register [`FailureHook`]s on the directory; every instrumented
//! operation evaluates the chain at a [`FailurePoint`] and the first hook that
//! returns an error aborts the operation with it. Hooks are shared with the
//! test (`Arc`) so it can arm, disarm and inspect them while the code under
//! test runs.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use faultline_core::{Error, Result};

/// Instrumented directory operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `create_output`
    CreateOutput,
    /// `open_input`
    OpenInput,
    /// `delete_file`
    DeleteFile,
    /// `sync`, evaluated once per name
    Sync,
    /// A write on an output handle
    Write,
    /// `flush` on an output handle
    Flush,
    /// `close` on an output handle
    CloseOutput,
}

impl Operation {
    /// Stable lowercase name, used in messages and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::CreateOutput => "create_output",
            Operation::OpenInput => "open_input",
            Operation::DeleteFile => "delete_file",
            Operation::Sync => "sync",
            Operation::Write => "write",
            Operation::Flush => "flush",
            Operation::CloseOutput => "close_output",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a hook is being evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailurePoint<'a> {
    /// The operation in progress
    pub op: Operation,
    /// The file it targets, if any
    pub name: Option<&'a str>,
    /// True for the extra open-time evaluation of `create_output` /
    /// `open_input` (see `fail_on_create_output` / `fail_on_open_input`)
    pub on_open: bool,
}

impl<'a> FailurePoint<'a> {
    /// Point for `op` on `name`
    pub fn new(op: Operation, name: &'a str) -> Self {
        FailurePoint {
            op,
            name: Some(name),
            on_open: false,
        }
    }

    /// Mark as the open-time evaluation
    pub fn on_open(mut self) -> Self {
        self.on_open = true;
        self
    }
}

/// A test-supplied failure policy
pub trait FailureHook: Send + Sync + fmt::Debug {
    /// Return an error to make the current operation fail
    fn eval(&self, point: &FailurePoint<'_>) -> Result<()>;

    /// Restore the hook to its initial state
    fn reset(&self) {}

    /// Arm the hook
    fn set_do_fail(&self);

    /// Disarm the hook
    fn clear_do_fail(&self);

    /// Whether the hook is armed
    fn do_fail(&self) -> bool;
}

/// Ordered list of hooks; the first error wins
#[derive(Debug, Default, Clone)]
pub struct FailureHookChain {
    hooks: Vec<Arc<dyn FailureHook>>,
}

impl FailureHookChain {
    /// Empty chain
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a hook (and reset it)
    pub fn push(&mut self, hook: Arc<dyn FailureHook>) {
        hook.reset();
        self.hooks.push(hook);
    }

    /// Evaluate every hook in order
    pub fn eval(&self, point: &FailurePoint<'_>) -> Result<()> {
        for hook in &self.hooks {
            hook.eval(point)?;
        }
        Ok(())
    }

    /// Reset every hook
    pub fn reset_all(&self) {
        for hook in &self.hooks {
            hook.reset();
        }
    }

    /// Remove every hook
    pub fn clear(&mut self) {
        self.hooks.clear();
    }

    /// Number of hooks
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// True if no hook is registered
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

/// Hook that never fails; counts evaluations
#[derive(Debug, Default)]
pub struct NoopFailure {
    do_fail: AtomicBool,
    evaluations: AtomicUsize,
}

impl NoopFailure {
    /// New noop hook
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of times the hook was evaluated since the last reset
    pub fn evaluations(&self) -> usize {
        self.evaluations.load(Ordering::Relaxed)
    }
}

impl FailureHook for NoopFailure {
    fn eval(&self, _point: &FailurePoint<'_>) -> Result<()> {
        self.evaluations.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn reset(&self) {
        self.evaluations.store(0, Ordering::Relaxed);
        self.do_fail.store(false, Ordering::Relaxed);
    }

    fn set_do_fail(&self) {
        self.do_fail.store(true, Ordering::Relaxed);
    }

    fn clear_do_fail(&self) {
        self.do_fail.store(false, Ordering::Relaxed);
    }

    fn do_fail(&self) -> bool {
        self.do_fail.load(Ordering::Relaxed)
    }
}

/// Hook that fails selected operations while armed
///
/// Created armed. With no operations selected it matches every operation;
/// with a name prefix it only matches points whose name starts with it.
#[derive(Debug)]
pub struct OperationFailure {
    ops: Vec<Operation>,
    name_prefix: Option<String>,
    once: bool,
    not_found: bool,
    message: String,
    do_fail: AtomicBool,
    hits: AtomicUsize,
}

impl OperationFailure {
    /// Armed hook failing every evaluation
    pub fn new() -> Self {
        OperationFailure {
            ops: Vec::new(),
            name_prefix: None,
            once: false,
            not_found: false,
            message: "injected failure".to_string(),
            do_fail: AtomicBool::new(true),
            hits: AtomicUsize::new(0),
        }
    }

    /// Armed hook failing `op`
    pub fn on(op: Operation) -> Self {
        Self::new().and(op)
    }

    /// Also fail `op` (builder pattern)
    pub fn and(mut self, op: Operation) -> Self {
        if !self.ops.contains(&op) {
            self.ops.push(op);
        }
        self
    }

    /// Only fail names starting with `prefix` (builder pattern)
    pub fn for_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = Some(prefix.into());
        self
    }

    /// Disarm after the first failure (builder pattern)
    pub fn once(mut self) -> Self {
        self.once = true;
        self
    }

    /// Report `FileNotFound` instead of an injected fault (builder pattern)
    pub fn as_not_found(mut self) -> Self {
        self.not_found = true;
        self
    }

    /// Error message prefix (builder pattern)
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Number of failures produced since the last reset
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::Relaxed)
    }

    fn matches(&self, point: &FailurePoint<'_>) -> bool {
        if !self.ops.is_empty() && !self.ops.contains(&point.op) {
            return false;
        }
        match (&self.name_prefix, point.name) {
            (Some(prefix), Some(name)) => name.starts_with(prefix.as_str()),
            (Some(_), None) => false,
            (None, _) => true,
        }
    }
}

impl Default for OperationFailure {
    fn default() -> Self {
        Self::new()
    }
}

impl FailureHook for OperationFailure {
    fn eval(&self, point: &FailurePoint<'_>) -> Result<()> {
        if !self.matches(point) {
            return Ok(());
        }
        let fire = if self.once {
            self.do_fail
                .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        } else {
            self.do_fail.load(Ordering::Acquire)
        };
        if !fire {
            return Ok(());
        }
        self.hits.fetch_add(1, Ordering::Relaxed);
        let name = point.name.unwrap_or("");
        if self.not_found {
            return Err(Error::not_found(name));
        }
        Err(Error::injected(format!(
            "{} ({} {})",
            self.message, point.op, name
        )))
    }

    fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.do_fail.store(true, Ordering::Release);
    }

    fn set_do_fail(&self) {
        self.do_fail.store(true, Ordering::Release);
    }

    fn clear_do_fail(&self) {
        self.do_fail.store(false, Ordering::Release);
    }

    fn do_fail(&self) -> bool {
        self.do_fail.load(Ordering::Acquire)
    }
}
