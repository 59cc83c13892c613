//! Allocation-context diagnostics for open handles
//!
//! Every handle opened through the fault-injecting directory records an
//! [`OpenTrace`]: which kind of handle it was, the file it is bound to, the
//! thread that opened it and a backtrace captured at open time. When a handle
//! leaks, or when an open file blocks a delete, the trace is attached as the
//! `source` of the resulting error so the original opener can be found
//! without extra logging.

use std::backtrace::{Backtrace, BacktraceStatus};
use std::fmt;
use std::sync::Arc;

/// Kind of an open handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HandleKind {
    /// Read handle returned by `open_input` (or a slicer slice)
    Input,
    /// Write handle returned by `create_output`
    Output,
    /// Slicer returned by `create_slicer`
    Slice,
}

impl HandleKind {
    /// Human readable name
    pub fn as_str(&self) -> &'static str {
        match self {
            HandleKind::Input => "Input",
            HandleKind::Output => "Output",
            HandleKind::Slice => "Slice",
        }
    }
}

impl fmt::Display for HandleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where and by whom a handle was opened
///
/// Cheap to clone; the backtrace is shared.
#[derive(Clone)]
pub struct OpenTrace {
    kind: HandleKind,
    name: String,
    thread: Option<String>,
    backtrace: Arc<Backtrace>,
}

impl OpenTrace {
    /// Capture the current call context for a handle on `name`
    ///
    /// The backtrace honours `RUST_BACKTRACE` / `RUST_LIB_BACKTRACE`, so
    /// capture is nearly free unless the test run asked for it.
    pub fn capture(kind: HandleKind, name: impl Into<String>) -> Self {
        OpenTrace {
            kind,
            name: name.into(),
            thread: std::thread::current().name().map(str::to_string),
            backtrace: Arc::new(Backtrace::capture()),
        }
    }

    /// Handle kind
    pub fn kind(&self) -> HandleKind {
        self.kind
    }

    /// File name the handle is bound to
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the thread that opened the handle, if it had one
    pub fn thread(&self) -> Option<&str> {
        self.thread.as_deref()
    }

    /// Backtrace captured at open time
    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }
}

impl fmt::Display for OpenTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unclosed {}: {}", self.kind, self.name)?;
        if let Some(thread) = &self.thread {
            write!(f, " (opened on thread '{}')", thread)?;
        }
        Ok(())
    }
}

impl fmt::Debug for OpenTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)?;
        if self.backtrace.status() == BacktraceStatus::Captured {
            write!(f, "\n{}", self.backtrace)?;
        }
        Ok(())
    }
}

impl std::error::Error for OpenTrace {}
