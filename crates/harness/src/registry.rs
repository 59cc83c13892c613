//! Open-handle bookkeeping
//!
//! Every registered handle carries the [`OpenTrace`] captured when it was
//! opened, so leaks and blocked deletes can point at the offending caller.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use faultline_core::{HandleKind, OpenTrace, Result};
use rustc_hash::FxHashMap;

/// Identifier of one registered handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HandleId(u64);

/// Closes a handle's delegate from outside the handle (used by crash)
pub(crate) trait ForceClose: Send + Sync {
    fn force_close(&self) -> Result<()>;
}

struct OpenHandle {
    name: String,
    trace: OpenTrace,
    closer: Arc<dyn ForceClose>,
}

/// Registry of open handles, keyed by file name
///
/// `open_files[name]` always equals the number of handles in `handles`
/// whose name is `name`; names whose count drops to zero are removed.
#[derive(Default)]
pub struct HandleRegistry {
    open_files: FxHashMap<String, usize>,
    handles: BTreeMap<HandleId, OpenHandle>,
    next_id: u64,
}

impl HandleRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add(
        &mut self,
        name: &str,
        kind: HandleKind,
        closer: Arc<dyn ForceClose>,
    ) -> HandleId {
        let id = HandleId(self.next_id);
        self.next_id += 1;
        *self.open_files.entry(name.to_string()).or_insert(0) += 1;
        self.handles.insert(
            id,
            OpenHandle {
                name: name.to_string(),
                trace: OpenTrace::capture(kind, name),
                closer,
            },
        );
        id
    }

    /// Unregister a handle. Unknown ids (force-closed by a crash) are ignored.
    pub(crate) fn remove(&mut self, id: HandleId) {
        let Some(handle) = self.handles.remove(&id) else {
            return;
        };
        if let Some(count) = self.open_files.get_mut(&handle.name) {
            *count -= 1;
            if *count == 0 {
                self.open_files.remove(&handle.name);
            }
        }
    }

    /// Drop every registration and hand back the closers
    pub(crate) fn drain(&mut self) -> Vec<Arc<dyn ForceClose>> {
        self.open_files.clear();
        std::mem::take(&mut self.handles)
            .into_values()
            .map(|h| h.closer)
            .collect()
    }

    /// Whether any handle on `name` is open
    pub fn is_open(&self, name: &str) -> bool {
        self.open_files.contains_key(name)
    }

    /// Number of open handles on `name`
    pub fn open_count(&self, name: &str) -> usize {
        self.open_files.get(name).copied().unwrap_or(0)
    }

    /// Snapshot of name -> open handle count
    pub fn open_files(&self) -> BTreeMap<String, usize> {
        self.open_files
            .iter()
            .map(|(name, count)| (name.clone(), *count))
            .collect()
    }

    /// Number of open handles
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// True if no handle is open
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Trace of the oldest open handle
    pub fn first_trace(&self) -> Option<OpenTrace> {
        self.handles.values().next().map(|h| h.trace.clone())
    }

    /// Trace of the oldest open handle on `name`, preferring `kind` if given
    pub fn trace_for(&self, name: &str, kind: Option<HandleKind>) -> Option<OpenTrace> {
        let mut on_name = self.handles.values().filter(|h| h.name == name);
        match kind {
            Some(kind) => {
                let matching: Vec<_> = on_name.collect();
                matching
                    .iter()
                    .find(|h| h.trace.kind() == kind)
                    .or_else(|| matching.first())
                    .map(|h| h.trace.clone())
            }
            None => on_name.next().map(|h| h.trace.clone()),
        }
    }
}

impl fmt::Debug for HandleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleRegistry")
            .field("open_files", &self.open_files())
            .field("handles", &self.handles.len())
            .finish()
    }
}
