//! Crash simulation
//!
//! A crash force-closes every registered handle and then damages each file
//! written since its last sync with one of five [`CorruptionAction`]s, picked
//! uniformly by the directory's seeded generator. Synced files are never
//! touched.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use faultline_core::{Directory, IndexOutput, IoContext, Result};
use rand::rngs::StdRng;
use rand::Rng;
use tracing::{debug, warn};

use crate::registry::ForceClose;

const ZERO_CHUNK: usize = 256;

/// What a crash did to one unsynced file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CorruptionAction {
    /// The file was removed
    Deleted,
    /// Rewritten with zero bytes, same length
    Zeroed,
    /// Cut to the first half of its bytes
    PartiallyTruncated,
    /// Left alone
    Unchanged,
    /// Rewritten with length zero
    FullyTruncated,
}

impl CorruptionAction {
    /// All actions, in draw order
    pub const ALL: [CorruptionAction; 5] = [
        CorruptionAction::Deleted,
        CorruptionAction::Zeroed,
        CorruptionAction::PartiallyTruncated,
        CorruptionAction::Unchanged,
        CorruptionAction::FullyTruncated,
    ];

    /// Stable lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            CorruptionAction::Deleted => "deleted",
            CorruptionAction::Zeroed => "zeroed",
            CorruptionAction::PartiallyTruncated => "partially_truncated",
            CorruptionAction::Unchanged => "unchanged",
            CorruptionAction::FullyTruncated => "fully_truncated",
        }
    }
}

impl fmt::Display for CorruptionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one crash
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrashReport {
    /// Unsynced files and what happened to each, in name order
    pub corrupted: Vec<(String, CorruptionAction)>,
    /// Handles whose force-close failed (the failures were ignored)
    pub close_failures: usize,
}

impl CrashReport {
    /// Action applied to `name`, if it was unsynced at crash time
    pub fn action_for(&self, name: &str) -> Option<CorruptionAction> {
        self.corrupted
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, action)| *action)
    }

    /// Names that were unsynced at crash time
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.corrupted.iter().map(|(n, _)| n.as_str())
    }
}

/// Applies crash damage to a delegate directory
pub(crate) struct CrashSimulator<'a> {
    inner: &'a dyn Directory,
    rng: &'a mut StdRng,
}

impl<'a> CrashSimulator<'a> {
    pub(crate) fn new(inner: &'a dyn Directory, rng: &'a mut StdRng) -> Self {
        CrashSimulator { inner, rng }
    }

    /// Close every handle, ignoring failures; returns how many failed
    pub(crate) fn force_close(handles: Vec<Arc<dyn ForceClose>>) -> usize {
        let mut failures = 0;
        for handle in handles {
            if let Err(e) = handle.force_close() {
                warn!(target: "faultline::crash", error = %e, "Ignoring failure while force-closing handle");
                failures += 1;
            }
        }
        failures
    }

    /// Pick and apply an action for each unsynced name
    ///
    /// Names the delegate no longer has are skipped.
    pub(crate) fn corrupt_all(
        &mut self,
        unsynced: BTreeSet<String>,
    ) -> Result<Vec<(String, CorruptionAction)>> {
        let mut applied = Vec::with_capacity(unsynced.len());
        for name in unsynced {
            let action = CorruptionAction::ALL[self.rng.gen_range(0..CorruptionAction::ALL.len())];
            if !self.inner.file_exists(&name)? {
                debug!(target: "faultline::crash", name = %name, "Unsynced file already gone");
                continue;
            }
            self.apply(&name, action)?;
            debug!(target: "faultline::crash", name = %name, action = %action, "Corrupted unsynced file");
            applied.push((name, action));
        }
        Ok(applied)
    }

    pub(crate) fn apply(&mut self, name: &str, action: CorruptionAction) -> Result<()> {
        let inner = self.inner;
        match action {
            CorruptionAction::Deleted => inner.delete_file(name),
            CorruptionAction::Zeroed => {
                let len = inner.file_length(name)?;
                let mut out = inner.create_output(name, IoContext::Default)?;
                let written = write_zeros(out.as_mut(), len);
                let closed = out.close();
                written.and(closed)
            }
            CorruptionAction::PartiallyTruncated => self.truncate_to_half(name),
            CorruptionAction::Unchanged => Ok(()),
            CorruptionAction::FullyTruncated => {
                inner.delete_file(name)?;
                let mut out = inner.create_output(name, IoContext::Default)?;
                let truncated = out.set_length(0);
                let closed = out.close();
                truncated.and(closed)
            }
        }
    }

    /// Keep the first half of `name`, staging it through a temp file
    fn truncate_to_half(&mut self, name: &str) -> Result<()> {
        let inner = self.inner;
        let temp = loop {
            let candidate = format!("{}.crash{}", name, self.rng.gen::<u32>());
            if !inner.file_exists(&candidate)? {
                break candidate;
            }
        };

        let len = inner.file_length(name)?;
        copy_prefix(inner, name, &temp, len / 2)?;
        inner.delete_file(name)?;
        let half = inner.file_length(&temp)?;
        copy_prefix(inner, &temp, name, half)?;
        inner.delete_file(&temp)
    }
}

fn write_zeros(out: &mut dyn IndexOutput, len: u64) -> Result<()> {
    let zeros = [0u8; ZERO_CHUNK];
    let mut remaining = len;
    while remaining > 0 {
        let chunk = remaining.min(ZERO_CHUNK as u64) as usize;
        out.write_bytes(&zeros[..chunk])?;
        remaining -= chunk as u64;
    }
    Ok(())
}

fn copy_prefix(inner: &dyn Directory, src: &str, dest: &str, len: u64) -> Result<()> {
    let mut input = inner.open_input(src, IoContext::ReadOnce)?;
    let copied = inner
        .create_output(dest, IoContext::Default)
        .and_then(|mut out| {
            let copied = out.copy_bytes(input.as_mut(), len);
            let closed = out.close();
            copied.and(closed)
        });
    let closed = input.close();
    copied.and(closed)
}
