//! I/O context hints passed to `create_output` / `open_input`

/// Hint describing why a file is being opened
///
/// Backends may use it to pick buffer sizes or caching; the harness passes it
/// through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IoContext {
    /// No particular access pattern
    #[default]
    Default,
    /// The file is read once, front to back
    ReadOnce,
    /// Regular reads
    Read,
    /// Written or read by a merge
    Merge {
        /// Expected size of the merged file
        estimated_bytes: u64,
    },
    /// Written by a flush
    Flush {
        /// Expected size of the flushed file
        estimated_bytes: u64,
    },
}

impl IoContext {
    /// Whether the context describes a merge
    pub fn is_merge(&self) -> bool {
        matches!(self, IoContext::Merge { .. })
    }

    /// Size estimate carried by merge/flush contexts
    pub fn estimated_bytes(&self) -> Option<u64> {
        match self {
            IoContext::Merge { estimated_bytes } | IoContext::Flush { estimated_bytes } => {
                Some(*estimated_bytes)
            }
            _ => None,
        }
    }
}
