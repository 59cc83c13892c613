//! Reserved file names
//!
//! The storage engine rewrites its segments control files in place, so the
//! harness exempts them from some of its restrictions.

/// Prefix of the segments control files (`segments_N`, `segments.gen`)
pub const SEGMENTS_PREFIX: &str = "segments";

/// Generation marker; exempt from the write-once policy
pub const GENERATION_MARKER: &str = "segments.gen";

/// Whether `name` is a segments control file
pub fn is_segments_file(name: &str) -> bool {
    name.starts_with(SEGMENTS_PREFIX)
}
