//! Post-close integrity verification
//!
//! The harness does not know the file format stored in the directory, so the
//! structural check and the "replay and delete unreferenced files" step are
//! delegated to an [`IndexVerifier`] supplied by the owner of the harness.

use std::fmt;

use faultline_core::{is_segments_file, Directory, Result};

/// Structural checker run by the directory wrappers on close
pub trait IndexVerifier: Send + Sync + fmt::Debug {
    /// Whether `dir` holds anything worth checking
    ///
    /// The default looks for a commit point (a `segments*` file).
    fn index_exists(&self, dir: &dyn Directory) -> Result<bool> {
        Ok(dir.list_all()?.iter().any(|name| is_segments_file(name)))
    }

    /// Verify the contents of `dir`; fail with `Error::IndexCheck` on damage
    fn check_index(&self, dir: &dyn Directory) -> Result<()>;

    /// Open `dir` the way the owning engine would and let it delete every
    /// file no commit point references
    fn delete_unreferenced_files(&self, dir: &dyn Directory) -> Result<()>;
}

/// Verifier that accepts everything and deletes nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopVerifier;

impl IndexVerifier for NoopVerifier {
    fn check_index(&self, _dir: &dyn Directory) -> Result<()> {
        Ok(())
    }

    fn delete_unreferenced_files(&self, _dir: &dyn Directory) -> Result<()> {
        Ok(())
    }
}
