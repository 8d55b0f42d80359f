//! Virtual display number allocation.
//!
//! X servers advertise ownership of display `:N` by creating `.X<N>-lock`
//! in the lock directory (`/tmp` on every mainstream distribution). The
//! allocator scans upward from a monotonically advancing candidate and
//! skips any number another server already holds. Numbers are never
//! reclaimed here; once a server exits its lock file disappears and the
//! host-wide convention makes the number reusable by anyone.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

const FIRST_CANDIDATE: u32 = 99;

/// Path of the host-wide lock marker for display `:N`.
pub fn lock_path(lock_dir: &Path, display: u32) -> PathBuf {
    lock_dir.join(format!(".X{}-lock", display))
}

pub struct DisplayAllocator {
    lock_dir: PathBuf,
    next_candidate: Mutex<u32>,
}

impl DisplayAllocator {
    pub fn new(lock_dir: impl Into<PathBuf>) -> Self {
        Self {
            lock_dir: lock_dir.into(),
            next_candidate: Mutex::new(FIRST_CANDIDATE),
        }
    }

    /// Returns the first display number at or above the current candidate
    /// with no lock marker, and advances the candidate past it.
    pub fn allocate(&self) -> u32 {
        let mut candidate = self
            .next_candidate
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        let mut display = *candidate;
        while lock_path(&self.lock_dir, display).exists() {
            display += 1;
        }
        *candidate = display + 1;
        display
    }

    pub fn lock_dir(&self) -> &Path {
        &self.lock_dir
    }
}
