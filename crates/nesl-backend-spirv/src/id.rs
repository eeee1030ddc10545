//! Result identifiers and their allocator.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

/// A SPIR-V result id.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct SpirvId(u32);

impl SpirvId {
    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for SpirvId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// Hands out dense, strictly increasing ids starting at 1.
#[derive(Debug)]
pub struct IdAllocator {
    next: AtomicU32,
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdAllocator {
    pub fn new() -> Self {
        Self {
            next: AtomicU32::new(1),
        }
    }

    pub fn next_id(&self) -> SpirvId {
        SpirvId(self.next.fetch_add(1, Ordering::Relaxed))
    }

    /// One past the highest id handed out so far.
    ///
    /// Only meaningful once every allocating thread has joined.
    pub fn bound(&self) -> u32 {
        self.next.load(Ordering::Acquire)
    }
}
