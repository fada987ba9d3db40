use alloc::boxed::Box;
use core::sync::atomic::{AtomicU32, Ordering};
use kernel_addresses::PageFrameNumber;

/// Per-frame reference counts: one entry for every page frame below the top
/// of physical memory.
///
/// The table performs **no locking of its own**, and none may be added: its
/// operations are `Relaxed` atomic accesses with no cross-entry ordering.
/// Any caller mutating a frame's count outside of the allocator's
/// `allocate`/`release` must hold the allocator's lock itself, or be provably
/// single-threaded with respect to that frame (e.g. duplicating mappings
/// during a fork while holding the address-space lock). The allocator does
/// not enforce this contract.
///
/// Entries are meaningless until bootstrap phase two has run [`reset`](Self::reset).
pub struct RefcountTable {
    counts: Box<[AtomicU32]>,
}

impl RefcountTable {
    /// A table covering `frames` page frames, all counts zero.
    #[must_use]
    pub fn new(frames: usize) -> Self {
        Self {
            counts: (0..frames).map(|_| AtomicU32::new(0)).collect(),
        }
    }

    /// Number of frames covered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Current count for `frame`.
    #[must_use]
    pub fn get(&self, frame: PageFrameNumber) -> u32 {
        self.counts[frame.index()].load(Ordering::Relaxed)
    }

    /// Add one reference, used when a frame becomes newly shared (e.g.
    /// copy-on-write duplication of a mapping without copying data).
    pub fn increment(&self, frame: PageFrameNumber) {
        self.counts[frame.index()].fetch_add(1, Ordering::Relaxed);
    }

    /// Drop one reference **without freeing the frame**.
    ///
    /// This is a lower-level primitive than `release`: it adjusts the count
    /// and nothing else. A caller using it directly takes over responsibility
    /// for eventually reclaiming the frame. Decrementing a zero count is a
    /// caller bug the table does not detect in release builds.
    pub fn decrement(&self, frame: PageFrameNumber) {
        let prev = self.counts[frame.index()].fetch_sub(1, Ordering::Relaxed);
        debug_assert!(prev != 0, "refcount underflow on frame {frame}");
    }

    /// Store an absolute count. Used by the allocator when handing a frame out.
    pub(crate) fn set(&self, frame: PageFrameNumber, count: u32) {
        self.counts[frame.index()].store(count, Ordering::Relaxed);
    }

    /// Zero every entry. Runs once, at the end of bootstrap phase two; this
    /// is what makes the counts of boot-seeded frames well-defined.
    pub fn reset(&self) {
        for count in &self.counts {
            count.store(0, Ordering::Relaxed);
        }
    }
}
