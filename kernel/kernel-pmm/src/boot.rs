//! Two-phase allocator bootstrap.
//!
//! Phase one runs while only the boot page tables exist and a single
//! processor is live: it seeds the early-mapped range onto the free list
//! with no locking and no refcounting. Phase two runs once page tables
//! spanning all processors are installed: it seeds the remaining physical
//! range, enables locking, and zeroes the refcount table, in that order,
//! so the pages seeded here go through the same unconditional path and get
//! their counts defined as 0 by the reset afterward.
//!
//! Both phases take `&mut self`: exclusive access is the type-level witness
//! that bootstrap is single-threaded, which is why no lock is needed here.

use kernel_addresses::{PAGE_SIZE, VirtualAddress};

use crate::frame_alloc::{FrameAllocator, scrub_and_push};

impl FrameAllocator {
    /// Bootstrap phase one: seed `[start, end)` onto the free list.
    ///
    /// Must run before any other operation on the allocator.
    ///
    /// # Safety
    /// The caller must exclusively own the direct-mapped memory in
    /// `[start, end)`; every full page in it is handed over to the allocator.
    pub unsafe fn phase_one(&mut self, start: VirtualAddress, end: VirtualAddress) {
        let seeded = unsafe { self.seed_range(start, end) };
        log::info!(
            "pmm phase one: seeded {seeded} pages, {free} free",
            free = self.free_count()
        );
    }

    /// Bootstrap phase two: seed the remaining range, enable locking, zero
    /// the refcount table.
    ///
    /// Must run exactly once, after [`phase_one`](Self::phase_one). The
    /// seeding still uses the bootstrap path (locking is enabled only after
    /// it), and the table reset at the end is what makes the seeded pages'
    /// refcounts well-defined as 0.
    ///
    /// # Safety
    /// Same ownership contract as [`phase_one`](Self::phase_one), and the
    /// system must still be single-threaded until this returns.
    pub unsafe fn phase_two(&mut self, start: VirtualAddress, end: VirtualAddress) {
        let seeded = unsafe { self.seed_range(start, end) };
        self.enable_locking();
        self.refcounts().reset();
        log::info!(
            "pmm phase two: seeded {seeded} pages, {free} free, refcounts live",
            free = self.free_count()
        );
    }

    /// Seed every full page in `[start, end)`, rounding `start` up to the
    /// next page boundary. Returns the number of pages seeded.
    ///
    /// # Safety
    /// Caller exclusively owns the range; see [`phase_one`](Self::phase_one).
    unsafe fn seed_range(&mut self, start: VirtualAddress, end: VirtualAddress) -> usize {
        let mut va = start.align_up_page();
        let mut seeded = 0;
        while va.as_u64() + PAGE_SIZE <= end.as_u64() {
            // misaligned or out-of-range seeds are as fatal as bad frees
            self.validate(va);
            // Safety: ownership of this page comes from the caller.
            unsafe { scrub_and_push(self.free_mut(), va) };
            seeded += 1;
            va += PAGE_SIZE;
        }
        seeded
    }
}
