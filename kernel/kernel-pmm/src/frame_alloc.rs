use core::ptr::{self, NonNull};
use core::sync::atomic::{AtomicBool, Ordering};
use kernel_addresses::{PAGE_SIZE, PageFrameNumber, VirtualAddress};
use kernel_info::MemoryLayout;
use kernel_sync::SpinLock;

use crate::fault::{self, FatalFault};
use crate::free_list::FreeList;
use crate::refcount::RefcountTable;

/// Byte written over a page's contents when it truly returns to the free
/// list. A use-after-free detector, not an allocation guarantee: pages come
/// back from [`FrameAllocator::allocate`] still carrying the fill.
pub const PAGE_POISON: u8 = 0x01;

/// A 4 KiB page handed out by [`FrameAllocator::allocate`].
///
/// Carries the page's virtual base address and its physical frame number, so
/// copy-on-write callers can feed the frame straight into the refcount table.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct PageHandle {
    base: VirtualAddress,
    frame: PageFrameNumber,
}

impl PageHandle {
    /// Virtual base address of the page (page-aligned).
    #[inline]
    #[must_use]
    pub const fn base(self) -> VirtualAddress {
        self.base
    }

    /// Physical frame number of the page.
    #[inline]
    #[must_use]
    pub const fn frame(self) -> PageFrameNumber {
        self.frame
    }
}

/// The physical page allocator.
///
/// One instance owns all usable physical memory from boot until shutdown.
/// Free pages live on an intrusive list whose links are stored inside the
/// pages themselves; allocated pages are tracked by a per-frame reference
/// count so copy-on-write sharing is safe.
///
/// `allocate` and `release` take the spin lock internally once locking is
/// enabled (bootstrap phase two). The refcount table accessible through
/// [`refcounts`](Self::refcounts) takes no lock of its own; see
/// [`RefcountTable`] for the serialization contract.
pub struct FrameAllocator {
    free: SpinLock<FreeList>,
    /// False until bootstrap phase two completes. While false the system is
    /// single-threaded by contract and the refcount machinery is not live:
    /// `release` seeds pages unconditionally.
    locking: AtomicBool,
    refcounts: RefcountTable,
    layout: MemoryLayout,
}

impl FrameAllocator {
    /// An allocator for the given layout with an empty free list.
    ///
    /// No memory is usable until the bootstrap phases
    /// ([`phase_one`](Self::phase_one), [`phase_two`](Self::phase_two)) have
    /// seeded the free list.
    #[must_use]
    pub fn new(layout: MemoryLayout) -> Self {
        Self {
            free: SpinLock::new(FreeList::new()),
            locking: AtomicBool::new(false),
            refcounts: RefcountTable::new(layout.page_frames()),
            layout,
        }
    }

    #[inline]
    #[must_use]
    pub const fn layout(&self) -> &MemoryLayout {
        &self.layout
    }

    /// The per-frame reference counts. No internal locking; callers
    /// mutating counts directly must serialize themselves.
    #[inline]
    #[must_use]
    pub const fn refcounts(&self) -> &RefcountTable {
        &self.refcounts
    }

    /// Allocate one page.
    ///
    /// Pops the free-list head under the lock and sets the frame's refcount
    /// to 1. Returns `None` if no page is available; the empty list is the
    /// one recoverable condition, and nothing is mutated on that path. Page
    /// contents are undefined (typically the [`PAGE_POISON`] fill).
    pub fn allocate(&self) -> Option<PageHandle> {
        let mut free = self.free.lock();
        // Safety: the list owns every linked page until popped.
        let page = unsafe { free.pop() }?;

        let base = VirtualAddress::from_ptr(page.as_ptr());
        let Some(frame) = self.layout.frame_of(base) else {
            // Only validated addresses are ever pushed; a miss here means the
            // list itself is corrupted.
            fault::halt(FatalFault::InvalidAddress(base));
        };
        self.refcounts.set(frame, 1);
        Some(PageHandle { base, frame })
    }

    /// Release one previously allocated page.
    pub fn release(&self, page: PageHandle) {
        self.release_addr(page.base());
    }

    /// Release the page at `va`, which must have come from
    /// [`allocate`](Self::allocate) (or be bootstrap seeding).
    ///
    /// Fatal if `va` is misaligned, below the end of the kernel image, or at
    /// or above the top of physical memory. In normal mode this drops one
    /// reference and only returns the page to the free list when the count
    /// reaches zero; a count already at zero is a fatal double free. Before
    /// phase two completes the refcount table is bypassed entirely and the
    /// page is freed unconditionally.
    pub fn release_addr(&self, va: VirtualAddress) {
        let frame = self.validate(va);

        let mut free = self.free.lock();
        if !self.locking.load(Ordering::Acquire) {
            // Bootstrap seeding: refcounts are not live yet.
            unsafe { scrub_and_push(&mut *free, va) };
            return;
        }

        // Drop the reference first.
        let count = self.refcounts.get(frame);
        if count == 0 {
            fault::halt(FatalFault::DoubleFree(frame));
        }
        self.refcounts.decrement(frame);

        // Still referenced by someone else (e.g. a CoW sibling): keep it.
        if count > 1 {
            return;
        }

        unsafe { scrub_and_push(&mut *free, va) };
    }

    /// Number of pages currently on the free list.
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.free.lock().pages()
    }

    /// Check that `va` is a page the allocator may own; fatal otherwise.
    pub(crate) fn validate(&self, va: VirtualAddress) -> PageFrameNumber {
        if !va.is_page_aligned() || va < self.layout.kernel_end() {
            fault::halt(FatalFault::InvalidAddress(va));
        }
        match self.layout.frame_of(va) {
            Some(frame) => frame,
            None => fault::halt(FatalFault::InvalidAddress(va)),
        }
    }

    /// Free-list access for single-threaded bootstrap (no lock taken).
    pub(crate) fn free_mut(&mut self) -> &mut FreeList {
        self.free.get_mut()
    }

    /// Flip the allocator into normal (locked, refcounted) operation.
    pub(crate) fn enable_locking(&mut self) {
        self.locking.store(true, Ordering::Release);
    }
}

/// Poison the page and link it onto the free list.
///
/// # Safety
/// `va` must be the validated, page-aligned base of a `PAGE_SIZE` region the
/// caller exclusively owns (it is being given up to the list here).
pub(crate) unsafe fn scrub_and_push(free: &mut FreeList, va: VirtualAddress) {
    let page = va.as_mut_ptr::<u8>();
    let Some(page) = NonNull::new(page) else {
        fault::halt(FatalFault::InvalidAddress(va));
    };
    unsafe {
        ptr::write_bytes(page.as_ptr(), PAGE_POISON, PAGE_SIZE as usize);
        // the push overwrites the first word with the link
        free.push(page);
    }
}
