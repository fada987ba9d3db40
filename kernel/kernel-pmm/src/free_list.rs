use core::ptr::{self, NonNull, null_mut};

/// Link stored in the first bytes of every **free** page.
///
/// A free page *is* its own list node: once a page belongs to the free list
/// nobody else may reference it, so the allocator borrows the page's first
/// word for the `next` link. The rest of the page keeps the poison fill
/// written when it was freed.
///
/// ```text
/// +--------+--------------------------------------+
/// | next   |        poison (rest of the page)     |
/// +--------+--------------------------------------+
/// ^ page base
/// ```
#[repr(C)]
struct FreeRun {
    /// The next free page (or null).
    next: *mut FreeRun,
}

/// Intrusive singly-linked stack of free pages plus a page counter.
///
/// This is the crate's unsafe perimeter: raw pointers into freed pages,
/// touched by exactly one owner, the allocator, and only behind its
/// spin lock (or through `&mut` during single-threaded bootstrap).
///
/// # Invariants
/// - Every linked page is page-aligned, `PAGE_SIZE` bytes, and owned by the
///   list (no live reference anywhere else).
/// - `pages` equals the number of linked nodes.
pub(crate) struct FreeList {
    head: *mut FreeRun,
    pages: usize,
}

// Safety: the raw pointers are only dereferenced by the single owner, under
// the allocator's lock or via &mut during bootstrap.
unsafe impl Send for FreeList {}

impl FreeList {
    pub(crate) const fn new() -> Self {
        Self {
            head: null_mut(),
            pages: 0,
        }
    }

    /// Number of pages currently on the list.
    pub(crate) const fn pages(&self) -> usize {
        self.pages
    }

    /// Push a page, storing the link in the page's own memory.
    ///
    /// # Safety
    /// - `page` must point to the base of a writable, page-aligned,
    ///   `PAGE_SIZE`-byte region exclusively owned by the caller.
    /// - The page must remain untouched by anyone else until popped.
    pub(crate) unsafe fn push(&mut self, page: NonNull<u8>) {
        let run = page.as_ptr().cast::<FreeRun>();
        unsafe {
            ptr::write(run, FreeRun { next: self.head });
        }
        self.head = run;
        self.pages += 1;
    }

    /// Pop the most recently pushed page, transferring ownership to the caller.
    ///
    /// # Safety
    /// - The list invariants must hold: every linked page must still be
    ///   exclusively owned by the list.
    pub(crate) unsafe fn pop(&mut self) -> Option<NonNull<u8>> {
        let run = self.head;
        if run.is_null() {
            return None;
        }
        self.head = unsafe { (*run).next };
        self.pages -= 1;
        NonNull::new(run.cast::<u8>())
    }
}
