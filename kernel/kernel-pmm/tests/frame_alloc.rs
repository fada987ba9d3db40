use kernel_addresses::{PAGE_SIZE, PageFrameNumber, PhysicalAddress, VirtualAddress};
use kernel_info::MemoryLayout;
use kernel_pmm::{FrameAllocator, PAGE_POISON};
use std::thread;

const PAGE: usize = PAGE_SIZE as usize;

/// Page-aligned backing memory standing in for usable physical RAM.
///
/// The layout maps the arena as a direct map starting at physical address 0:
/// `pa = va - arena_base`, frames `0..PAGES`.
#[repr(align(4096))]
struct Arena<const PAGES: usize>([[u8; PAGE]; PAGES]);

impl<const PAGES: usize> Arena<PAGES> {
    fn new() -> Box<Self> {
        Box::new(Self([[0; PAGE]; PAGES]))
    }

    fn base(&mut self) -> VirtualAddress {
        VirtualAddress::from_ptr(core::ptr::from_mut(self).cast::<u8>())
    }

    fn page(&mut self, index: u64) -> VirtualAddress {
        self.base() + index * PAGE_SIZE
    }

    /// Layout over the whole arena; nothing reserved for a kernel image.
    fn layout(&mut self) -> MemoryLayout {
        let base = self.base();
        MemoryLayout::new(base, base, PhysicalAddress::new(PAGES as u64 * PAGE_SIZE))
    }
}

/// Seed every arena page in one go (phase one only covers the first
/// `early_pages`, phase two the rest).
fn booted<const PAGES: usize>(arena: &mut Arena<PAGES>, early_pages: u64) -> FrameAllocator {
    let mut pmm = FrameAllocator::new(arena.layout());
    unsafe {
        pmm.phase_one(arena.base(), arena.page(early_pages));
        pmm.phase_two(arena.page(early_pages), arena.page(PAGES as u64));
    }
    pmm
}

#[test]
fn two_phase_bootstrap_scenario() {
    let mut arena = Arena::<5>::new();
    let mut pmm = FrameAllocator::new(arena.layout());

    // phase one seeds a 2-page range
    unsafe { pmm.phase_one(arena.base(), arena.page(2)) };
    assert_eq!(pmm.free_count(), 2);

    // phase two seeds 3 more pages and resets every refcount
    unsafe { pmm.phase_two(arena.page(2), arena.page(5)) };
    assert_eq!(pmm.free_count(), 5);
    for frame in 0..5 {
        assert_eq!(pmm.refcounts().get(PageFrameNumber::new(frame)), 0);
    }

    // allocate: one page gone, refcount 1
    let page = pmm.allocate().expect("5 pages seeded");
    assert_eq!(pmm.free_count(), 4);
    assert_eq!(pmm.refcounts().get(page.frame()), 1);

    // share it (copy-on-write style)
    pmm.refcounts().increment(page.frame());
    assert_eq!(pmm.refcounts().get(page.frame()), 2);

    // first release only drops the reference
    pmm.release(page);
    assert_eq!(pmm.refcounts().get(page.frame()), 1);
    assert_eq!(pmm.free_count(), 4);

    // last release frees the page
    pmm.release(page);
    assert_eq!(pmm.refcounts().get(page.frame()), 0);
    assert_eq!(pmm.free_count(), 5);
}

#[test]
fn allocate_release_round_trip_restores_free_count() {
    let mut arena = Arena::<4>::new();
    let pmm = booted(&mut arena, 2);

    let before = pmm.free_count();
    let page = pmm.allocate().expect("seeded arena");
    assert_eq!(pmm.free_count(), before - 1);
    pmm.release(page);
    assert_eq!(pmm.free_count(), before);
}

#[test]
fn empty_free_list_is_recoverable_and_mutates_nothing() {
    let mut arena = Arena::<2>::new();
    let pmm = booted(&mut arena, 1);

    let a = pmm.allocate().expect("page 1 of 2");
    let b = pmm.allocate().expect("page 2 of 2");
    assert_eq!(pmm.free_count(), 0);

    // exhausted: sentinel, no side effects
    assert!(pmm.allocate().is_none());
    assert_eq!(pmm.free_count(), 0);
    assert_eq!(pmm.refcounts().get(a.frame()), 1);
    assert_eq!(pmm.refcounts().get(b.frame()), 1);
}

#[test]
fn bootstrap_seeding_never_touches_refcounts() {
    let mut arena = Arena::<3>::new();
    let junk = PageFrameNumber::new(0);

    let mut pmm = FrameAllocator::new(arena.layout());
    // scribble over the (not yet live) table
    pmm.refcounts().increment(junk);
    pmm.refcounts().increment(junk);
    pmm.refcounts().increment(junk);

    // seeding frame 0 in phase one leaves the junk untouched
    unsafe { pmm.phase_one(arena.base(), arena.page(1)) };
    assert_eq!(pmm.refcounts().get(junk), 3);

    // only the phase-two reset defines the counts
    unsafe { pmm.phase_two(arena.page(1), arena.page(3)) };
    assert_eq!(pmm.refcounts().get(junk), 0);
}

#[test]
fn freed_pages_are_poisoned() {
    let mut arena = Arena::<2>::new();
    let base = arena.base();
    let _pmm = booted(&mut arena, 1);

    // everything past the free-list link must carry the poison fill
    let page = base.as_mut_ptr::<u8>();
    for offset in size_of::<usize>()..PAGE {
        assert_eq!(unsafe { *page.add(offset) }, PAGE_POISON, "offset {offset}");
    }
}

#[test]
#[should_panic(expected = "double free")]
fn double_free_is_fatal() {
    let mut arena = Arena::<2>::new();
    let pmm = booted(&mut arena, 1);

    let page = pmm.allocate().expect("seeded arena");
    pmm.release(page);
    pmm.release(page);
}

#[test]
#[should_panic(expected = "misaligned or outside")]
fn misaligned_release_is_fatal() {
    let mut arena = Arena::<2>::new();
    let base = arena.base();
    let pmm = booted(&mut arena, 1);

    pmm.release_addr(base + 1);
}

#[test]
#[should_panic(expected = "misaligned or outside")]
fn release_below_kernel_image_is_fatal() {
    let mut arena = Arena::<3>::new();
    let base = arena.base();
    // first page belongs to the "kernel image"
    let layout = MemoryLayout::new(base, base + PAGE_SIZE, PhysicalAddress::new(3 * PAGE_SIZE));
    let mut pmm = FrameAllocator::new(layout);
    unsafe {
        pmm.phase_one(base + PAGE_SIZE, base + 3 * PAGE_SIZE);
        pmm.phase_two(base + 3 * PAGE_SIZE, base + 3 * PAGE_SIZE);
    }

    pmm.release_addr(base);
}

#[test]
#[should_panic(expected = "misaligned or outside")]
fn release_past_phys_top_is_fatal() {
    let mut arena = Arena::<2>::new();
    let base = arena.base();
    let pmm = booted(&mut arena, 1);

    pmm.release_addr(base + 2 * PAGE_SIZE);
}

#[test]
fn concurrent_drain_hands_out_each_page_once() {
    const PAGES: usize = 32;
    const THREADS: usize = 4;

    let mut arena = Arena::<PAGES>::new();
    let pmm = booted(&mut arena, 8);

    let mut all: Vec<u64> = thread::scope(|s| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                s.spawn(|| {
                    let mut got = Vec::new();
                    while let Some(page) = pmm.allocate() {
                        got.push(page.base().as_u64());
                    }
                    got
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|h| h.join().expect("allocator thread"))
            .collect()
    });

    all.sort_unstable();
    let before_dedup = all.len();
    all.dedup();
    assert_eq!(all.len(), before_dedup, "a page was handed out twice");
    assert_eq!(all.len(), PAGES);
    assert_eq!(pmm.free_count(), 0);

    for base in all {
        pmm.release_addr(VirtualAddress::new(base));
    }
    assert_eq!(pmm.free_count(), PAGES);
}

#[test]
fn concurrent_churn_preserves_free_count() {
    const PAGES: usize = 16;
    const THREADS: usize = 4;
    const ITERS: usize = 2_000;

    let mut arena = Arena::<PAGES>::new();
    let pmm = booted(&mut arena, 4);

    thread::scope(|s| {
        for _ in 0..THREADS {
            s.spawn(|| {
                for _ in 0..ITERS {
                    if let Some(page) = pmm.allocate() {
                        assert_eq!(pmm.refcounts().get(page.frame()), 1);
                        pmm.release(page);
                    }
                }
            });
        }
    });

    assert_eq!(pmm.free_count(), PAGES);
}
