//! # Memory Layout

use kernel_addresses::{PAGE_SIZE, PageFrameNumber, PhysicalAddress, VirtualAddress};

/// Base of the kernel's linear direct map: physical address `pa` is reachable
/// at virtual address [`DIRECT_MAP_BASE`]` + pa`.
pub const DIRECT_MAP_BASE: u64 = 0xffff_8880_0000_0000;

/// Top of usable physical memory (exclusive). 224 MiB.
pub const PHYS_TOP: u64 = 0x0E00_0000;

const _: () = {
    assert!(PHYS_TOP % PAGE_SIZE == 0);
    assert!(DIRECT_MAP_BASE % PAGE_SIZE == 0);
};

/// The physical-memory layout the page allocator operates on.
///
/// One value is constructed at boot and handed to the allocator; nothing here
/// is ambient global state. The layout captures the boot memory contract:
/// the kernel frees and allocates *virtual* addresses inside a linear direct
/// map (`pa = va - direct_map_base`), ownership is tracked per *physical*
/// frame, and only addresses past the loaded kernel image and below the top
/// of physical memory are the allocator's to manage.
#[derive(Copy, Clone, Debug)]
pub struct MemoryLayout {
    /// Virtual address at which physical address 0 is mapped.
    direct_map_base: VirtualAddress,
    /// First virtual address past the loaded kernel image; everything below
    /// it is never handed to the allocator.
    kernel_end: VirtualAddress,
    /// Top of usable physical memory (exclusive).
    phys_top: PhysicalAddress,
}

impl MemoryLayout {
    /// Describe a physical memory range.
    ///
    /// # Panics
    /// If `kernel_end` lies below the direct map or `phys_top` is not
    /// page-aligned; both indicate a broken boot configuration.
    #[must_use]
    pub const fn new(
        direct_map_base: VirtualAddress,
        kernel_end: VirtualAddress,
        phys_top: PhysicalAddress,
    ) -> Self {
        assert!(kernel_end.as_u64() >= direct_map_base.as_u64());
        assert!(phys_top.as_u64() % PAGE_SIZE == 0);
        Self {
            direct_map_base,
            kernel_end,
            phys_top,
        }
    }

    /// The canonical layout for a kernel image ending at `kernel_end`.
    #[must_use]
    pub const fn canonical(kernel_end: VirtualAddress) -> Self {
        Self::new(
            VirtualAddress::new(DIRECT_MAP_BASE),
            kernel_end,
            PhysicalAddress::new(PHYS_TOP),
        )
    }

    #[inline]
    #[must_use]
    pub const fn kernel_end(&self) -> VirtualAddress {
        self.kernel_end
    }

    #[inline]
    #[must_use]
    pub const fn phys_top(&self) -> PhysicalAddress {
        self.phys_top
    }

    /// Number of page frames below the top of physical memory.
    #[inline]
    #[must_use]
    pub const fn page_frames(&self) -> usize {
        (self.phys_top.as_u64() / PAGE_SIZE) as usize
    }

    /// Translate a direct-mapped virtual address to its physical address.
    ///
    /// Returns `None` for addresses below the direct map.
    #[inline]
    #[must_use]
    pub const fn virt_to_phys(&self, va: VirtualAddress) -> Option<PhysicalAddress> {
        match va.as_u64().checked_sub(self.direct_map_base.as_u64()) {
            Some(pa) => Some(PhysicalAddress::new(pa)),
            None => None,
        }
    }

    /// Virtual address at which `pa` is reachable through the direct map.
    #[inline]
    #[must_use]
    pub const fn phys_to_virt(&self, pa: PhysicalAddress) -> VirtualAddress {
        VirtualAddress::new(self.direct_map_base.as_u64() + pa.as_u64())
    }

    /// The page frame a direct-mapped virtual address belongs to, or `None`
    /// if the address lies outside usable physical memory.
    #[inline]
    #[must_use]
    pub const fn frame_of(&self, va: VirtualAddress) -> Option<PageFrameNumber> {
        match self.virt_to_phys(va) {
            Some(pa) if pa.as_u64() < self.phys_top.as_u64() => Some(pa.frame()),
            _ => None,
        }
    }
}
