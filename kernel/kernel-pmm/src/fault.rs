use kernel_addresses::{PageFrameNumber, VirtualAddress};

/// Unrecoverable physical-memory invariant violations.
///
/// These are never returned to callers and never retried: they terminate the
/// whole system. Out-of-memory is deliberately *not* part of
/// this enum; it is an ordinary `None` from
/// [`FrameAllocator::allocate`](crate::FrameAllocator::allocate).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FatalFault {
    /// `release` was handed an address that is misaligned, below the kernel
    /// image, or outside usable physical memory.
    #[error("released address {0} is misaligned or outside usable physical memory")]
    InvalidAddress(VirtualAddress),
    /// `release` observed a refcount that was already zero.
    #[error("refcount underflow on frame {0}: double free")]
    DoubleFree(PageFrameNumber),
}

/// Hand a fault to the fatal-halt collaborator. Never returns.
#[cold]
pub(crate) fn halt(fault: FatalFault) -> ! {
    log::error!("halting: {fault}");
    panic!("{fault}");
}
