//! # Kernel synchronization primitives
//!
//! Currently a single busy-wait lock, [`SpinLock`]. The critical sections it
//! guards (free-list pushes and pops) are short and never block, so spinning
//! is the right trade-off; there is no queueing fairness and no timeout.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod spin_lock;

pub use spin_lock::{SpinLock, SpinLockGuard};
