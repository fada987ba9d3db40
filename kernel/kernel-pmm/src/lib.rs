//! # Physical Page Allocator
//!
//! Owns all usable physical memory and hands out fixed 4 KiB pages for
//! process memory, page tables, kernel stacks, and buffers. Every frame
//! carries a reference count so copy-on-write page sharing is safe: a page
//! only returns to the free list once its last mapping is gone.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │              [`FrameAllocator`]                     │
//! │   • allocate / release / free_count                 │
//! │   • spin-lock guarded free list + frame refcounts   │
//! └──────────┬───────────────────────┬──────────────────┘
//!            │                       │
//! ┌──────────▼───────────┐ ┌─────────▼──────────────────┐
//! │ FreeList             │ │ [`RefcountTable`]          │
//! │ intrusive links kept │ │ one count per frame,       │
//! │ inside free pages    │ │ no locking of its own      │
//! └──────────────────────┘ └────────────────────────────┘
//! ```
//!
//! Startup is two-phased: phase one seeds the free list while the
//! system is still single-threaded and refcounting is inactive; phase two
//! seeds the remaining range, enables locking, and zeroes the refcount table.
//!
//! ## Error model
//!
//! Out-of-memory is ordinary control flow: [`FrameAllocator::allocate`]
//! returns `None` and the caller decides policy. Invariant violations
//! (misaligned or out-of-range frees, refcount underflow) are [`FatalFault`]s
//! and halt the system; a caller that trips one has already demonstrated a
//! corrupted view of memory ownership, so nothing can be safely contained.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

extern crate alloc;

mod boot;
mod fault;
mod frame_alloc;
mod free_list;
mod refcount;

pub use fault::FatalFault;
pub use frame_alloc::{FrameAllocator, PAGE_POISON, PageHandle};
pub use refcount::RefcountTable;
