//! # Kernel memory layout
//!
//! Describes where usable physical memory lives and how the kernel reaches it.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod memory;

pub use memory::MemoryLayout;
