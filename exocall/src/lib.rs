//! Typed contract between a user environment and an exokernel.
//!
//! The kernel underneath this crate owns the page tables, the physical
//! frame allocator, and the scheduler. What it hands to user code is a
//! small set of page-granularity system calls plus a read-only, self-mapped
//! view of the calling environment's own 4-level page table. This crate
//! gives those two surfaces a typed shape:
//!
//! - [`addressing`]: virtual/physical address and page-number newtypes.
//! - [`layout`]: the fixed user address-space layout and per-level spans.
//! - [`table`]: table-entry values, permission bits, and the
//!   [`MappingView`] trait for the self-mapped table.
//! - [`error`]: the negative results a system call can produce.
//! - [`env`]: environment identity and the page-fault report.
//! - [`call`]: the [`ExoCall`] trait, the system-call boundary itself.
//!
//! Nothing in this crate performs a privileged operation. Implementations
//! of [`ExoCall`] do: on real hardware that is a syscall stub layer, and in
//! tests it is a software model of the kernel.

#![no_std]
#![deny(missing_docs, rustdoc::broken_intra_doc_links)]

pub mod addressing;
pub mod call;
pub mod env;
pub mod error;
pub mod layout;
pub mod table;

pub use addressing::{PAGE_MASK, PAGE_SHIFT, PAGE_SIZE, Pa, Va, Vpn};
pub use call::{ExoCall, FaultUpcall, ForkResult};
pub use env::{EnvId, EnvSelf, FaultCause, FaultInfo};
pub use error::SysError;
pub use table::{MappingView, PtIndices, Pte, PteFlags};
