//! The fixed user address-space layout.
//!
//! Translation is the 4-level scheme of x86_64: each table holds
//! [`NPTENTRIES`] entries, each level divides its parent's span by that
//! fan-out, and a leaf entry covers one 4 KiB page. The user-controlled
//! range and its fixed landmarks are:
//!
//! ```text
//!  UTOP, UXSTACKTOP ─────▶ +==========================+ 0x100_0000_0000
//!                          |     exception stack      | one page
//!                          +--------------------------+
//!                          |       (guard page)       |
//!  USTACKTOP ────────────▶ +--------------------------+
//!                          |       normal stack       |
//!                          |           ...            |
//!  UTEXT ────────────────▶ +--------------------------+ 0x80_0000
//!                          |           ...            |
//!  PFTEMP ───────────────▶ +--------------------------+ 0x60_0000
//!                          |           ...            |
//!                          +==========================+ 0x0
//! ```
//!
//! Everything in `UTEXT..UTOP` belongs to the environment and is subject
//! to duplication at fork time, with one exception: the page immediately
//! below [`UXSTACKTOP`] is the environment's exception stack, which is
//! always privately owned. [`PFTEMP`] sits below [`UTEXT`] so that a
//! transiently mapped scratch page is never mistaken for part of the
//! duplicable range.

use crate::addressing::{PAGE_SHIFT, PAGE_SIZE, Va};
use static_assertions::{const_assert, const_assert_eq};

/// Number of entries in one table, at every level of the hierarchy.
pub const NPTENTRIES: usize = 512;

/// Bytes of virtual address space covered by one top-level (PML4) entry.
pub const PML4E_SPAN: usize = 1 << 39;

/// Bytes of virtual address space covered by one second-level (PDPT)
/// entry.
pub const PDPE_SPAN: usize = 1 << 30;

/// Bytes of virtual address space covered by one third-level (PD) entry.
pub const PDE_SPAN: usize = 1 << 21;

/// Exclusive top of the user-controlled virtual range.
pub const UTOP: Va = Va(0x100_0000_0000);

/// Top of the exception stack. The exception stack is the single page
/// ending here; the kernel switches onto it before dispatching a fault
/// upcall, so that fault servicing never depends on the state of the
/// normal stack.
pub const UXSTACKTOP: Va = Va(0x100_0000_0000);

/// Top of the normal user stack. One unmapped guard page separates it
/// from the exception stack above.
pub const USTACKTOP: Va = Va(0x100_0000_0000 - 2 * PAGE_SIZE);

/// Lowest address considered part of the duplicable user range. Program
/// text is linked at this address.
pub const UTEXT: Va = Va(0x80_0000);

/// A fixed, process-private scratch slot, one page wide.
///
/// Fault repair and fork both need somewhere to stage a freshly allocated
/// frame while filling it; they map it here, copy into it, hand the frame
/// to its final home, and unmap this slot again. The slot is below
/// [`UTEXT`] and therefore outside the range the fork walk visits.
pub const PFTEMP: Va = Va(0x60_0000);

/// The base address of the environment's exception stack page.
#[inline]
pub const fn uxstack_page() -> Va {
    Va(UXSTACKTOP.0 - PAGE_SIZE)
}

const_assert_eq!(PAGE_SIZE, 1 << PAGE_SHIFT);
const_assert_eq!(PDE_SPAN, NPTENTRIES * PAGE_SIZE);
const_assert_eq!(PDPE_SPAN, NPTENTRIES * PDE_SPAN);
const_assert_eq!(PML4E_SPAN, NPTENTRIES * PDPE_SPAN);

// The walk relies on UTOP landing on a top-level entry boundary, and on
// the landmarks being page-aligned and ordered.
const_assert_eq!(UTOP.0 % PML4E_SPAN, 0);
const_assert_eq!(UTEXT.0 % PAGE_SIZE, 0);
const_assert_eq!(PFTEMP.0 % PAGE_SIZE, 0);
const_assert!(PFTEMP.0 < UTEXT.0);
const_assert!(UTEXT.0 < USTACKTOP.0);
const_assert_eq!(UXSTACKTOP.0, UTOP.0);
