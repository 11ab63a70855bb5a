//! Enumeration of the caller's present pages.
//!
//! The user range spans far more page slots than could be visited one at
//! a time, and almost all of them are holes. The walk therefore checks
//! the table hierarchy from the top at every position: if the top-level
//! entry is absent, nothing below it can be mapped and the whole 512 GiB
//! span is skipped in one step; likewise 1 GiB for an absent
//! second-level entry and 2 MiB for an absent third-level entry. Only
//! when all three intermediate levels are present is the leaf entry
//! consulted, and only a present leaf reaches the duplicator.
//!
//! A skip advances to the start of the *next* entry at the absent level,
//! not by a raw span from the current position; the current position may
//! sit in the middle of the absent entry's span, and overshooting would
//! jump past addresses governed by an entry that was never checked.

use crate::{ForkError, dup};
use exocall::layout::{PDE_SPAN, PDPE_SPAN, PML4E_SPAN, UTEXT, UTOP, uxstack_page};
use exocall::{EnvId, ExoCall, PAGE_SIZE, PtIndices, Va};

/// Advance to the start of the next span-sized, span-aligned region.
#[inline]
fn next_span(va: Va, span: usize) -> Va {
    va - (va.into_usize() & (span - 1)) + span
}

/// Map every present page of the caller's user range into `child` via
/// [`dup::duppage`], excluding the exception-stack page.
///
/// Runs exactly once per fork, over the caller's own table, before the
/// child is made runnable. The first failing transfer aborts the walk;
/// pages transferred before it stay transferred (and, where applicable,
/// demoted).
pub fn duplicate_user_space<E: ExoCall + ?Sized>(
    k: &mut E,
    child: EnvId,
) -> Result<(), ForkError> {
    let xstack = uxstack_page();
    let mut va = UTEXT;
    while va < UTOP {
        let ix = PtIndices::of(va);
        if !k.pml4e(ix.pml4e).is_present() {
            va = next_span(va, PML4E_SPAN);
            continue;
        }
        if !k.pdpe(ix.pdpe).is_present() {
            va = next_span(va, PDPE_SPAN);
            continue;
        }
        if !k.pde(ix.pde).is_present() {
            va = next_span(va, PDE_SPAN);
            continue;
        }
        if k.pte(ix.pte).is_present() && va != xstack {
            dup::duppage(k, child, va.vpn()).map_err(|cause| ForkError::Duplicate { va, cause })?;
        }
        va += PAGE_SIZE;
    }
    Ok(())
}
