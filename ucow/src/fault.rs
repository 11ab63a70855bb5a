//! Copy-on-write page-fault servicing.
//!
//! The kernel dispatches every page fault of an environment to the
//! upcall registered for it, on the environment's exception stack. This
//! module is that upcall for environments produced by [`fork`]: the only
//! fault it knows how to repair is a write to a page marked
//! copy-on-write. Anything else reaching it is a contract violation and
//! the environment aborts; in particular a read fault is never repaired
//! here, because a copy-on-write page is always mapped readable.
//!
//! Repair materializes the private copy: allocate one fresh frame, stage
//! it at the fixed scratch slot [`PFTEMP`], copy the faulting page's
//! content into it, then remap the faulting page onto the staged frame
//! with write permission. Remapping replaces the old entry, so the
//! shared frame needs no explicit unmap; the kernel drops its reference
//! as a side effect. Afterwards the scratch slot is released.
//!
//! [`fork`]: crate::fork::fork
//! [`PFTEMP`]: exocall::layout::PFTEMP

use crate::FaultError;
use exocall::layout::PFTEMP;
use exocall::{ExoCall, FaultInfo, PteFlags, SysError};
use log::{error, trace};

/// Service one copy-on-write fault.
///
/// # Parameters
/// - `k`: the faulting environment's kernel handle.
/// - `info`: the fault report. The faulting page is the page containing
///   `info.addr`.
///
/// # Returns
/// - `Ok(())` once exactly the faulting environment's own mapping has
///   been switched to a private writable copy. Sibling mappings of the
///   original frame are untouched.
/// - `Err(FaultError)` if the fault is not a write to a copy-on-write
///   page, or if allocation or mapping fails during repair. All of these
///   are fatal to the environment.
pub fn handle_cow_fault<E: ExoCall + ?Sized>(k: &mut E, info: &FaultInfo) -> Result<(), FaultError> {
    let page = info.addr.page_down();

    if !info.is_write() {
        return Err(FaultError::NotWrite(info.addr));
    }
    if !k.lookup(page).is_cow() {
        return Err(FaultError::NotCow(info.addr));
    }

    let me = k.env_id();
    let fresh = PteFlags::P | PteFlags::RW | PteFlags::US;

    // Stage a fresh frame at the scratch slot and fill it with the
    // page's current content.
    k.page_alloc(me, PFTEMP, fresh).map_err(FaultError::Repair)?;
    k.copy_page(page, PFTEMP);

    // Moving the staged frame onto the faulting page supersedes the
    // shared mapping.
    k.page_map(me, PFTEMP, me, page, fresh)
        .map_err(FaultError::Repair)?;
    k.page_unmap(me, PFTEMP).map_err(FaultError::Repair)?;

    trace!("{}: private copy materialized at {}", me, page);
    Ok(())
}

/// The fault upcall installed by the fork path.
///
/// Adapts [`handle_cow_fault`] to the [`FaultUpcall`] signature: a
/// failure is logged and reported to the kernel, which tears the
/// environment down.
///
/// [`FaultUpcall`]: exocall::FaultUpcall
pub fn upcall(k: &mut dyn ExoCall, info: &FaultInfo) -> Result<(), SysError> {
    handle_cow_fault(k, info).map_err(|e| {
        error!(
            "{}: unrecoverable fault at {} ({:?}): {:?}",
            k.env_id(),
            info.addr,
            info.cause,
            e
        );
        SysError::from(e)
    })
}
