//! The fork entry points.

use crate::{ForkError, fault, walk};
use exocall::layout::{PFTEMP, uxstack_page};
use exocall::{EnvId, EnvSelf, ExoCall, ForkResult, PteFlags};
use log::debug;

/// Duplicate the calling environment, sharing memory copy-on-write.
///
/// In the parent, builds a complete child: every present page of the
/// user range mapped at the same address (writable pages demoted to
/// copy-on-write on both sides), a private exception stack holding a
/// byte copy of the parent's, the fault upcall registered, and finally
/// the child made runnable. Returns [`ForkResult::Parent`] with the
/// child's identifier.
///
/// In the child, the same call returns [`ForkResult::Child`] after
/// re-binding `me`: the identity value the child inherited by memory
/// duplication still names the parent and must not be trusted.
///
/// # Errors
///
/// Every error is fatal to the caller (see [`ForkError`]). A failed fork
/// never yields a usable child. The parent's address space survives,
/// except that pages already demoted to copy-on-write before the failure
/// point remain demoted; they are safe to keep using and are not rolled
/// back.
pub fn fork<E: ExoCall + ?Sized>(k: &mut E, me: &mut EnvSelf) -> Result<ForkResult, ForkError> {
    // Both resulting environments service their own faults, so the
    // registration happens up front in the parent; the child repeats it
    // harmlessly if it ever forks itself.
    install_fault_handler(k)?;

    let child = match k.exofork().map_err(ForkError::CreateChild)? {
        ForkResult::Child => {
            me.rebind(k);
            return Ok(ForkResult::Child);
        }
        ForkResult::Parent(child) => child,
    };
    debug!("{}: forking into {}", me.id(), child);

    walk::duplicate_user_space(k, child)?;
    replicate_exception_stack(k, child)?;

    k.set_fault_upcall(child, fault::upcall)
        .map_err(ForkError::InstallUpcall)?;
    k.set_runnable(child).map_err(ForkError::SetRunnable)?;

    debug!("{}: child {} runnable", me.id(), child);
    Ok(ForkResult::Parent(child))
}

/// Duplicate the calling environment with fully shared memory.
///
/// Not provided: always returns
/// [`ForkError::SharedForkUnimplemented`] and performs no state change.
/// The entry point exists so that callers probing for the feature get
/// the designated answer rather than a missing symbol.
pub fn sfork<E: ExoCall + ?Sized>(_k: &mut E) -> Result<ForkResult, ForkError> {
    Err(ForkError::SharedForkUnimplemented)
}

/// Ensure the caller can service its own copy-on-write faults.
///
/// Provisions the exception stack if the caller does not have one yet,
/// then registers [`fault::upcall`] as the caller's fault entry.
fn install_fault_handler<E: ExoCall + ?Sized>(k: &mut E) -> Result<(), ForkError> {
    let me = k.env_id();
    let xstack = uxstack_page();
    if !k.lookup(xstack).is_present() {
        k.page_alloc(me, xstack, PteFlags::P | PteFlags::RW | PteFlags::US)
            .map_err(ForkError::InstallHandler)?;
    }
    k.set_fault_upcall(me, fault::upcall)
        .map_err(ForkError::InstallHandler)?;
    Ok(())
}

/// Give `child` a private exception stack holding a byte copy of the
/// caller's.
///
/// The exception stack is never shared and never marked copy-on-write:
/// the two environments may service faults concurrently, and neither may
/// observe the other's servicing state. A fresh frame is staged at
/// [`PFTEMP`], filled from the caller's exception stack, mapped into the
/// child at the exception-stack address, and the scratch slot released.
/// After the release the child holds the frame's only reference.
fn replicate_exception_stack<E: ExoCall + ?Sized>(
    k: &mut E,
    child: EnvId,
) -> Result<(), ForkError> {
    let me = k.env_id();
    let xstack = uxstack_page();
    let fresh = PteFlags::P | PteFlags::RW | PteFlags::US;

    k.page_alloc(me, PFTEMP, fresh)
        .map_err(ForkError::ExceptionStack)?;
    k.copy_page(xstack, PFTEMP);
    k.page_map(me, PFTEMP, child, xstack, fresh)
        .map_err(ForkError::ExceptionStack)?;
    k.page_unmap(me, PFTEMP)
        .map_err(ForkError::ExceptionStack)?;
    Ok(())
}
