//! Single-page transfer into a child environment.

use crate::DupError;
use exocall::{EnvId, ExoCall, PteFlags, SysError, Vpn};
use log::trace;

/// Transfer the caller's mapping of page `vpn` to `child`, at the same
/// virtual address.
///
/// The caller's own leaf entry decides the mode:
///
/// - **Writable or already copy-on-write**: both sides must end up with
///   the same reduced permissions, writable stripped and the
///   copy-on-write marker set. The child's mapping is established first,
///   then the caller's own mapping is re-established with the reduced
///   permissions. The order matters: the moment the frame gains its
///   second reference, that reference is already protected, and the
///   caller's writable access is revoked before the caller can touch the
///   frame again after the child exists. Re-marking is needed even for a
///   page that was already copy-on-write, because the caller may since
///   have been on the parent side of an earlier fork whose child holds
///   the old frame.
/// - **Plain read-only**: the child is mapped with the caller's
///   permissions unchanged. Nothing is demoted on either side.
///
/// # Returns
/// - `Ok(())` on success.
/// - `Err(DupError::Demote)` if a mapping call on the first branch
///   failed; the caller must treat this as fatal.
/// - `Err(DupError::Share)` if the read-only share failed; no state
///   changed.
pub fn duppage<E: ExoCall + ?Sized>(k: &mut E, child: EnvId, vpn: Vpn) -> Result<(), DupError> {
    let va = vpn.va();
    let entry = k.lookup(va);
    if !entry.is_present() {
        return Err(DupError::Share(SysError::NoSuchMapping));
    }

    let me = k.env_id();
    let perms = entry.flags() & PteFlags::USER_MASK;

    if perms.intersects(PteFlags::RW | PteFlags::COW) {
        let reduced = (perms - PteFlags::RW) | PteFlags::COW;
        // Child first; only then revoke our own write access.
        k.page_map(me, va, child, va, reduced)
            .map_err(DupError::Demote)?;
        k.page_map(me, va, me, va, reduced)
            .map_err(DupError::Demote)?;
        trace!("{}: {} shared copy-on-write with {}", me, va, child);
    } else {
        k.page_map(me, va, child, va, perms)
            .map_err(DupError::Share)?;
        trace!("{}: {} shared read-only with {}", me, va, child);
    }
    Ok(())
}
