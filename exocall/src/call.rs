//! The system-call boundary.
//!
//! [`ExoCall`] is the complete set of privileged operations a user
//! environment can request, as the library consumes it. The kernel behind
//! the trait owns all the mechanism: frame allocation and reference
//! counting, page-table updates, scheduling. The caller only names pages,
//! permissions, and environments; every call is synchronous and blocking.
//!
//! A handle also implements [`MappingView`], because the kernel publishes
//! the caller's own table read-only into the caller's address space: the
//! two surfaces always travel together.
//!
//! ## Which environments a caller may touch
//!
//! Calls taking a target [`EnvId`] succeed only for the caller itself or
//! for an environment the caller created. That rule, plus the fact that a
//! fresh child is not runnable until explicitly made so, is what lets the
//! fork path mutate a child's address space without any locking: nobody
//! else can reach it yet.

use crate::addressing::Va;
use crate::env::{EnvId, FaultInfo};
use crate::error::SysError;
use crate::table::{MappingView, PteFlags};

/// The two sides of a successful child-context creation.
///
/// The creating call returns twice: once in the parent, identifying the
/// new child, and once in the child when it first runs, as [`Child`].
///
/// [`Child`]: ForkResult::Child
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForkResult {
    /// This execution is the original caller; the payload names the new
    /// child environment.
    Parent(EnvId),
    /// This execution is the newly created child.
    Child,
}

/// The entry the kernel dispatches a page fault to.
///
/// The kernel invokes the registered upcall in the faulting environment,
/// on that environment's exception stack, with a handle for further
/// system calls and the fault report. Returning `Ok(())` resumes the
/// faulting access; returning an error tells the kernel the environment
/// cannot continue, and the kernel tears it down.
pub type FaultUpcall = fn(&mut dyn ExoCall, &FaultInfo) -> Result<(), SysError>;

/// A user environment's handle on the exokernel.
///
/// All methods are the caller's own system calls: `self` is the calling
/// environment, and [`EnvId`] arguments name the environment to operate
/// on (which may be the caller itself).
pub trait ExoCall: MappingView {
    /// The identity of the calling execution context.
    fn env_id(&self) -> EnvId;

    /// Create a new child context.
    ///
    /// The child's saved execution state is a duplicate of the caller's
    /// at the moment of the call, positioned so that when the child first
    /// runs, this same call returns [`ForkResult::Child`] there. The
    /// child's user address space starts empty, and the child is not
    /// runnable until [`ExoCall::set_runnable`] is invoked on it.
    ///
    /// # Returns
    /// - `Ok(ForkResult::Parent(id))` in the caller.
    /// - `Ok(ForkResult::Child)` in the child, when it eventually runs.
    /// - `Err(SysError::NoFreeEnv)` if no environment slot is free.
    fn exofork(&mut self) -> Result<ForkResult, SysError>;

    /// Allocate a fresh frame and map it at `va` in `env`.
    ///
    /// The new frame's content is zeroed. If `va` was already mapped, the
    /// previous mapping is replaced and its frame reference dropped.
    /// `perm` must contain `P | US`, and must not exceed
    /// [`PteFlags::USER_MASK`].
    fn page_alloc(&mut self, env: EnvId, va: Va, perm: PteFlags) -> Result<(), SysError>;

    /// Map, at `dst_va` in `dst_env`, the same frame that `src_va` maps
    /// in `src_env`, with permissions `perm`.
    ///
    /// `perm` may differ from the source mapping's permissions, subject
    /// to the same constraints as [`ExoCall::page_alloc`] plus one more:
    /// `RW` may only be requested if the source mapping itself is
    /// writable. If `dst_va` was already mapped, the previous mapping is
    /// replaced.
    fn page_map(
        &mut self,
        src_env: EnvId,
        src_va: Va,
        dst_env: EnvId,
        dst_va: Va,
        perm: PteFlags,
    ) -> Result<(), SysError>;

    /// Remove the mapping at `va` in `env`.
    ///
    /// The kernel drops the frame's reference count; the frame itself is
    /// reclaimed only when the last reference goes away.
    fn page_unmap(&mut self, env: EnvId, va: Va) -> Result<(), SysError>;

    /// Register `upcall` as the page-fault entry for `env`.
    ///
    /// Future faults in that environment dispatch to the upcall on the
    /// environment's exception stack.
    fn set_fault_upcall(&mut self, env: EnvId, upcall: FaultUpcall) -> Result<(), SysError>;

    /// Make `env` eligible for scheduling.
    fn set_runnable(&mut self, env: EnvId) -> Result<(), SysError>;

    /// Copy one page of memory from `src` to `dst` within the caller's
    /// own address space.
    ///
    /// This is not a system call; it stands for a plain user-mode
    /// page-sized `memmove`, and is on the trait so the library can run
    /// against an address space it cannot natively dereference. Both
    /// addresses are taken page-aligned (offset bits ignored); `src` must
    /// be mapped readable and `dst` mapped writable in the caller.
    fn copy_page(&mut self, src: Va, dst: Va);
}
