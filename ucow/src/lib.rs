//! # User-level `fork` with copy-on-write.
//!
//! `fork` duplicates the calling environment: after the call there are two
//! environments whose address spaces hold the same content, distinguished
//! only by the call's return value. Copying every page eagerly would make
//! that cost proportional to the whole address space, most of which the
//! two sides will never write. This library instead builds the child
//! entirely from user space, over an exokernel's page-granularity system
//! calls, and shares every page copy-on-write:
//!
//! 1. At fork time the parent walks its own page table through the
//!    read-only self-mapped view, and maps every present page into the
//!    child at the same address. A writable page is not handed over
//!    writable: both the child's new mapping and the parent's own are
//!    demoted to read-only with the software copy-on-write marker set.
//! 2. The first write either side makes to such a page traps. The fault
//!    upcall allocates a fresh frame, copies the page's content into it,
//!    and remaps the written page onto the private copy, writable. The
//!    other side keeps the original frame, untouched.
//!
//! One page is exempt from sharing in both directions: the exception
//! stack. Fault servicing runs on it, so the two environments must never
//! observe each other's fault servicing state; the child gets a private
//! frame holding a byte copy of the parent's.
//!
//! ## Ordering
//!
//! The single correctness-critical ordering lives in [`dup::duppage`]:
//! when a writable (or already copy-on-write) page is transferred, the
//! child's protected mapping is established *before* the parent's own
//! mapping is demoted. At no instant is the shared frame reachable
//! through a writable mapping while a second mapping exists. The
//! orchestration in [`fork::fork`] adds the outer ordering: the child
//! becomes visible to the scheduler only after its whole address space,
//! exception stack, and fault entry are installed.
//!
//! ## Errors
//!
//! Failures split into two classes, and the split is carried in the
//! types. Contract violations and mid-construction system-call failures
//! are fatal: a half-built child cannot be scheduled and cannot be safely
//! discarded from user space, so the caller must abort. The one benign
//! case is a failed plain read-only share, reported as
//! [`DupError::Share`]; the orchestrator still treats it as fatal, but
//! [`ForkError::is_benign`] preserves the distinction for a caller that
//! wants softer semantics.

#![no_std]
#![deny(missing_docs, rustdoc::broken_intra_doc_links)]

pub mod dup;
pub mod fault;
pub mod fork;
pub mod walk;

pub use exocall::ForkResult;

use exocall::{SysError, Va};

/// Errors of the copy-on-write fault path.
///
/// Every variant is fatal to the faulting environment. The first two are
/// contract violations: the kernel dispatched a fault this handler was
/// never meant to see. The last is a resource failure during repair; the
/// faulting access cannot be made to succeed, and it is not retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultError {
    /// The faulting access was not a write.
    NotWrite(Va),
    /// The faulting page is not marked copy-on-write.
    NotCow(Va),
    /// A system call failed while materializing the private copy.
    Repair(SysError),
}

impl From<FaultError> for SysError {
    fn from(e: FaultError) -> SysError {
        match e {
            FaultError::NotWrite(_) | FaultError::NotCow(_) => SysError::InvalidPermission,
            FaultError::Repair(e) => e,
        }
    }
}

/// Errors of the single-page transfer.
///
/// The two variants deliberately carry different weight. [`Demote`]
/// means a mapping call failed while the page was being placed under
/// copy-on-write protection; the frame may already be multiply
/// referenced, and the caller must treat the fork as unrecoverable.
/// [`Share`] means the plain read-only share of an already-read-only
/// page failed; nothing was changed on either side, and the result is an
/// ordinary negative answer to the immediate caller. The asymmetry is
/// deliberate; whether a caller could usefully continue after [`Share`]
/// is an open product question, so the distinction is kept rather than
/// collapsed.
///
/// [`Demote`]: DupError::Demote
/// [`Share`]: DupError::Share
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DupError {
    /// Establishing a copy-on-write mapping (child's or the caller's own
    /// re-mapping) failed.
    Demote(SysError),
    /// Establishing the plain read-only share failed.
    Share(SysError),
}

impl From<DupError> for SysError {
    fn from(e: DupError) -> SysError {
        match e {
            DupError::Demote(e) | DupError::Share(e) => e,
        }
    }
}

/// Errors of the fork orchestration.
///
/// Every variant except [`SharedForkUnimplemented`] reports a fatal
/// condition: the caller holds no usable child, and must abort rather
/// than continue with a partially constructed one. Pages already demoted
/// to copy-on-write before the failure point remain demoted; no rollback
/// is attempted, since the demoted state is safe (merely slower) for the
/// surviving parent.
///
/// [`SharedForkUnimplemented`]: ForkError::SharedForkUnimplemented
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForkError {
    /// Registering the caller's fault handler, or provisioning its
    /// exception stack, failed.
    InstallHandler(SysError),
    /// Creating the child context failed; nothing was built.
    CreateChild(SysError),
    /// Transferring the page at `va` into the child failed.
    Duplicate {
        /// Base address of the page whose transfer failed.
        va: Va,
        /// The transfer failure, with its fatal/benign class intact.
        cause: DupError,
    },
    /// Building the child's private exception stack failed.
    ExceptionStack(SysError),
    /// Registering the child's fault upcall failed.
    InstallUpcall(SysError),
    /// Making the child eligible for scheduling failed.
    SetRunnable(SysError),
    /// Shared (non-copy-on-write) fork is not provided.
    SharedForkUnimplemented,
}

impl From<ForkError> for SysError {
    fn from(e: ForkError) -> SysError {
        match e {
            ForkError::InstallHandler(e)
            | ForkError::CreateChild(e)
            | ForkError::ExceptionStack(e)
            | ForkError::InstallUpcall(e)
            | ForkError::SetRunnable(e) => e,
            ForkError::Duplicate { cause, .. } => cause.into(),
            ForkError::SharedForkUnimplemented => SysError::NotImplemented,
        }
    }
}

impl ForkError {
    /// Whether this failure is, in principle, survivable by the caller.
    ///
    /// A failed plain read-only share qualifies (it mutates nothing), as
    /// does the unimplemented shared-fork answer. [`fork::fork`] itself
    /// still aborts on the former; this predicate exists for callers
    /// that want to distinguish the cases.
    pub fn is_benign(&self) -> bool {
        matches!(
            self,
            ForkError::Duplicate {
                cause: DupError::Share(_),
                ..
            } | ForkError::SharedForkUnimplemented
        )
    }
}
