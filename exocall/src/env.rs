//! Environment identity and the page-fault report.

use crate::addressing::Va;
use crate::call::ExoCall;

/// An opaque environment identifier.
///
/// The kernel assigns one to every environment it creates. Identifiers
/// are never zero and are never reused while the environment exists.
#[derive(Debug, Clone, Copy, Eq, PartialEq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct EnvId(pub usize);

impl EnvId {
    /// Returns the raw identifier value.
    #[inline]
    pub const fn into_usize(self) -> usize {
        self.0
    }
}

impl core::fmt::Display for EnvId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "env[{}]", self.0)
    }
}

/// The identity this execution context believes it has.
///
/// When an address space is duplicated, every by-value copy of the
/// parent's state comes along, including any recorded identity. The copy
/// in the child therefore still names the parent until it is explicitly
/// re-bound. Holding identity in an [`EnvSelf`] value that the fork path
/// re-binds at the child branch point keeps that correction visible in
/// one place, instead of hiding it behind a mutable global.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct EnvSelf {
    id: EnvId,
}

impl EnvSelf {
    /// Capture the identity of the calling execution context.
    pub fn current<E: ExoCall + ?Sized>(k: &E) -> Self {
        Self { id: k.env_id() }
    }

    /// The environment this context currently believes it is.
    #[inline]
    pub fn id(&self) -> EnvId {
        self.id
    }

    /// Re-resolve identity against the kernel's answer.
    ///
    /// Called in the child branch of fork, where the inherited value still
    /// names the parent.
    pub fn rebind<E: ExoCall + ?Sized>(&mut self, k: &E) {
        self.id = k.env_id();
    }
}

bitflags::bitflags! {
    /// The cause bits the kernel reports with a page fault.
    pub struct FaultCause: usize {
        /// The fault is a protection violation: a translation exists but
        /// forbids the attempted access. If clear, no translation exists.
        const PROTECTION = 1 << 0;
        /// The faulting access was a write.
        const WRITE = 1 << 1;
        /// The faulting access came from user mode.
        const USER = 1 << 2;
    }
}

/// What the kernel tells a fault upcall about the fault it is servicing.
#[derive(Debug, Clone, Copy)]
pub struct FaultInfo {
    /// The address whose access faulted. Not necessarily page-aligned;
    /// the faulting page is the one containing it.
    pub addr: Va,
    /// The cause bits of the fault.
    pub cause: FaultCause,
}

impl FaultInfo {
    /// Build a report from the raw cause bits and faulting address.
    pub fn new(cause: FaultCause, addr: Va) -> Self {
        Self { addr, cause }
    }

    /// Whether the faulting access was a write.
    #[inline]
    pub fn is_write(&self) -> bool {
        self.cause.contains(FaultCause::WRITE)
    }

    /// Whether the fault is a protection violation on a present mapping.
    #[inline]
    pub fn is_protection(&self) -> bool {
        self.cause.contains(FaultCause::PROTECTION)
    }
}
