//! Table entries and the read-only self-mapped table view.
//!
//! The kernel maps every environment's own 4-level page table into that
//! environment's address space, read-only. Through that window user code
//! can inspect, but never write, the entries that translate its
//! addresses. The window presents each level as one flat array: index
//! `va >> 39` into the top level, `va >> 30` into the second,
//! `va >> 21` into the third, and `va >> 12` (the page number) into the
//! leaf level. [`MappingView`] is the typed form of those four arrays and
//! [`PtIndices`] computes the indices.
//!
//! A present intermediate entry only promises that the next level of the
//! walk exists; the authoritative permission state of a page lives in its
//! leaf entry.

use crate::addressing::{PAGE_SHIFT, Pa, Va};

bitflags::bitflags! {
    /// Flags of a page-table entry.
    ///
    /// The low permission bits and the high no-execute bit are interpreted
    /// by hardware. Bits 9 through 11 are ignored by hardware and
    /// reserved for software; this system spends bit 11 on the
    /// copy-on-write convention.
    pub struct PteFlags: usize {
        /// Present; the entry holds a valid translation.
        const P = 1 << 0;
        /// Read/write; if 0, writes through this entry are not allowed.
        const RW = 1 << 1;
        /// User/supervisor; if 0, user-mode accesses are not allowed.
        const US = 1 << 2;
        /// Page-level write-through.
        const PWT = 1 << 3;
        /// Page-level cache disable.
        const PCD = 1 << 4;
        /// Accessed; set by hardware on translation through this entry.
        const A = 1 << 5;
        /// Dirty; set by hardware on a write through this entry.
        const D = 1 << 6;
        /// Page size; in an intermediate entry, terminates the walk early.
        const PS = 1 << 7;
        /// Global; the translation survives an address-space switch.
        const G = 1 << 8;
        /// First software-available bit; ignored by hardware.
        const AVAIL_0 = 1 << 9;
        /// Second software-available bit; ignored by hardware.
        const AVAIL_1 = 1 << 10;
        /// Copy-on-write marker, a software convention in the third
        /// available bit: the page's frame may be shared by several
        /// mappings, and a write must go through fault-handler mediation
        /// before it can proceed.
        const COW = 1 << 11;
        /// Execute-disable; if set, instruction fetches through this entry
        /// are not allowed.
        const XD = 1 << 63;
    }
}

impl PteFlags {
    /// The flag bits an environment may legally pass across the system
    /// call boundary: present, writable, user, and the software bits.
    /// Everything else is owned by the kernel and hardware.
    pub const USER_MASK: PteFlags = PteFlags::from_bits_truncate(
        PteFlags::P.bits()
            | PteFlags::RW.bits()
            | PteFlags::US.bits()
            | PteFlags::AVAIL_0.bits()
            | PteFlags::AVAIL_1.bits()
            | PteFlags::COW.bits(),
    );
}

/// One page-table entry, at any level of the hierarchy.
///
/// An entry packs a frame address with the [`PteFlags`] bits. The view
/// hands these out by value; modifying one has no effect on the real
/// table, which is only reachable through system calls.
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct Pte(pub usize);

impl Pte {
    /// An entry with no translation at all.
    pub const NONE: Pte = Pte(0);

    /// Compose an entry from a frame address and flags.
    ///
    /// Only the page-aligned part of `pa` is used.
    #[inline]
    pub const fn compose(pa: Pa, flags: PteFlags) -> Self {
        Pte(pa.page_down().into_usize() | flags.bits())
    }

    /// Get the flags associated with this entry.
    #[inline]
    pub const fn flags(&self) -> PteFlags {
        PteFlags::from_bits_truncate(self.0)
    }

    /// Get the physical address pointed to by this entry.
    ///
    /// # Returns
    /// - `Some(Pa)` if the entry is present, containing the frame address.
    /// - `None` if the entry is not present.
    #[inline]
    pub const fn pa(&self) -> Option<Pa> {
        if self.flags().contains(PteFlags::P) {
            Pa::new(self.0 & !PteFlags::all().bits())
        } else {
            None
        }
    }

    /// Whether the entry holds a valid translation.
    #[inline]
    pub const fn is_present(&self) -> bool {
        self.flags().contains(PteFlags::P)
    }

    /// Whether hardware permits writes through this entry.
    #[inline]
    pub const fn is_writable(&self) -> bool {
        self.flags().contains(PteFlags::RW)
    }

    /// Whether user-mode access is permitted through this entry.
    #[inline]
    pub const fn is_user(&self) -> bool {
        self.flags().contains(PteFlags::US)
    }

    /// Whether the page is marked copy-on-write.
    #[inline]
    pub const fn is_cow(&self) -> bool {
        self.flags().contains(PteFlags::COW)
    }
}

impl core::fmt::Debug for Pte {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if let Some(pa) = self.pa() {
            write!(f, "Pte({:?}, {:?})", pa, self.flags())
        } else {
            write!(f, "Pte(.)")
        }
    }
}

/// Flat per-level view indices for a given virtual address.
///
/// Each field is the index of the entry governing the address at that
/// level, in the flat array the self-mapped view presents for the level.
/// The page-offset bits of the address do not participate; two addresses
/// in the same page decompose identically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PtIndices {
    /// Index into the top-level (PML4) view array.
    pub pml4e: usize,
    /// Index into the second-level (PDPT) view array.
    pub pdpe: usize,
    /// Index into the third-level (PD) view array.
    pub pde: usize,
    /// Index into the leaf (PT) view array; equal to the page number.
    pub pte: usize,
}

impl PtIndices {
    /// Decompose a virtual address into its per-level view indices.
    #[inline]
    pub const fn of(va: Va) -> Self {
        let addr = va.into_usize();
        Self {
            pml4e: addr >> 39,
            pdpe: addr >> 30,
            pde: addr >> 21,
            pte: addr >> PAGE_SHIFT,
        }
    }
}

/// The read-only, self-mapped view of the calling environment's own
/// 4-level page table.
///
/// Each method returns the entry at a flat per-level index (see
/// [`PtIndices`]) by value. An index beyond the range the kernel exposes
/// yields [`Pte::NONE`]. Reading an entry at one level is only meaningful
/// when every entry above it is present; [`MappingView::lookup`] performs
/// that top-down check.
pub trait MappingView {
    /// The top-level entry at flat index `index`.
    fn pml4e(&self, index: usize) -> Pte;

    /// The second-level entry at flat index `index`.
    fn pdpe(&self, index: usize) -> Pte;

    /// The third-level entry at flat index `index`.
    fn pde(&self, index: usize) -> Pte;

    /// The leaf entry at flat index `index` (the page number).
    fn pte(&self, index: usize) -> Pte;

    /// Resolve the leaf entry governing `va`, walking every level from
    /// the top.
    ///
    /// # Returns
    /// - The leaf [`Pte`] if all four levels are present.
    /// - [`Pte::NONE`] as soon as any level reports an absent entry.
    fn lookup(&self, va: Va) -> Pte {
        let ix = PtIndices::of(va);
        if !self.pml4e(ix.pml4e).is_present()
            || !self.pdpe(ix.pdpe).is_present()
            || !self.pde(ix.pde).is_present()
        {
            return Pte::NONE;
        }
        self.pte(ix.pte)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addressing::PAGE_SIZE;
    use crate::layout::{PDE_SPAN, PDPE_SPAN, PML4E_SPAN, UTEXT};

    #[test]
    fn index_decomposition() {
        let ix = PtIndices::of(UTEXT);
        assert_eq!(ix.pml4e, 0);
        assert_eq!(ix.pdpe, 0);
        assert_eq!(ix.pde, UTEXT.into_usize() / PDE_SPAN);
        assert_eq!(ix.pte, UTEXT.into_usize() / PAGE_SIZE);

        // One step across each span bumps exactly that level's index.
        let va = Va::new(PML4E_SPAN + PDPE_SPAN + PDE_SPAN + PAGE_SIZE).unwrap();
        let ix = PtIndices::of(va);
        assert_eq!(ix.pml4e, 1);
        assert_eq!(ix.pdpe, (PML4E_SPAN + PDPE_SPAN) / PDPE_SPAN);
        assert_eq!(ix.pde, (PML4E_SPAN + PDPE_SPAN + PDE_SPAN) / PDE_SPAN);
        assert_eq!(ix.pte, va.into_usize() / PAGE_SIZE);
    }

    #[test]
    fn offset_bits_do_not_matter() {
        let a = Va::new(0x80_0000).unwrap();
        let b = Va::new(0x80_0abc).unwrap();
        assert_eq!(PtIndices::of(a), PtIndices::of(b));
    }

    #[test]
    fn entry_composition() {
        let pa = Pa::new(0x1234_5000).unwrap();
        let pte = Pte::compose(pa, PteFlags::P | PteFlags::US | PteFlags::COW);
        assert_eq!(pte.pa(), Some(pa));
        assert!(pte.is_present() && pte.is_user() && pte.is_cow());
        assert!(!pte.is_writable());
        assert_eq!(Pte::NONE.pa(), None);
    }
}
