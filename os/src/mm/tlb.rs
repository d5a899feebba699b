//! ## Translation lookaside buffer of one processor
//!
//! A software-managed, fully associative cache of `NUM_TLB` entries. Each
//! entry is a pair of words:
//!
//! | word |31--------------12|11-----------0|
//! |------|------------------|--------------|
//! | hi   | virtual page     | (ASID, unused)|
//! | lo   | physical frame   | flags        |
//!
//! Every host thread owns one [`Tlb`]; misses are resolved by
//! [`crate::mm::vm_fault`], which programs it through [`Tlb::install`].

use super::{PhysAddr, VirtAddr};
use crate::config::{NUM_TLB, PAGE_FRAME};
use crate::sync::{interrupts_enabled, UPIntrFreeCell};
use bitflags::*;
use rand::Rng;

bitflags! {
    /// Flag bits in the low word of a TLB entry.
    pub struct TlbLo: u32 {
        /// Global: the entry matches every address space.
        const GLOBAL = 0x100;
        /// Valid:
        /// - An entry participates in translation only if this bit is 1.
        const VALID = 0x200;
        /// Dirty:
        /// - Writes are allowed only if this bit is 1; otherwise a store
        ///   raises a read-only (modify) fault.
        const DIRTY = 0x400;
        /// Uncached access.
        const NOCACHE = 0x800;
    }
}

/// One (hi, lo) pair.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TlbEntry {
    pub hi: u32,
    pub lo: u32,
}

impl TlbEntry {
    /// Entry that can never match: each slot gets a distinct kernel page so
    /// no two invalid entries collide.
    pub fn invalid(slot: usize) -> Self {
        Self {
            hi: ((0x80000 + slot) << 12) as u32,
            lo: 0,
        }
    }

    /// Entry mapping the page of `vaddr` onto the frame of `paddr`.
    pub fn new(vaddr: VirtAddr, paddr: PhysAddr, flags: TlbLo) -> Self {
        Self {
            hi: vaddr.0 & PAGE_FRAME,
            lo: (paddr.0 & PAGE_FRAME) | flags.bits(),
        }
    }

    pub fn flags(&self) -> TlbLo {
        TlbLo::from_bits_truncate(self.lo)
    }

    /// true if `VALID` is set.
    pub fn is_valid(&self) -> bool {
        self.flags().contains(TlbLo::VALID)
    }

    /// true if `DIRTY` (write permission) is set.
    pub fn is_dirty(&self) -> bool {
        self.flags().contains(TlbLo::DIRTY)
    }

    pub fn vpage(&self) -> VirtAddr {
        VirtAddr(self.hi & PAGE_FRAME)
    }

    pub fn frame(&self) -> PhysAddr {
        PhysAddr(self.lo & PAGE_FRAME)
    }
}

/// The entries of one processor's TLB.
pub struct Tlb {
    entries: [TlbEntry; NUM_TLB],
}

impl Default for Tlb {
    fn default() -> Self {
        Self::new()
    }
}

impl Tlb {
    /// A TLB with every slot invalid.
    pub fn new() -> Self {
        let mut entries = [TlbEntry::invalid(0); NUM_TLB];
        for (slot, entry) in entries.iter_mut().enumerate() {
            *entry = TlbEntry::invalid(slot);
        }
        Self { entries }
    }

    /// `tlb_read`
    pub fn read(&self, slot: usize) -> TlbEntry {
        self.entries[slot]
    }

    /// `tlb_write`: overwrite one slot.
    ///
    /// # Panic
    ///
    /// If interrupts are enabled on this processor.
    pub fn write(&mut self, entry: TlbEntry, slot: usize) {
        assert!(!interrupts_enabled(), "tlb written with interrupts on");
        self.entries[slot] = entry;
    }

    /// `tlb_random`: overwrite a slot chosen uniformly at random and return it.
    pub fn random(&mut self, entry: TlbEntry) -> usize {
        let slot = rand::thread_rng().gen_range(0..NUM_TLB);
        self.write(entry, slot);
        slot
    }

    /// `tlb_probe`: slot of the valid entry whose page matches `vaddr`.
    pub fn probe(&self, vaddr: VirtAddr) -> Option<usize> {
        let page = vaddr.0 & PAGE_FRAME;
        self.entries
            .iter()
            .position(|e| e.is_valid() && e.hi == page)
    }

    /// Put `entry` in the first invalid slot, or a random one if all are
    /// valid. Returns the slot used.
    pub fn install(&mut self, entry: TlbEntry) -> usize {
        match self.entries.iter().position(|e| !e.is_valid()) {
            Some(slot) => {
                self.write(entry, slot);
                slot
            }
            None => self.random(entry),
        }
    }

    /// Invalidate every slot.
    pub fn invalidate_all(&mut self) {
        for slot in 0..NUM_TLB {
            self.write(TlbEntry::invalid(slot), slot);
        }
    }

    /// Number of valid entries.
    pub fn valid_entries(&self) -> usize {
        self.entries.iter().filter(|e| e.is_valid()).count()
    }

    /// Simulated address translation: the physical address `vaddr` maps to,
    /// if a valid entry covers it and allows the access.
    pub fn translate(&self, vaddr: VirtAddr, write: bool) -> Option<PhysAddr> {
        let entry = self.entries[self.probe(vaddr)?];
        if write && !entry.is_dirty() {
            return None;
        }
        Some(entry.frame().add(vaddr.page_offset()))
    }
}

thread_local! {
    static LOCAL_TLB: UPIntrFreeCell<Tlb> = UPIntrFreeCell::new(Tlb::new());
}

/// Run `f` with this processor's TLB.
pub fn with_local_tlb<F, V>(f: F) -> V
where
    F: FnOnce(&UPIntrFreeCell<Tlb>) -> V,
{
    LOCAL_TLB.with(f)
}

/// A request to invalidate TLB entries on another processor.
#[derive(Copy, Clone, Debug)]
pub struct TlbShootdown {
    pub vaddr: VirtAddr,
}

/// dumbvm keeps no shared mappings, so a shootdown request means something
/// is badly wrong.
pub fn vm_tlbshootdown(ts: &TlbShootdown) -> ! {
    panic!("dumbvm tried to do tlb shootdown?! ({:?})", ts.vaddr);
}

/// See [`vm_tlbshootdown`].
pub fn vm_tlbshootdown_all() -> ! {
    panic!("dumbvm tried to do tlb shootdown?!");
}
