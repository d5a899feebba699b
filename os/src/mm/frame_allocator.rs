//! Implementation of [`FrameAllocator`] which
//! controls all the frames in the operating system.
//!
//! After boot every frame is described by one [`CoremapEntry`]. Requests for
//! `n` pages are satisfied first-fit by a linear scan for `n` contiguous free
//! entries; the first entry of the run remembers `n` so the whole run can be
//! released from its base address alone.

use super::{PhysAddr, PhysicalMemory, VirtAddr};
use crate::config::PAGE_SIZE;
use log::{debug, warn};
use std::sync::Arc;

/// Per-frame bookkeeping.
///
/// For an allocation spanning pages `[i, i + n)`, page `i` has
/// `run_length == n`; every page of the run is `used`. All other pages are
/// unused with a zero run length.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct CoremapEntry {
    pub used: bool,
    pub run_length: u32,
}

/// The table of [`CoremapEntry`]s, one per allocable frame.
///
/// It occupies `[start, mem_begin)` of physical memory, which is therefore
/// never handed out.
pub struct Coremap {
    entries: Vec<CoremapEntry>,
    /// address of the first coremap entry
    start: PhysAddr,
    /// address of the first allocable frame - page aligned
    mem_begin: PhysAddr,
}

impl Coremap {
    fn empty() -> Self {
        Self {
            entries: Vec::new(),
            start: PhysAddr(0),
            mem_begin: PhysAddr(0),
        }
    }

    /// Lay the coremap out over `[first, last)`: the entries at the bottom,
    /// every whole page after them allocable.
    fn new(first: PhysAddr, last: PhysAddr) -> Self {
        assert!(last > first, "no memory left for the coremap");
        let pages_including_cm = (last.0 - first.0) as usize / PAGE_SIZE;
        let cm_bytes = pages_including_cm * core::mem::size_of::<CoremapEntry>();
        let mem_begin = (first.0 as usize + cm_bytes + PAGE_SIZE - 1) / PAGE_SIZE * PAGE_SIZE;
        assert!(mem_begin < last.0 as usize, "coremap leaves no allocable memory");
        let length = (last.0 as usize - mem_begin) / PAGE_SIZE;
        Self {
            entries: vec![CoremapEntry::default(); length],
            start: first,
            mem_begin: PhysAddr(mem_begin as u32),
        }
    }

    /// Number of frames described.
    fn len(&self) -> usize {
        self.entries.len()
    }

    /// Given a physical address, return the corresponding coremap index.
    ///
    /// # Panic
    ///
    /// If the address is not a frame inside the allocable range.
    fn index_of(&self, pa: PhysAddr) -> usize {
        assert!(pa >= self.mem_begin, "{:?} lies below the allocable memory", pa);
        assert!(pa.aligned(), "{:?} is not frame aligned", pa);
        let idx = (pa.0 - self.mem_begin.0) as usize / PAGE_SIZE;
        assert!(idx < self.entries.len(), "{:?} lies beyond the coremap", pa);
        idx
    }

    fn address_of(&self, idx: usize) -> PhysAddr {
        self.mem_begin.add(idx * PAGE_SIZE)
    }

    /// Returns true if a block of `n` pages is available starting with `start_idx`.
    fn run_is_free(&self, start_idx: usize, n: usize) -> bool {
        if start_idx + n > self.entries.len() {
            // the block goes out of bounds
            return false;
        }
        self.entries[start_idx..start_idx + n].iter().all(|e| !e.used)
    }

    /// Sets the `n` entries starting at `start_idx` to used and records `n` on the first.
    fn mark_run(&mut self, start_idx: usize, n: usize) {
        assert!(n > 0);
        assert!(start_idx + n <= self.entries.len());
        self.entries[start_idx].run_length = n as u32;
        for entry in &mut self.entries[start_idx..start_idx + n] {
            entry.used = true;
        }
    }

    /// First fit: the lowest index that starts `n` free entries.
    fn alloc(&mut self, n: usize) -> Option<PhysAddr> {
        let start_idx = (0..self.entries.len()).find(|&idx| self.run_is_free(idx, n))?;
        self.mark_run(start_idx, n);
        Some(self.address_of(start_idx))
    }

    /// Release the run starting at `pa`; returns how many pages were freed.
    ///
    /// A page with a zero run length (already free) is left alone.
    fn dealloc(&mut self, pa: PhysAddr) -> usize {
        let begin_idx = self.index_of(pa);
        let run_length = self.entries[begin_idx].run_length as usize;
        if run_length == 0 {
            return 0;
        }
        assert!(begin_idx + run_length <= self.entries.len());
        for entry in &mut self.entries[begin_idx..begin_idx + run_length] {
            assert!(entry.used, "frame inside a run of {:?} is not in use", pa);
            entry.used = false;
            entry.run_length = 0;
        }
        run_length
    }
}

struct AllocatorInner {
    vm_booted: bool,
    coremap: Coremap,
}

/// Physical page allocator.
///
/// Before [`FrameAllocator::bootstrap`] pages are stolen from RAM and never
/// returned; afterwards the coremap is authoritative. One spin lock covers
/// both paths and the whole search-and-mark (or clear) sequence.
pub struct FrameAllocator {
    ram: Arc<PhysicalMemory>,
    inner: spin::Mutex<AllocatorInner>,
}

impl FrameAllocator {
    pub fn new(ram: Arc<PhysicalMemory>) -> Self {
        Self {
            ram,
            inner: spin::Mutex::new(AllocatorInner {
                vm_booted: false,
                coremap: Coremap::empty(),
            }),
        }
    }

    /// Take over all memory not stolen so far and switch to the coremap.
    ///
    /// # Panic
    ///
    /// If called twice.
    pub fn bootstrap(&self) {
        let mut inner = self.inner.lock();
        assert!(!inner.vm_booted, "vm_bootstrap called twice");
        let (first, last) = self.ram.getsize();
        inner.coremap = Coremap::new(first, last);
        inner.vm_booted = true;
        debug!(
            "coremap: {} entries at {:?}, allocable memory from {:?}",
            inner.coremap.len(),
            inner.coremap.start,
            inner.coremap.mem_begin
        );
    }

    /// Whether the coremap has taken over.
    pub fn is_booted(&self) -> bool {
        self.inner.lock().vm_booted
    }

    /// The RAM this allocator hands out.
    pub fn ram(&self) -> &Arc<PhysicalMemory> {
        &self.ram
    }

    /// Reserve `npages` contiguous frames and return the first one's address.
    ///
    /// `None` means no run of `npages` free frames exists (or `npages == 0`);
    /// the coremap is left unchanged in that case.
    pub fn alloc_ppages(&self, npages: usize) -> Option<PhysAddr> {
        if npages == 0 {
            return None;
        }
        let mut inner = self.inner.lock();
        let pa = if inner.vm_booted {
            inner.coremap.alloc(npages)
        } else {
            self.ram.stealmem(npages)
        };
        match pa {
            Some(pa) => debug!("allocated {} pages at {:?}", npages, pa),
            None => debug!("no run of {} free pages", npages),
        }
        pa
    }

    /// Release the run that starts at `pa`.
    ///
    /// Precondition: `pa` is frame aligned and is the base address returned
    /// by an earlier [`FrameAllocator::alloc_ppages`]. An address in the middle
    /// of a run carries no run length and is ignored like an already-free
    /// page, so freeing twice is a no-op. The zero address is a no-op too.
    pub fn free_ppages(&self, pa: PhysAddr) {
        if pa.0 == 0 {
            return;
        }
        let mut inner = self.inner.lock();
        if !inner.vm_booted {
            warn!("{:?} was stolen before boot and is never freed", pa);
            return;
        }
        match inner.coremap.dealloc(pa) {
            0 => debug!("free of {:?}: no run starts here", pa),
            n => debug!("freed {} pages at {:?}", n, pa),
        }
    }

    /// Allocate kernel-space pages; the result is a KSEG0 address.
    pub fn alloc_kpages(&self, npages: usize) -> Option<VirtAddr> {
        self.alloc_ppages(npages).map(|pa| pa.to_kvaddr())
    }

    /// Free kernel-space pages obtained from [`FrameAllocator::alloc_kpages`].
    pub fn free_kpages(&self, addr: VirtAddr) {
        if addr.0 == 0 {
            return;
        }
        self.free_ppages(addr.kvaddr_to_paddr());
    }

    /// Number of frames under coremap control (0 before boot).
    pub fn total_pages(&self) -> usize {
        self.inner.lock().coremap.len()
    }

    /// Number of frames currently marked used.
    pub fn used_pages(&self) -> usize {
        let inner = self.inner.lock();
        inner.coremap.entries.iter().filter(|e| e.used).count()
    }

    /// Number of frames currently free.
    pub fn free_pages(&self) -> usize {
        let inner = self.inner.lock();
        inner.coremap.entries.iter().filter(|e| !e.used).count()
    }

    /// Address of the first allocable frame (0 before boot).
    pub fn mem_begin(&self) -> PhysAddr {
        self.inner.lock().coremap.mem_begin
    }

    /// Copy of every coremap entry, lowest frame first.
    pub fn snapshot(&self) -> Vec<CoremapEntry> {
        self.inner.lock().coremap.entries.clone()
    }
}
