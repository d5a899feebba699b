//! Implementation of [`Region`] and [`AddressSpace`].
//!
//! A dumbvm address space is at most two general regions plus a fixed
//! 12-page stack ending at [`USERSTACK`]. Each region is physically
//! contiguous, so a virtual address translates by plain offset arithmetic
//! and no page table is needed.

use super::{with_local_tlb, FrameAllocator, PhysAddr, PhysicalMemory, VirtAddr};
use crate::config::{DUMBVM_STACKPAGES, PAGE_SIZE, USERSTACK};
use crate::error::Errno;
use bitflags::*;
use log::{debug, warn};

bitflags! {
    /// Access requested for a region.
    ///
    /// Recorded for information only: every page is mapped read-write.
    pub struct MapPermission: u8 {
        /// Readable
        const R = 1 << 1;
        /// Writable
        const W = 1 << 2;
        /// eXecutable
        const X = 1 << 3;
    }
}

/// Lowest address of the user stack.
pub const STACK_BASE: u32 = USERSTACK - (DUMBVM_STACKPAGES * PAGE_SIZE) as u32;

/// Which window of an address space a virtual address falls in.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RegionKind {
    /// The first region defined (text, for a loaded program).
    First,
    /// The second region defined.
    Second,
    /// The fixed user stack.
    Stack,
}

/// A contiguous virtual span backed by contiguous physical frames.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Region {
    /// Page-aligned virtual base.
    pub vbase: VirtAddr,
    /// Physical base; `None` until [`AddressSpace::prepare_load`].
    pub pbase: Option<PhysAddr>,
    /// Length in pages.
    pub npages: usize,
    pub perm: MapPermission,
}

impl Region {
    /// One past the last virtual address of the region.
    pub fn vtop(&self) -> VirtAddr {
        self.vbase.add(self.npages * PAGE_SIZE)
    }

    pub fn contains(&self, va: VirtAddr) -> bool {
        va >= self.vbase && va < self.vtop()
    }
}

/// Per-process virtual memory.
///
/// Owns the frames of both regions and the stack once prepared; they go
/// back to the allocator only through [`AddressSpace::destroy`].
#[derive(Debug, Default)]
pub struct AddressSpace {
    regions: [Option<Region>; 2],
    stack_pbase: Option<PhysAddr>,
    load_completed: bool,
}

impl AddressSpace {
    /// Create an empty address space (`as_create`).
    pub fn new() -> Self {
        Self::default()
    }

    /// Set up a region of memory within the address space.
    ///
    /// The base is aligned down and the size up to whole pages. Only two
    /// regions are supported; a third yields `EUNIMP`. An empty region
    /// would own no frames and is rejected with `EINVAL`.
    pub fn define_region(
        &mut self,
        vaddr: VirtAddr,
        size: usize,
        perm: MapPermission,
    ) -> Result<(), Errno> {
        if size == 0 {
            warn!("dumbvm: empty region at {:?}", vaddr);
            return Err(Errno::EINVAL);
        }
        // Align the region. First, the base...
        let size = size + vaddr.page_offset();
        let vbase = vaddr.floor();
        // ...and now the length.
        let npages = (size + PAGE_SIZE - 1) / PAGE_SIZE;

        let slot = self
            .regions
            .iter_mut()
            .find(|r| r.is_none())
            .ok_or_else(|| {
                warn!("dumbvm: too many regions");
                Errno::EUNIMP
            })?;
        *slot = Some(Region {
            vbase,
            pbase: None,
            npages,
            perm,
        });
        debug!("dumbvm: region {:?} +{} pages ({:?})", vbase, npages, perm);
        Ok(())
    }

    /// Allocate and zero-fill the frames of every defined region and of the
    /// stack.
    ///
    /// On `ENOMEM` whatever was already allocated stays owned by the address
    /// space: the caller must [`AddressSpace::destroy`] it.
    ///
    /// # Panic
    ///
    /// If called on an address space that already has backing memory.
    pub fn prepare_load(&mut self, frames: &FrameAllocator) -> Result<(), Errno> {
        assert!(!self.is_backed(), "prepare_load on a backed address space");
        for region in self.regions.iter_mut().flatten() {
            let pbase = frames.alloc_ppages(region.npages).ok_or(Errno::ENOMEM)?;
            region.pbase = Some(pbase);
        }
        self.stack_pbase = Some(frames.alloc_ppages(DUMBVM_STACKPAGES).ok_or(Errno::ENOMEM)?);

        let ram = frames.ram();
        for region in self.regions.iter().flatten() {
            if let Some(pbase) = region.pbase {
                ram.zero(pbase, region.npages * PAGE_SIZE);
            }
        }
        if let Some(stack) = self.stack_pbase {
            ram.zero(stack, DUMBVM_STACKPAGES * PAGE_SIZE);
        }
        Ok(())
    }

    /// The program image has been copied in.
    pub fn complete_load(&mut self) {
        self.load_completed = true;
    }

    pub fn is_load_completed(&self) -> bool {
        self.load_completed
    }

    /// Make an independent copy: same geometry, fresh frames, same bytes.
    pub fn copy(&self, frames: &FrameAllocator) -> Result<AddressSpace, Errno> {
        let mut new = AddressSpace {
            regions: self.regions.map(|r| r.map(|r| Region { pbase: None, ..r })),
            stack_pbase: None,
            load_completed: self.load_completed,
        };
        if new.prepare_load(frames).is_err() {
            new.destroy(frames);
            return Err(Errno::ENOMEM);
        }

        let ram = frames.ram();
        for (old, new) in self.regions.iter().zip(new.regions.iter()) {
            if let (Some(old), Some(new)) = (old, new) {
                if let (Some(src), Some(dst)) = (old.pbase, new.pbase) {
                    ram.copy(dst, src, old.npages * PAGE_SIZE);
                }
            }
        }
        if let (Some(src), Some(dst)) = (self.stack_pbase, new.stack_pbase) {
            ram.copy(dst, src, DUMBVM_STACKPAGES * PAGE_SIZE);
        }
        Ok(new)
    }

    /// Return every frame to the allocator. Unbacked regions are skipped.
    pub fn destroy(mut self, frames: &FrameAllocator) {
        self.release(frames);
    }

    fn release(&mut self, frames: &FrameAllocator) {
        if let Some(stack) = self.stack_pbase.take() {
            frames.free_ppages(stack);
        }
        for region in self.regions.iter_mut().rev().flatten() {
            if let Some(pbase) = region.pbase.take() {
                frames.free_ppages(pbase);
            }
        }
    }

    /// Whether any frame is currently owned.
    pub fn is_backed(&self) -> bool {
        self.stack_pbase.is_some() || self.regions.iter().flatten().any(|r| r.pbase.is_some())
    }

    /// Flush this processor's TLB so no translation of a previous address
    /// space survives.
    pub fn activate(&self) {
        with_local_tlb(|tlb| tlb.exclusive_access().invalidate_all());
    }

    /// The general region in `kind` (`None` for the stack or an undefined region).
    pub fn region(&self, kind: RegionKind) -> Option<Region> {
        match kind {
            RegionKind::First => self.regions[0],
            RegionKind::Second => self.regions[1],
            RegionKind::Stack => None,
        }
    }

    pub fn stack_pbase(&self) -> Option<PhysAddr> {
        self.stack_pbase
    }

    /// Find the window holding `va` and the physical address it maps to.
    pub fn lookup(&self, va: VirtAddr) -> Option<(RegionKind, PhysAddr)> {
        let kinds = [RegionKind::First, RegionKind::Second];
        for (region, kind) in self.regions.iter().zip(kinds) {
            if let Some(region) = region.filter(|r| r.contains(va)) {
                return region
                    .pbase
                    .map(|pbase| (kind, pbase.add((va.0 - region.vbase.0) as usize)));
            }
        }
        if va.0 >= STACK_BASE && va.0 < USERSTACK {
            return self
                .stack_pbase
                .map(|pbase| (RegionKind::Stack, pbase.add((va.0 - STACK_BASE) as usize)));
        }
        None
    }

    /// Physical address of `va`, if mapped.
    pub fn translate(&self, va: VirtAddr) -> Option<PhysAddr> {
        self.lookup(va).map(|(_, pa)| pa)
    }

    /// Copy `data` into user memory at `va` (`copyout`).
    pub fn copy_out(&self, ram: &PhysicalMemory, va: VirtAddr, data: &[u8]) -> Result<(), Errno> {
        let mut done = 0;
        while done < data.len() {
            let cur = va.add(done);
            let pa = self.translate(cur).ok_or(Errno::EFAULT)?;
            let chunk = (PAGE_SIZE - cur.page_offset()).min(data.len() - done);
            ram.write(pa, &data[done..done + chunk]);
            done += chunk;
        }
        Ok(())
    }

    /// Fill `buf` from user memory at `va` (`copyin`).
    pub fn copy_in(&self, ram: &PhysicalMemory, va: VirtAddr, buf: &mut [u8]) -> Result<(), Errno> {
        let mut done = 0;
        while done < buf.len() {
            let cur = va.add(done);
            let pa = self.translate(cur).ok_or(Errno::EFAULT)?;
            let chunk = (PAGE_SIZE - cur.page_offset()).min(buf.len() - done);
            ram.read(pa, &mut buf[done..done + chunk]);
            done += chunk;
        }
        Ok(())
    }

    /// Read a NUL-terminated string of at most `max` bytes including the NUL
    /// (`copyinstr`).
    ///
    /// `E2BIG` if no NUL appears within `max` bytes.
    pub fn copy_in_str(
        &self,
        ram: &PhysicalMemory,
        va: VirtAddr,
        max: usize,
    ) -> Result<String, Errno> {
        let mut bytes = Vec::new();
        for i in 0..max {
            let mut b = [0u8];
            self.copy_in(ram, va.add(i), &mut b)?;
            if b[0] == 0 {
                return String::from_utf8(bytes).map_err(|_| Errno::EINVAL);
            }
            bytes.push(b[0]);
        }
        Err(Errno::E2BIG)
    }

    /// Store a big-endian 32-bit word.
    pub fn copy_out_word(
        &self,
        ram: &PhysicalMemory,
        va: VirtAddr,
        word: u32,
    ) -> Result<(), Errno> {
        self.copy_out(ram, va, &word.to_be_bytes())
    }

    /// Load a big-endian 32-bit word.
    pub fn copy_in_word(&self, ram: &PhysicalMemory, va: VirtAddr) -> Result<u32, Errno> {
        let mut word = [0u8; 4];
        self.copy_in(ram, va, &mut word)?;
        Ok(u32::from_be_bytes(word))
    }

    /// Lay out `args` at the top of the stack and return the initial stack
    /// pointer.
    ///
    /// The strings go first, each NUL terminated in a slot rounded up to 8
    /// bytes, the first argument highest. Below them sits the `argv` array
    /// of 4-byte pointers ending in a null pointer, so the returned stack
    /// pointer is also `argv`. With no arguments the stack top is returned.
    ///
    /// # Panic
    ///
    /// If the stack has no backing memory.
    pub fn define_stack(&self, ram: &PhysicalMemory, args: &[String]) -> Result<VirtAddr, Errno> {
        assert!(self.stack_pbase.is_some(), "define_stack before prepare_load");
        let mut sp = VirtAddr(USERSTACK);
        if args.is_empty() {
            return Ok(sp);
        }

        let mut locations = Vec::with_capacity(args.len() + 1);
        for arg in args {
            let argsize = arg.len() + 1;
            let slot = (argsize + 7) / 8 * 8;
            if slot > (sp.0 - STACK_BASE) as usize {
                return Err(Errno::EFAULT);
            }
            sp = sp.sub(slot);
            let mut bytes = Vec::with_capacity(argsize);
            bytes.extend_from_slice(arg.as_bytes());
            bytes.push(0);
            self.copy_out(ram, sp, &bytes)?;
            locations.push(sp.0);
        }
        locations.push(0);

        for location in locations.iter().rev() {
            if sp.0 - STACK_BASE < 4 {
                return Err(Errno::EFAULT);
            }
            sp = sp.sub(4);
            self.copy_out_word(ram, sp, *location)?;
        }
        Ok(sp)
    }
}

impl Drop for AddressSpace {
    fn drop(&mut self) {
        if self.is_backed() {
            warn!("address space dropped without destroy: its frames are leaked");
        }
    }
}
