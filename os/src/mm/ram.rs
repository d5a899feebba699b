//! Physical RAM of the simulated machine.
//!
//! Before the VM system boots, memory is handed out by simply advancing the
//! first free address (`stealmem`). Once the coremap takes over,
//! [`PhysicalMemory::getsize`] reports what is left and disables stealing.

use super::PhysAddr;
use crate::config::{MachineConfig, PAGE_SIZE};
use parking_lot::Mutex;

/// Byte store for every physical frame plus the early-boot bounds.
pub struct PhysicalMemory {
    bytes: Mutex<Vec<u8>>,
    bounds: spin::Mutex<RamBounds>,
}

/// `[first_free, last)` is memory nobody owns yet.
#[derive(Copy, Clone, Debug)]
struct RamBounds {
    first_free: u32,
    last: u32,
}

impl PhysicalMemory {
    /// Create RAM of `config.ram_size` bytes (rounded down to whole pages) with
    /// the kernel image occupying the bottom `config.kernel_reserved` bytes.
    ///
    /// # Panic
    ///
    /// If the kernel image does not fit, or RAM exceeds the 32-bit physical
    /// address space below KSEG0.
    pub fn new(config: &MachineConfig) -> Self {
        let size = config.ram_size / PAGE_SIZE * PAGE_SIZE;
        let first_free = (config.kernel_reserved + PAGE_SIZE - 1) / PAGE_SIZE * PAGE_SIZE;
        assert!(first_free < size, "kernel image does not fit in RAM");
        assert!(size <= 0x8000_0000, "RAM larger than KSEG0");
        Self {
            bytes: Mutex::new(vec![0; size]),
            bounds: spin::Mutex::new(RamBounds {
                first_free: first_free as u32,
                last: size as u32,
            }),
        }
    }

    /// Take `npages` pages from the un-partitioned part of RAM.
    ///
    /// Stolen memory is never given back.
    pub fn stealmem(&self, npages: usize) -> Option<PhysAddr> {
        let mut bounds = self.bounds.lock();
        let size = npages.checked_mul(PAGE_SIZE)?;
        let end = bounds.first_free as usize + size;
        if end > bounds.last as usize {
            return None;
        }
        let pa = PhysAddr(bounds.first_free);
        bounds.first_free = end as u32;
        Some(pa)
    }

    /// Report `[first_free, last)` and hand all of it over to the caller.
    ///
    /// Afterwards [`PhysicalMemory::stealmem`] always fails.
    pub fn getsize(&self) -> (PhysAddr, PhysAddr) {
        let mut bounds = self.bounds.lock();
        let range = (PhysAddr(bounds.first_free), PhysAddr(bounds.last));
        bounds.first_free = 0;
        bounds.last = 0;
        range
    }

    /// Copy `buf.len()` bytes starting at `pa` into `buf`.
    pub fn read(&self, pa: PhysAddr, buf: &mut [u8]) {
        let bytes = self.bytes.lock();
        let start = checked_range(&bytes, pa, buf.len());
        buf.copy_from_slice(&bytes[start..start + buf.len()]);
    }

    /// Copy `data` into RAM starting at `pa`.
    pub fn write(&self, pa: PhysAddr, data: &[u8]) {
        let mut bytes = self.bytes.lock();
        let start = checked_range(&bytes, pa, data.len());
        bytes[start..start + data.len()].copy_from_slice(data);
    }

    /// Zero `len` bytes starting at `pa`.
    pub fn zero(&self, pa: PhysAddr, len: usize) {
        let mut bytes = self.bytes.lock();
        let start = checked_range(&bytes, pa, len);
        bytes[start..start + len].fill(0);
    }

    /// Copy `len` bytes from `src` to `dst`; the ranges may overlap.
    pub fn copy(&self, dst: PhysAddr, src: PhysAddr, len: usize) {
        let mut bytes = self.bytes.lock();
        let from = checked_range(&bytes, src, len);
        let to = checked_range(&bytes, dst, len);
        bytes.copy_within(from..from + len, to);
    }
}

/// Start offset of `[pa, pa + len)`, which must lie inside RAM.
fn checked_range(bytes: &[u8], pa: PhysAddr, len: usize) -> usize {
    let start = pa.0 as usize;
    assert!(
        start.checked_add(len).map_or(false, |end| end <= bytes.len()),
        "physical access {:?}+{:#x} beyond end of RAM",
        pa,
        len
    );
    start
}
