//! Implementation of physical and virtual addresses.
//!
//! The machine is a 32-bit MIPS: every address fits a `u32`.

use crate::config::{MIPS_KSEG0, PAGE_FRAME};
use core::fmt::{self, Debug, Formatter};

/// # Physical address(32bit)
///
/// | BitNum  |31----------------12|11---------0|
/// |---------|--------------------|------------|
/// | Meaning | PhysicalPageNumber | PageOffset |
/// |  Width  |         20         |     12     |
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Default)]
pub struct PhysAddr(pub u32);

/// # Virtual address(32bit)
///
/// User addresses live below [`MIPS_KSEG0`]; kernel addresses at or above it
/// are direct-mapped onto physical memory.
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Default)]
pub struct VirtAddr(pub u32);

/// Debugging

impl Debug for VirtAddr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("VA:{:#x}", self.0))
    }
}

impl Debug for PhysAddr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("PA:{:#x}", self.0))
    }
}

/// T: {PhysAddr, VirtAddr}
/// T -> u32: T.0
/// u32 -> T: u32.into()

impl From<u32> for PhysAddr {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

impl From<u32> for VirtAddr {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

impl From<PhysAddr> for u32 {
    fn from(v: PhysAddr) -> Self {
        v.0
    }
}

impl From<VirtAddr> for u32 {
    fn from(v: VirtAddr) -> Self {
        v.0
    }
}

impl VirtAddr {
    /// Truncate to the start of the page containing this address.
    pub fn floor(&self) -> VirtAddr {
        VirtAddr(self.0 & PAGE_FRAME)
    }

    /// Only the offset(12 bits) is taken from the virtual address and returned.
    pub fn page_offset(&self) -> usize {
        (self.0 & !PAGE_FRAME) as usize
    }

    /// Is the virtual address aligned to a multiple of PAGE_SIZE?
    pub fn aligned(&self) -> bool {
        self.page_offset() == 0
    }

    /// The address `bytes` further up.
    pub fn add(&self, bytes: usize) -> VirtAddr {
        VirtAddr(self.0.wrapping_add(bytes as u32))
    }

    /// The address `bytes` further down.
    pub fn sub(&self, bytes: usize) -> VirtAddr {
        VirtAddr(self.0.wrapping_sub(bytes as u32))
    }

    /// Whether this is a direct-mapped kernel address.
    pub fn is_kernel(&self) -> bool {
        self.0 >= MIPS_KSEG0
    }

    /// Undo [`PhysAddr::to_kvaddr`].
    ///
    /// # Panic
    ///
    /// If the address is not a kernel address.
    pub fn kvaddr_to_paddr(&self) -> PhysAddr {
        assert!(self.is_kernel(), "{:?} is not a kernel address", self);
        PhysAddr(self.0 - MIPS_KSEG0)
    }
}

impl PhysAddr {
    /// Only the offset(12 bits) is taken from the physical address and returned.
    pub fn page_offset(&self) -> usize {
        (self.0 & !PAGE_FRAME) as usize
    }

    /// Is the Physical Address aligned to a multiple of PAGE_SIZE (default: 4096)?
    pub fn aligned(&self) -> bool {
        self.page_offset() == 0
    }

    /// The address `bytes` further up.
    pub fn add(&self, bytes: usize) -> PhysAddr {
        PhysAddr(self.0 + bytes as u32)
    }

    /// Kernel virtual address through which this physical address is reached
    /// (`PADDR_TO_KVADDR`).
    pub fn to_kvaddr(&self) -> VirtAddr {
        VirtAddr(self.0 + MIPS_KSEG0)
    }
}
