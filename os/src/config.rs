//! Constants and machine configuration used in dumbvm

/// 4096byte == 4KiB
pub const PAGE_SIZE: usize = 0x1000;
/// Mask selecting the page frame part of a 32-bit address.
pub const PAGE_FRAME: u32 = 0xffff_f000;

/// Under dumbvm every process always has 48KiB of user stack.
pub const DUMBVM_STACKPAGES: usize = 12;

/// Top of user space; the user stack grows down from here.
pub const USERSTACK: u32 = 0x8000_0000;
/// Base of the direct-mapped, cached kernel segment.
///
/// `kvaddr == paddr + MIPS_KSEG0` for every physical address.
pub const MIPS_KSEG0: u32 = 0x8000_0000;

/// Number of entries in each processor's translation lookaside buffer.
pub const NUM_TLB: usize = 64;

/// Smallest pid handed out to a user process.
pub const PID_MIN: usize = 2;
/// Largest pid handed out to a user process.
pub const PID_MAX: usize = 32767;

/// Upper bound on the total size of `execv` arguments (strings and pointers).
pub const ARG_MAX: usize = 64 * 1024;
/// Upper bound on the length of a program path passed to `execv`.
pub const PATH_MAX: usize = 1024;

/// 0x10_0000byte == 1MiB
pub const DEFAULT_RAM_SIZE: usize = 0x10_0000;
/// Bytes at the bottom of RAM occupied by the kernel image (16KiB).
pub const DEFAULT_KERNEL_RESERVED: usize = 0x4000;

/// Shape of the simulated machine.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MachineConfig {
    /// Size of physical RAM in bytes; rounded down to whole pages.
    pub ram_size: usize,
    /// Bytes at the bottom of RAM that belong to the kernel image and are
    /// never handed to the allocator.
    pub kernel_reserved: usize,
}

impl MachineConfig {
    /// A machine with `pages` pages of RAM and the default kernel image size.
    pub fn with_ram_pages(pages: usize) -> Self {
        Self {
            ram_size: pages * PAGE_SIZE,
            ..Self::default()
        }
    }
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            ram_size: DEFAULT_RAM_SIZE,
            kernel_reserved: DEFAULT_KERNEL_RESERVED,
        }
    }
}
