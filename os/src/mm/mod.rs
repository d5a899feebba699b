//! Memory management implementation
//!
//! The "dumb" VM layer of a MIPS-like machine: a coremap frame allocator
//! over physical RAM, per-process address spaces of two regions plus a
//! fixed stack, and a TLB miss handler that maps faults by offset into
//! those regions.
//!
//! Every process has an [`AddressSpace`]; every processor has a [`Tlb`].

mod address;
mod address_space;
mod fault;
mod frame_allocator;
mod ram;
mod tlb;

#[cfg(test)]
mod tests_prop;

pub use address::{PhysAddr, VirtAddr};
pub use address_space::{AddressSpace, MapPermission, Region, RegionKind, STACK_BASE};
pub use fault::{handle_fault, vm_fault, FaultType};
pub use frame_allocator::{CoremapEntry, FrameAllocator};
pub use ram::PhysicalMemory;
pub use tlb::{
    vm_tlbshootdown, vm_tlbshootdown_all, with_local_tlb, Tlb, TlbEntry, TlbLo, TlbShootdown,
};
