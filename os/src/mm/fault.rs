//! TLB miss handling.

use super::{with_local_tlb, AddressSpace, RegionKind, Tlb, TlbEntry, TlbLo, VirtAddr};
use crate::error::Errno;
use crate::sync::UPIntrFreeCell;
use crate::task::current_process;
use log::debug;

/// Why the hardware trapped.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FaultType {
    /// A read was attempted
    Read,
    /// A write was attempted
    Write,
    /// A write to a page without the dirty bit
    ReadOnly,
}

impl TryFrom<i32> for FaultType {
    type Error = Errno;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(FaultType::Read),
            1 => Ok(FaultType::Write),
            2 => Ok(FaultType::ReadOnly),
            _ => Err(Errno::EINVAL),
        }
    }
}

/// Resolve a fault of the current process on this processor.
pub fn vm_fault(fault_type: FaultType, fault_address: VirtAddr) -> Result<(), Errno> {
    let process = current_process();
    let inner = process.as_ref().map(|p| p.inner_exclusive_access());
    let space = inner.as_ref().and_then(|inner| inner.address_space.as_ref());
    with_local_tlb(|tlb| handle_fault(fault_type, fault_address, space, tlb))
}

/// Map the page of `fault_address` into `tlb`.
///
/// - read-only faults are never repaired: `EROFS`;
/// - no address space (a kernel fault early in boot): `EFAULT`;
/// - an address outside both regions and the stack: `EFAULT`.
///
/// Pages of the first region stay clean until the program image is loaded.
pub fn handle_fault(
    fault_type: FaultType,
    fault_address: VirtAddr,
    space: Option<&AddressSpace>,
    tlb: &UPIntrFreeCell<Tlb>,
) -> Result<(), Errno> {
    let fault_address = fault_address.floor();
    debug!("dumbvm: fault: {:?} {:?}", fault_type, fault_address);

    if fault_type == FaultType::ReadOnly {
        return Err(Errno::EROFS);
    }
    let space = space.ok_or(Errno::EFAULT)?;
    let (kind, paddr) = space.lookup(fault_address).ok_or(Errno::EFAULT)?;
    assert!(paddr.aligned());

    let mut flags = TlbLo::VALID | TlbLo::DIRTY;
    if kind == RegionKind::First && !space.is_load_completed() {
        flags.remove(TlbLo::DIRTY);
    }
    let entry = TlbEntry::new(fault_address, paddr, flags);
    // interrupts stay off while the slot is chosen and written
    let slot = tlb.exclusive_access().install(entry);
    debug!("dumbvm: {:?} -> {:?} in slot {}", fault_address, paddr, slot);
    Ok(())
}
