//! Trap handling functionality
//!
//! User mode is simulated: a [`UserMode`] callback runs "user code" from a
//! [`TrapFrame`] and enters the kernel the way hardware would, through
//! [`crate::syscall::syscall`] for a `syscall` instruction and through
//! [`tlb_exception`] when a load or store misses the TLB. [`user_read`] and
//! [`user_write`] perform user loads and stores through the TLB of the
//! current processor, taking those exceptions as needed.
mod context;

pub use context::TrapFrame;

use crate::config::PAGE_SIZE;
use crate::error::Errno;
use crate::kernel::Kernel;
use crate::mm::{vm_fault, with_local_tlb, FaultType, PhysAddr, VirtAddr};
use crate::task::{clear_processor, current_kernel, set_current, ProcessControlBlock};
use log::{debug, warn};
use std::sync::Arc;

/// TLB modify exception: store to a page whose entry is not dirty.
pub const EX_MOD: u32 = 1;
/// TLB miss on a load or instruction fetch.
pub const EX_TLBL: u32 = 2;
/// TLB miss on a store.
pub const EX_TLBS: u32 = 3;

/// The code that runs in user mode.
///
/// `enter` starts at `tf.epc` and returns the process's exit code when it
/// returns without calling `_exit`.
pub trait UserMode: Send + Sync {
    fn enter(&self, tf: TrapFrame) -> i32;
}

impl<F> UserMode for F
where
    F: Fn(TrapFrame) -> i32 + Send + Sync,
{
    fn enter(&self, tf: TrapFrame) -> i32 {
        self(tf)
    }
}

/// First code run by the thread of a forked child: the child sees `fork`
/// return 0 and continues after the `syscall` instruction.
pub fn enter_forked_process(kernel: Arc<Kernel>, child: Arc<ProcessControlBlock>, tf: TrapFrame) {
    set_current(&kernel, child);
    let mut tf = tf;
    tf.v0 = 0;
    tf.a3 = 0;
    tf.advance();
    kernel.run_user(tf);
    clear_processor();
}

/// Handle a TLB exception raised at `vaddr`.
pub fn tlb_exception(code: u32, vaddr: VirtAddr) -> Result<(), Errno> {
    let fault_type = match code {
        EX_MOD => FaultType::ReadOnly,
        EX_TLBL => FaultType::Read,
        EX_TLBS => FaultType::Write,
        _ => return Err(Errno::EINVAL),
    };
    vm_fault(fault_type, vaddr).map_err(|e| {
        warn!("fatal user mode trap {} at {:?}: {}", code, vaddr, e);
        e
    })
}

/// Translate one user address the way the MMU does, faulting the page in
/// when the TLB misses.
fn user_translate(va: VirtAddr, write: bool) -> Result<PhysAddr, Errno> {
    // a miss is repaired by one fault; the retry then hits
    for _ in 0..2 {
        let hit = with_local_tlb(|tlb| {
            let tlb = tlb.exclusive_access();
            match tlb.translate(va, write) {
                Some(pa) => Ok(pa),
                None if write && tlb.probe(va).is_some() => Err(EX_MOD),
                None if write => Err(EX_TLBS),
                None => Err(EX_TLBL),
            }
        });
        match hit {
            Ok(pa) => return Ok(pa),
            Err(code) => {
                debug!("tlb exception {} at {:?}", code, va);
                tlb_exception(code, va)?;
            }
        }
    }
    Err(Errno::EFAULT)
}

fn kernel_of_current() -> Result<Arc<Kernel>, Errno> {
    current_kernel().ok_or(Errno::EFAULT)
}

/// User-mode load of `buf.len()` bytes at `va`.
pub fn user_read(va: VirtAddr, buf: &mut [u8]) -> Result<(), Errno> {
    let kernel = kernel_of_current()?;
    let mut done = 0;
    while done < buf.len() {
        let cur = va.add(done);
        let chunk = (PAGE_SIZE - cur.page_offset()).min(buf.len() - done);
        let pa = user_translate(cur, false)?;
        kernel.ram().read(pa, &mut buf[done..done + chunk]);
        done += chunk;
    }
    Ok(())
}

/// User-mode store of `data` at `va`.
pub fn user_write(va: VirtAddr, data: &[u8]) -> Result<(), Errno> {
    let kernel = kernel_of_current()?;
    let mut done = 0;
    while done < data.len() {
        let cur = va.add(done);
        let chunk = (PAGE_SIZE - cur.page_offset()).min(data.len() - done);
        let pa = user_translate(cur, true)?;
        kernel.ram().write(pa, &data[done..done + chunk]);
        done += chunk;
    }
    Ok(())
}
