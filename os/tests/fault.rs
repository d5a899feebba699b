//! TLB misses taken by a running process.
mod common;

use common::*;
use dumbvm::config::{MachineConfig, PAGE_SIZE, USERSTACK};
use dumbvm::error::Errno;
use dumbvm::kernel::Kernel;
use dumbvm::loader::ProgramImage;
use dumbvm::mm::{
    handle_fault, vm_fault, with_local_tlb, AddressSpace, FaultType, FrameAllocator, MapPermission,
    PhysicalMemory, Tlb, VirtAddr,
};
use dumbvm::sync::UPIntrFreeCell;
use dumbvm::task::{clear_processor, current_process};
use dumbvm::trap::{tlb_exception, user_read, user_write, TrapFrame, EX_MOD, EX_TLBL, EX_TLBS};
use std::sync::Arc;

const SMALL: &str = "/testbin/small";

/// Region 1 at 0x1000 (two pages), region 2 at 0x4000 (one page).
fn small_image() -> ProgramImage {
    ProgramImage::new(SMALL, VirtAddr(0x1000))
        .segment(VirtAddr(0x1000), 2 * PAGE_SIZE, b"text!", MapPermission::R | MapPermission::X)
        .segment(VirtAddr(0x4000), PAGE_SIZE, b"data!", MapPermission::R | MapPermission::W)
}

/// Run `body` as process [`SMALL`] on the test thread, then exit it.
fn as_small_process(body: impl FnOnce(&Arc<Kernel>)) {
    let kernel = boot(128, |_tf: TrapFrame| 0);
    kernel.register_program(small_image());
    kernel.run_program(SMALL, &[]).unwrap();
    body(&kernel);
    kernel.exit_current(0);
    clear_processor();
    shutdown(&kernel);
}

fn local_entry(va: u32) -> Option<(bool, bool)> {
    with_local_tlb(|tlb| {
        tlb.exclusive_session(|t| {
            t.probe(VirtAddr(va)).map(|slot| {
                let entry = t.read(slot);
                (entry.is_valid(), entry.is_dirty())
            })
        })
    })
}

#[test]
fn loading_pages_stay_clean_until_load_completes() {
    let ram = PhysicalMemory::new(&MachineConfig::with_ram_pages(64));
    let frames = FrameAllocator::new(Arc::new(ram));
    frames.bootstrap();
    let mut space = AddressSpace::new();
    space
        .define_region(VirtAddr(0x1000), 2 * PAGE_SIZE, MapPermission::R | MapPermission::X)
        .unwrap();
    space
        .define_region(VirtAddr(0x4000), PAGE_SIZE, MapPermission::R | MapPermission::W)
        .unwrap();
    space.prepare_load(&frames).unwrap();
    assert_eq!(frames.used_pages(), 2 + 1 + 12);

    let tlb = UPIntrFreeCell::new(Tlb::new());
    handle_fault(FaultType::Read, VirtAddr(0x1000), Some(&space), &tlb).unwrap();
    let entry = tlb.exclusive_session(|t| t.read(0));
    assert!(entry.is_valid() && !entry.is_dirty());

    space.complete_load();
    tlb.exclusive_session(|t| t.invalidate_all());
    handle_fault(FaultType::Read, VirtAddr(0x1000), Some(&space), &tlb).unwrap();
    let entry = tlb.exclusive_session(|t| t.read(0));
    assert!(entry.is_valid() && entry.is_dirty());

    assert_eq!(
        handle_fault(FaultType::Read, VirtAddr(0x3000), Some(&space), &tlb),
        Err(Errno::EFAULT)
    );
    space.destroy(&frames);
    assert_eq!(frames.used_pages(), 0);
}

#[test]
fn running_process_faults_pages_in() {
    as_small_process(|_| {
        assert_eq!(local_entry(0x1000), None, "activate flushed the tlb");
        let mut buf = [0u8; 5];
        user_read(VirtAddr(0x1000), &mut buf).unwrap();
        assert_eq!(&buf, b"text!");
        // loaded image: the text page comes in writable
        assert_eq!(local_entry(0x1000), Some((true, true)));

        user_read(VirtAddr(0x4000), &mut buf).unwrap();
        assert_eq!(&buf, b"data!");
        user_write(VirtAddr(0x2ffe), b"span").unwrap_err();
        user_write(VirtAddr(0x1ffe), b"span").unwrap();
        let mut span = [0u8; 4];
        user_read(VirtAddr(0x1ffe), &mut span).unwrap();
        assert_eq!(&span, b"span");
    });
}

#[test]
fn stack_is_the_top_twelve_pages() {
    as_small_process(|_| {
        let bottom = USERSTACK - 12 * PAGE_SIZE as u32;
        user_write(VirtAddr(USERSTACK - 4), &[1, 2, 3, 4]).unwrap();
        user_write(VirtAddr(bottom), &[5]).unwrap();
        assert_eq!(user_write(VirtAddr(bottom - 1), &[6]), Err(Errno::EFAULT));
        let mut top = [0u8; 4];
        user_read(VirtAddr(USERSTACK - 4), &mut top).unwrap();
        assert_eq!(top, [1, 2, 3, 4]);
    });
}

#[test]
fn addresses_outside_every_region_fault() {
    as_small_process(|_| {
        let mut buf = [0u8; 1];
        for va in [0x0u32, 0x3000, 0x5000, USERSTACK, 0xffff_f000] {
            assert_eq!(user_read(VirtAddr(va), &mut buf), Err(Errno::EFAULT), "{:#x}", va);
        }
        assert_eq!(tlb_exception(EX_TLBL, VirtAddr(0x3000)), Err(Errno::EFAULT));
        assert_eq!(with_local_tlb(|tlb| tlb.exclusive_session(|t| t.valid_entries())), 0);
    });
}

#[test]
fn exception_codes_map_to_fault_types() {
    as_small_process(|_| {
        tlb_exception(EX_TLBL, VirtAddr(0x1004)).unwrap();
        tlb_exception(EX_TLBS, VirtAddr(0x4008)).unwrap();
        assert_eq!(local_entry(0x1000), Some((true, true)));
        assert_eq!(local_entry(0x4000), Some((true, true)));
        assert_eq!(tlb_exception(EX_MOD, VirtAddr(0x1000)), Err(Errno::EROFS));
        assert_eq!(tlb_exception(9, VirtAddr(0x1000)), Err(Errno::EINVAL));
        assert_eq!(vm_fault(FaultType::Read, VirtAddr(0x2000)), Ok(()));
        assert!(current_process().is_some());
    });
}

#[test]
fn user_access_needs_a_process() {
    let mut buf = [0u8; 1];
    assert_eq!(user_read(VirtAddr(0x1000), &mut buf), Err(Errno::EFAULT));
    assert_eq!(vm_fault(FaultType::Write, VirtAddr(0x1000)), Err(Errno::EFAULT));
}
