//! Shared fixtures: a booted kernel with two small test programs and a
//! user-side syscall stub.
#![allow(dead_code)]

use dumbvm::config::{MachineConfig, USERSTACK};
use dumbvm::kernel::Kernel;
use dumbvm::loader::ProgramImage;
use dumbvm::mm::{MapPermission, VirtAddr};
use dumbvm::syscall::syscall;
use dumbvm::trap::{TrapFrame, UserMode};
use std::sync::Arc;

/// Text of every test program starts here.
pub const TEXT: u32 = 0x40_0000;
/// Initialized data of every test program.
pub const DATA: u32 = 0x50_0000;
/// Scratch word on the user stack (wait status, argv pointers, ...).
pub const SCRATCH: u32 = USERSTACK - 0x100;

pub const PARENT: &str = "/testbin/parent";
pub const CHILD: &str = "/testbin/child";

/// Entry of [`PARENT`].
pub const PARENT_ENTRY: u32 = TEXT;
/// Entry of [`CHILD`].
pub const CHILD_ENTRY: u32 = TEXT + 0x800;

fn image(name: &str, entry: u32, data: &[u8]) -> ProgramImage {
    ProgramImage::new(name, VirtAddr(entry))
        .segment(VirtAddr(TEXT), 0x1000, &[0; 16], MapPermission::R | MapPermission::X)
        .segment(VirtAddr(DATA), 0x1000, data, MapPermission::R | MapPermission::W)
}

/// Boot a machine of `pages` pages of RAM with [`PARENT`] and [`CHILD`] registered.
pub fn boot(pages: usize, user_mode: impl UserMode + 'static) -> Arc<Kernel> {
    let kernel = Kernel::boot(MachineConfig::with_ram_pages(pages), user_mode);
    kernel.register_program(image(PARENT, PARENT_ENTRY, b"parent data\0"));
    kernel.register_program(image(CHILD, CHILD_ENTRY, b"child data\0"));
    kernel
}

/// Issue syscall `callno` from `site`; `Ok(v0)` or `Err(errno)`.
pub fn call(tf: &mut TrapFrame, site: u32, callno: u32, args: [u32; 3]) -> Result<u32, u32> {
    tf.epc = site;
    tf.v0 = callno;
    tf.a0 = args[0];
    tf.a1 = args[1];
    tf.a2 = args[2];
    syscall(tf);
    if tf.a3 == 0 {
        Ok(tf.v0)
    } else {
        Err(tf.v0)
    }
}

/// Wait until every process has exited and every thread finished, and
/// check nothing panicked or leaked.
pub fn shutdown(kernel: &Kernel) {
    kernel.wait_for_user_processes();
    assert_eq!(kernel.join_threads(), 0, "a process thread panicked");
    assert_eq!(kernel.live_processes(), 0);
    assert_eq!(kernel.frames().used_pages(), 0, "frames leaked");
}
