//! Implementation of syscalls
//!
//! The single entry point to all system calls, [`syscall()`], is called
//! whenever user mode executes a `syscall` instruction. The call number is
//! in `v0` and the arguments in `a0`..`a3`.
//!
//! On return `a3` tells user mode whether the call failed: 0 with the result
//! in `v0`, or 1 with the errno in `v0`. `epc` moves past the `syscall`
//! instruction, except after a successful `execv` (the frame now starts
//! the new image) or `_exit` (nothing returns).

/// fork syscall
pub const SYS_FORK: u32 = 0;
/// execv syscall
pub const SYS_EXECV: u32 = 2;
/// _exit syscall
pub const SYS__EXIT: u32 = 3;
/// waitpid syscall
pub const SYS_WAITPID: u32 = 4;
/// getpid syscall
pub const SYS_GETPID: u32 = 5;

mod process;

use crate::error::Errno;
use crate::mm::VirtAddr;
use crate::trap::TrapFrame;
use log::{trace, warn};
pub use process::*;

/// handle syscall exception with `syscall_id` in `tf.v0`
pub fn syscall(tf: &mut TrapFrame) {
    let callno = tf.v0;
    trace!("syscall {} ({:#x}, {:#x}, {:#x})", callno, tf.a0, tf.a1, tf.a2);
    let result = match callno {
        SYS_FORK => sys_fork(tf),
        SYS_EXECV => match sys_execv(VirtAddr(tf.a0), VirtAddr(tf.a1)) {
            Ok(new_frame) => {
                *tf = new_frame;
                return;
            }
            Err(e) => Err(e),
        },
        SYS__EXIT => {
            sys__exit(tf.a0 as i32);
            return;
        }
        SYS_WAITPID => sys_waitpid(tf.a0 as i32, VirtAddr(tf.a1), tf.a2 as i32),
        SYS_GETPID => sys_getpid(),
        _ => {
            warn!("unknown syscall {}", callno);
            Err(Errno::ENOSYS)
        }
    };
    match result {
        Ok(retval) => {
            tf.v0 = retval as u32;
            tf.a3 = 0;
        }
        Err(e) => {
            tf.v0 = e.code() as u32;
            tf.a3 = 1;
        }
    }
    tf.advance();
}
