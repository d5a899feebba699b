//! Process management syscalls
use crate::config::{ARG_MAX, PATH_MAX};
use crate::error::Errno;
use crate::kernel::Kernel;
use crate::loader::load_program;
use crate::mm::{AddressSpace, PhysicalMemory, VirtAddr};
use crate::task::{current_kernel, current_process, set_pending_image, ProcessControlBlock};
use crate::trap::TrapFrame;
use log::{debug, info};
use std::sync::Arc;

/// Encode an exit code the way `waitpid` reports it (`_MKWAIT_EXIT`).
pub fn mkwait_exit(code: i32) -> i32 {
    (code & 0xff) << 2
}

/// The kernel and process of the calling thread.
///
/// # Panic
///
/// If the thread is not running a user process.
fn current() -> (Arc<Kernel>, Arc<ProcessControlBlock>) {
    match (current_kernel(), current_process()) {
        (Some(kernel), Some(process)) => (kernel, process),
        _ => panic!("syscall without a current process"),
    }
}

/// Process exits and submit an exit code
///
/// # Parameters
/// - `exit_code`: The return value of the application.
#[allow(non_snake_case)]
pub fn sys__exit(exit_code: i32) {
    let (kernel, process) = current();
    debug!("Syscall: _exit({}) from {}", exit_code, process.getpid());
    drop(process);
    kernel.exit_current(exit_code);
}

/// Get process identifier of the calling process.
pub fn sys_getpid() -> Result<i32, Errno> {
    let (_, process) = current();
    Ok(process.getpid() as i32)
}

/// Create a child process with a copy of the caller's address space.
///
/// # Return
/// - to the child process => 0 (set up by the child's entry)
/// - to the current process => PID(Process Identifier) of child process
pub fn sys_fork(tf: &TrapFrame) -> Result<i32, Errno> {
    let (kernel, _) = current();
    kernel.fork_current(tf).map(|pid| pid as i32)
}

/// Wait for the child `pid` to exit and reap it.
///
/// # Parameters
/// - `pid`: Process ID of the child process to wait for.
/// - `status`: Where the encoded exit status is stored; ignored if null.
/// - `options`: must be 0.
///
/// # Return
/// The pid of the reaped child.
pub fn sys_waitpid(pid: i32, status: VirtAddr, options: i32) -> Result<i32, Errno> {
    if options != 0 {
        return Err(Errno::EINVAL);
    }
    let (kernel, process) = current();
    if pid <= 0 {
        return Err(Errno::ECHILD);
    }
    // reject a bad status pointer before the child is consumed
    if status.0 != 0 {
        let inner = process.inner_exclusive_access();
        let space = inner.address_space.as_ref().ok_or(Errno::EFAULT)?;
        space.copy_in_word(kernel.ram(), status)?;
    }

    let exit_code = process.waitpid(pid as usize)?;
    if status.0 != 0 {
        let inner = process.inner_exclusive_access();
        let space = inner.address_space.as_ref().ok_or(Errno::EFAULT)?;
        space.copy_out_word(kernel.ram(), status, mkwait_exit(exit_code) as u32)?;
    }
    Ok(pid)
}

/// Read the null-terminated `argv` array at `argv` out of user memory.
///
/// `E2BIG` once strings and pointers together exceed `ARG_MAX` bytes.
fn copy_in_args(
    space: &AddressSpace,
    ram: &PhysicalMemory,
    argv: VirtAddr,
) -> Result<Vec<String>, Errno> {
    let mut args = Vec::new();
    let mut budget = ARG_MAX;
    loop {
        budget = budget.checked_sub(4).ok_or(Errno::E2BIG)?;
        let ptr = space.copy_in_word(ram, argv.add(args.len() * 4))?;
        if ptr == 0 {
            return Ok(args);
        }
        let arg = space.copy_in_str(ram, VirtAddr(ptr), budget)?;
        budget -= arg.len() + 1;
        args.push(arg);
    }
}

/// Replace the caller's program with the one at `path`.
///
/// The old address space is only destroyed once the new one is fully set
/// up, so on any error the caller keeps running its old image.
///
/// # Return
/// The initial frame of the new image.
pub fn sys_execv(path: VirtAddr, argv: VirtAddr) -> Result<TrapFrame, Errno> {
    let (kernel, process) = current();
    let ram = kernel.ram();
    let (path, args) = {
        let inner = process.inner_exclusive_access();
        let space = inner.address_space.as_ref().ok_or(Errno::EFAULT)?;
        let path = space.copy_in_str(ram, path, PATH_MAX)?;
        let args = copy_in_args(space, ram, argv)?;
        (path, args)
    };
    if path.is_empty() {
        return Err(Errno::EINVAL);
    }
    let image = kernel.program(&path).ok_or(Errno::ENOENT)?;

    let space = load_program(&image, kernel.frames())?;
    let sp = match space.define_stack(ram, &args) {
        Ok(sp) => sp,
        Err(e) => {
            space.destroy(kernel.frames());
            return Err(e);
        }
    };
    space.activate();
    if let Some(old) = process.replace_address_space(space) {
        old.destroy(kernel.frames());
    }
    info!("process {} exec {} {:?}", process.getpid(), path, args);

    let tf = TrapFrame::app_init_context(image.entry.0, sp.0, args.len() as u32, sp.0);
    set_pending_image(tf);
    Ok(tf)
}
