//! A small kernel menu: boots the machine and runs `/testbin/forktest`,
//! which forks a few children, waits for each and reports their status.
//!
//! `dumbvm [children]` (default 4). Build with `LOG=info` (or `debug`) to
//! see the kernel's log.

use dumbvm::config::MachineConfig;
use dumbvm::kernel::Kernel;
use dumbvm::loader::ProgramImage;
use dumbvm::mm::{MapPermission, VirtAddr};
use dumbvm::syscall::{syscall, SYS_FORK, SYS_GETPID, SYS_WAITPID, SYS__EXIT};
use dumbvm::trap::{user_read, TrapFrame};

const TEXT: u32 = 0x40_0000;
const DATA: u32 = 0x41_0000;
const FORK_SITE: u32 = TEXT + 0x10;
const WAIT_SITE: u32 = TEXT + 0x20;
const EXIT_SITE: u32 = TEXT + 0x30;
const FORKTEST: &str = "/testbin/forktest";

/// One `syscall` instruction at `site`; the raw `(v0, a3)` pair.
fn trap(tf: &mut TrapFrame, site: u32, callno: u32, a0: u32, a1: u32) -> (u32, u32) {
    tf.epc = site;
    tf.v0 = callno;
    tf.a0 = a0;
    tf.a1 = a1;
    tf.a2 = 0;
    syscall(tf);
    (tf.v0, tf.a3)
}

/// User code of `forktest`; `argv[1]` is the number of children.
fn forktest(tf: TrapFrame) -> i32 {
    let mut tf = tf;
    if tf.epc == FORK_SITE + 4 {
        // child: exit with our pid's low byte
        let (pid, _) = trap(&mut tf, TEXT, SYS_GETPID, 0, 0);
        trap(&mut tf, EXIT_SITE, SYS__EXIT, pid & 0xff, 0);
        return 0;
    }

    let children = match read_arg(&tf, 1) {
        Some(n) => n,
        None => return 1,
    };
    let mut pids = Vec::new();
    for _ in 0..children {
        match trap(&mut tf, FORK_SITE, SYS_FORK, 0, 0) {
            (pid, 0) => pids.push(pid),
            (errno, _) => println!("forktest: fork failed: errno {}", errno),
        }
    }
    let status = tf.sp - 4;
    for pid in pids {
        match trap(&mut tf, WAIT_SITE, SYS_WAITPID, pid, status) {
            (_, 0) => {
                let mut word = [0u8; 4];
                if user_read(VirtAddr(status), &mut word).is_ok() {
                    let code = u32::from_be_bytes(word);
                    println!("forktest: pid {} exited, status {:#x}", pid, code);
                }
            }
            (errno, _) => println!("forktest: waitpid({}) failed: errno {}", pid, errno),
        }
    }
    0
}

/// Parse `argv[i]` as a number.
fn read_arg(tf: &TrapFrame, i: u32) -> Option<u32> {
    if i >= tf.a0 {
        return None;
    }
    let mut ptr = [0u8; 4];
    user_read(VirtAddr(tf.a1).add(4 * i as usize), &mut ptr).ok()?;
    let ptr = u32::from_be_bytes(ptr);
    let mut text = String::new();
    for offset in 0.. {
        let mut byte = [0u8];
        user_read(VirtAddr(ptr).add(offset), &mut byte).ok()?;
        if byte[0] == 0 {
            break;
        }
        text.push(byte[0] as char);
    }
    text.parse().ok()
}

fn forktest_image() -> ProgramImage {
    ProgramImage::new(FORKTEST, VirtAddr(TEXT))
        .segment(VirtAddr(TEXT), 0x1000, &[], MapPermission::R | MapPermission::X)
        .segment(VirtAddr(DATA), 0x1000, &[], MapPermission::R | MapPermission::W)
}

fn main() {
    let children = std::env::args().nth(1).unwrap_or_else(|| "4".to_string());
    let kernel = Kernel::boot(MachineConfig::default(), forktest);
    kernel.register_program(forktest_image());

    let args = vec!["forktest".to_string(), children];
    match kernel.spawn_program(FORKTEST, &args) {
        Ok(pid) => println!("menu: started forktest as pid {}", pid),
        Err(e) => {
            eprintln!("menu: forktest: {}", e);
            std::process::exit(1);
        }
    }
    kernel.wait_for_user_processes();
    let panicked = kernel.join_threads();
    println!(
        "menu: all processes done; {} of {} frames in use",
        kernel.frames().used_pages(),
        kernel.frames().total_pages()
    );
    if panicked > 0 {
        std::process::exit(1);
    }
}
