//! Syscall dispatch: execv, getpid and the error convention.
mod common;

use common::*;
use dumbvm::config::USERSTACK;
use dumbvm::error::Errno;
use dumbvm::mm::VirtAddr;
use dumbvm::syscall::{SYS_EXECV, SYS_GETPID};
use dumbvm::trap::{user_read, user_write, TrapFrame};
use parking_lot::Mutex;
use std::sync::Arc;

const EXEC_SITE: u32 = TEXT + 0x100;
const PATH: u32 = DATA + 0x100;
const ARGV: u32 = DATA + 0x300;

fn put_str(va: u32, s: &str) {
    let mut bytes = s.as_bytes().to_vec();
    bytes.push(0);
    user_write(VirtAddr(va), &bytes).unwrap();
}

fn put_words(va: u32, words: &[u32]) {
    let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_be_bytes()).collect();
    user_write(VirtAddr(va), &bytes).unwrap();
}

fn get_word(va: u32) -> u32 {
    let mut word = [0u8; 4];
    user_read(VirtAddr(va), &mut word).unwrap();
    u32::from_be_bytes(word)
}

fn get_str(va: u32) -> String {
    let mut bytes = Vec::new();
    let mut byte = [0u8];
    loop {
        user_read(VirtAddr(va + bytes.len() as u32), &mut byte).unwrap();
        if byte[0] == 0 {
            return String::from_utf8(bytes).unwrap();
        }
        bytes.push(byte[0]);
    }
}

/// `main`'s view of its arguments.
fn args_of(tf: &TrapFrame) -> Vec<String> {
    (0..tf.a0).map(|i| get_str(get_word(tf.a1 + 4 * i))).collect()
}

#[test]
fn spawned_program_sees_its_arguments() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let kernel = boot(256, {
        let seen = Arc::clone(&seen);
        move |tf: TrapFrame| {
            assert_eq!(tf.epc, CHILD_ENTRY);
            assert_eq!(tf.sp, tf.a1);
            assert!(tf.sp < USERSTACK);
            assert_eq!(get_word(tf.a1 + 4 * tf.a0), 0, "argv is null terminated");
            *seen.lock() = args_of(&tf);
            0
        }
    });
    let args = vec!["child".to_string(), "one".to_string(), "a much longer argument".to_string()];
    kernel.spawn_program(CHILD, &args).unwrap();
    shutdown(&kernel);
    assert_eq!(*seen.lock(), args);
}

#[test]
fn execv_replaces_the_image_and_keeps_the_pid() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let kernel = boot(256, {
        let log = Arc::clone(&log);
        move |tf: TrapFrame| {
            let mut tf = tf;
            match tf.epc {
                PARENT_ENTRY => {
                    let pid = call(&mut tf, TEXT, SYS_GETPID, [0; 3]).unwrap();
                    log.lock().push(format!("parent {}", pid));
                    put_str(PATH, CHILD);
                    put_str(DATA + 0x200, "child");
                    put_str(DATA + 0x210, "hello");
                    put_words(ARGV, &[DATA + 0x200, DATA + 0x210, 0]);
                    call(&mut tf, EXEC_SITE, SYS_EXECV, [PATH, ARGV, 0]).unwrap();
                    assert_eq!(tf.epc, CHILD_ENTRY);
                    assert_eq!(tf.a0, 2);
                    // back to the kernel, which enters the new image
                    0
                }
                CHILD_ENTRY => {
                    let pid = call(&mut tf, TEXT, SYS_GETPID, [0; 3]).unwrap();
                    log.lock().push(format!("child {}", pid));
                    let mut data = [0u8; 10];
                    user_read(VirtAddr(DATA), &mut data).unwrap();
                    assert_eq!(&data, b"child data");
                    assert_eq!(args_of(&tf), ["child", "hello"]);
                    0
                }
                other => panic!("unexpected entry {:#x}", other),
            }
        }
    });
    let pid = kernel.spawn_program(PARENT, &[]).unwrap();
    shutdown(&kernel);
    assert_eq!(*log.lock(), vec![format!("parent {}", pid), format!("child {}", pid)]);
}

#[test]
fn failed_execv_keeps_the_old_image() {
    let kernel = boot(256, |tf: TrapFrame| {
        let mut tf = tf;
        let enoent = Errno::ENOENT.code() as u32;
        let einval = Errno::EINVAL.code() as u32;
        let efault = Errno::EFAULT.code() as u32;

        put_str(PATH, "/testbin/missing");
        put_words(ARGV, &[0]);
        assert_eq!(call(&mut tf, EXEC_SITE, SYS_EXECV, [PATH, ARGV, 0]), Err(enoent));
        assert_eq!(tf.epc, EXEC_SITE + 4);

        put_str(PATH, "");
        assert_eq!(call(&mut tf, EXEC_SITE, SYS_EXECV, [PATH, ARGV, 0]), Err(einval));
        assert_eq!(call(&mut tf, EXEC_SITE, SYS_EXECV, [0x3000, ARGV, 0]), Err(efault));

        let mut data = [0u8; 11];
        user_read(VirtAddr(DATA), &mut data).unwrap();
        assert_eq!(&data, b"parent data");
        0
    });
    kernel.spawn_program(PARENT, &[]).unwrap();
    shutdown(&kernel);
}

#[test]
fn oversized_argv_is_e2big() {
    let kernel = boot(256, |tf: TrapFrame| {
        let mut tf = tf;
        const LONG: u32 = DATA + 0x400;
        const MANY: u32 = DATA + 0x800;
        // 70 arguments of 1000 bytes each pass ARG_MAX
        put_str(LONG, &"x".repeat(999));
        let mut argv = vec![LONG; 70];
        argv.push(0);
        put_words(MANY, &argv);
        put_str(PATH, CHILD);
        let e2big = Errno::E2BIG.code() as u32;
        assert_eq!(call(&mut tf, EXEC_SITE, SYS_EXECV, [PATH, MANY, 0]), Err(e2big));
        0
    });
    kernel.spawn_program(PARENT, &[]).unwrap();
    shutdown(&kernel);
}

#[test]
fn unknown_syscall_is_enosys() {
    let kernel = boot(256, |tf: TrapFrame| {
        let mut tf = tf;
        let site = TEXT + 0x40;
        assert_eq!(call(&mut tf, site, 99, [0; 3]), Err(Errno::ENOSYS.code() as u32));
        assert_eq!(tf.a3, 1);
        assert_eq!(tf.epc, site + 4);
        0
    });
    kernel.spawn_program(PARENT, &[]).unwrap();
    shutdown(&kernel);
}

#[test]
fn getpid_matches_the_spawned_pid() {
    let reported = Arc::new(Mutex::new(0));
    let kernel = boot(256, {
        let reported = Arc::clone(&reported);
        move |tf: TrapFrame| {
            let mut tf = tf;
            *reported.lock() = call(&mut tf, TEXT, SYS_GETPID, [0; 3]).unwrap() as usize;
            0
        }
    });
    let pid = kernel.spawn_program(PARENT, &[]).unwrap();
    shutdown(&kernel);
    assert_eq!(*reported.lock(), pid);
}
