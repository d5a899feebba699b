//! dumbvm: the memory and process core of a small teaching kernel for a
//! 32-bit MIPS machine, hosted on ordinary threads.
//!
//! Various facilities of the kernel are implemented as submodules. The most
//! important ones are:
//!
//! - [`mm`]: the coremap frame allocator, address spaces and the TLB fault handler
//! - [`task`]: process control blocks and the fork/exit/waitpid lifecycle
//! - [`trap`]: the user-mode boundary, TLB exceptions and user memory access
//! - [`syscall`]: system call dispatch and implementation
//!
//! A [`kernel::Kernel`] ties them together: [`kernel::Kernel::boot`] brings up
//! RAM and the coremap, programs are registered as
//! [`loader::ProgramImage`]s, and each user process runs on its own thread.
//!
//! ```
//! use dumbvm::config::MachineConfig;
//! use dumbvm::kernel::Kernel;
//! use dumbvm::loader::ProgramImage;
//! use dumbvm::mm::{MapPermission, VirtAddr};
//! use dumbvm::trap::TrapFrame;
//!
//! let kernel = Kernel::boot(MachineConfig::default(), |_tf: TrapFrame| 0);
//! kernel.register_program(
//!     ProgramImage::new("/bin/true", VirtAddr(0x40_0000))
//!         .segment(VirtAddr(0x40_0000), 0x100, &[], MapPermission::R | MapPermission::X),
//! );
//! let pid = kernel.spawn_program("/bin/true", &[]).unwrap();
//! assert!(pid >= dumbvm::config::PID_MIN);
//! kernel.wait_for_user_processes();
//! assert_eq!(kernel.join_threads(), 0);
//! assert_eq!(kernel.frames().used_pages(), 0);
//! ```

pub mod config;
pub mod error;
pub mod kernel;
pub mod loader;
pub mod logging;
pub mod mm;
pub mod sync;
pub mod syscall;
pub mod task;
pub mod trap;

pub use error::Errno;
