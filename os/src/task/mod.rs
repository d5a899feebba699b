//! Process management implementation
//!
//! Everything about the process lifecycle, fork/exit/waitpid and the
//! parent/child links between processes, is implemented here.
//!
//! Each thread has its own [`Processor`] recording the process it runs.
//! A single global `PID_ALLOCATOR` hands out pids for user processes.
mod id;
mod process;
mod processor;

pub use id::{pid_alloc, PidHandle, RecycleAllocator};
pub use process::{ProcessControlBlock, ProcessControlBlockInner};
pub use processor::{
    clear_processor, current_kernel, current_process, set_current, set_pending_image,
    take_current_process, take_pending_image, Processor,
};
