//!Implementation of [`RecycleAllocator`] and process identifiers.
use crate::config::{PID_MAX, PID_MIN};
use lazy_static::*;
use log::trace;

/// Allocator to manage new ID assignment/reassignment/deletion, etc.
pub struct RecycleAllocator {
    /// Start position of unassigned id
    current: usize,
    /// Largest id that may be handed out
    max: usize,
    recycled: Vec<usize>,
}

impl RecycleAllocator {
    ///Create an allocator handing out ids in `[min, max]`
    pub fn new(min: usize, max: usize) -> Self {
        RecycleAllocator {
            current: min,
            max,
            recycled: Vec::new(),
        }
    }

    ///Allocate a id(identifier); `None` once every id is in use
    pub fn alloc(&mut self) -> Option<usize> {
        if let Some(id) = self.recycled.pop() {
            Some(id)
        } else if self.current <= self.max {
            self.current += 1;
            Some(self.current - 1)
        } else {
            None
        }
    }

    ///Recycle a id(identifier)
    pub fn dealloc(&mut self, id: usize) {
        assert!(id < self.current);
        assert!(
            !self.recycled.iter().any(|i| *i == id),
            "id {} has been deallocated!",
            id
        );
        self.recycled.push(id);
    }
}

lazy_static! {
    static ref PID_ALLOCATOR: spin::Mutex<RecycleAllocator> =
        spin::Mutex::new(RecycleAllocator::new(PID_MIN, PID_MAX));
}

/// Process ID handle
///
/// By wrapping the `Drop` in an implemented structure, the pid is
/// automatically recycled when the process control block goes away.
pub struct PidHandle(pub usize);

impl Drop for PidHandle {
    fn drop(&mut self) {
        trace!("drop pid {}", self.0);
        PID_ALLOCATOR.lock().dealloc(self.0);
    }
}

///Allocate a pid(process identifier) from PID_ALLOCATOR
pub fn pid_alloc() -> Option<PidHandle> {
    PID_ALLOCATOR.lock().alloc().map(PidHandle)
}
