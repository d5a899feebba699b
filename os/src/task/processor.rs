//!Implementation of [`Processor`]
//!
//! Every host thread plays one processor, so the processor state lives in a
//! `thread_local!` and needs no lock, only interrupt masking.
use super::ProcessControlBlock;
use crate::kernel::Kernel;
use crate::sync::UPIntrFreeCell;
use crate::trap::TrapFrame;
use std::sync::Arc;

/// Maintain CPU status
#[derive(Default)]
pub struct Processor {
    /// Kernel this processor belongs to.
    kernel: Option<Arc<Kernel>>,
    /// Process running on the current processor.
    current: Option<Arc<ProcessControlBlock>>,
    /// Initial frame of an image installed by `execv`, waiting for user
    /// mode to be re-entered.
    pending_image: Option<TrapFrame>,
}

impl Processor {
    ///Create an empty Processor
    pub fn new() -> Self {
        Self::default()
    }

    ///Get current process in moving semanteme
    pub fn take_current(&mut self) -> Option<Arc<ProcessControlBlock>> {
        self.current.take()
    }

    ///Get current process in cloning semanteme
    pub fn current(&self) -> Option<Arc<ProcessControlBlock>> {
        self.current.as_ref().map(Arc::clone)
    }
}

thread_local! {
    static PROCESSOR: UPIntrFreeCell<Processor> = UPIntrFreeCell::new(Processor::new());
}

/// Make `process` the one running on this processor and switch the TLB to
/// its address space.
pub fn set_current(kernel: &Arc<Kernel>, process: Arc<ProcessControlBlock>) {
    PROCESSOR.with(|p| {
        let mut p = p.exclusive_access();
        p.kernel = Some(Arc::clone(kernel));
        p.current = Some(Arc::clone(&process));
    });
    if let Some(space) = process.inner_exclusive_access().address_space.as_ref() {
        space.activate();
    }
}

///Take the current process,leaving a None in its place
pub fn take_current_process() -> Option<Arc<ProcessControlBlock>> {
    PROCESSOR.with(|p| p.exclusive_access().take_current())
}

///Get running process
pub fn current_process() -> Option<Arc<ProcessControlBlock>> {
    PROCESSOR.with(|p| p.exclusive_access().current())
}

///Get the kernel of this processor
pub fn current_kernel() -> Option<Arc<Kernel>> {
    PROCESSOR.with(|p| p.exclusive_access().kernel.clone())
}

/// Remember the initial frame of a newly exec'd image.
pub fn set_pending_image(tf: TrapFrame) {
    PROCESSOR.with(|p| p.exclusive_access().pending_image = Some(tf));
}

/// Take the frame left by [`set_pending_image`], if any.
pub fn take_pending_image() -> Option<TrapFrame> {
    PROCESSOR.with(|p| p.exclusive_access().pending_image.take())
}

/// Forget the kernel and process of this processor.
pub fn clear_processor() {
    PROCESSOR.with(|p| *p.exclusive_access() = Processor::new());
}
