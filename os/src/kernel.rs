//! The kernel context: machine, frame allocator, program table and the
//! threads running user processes.
//!
//! Each user process runs on its own host thread. The thread makes the
//! process current on its [`crate::task::Processor`], enters user mode
//! through the [`UserMode`] callback and exits the process when the
//! callback returns.

use crate::config::MachineConfig;
use crate::error::Errno;
use crate::loader::{load_program, ProgramImage};
use crate::logging;
use crate::mm::{FrameAllocator, PhysicalMemory};
use crate::task::{
    clear_processor, current_process, set_current, take_current_process, take_pending_image,
    ProcessControlBlock,
};
use crate::trap::{TrapFrame, UserMode};
use log::{error, info, warn};
use parking_lot::{Condvar, Mutex};
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;

pub struct Kernel {
    config: MachineConfig,
    frames: FrameAllocator,
    user_mode: Box<dyn UserMode>,
    programs: Mutex<BTreeMap<String, Arc<ProgramImage>>>,
    /// User processes that have not exited yet.
    live_processes: Mutex<usize>,
    no_processes: Condvar,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl Kernel {
    /// Bring the machine up: RAM, then the coremap.
    pub fn boot(config: MachineConfig, user_mode: impl UserMode + 'static) -> Arc<Self> {
        logging::init();
        let ram = Arc::new(PhysicalMemory::new(&config));
        let frames = FrameAllocator::new(ram);
        frames.bootstrap();
        info!(
            "dumbvm: {} KiB of RAM, {} frames allocable",
            config.ram_size / 1024,
            frames.total_pages()
        );
        Arc::new(Self {
            config,
            frames,
            user_mode: Box::new(user_mode),
            programs: Mutex::new(BTreeMap::new()),
            live_processes: Mutex::new(0),
            no_processes: Condvar::new(),
            threads: Mutex::new(Vec::new()),
        })
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    pub fn frames(&self) -> &FrameAllocator {
        &self.frames
    }

    pub fn ram(&self) -> &PhysicalMemory {
        self.frames.ram()
    }

    /// Make `image` runnable under its name.
    pub fn register_program(&self, image: ProgramImage) {
        self.programs
            .lock()
            .insert(image.name.clone(), Arc::new(image));
    }

    pub fn program(&self, path: &str) -> Option<Arc<ProgramImage>> {
        self.programs.lock().get(path).cloned()
    }

    /// Build a new process running `path` with `args`, plus its initial frame.
    fn create_process(
        &self,
        path: &str,
        args: &[String],
    ) -> Result<(Arc<ProcessControlBlock>, TrapFrame), Errno> {
        let image = self.program(path).ok_or(Errno::ENOENT)?;
        let process = ProcessControlBlock::new(path)?;
        let space = load_program(&image, &self.frames)?;
        let sp = match space.define_stack(self.ram(), args) {
            Ok(sp) => sp,
            Err(e) => {
                space.destroy(&self.frames);
                return Err(e);
            }
        };
        process.replace_address_space(space);
        self.process_started();
        let tf = TrapFrame::app_init_context(image.entry.0, sp.0, args.len() as u32, sp.0);
        Ok((process, tf))
    }

    /// Start `path` on the calling thread (`runprogram`): the process
    /// becomes current and its initial frame is returned for
    /// [`Kernel::run_user`].
    pub fn run_program(self: &Arc<Self>, path: &str, args: &[String]) -> Result<TrapFrame, Errno> {
        let (process, tf) = self.create_process(path, args)?;
        info!("running {} as process {}", path, process.getpid());
        set_current(self, process);
        Ok(tf)
    }

    /// Start `path` on a thread of its own and return its pid.
    pub fn spawn_program(self: &Arc<Self>, path: &str, args: &[String]) -> Result<usize, Errno> {
        let (process, tf) = self.create_process(path, args)?;
        let pid = process.getpid();
        let kernel = Arc::clone(self);
        let spawned = std::thread::Builder::new()
            .name(format!("pid {}", pid))
            .spawn({
                let process = Arc::clone(&process);
                move || {
                    set_current(&kernel, process);
                    kernel.run_user(tf);
                    clear_processor();
                }
            });
        match spawned {
            Ok(handle) => {
                self.threads.lock().push(handle);
                Ok(pid)
            }
            Err(e) => {
                error!("cannot start a thread for {}: {}", path, e);
                process.exit(0, &self.frames);
                self.process_exited();
                Err(Errno::ENOMEM)
            }
        }
    }

    /// Fork the current process; the child resumes from a copy of `tf` on a
    /// new thread. Returns the child's pid.
    pub fn fork_current(self: &Arc<Self>, tf: &TrapFrame) -> Result<usize, Errno> {
        let parent = current_process().ok_or(Errno::EFAULT)?;
        let child = parent.fork(&self.frames)?;
        let pid = child.getpid();
        self.process_started();

        let kernel = Arc::clone(self);
        let tf = *tf;
        let spawned = std::thread::Builder::new()
            .name(format!("pid {}", pid))
            .spawn({
                let child = Arc::clone(&child);
                move || crate::trap::enter_forked_process(kernel, child, tf)
            });
        match spawned {
            Ok(handle) => {
                self.threads.lock().push(handle);
                Ok(pid)
            }
            Err(e) => {
                warn!("fork: cannot start a thread for {}: {}", pid, e);
                parent.unregister_child(&child, &self.frames);
                self.process_exited();
                Err(Errno::ENOMEM)
            }
        }
    }

    /// Run user mode from `tf` until the process is gone.
    ///
    /// After a successful `execv` the callback is re-entered at the new
    /// image; a callback returning without `_exit` exits with its return
    /// value.
    ///
    /// A panic in user mode exits the process with -1 before it propagates,
    /// so waiters are not left blocked on it.
    pub fn run_user(self: &Arc<Self>, tf: TrapFrame) {
        let ran = panic::catch_unwind(AssertUnwindSafe(|| self.user_loop(tf)));
        if let Err(payload) = ran {
            if current_process().is_some() {
                error!("user mode panicked; killing the process");
                self.exit_current(-1);
            }
            panic::resume_unwind(payload);
        }
    }

    fn user_loop(self: &Arc<Self>, tf: TrapFrame) {
        let mut tf = tf;
        loop {
            let code = self.user_mode.enter(tf);
            if current_process().is_none() {
                return;
            }
            match take_pending_image() {
                Some(next) => tf = next,
                None => {
                    self.exit_current(code);
                    return;
                }
            }
        }
    }

    /// `_exit` for the process running on this thread.
    ///
    /// # Panic
    ///
    /// If no process is current.
    pub fn exit_current(&self, exit_code: i32) {
        let Some(process) = take_current_process() else {
            panic!("exit without a current process");
        };
        take_pending_image();
        process.exit(exit_code, &self.frames);
        self.process_exited();
    }

    fn process_started(&self) {
        *self.live_processes.lock() += 1;
    }

    fn process_exited(&self) {
        let mut live = self.live_processes.lock();
        *live -= 1;
        if *live == 0 {
            self.no_processes.notify_all();
        }
    }

    /// User processes that have not exited yet.
    pub fn live_processes(&self) -> usize {
        *self.live_processes.lock()
    }

    /// Block until every user process has exited, as the menu does after
    /// starting a program.
    pub fn wait_for_user_processes(&self) {
        let mut live = self.live_processes.lock();
        while *live > 0 {
            self.no_processes.wait(&mut live);
        }
    }

    /// Join every process thread started so far, including ones started
    /// while joining. Returns how many of them panicked.
    pub fn join_threads(&self) -> usize {
        let mut panicked = 0;
        loop {
            let handles: Vec<_> = self.threads.lock().drain(..).collect();
            if handles.is_empty() {
                return panicked;
            }
            for handle in handles {
                if handle.join().is_err() {
                    panicked += 1;
                }
            }
        }
    }
}
