//! Types related to process management
use super::id::{pid_alloc, PidHandle};
use crate::error::Errno;
use crate::mm::{AddressSpace, FrameAllocator};
use log::{debug, info};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::sync::{Arc, Weak};

/// A structure of the components of a single process
///
/// Lock order: a parent's `inner` is always taken before a child's, never
/// the other way round.
pub struct ProcessControlBlock {
    // immutable
    pub pid: PidHandle,
    pub name: String,
    // mutable
    inner: Mutex<ProcessControlBlockInner>,
    /// Signalled once `alive` turns false.
    exited: Condvar,
}

pub struct ProcessControlBlockInner {
    /// false from the moment exit starts tearing the process down
    pub alive: bool,
    /// Recorded by exit; only meaningful once `alive` is false.
    pub exit_code: i32,
    /// Address space for the program; `None` for kernel-only processes and
    /// after exit.
    pub address_space: Option<AddressSpace>,
    /// Parent of the current process (if it exists).
    /// Note:
    ///   This smart pointer does not affect the reference count of the parent process,
    ///   since we are wrapping another process control block using `Weak` instead of `Arc`.
    ///   It is rewritten to `None` when the parent exits first.
    pub parent: Option<Weak<ProcessControlBlock>>,
    /// Unreaped children. Holding the `Arc` here is what keeps a dead child
    /// around until `waitpid` collects it.
    pub children: Vec<Arc<ProcessControlBlock>>,
}

impl ProcessControlBlock {
    pub fn inner_exclusive_access(&self) -> MutexGuard<'_, ProcessControlBlockInner> {
        self.inner.lock()
    }

    /// Create a parentless process without an address space, as the
    /// program loader does for the first user process.
    pub fn new(name: &str) -> Result<Arc<Self>, Errno> {
        let pid = pid_alloc().ok_or(Errno::ENOMEM)?;
        Ok(Self::with_pid(pid, name.to_owned(), None, None))
    }

    fn with_pid(
        pid: PidHandle,
        name: String,
        address_space: Option<AddressSpace>,
        parent: Option<Weak<ProcessControlBlock>>,
    ) -> Arc<Self> {
        debug!("process {} ({}) created", pid.0, name);
        Arc::new(Self {
            pid,
            name,
            inner: Mutex::new(ProcessControlBlockInner {
                alive: true,
                exit_code: 0,
                address_space,
                parent,
                children: Vec::new(),
            }),
            exited: Condvar::new(),
        })
    }

    pub fn getpid(&self) -> usize {
        self.pid.0
    }

    pub fn is_alive(&self) -> bool {
        self.inner.lock().alive
    }

    /// Exit code, once the process has exited.
    pub fn exit_code(&self) -> Option<i32> {
        let inner = self.inner.lock();
        (!inner.alive).then_some(inner.exit_code)
    }

    /// The parent, unless it has exited already.
    pub fn parent(&self) -> Option<Arc<ProcessControlBlock>> {
        self.inner.lock().parent.as_ref().and_then(Weak::upgrade)
    }

    /// Pids of the children not yet reaped.
    pub fn children_pids(&self) -> Vec<usize> {
        self.inner.lock().children.iter().map(|c| c.getpid()).collect()
    }

    /// Install `space`, returning the one it replaces.
    pub fn replace_address_space(&self, space: AddressSpace) -> Option<AddressSpace> {
        self.inner.lock().address_space.replace(space)
    }

    /// Create a child with a private copy of this process's address space
    /// and register it.
    ///
    /// Every failure is `ENOMEM` and leaves no child registered and no frame
    /// or pid allocated.
    pub fn fork(self: &Arc<Self>, frames: &FrameAllocator) -> Result<Arc<Self>, Errno> {
        let pid = pid_alloc().ok_or(Errno::ENOMEM)?;
        let mut parent_inner = self.inner.lock();
        let address_space = match parent_inner.address_space.as_ref() {
            Some(space) => Some(space.copy(frames)?),
            None => None,
        };
        let child = Self::with_pid(
            pid,
            self.name.clone(),
            address_space,
            Some(Arc::downgrade(self)),
        );
        parent_inner.children.push(Arc::clone(&child));
        info!("process {} forked child {}", self.getpid(), child.getpid());
        Ok(child)
    }

    /// Undo a [`ProcessControlBlock::fork`] whose child never ran.
    pub fn unregister_child(&self, child: &Arc<Self>, frames: &FrameAllocator) {
        let mut inner = self.inner.lock();
        inner.children.retain(|c| !Arc::ptr_eq(c, child));
        drop(inner);
        if let Some(space) = child.inner.lock().address_space.take() {
            space.destroy(frames);
        }
        debug!("fork of {} abandoned", child.getpid());
    }

    /// Tear the process down and record `exit_code`.
    ///
    /// Live children lose their parent; dead unreaped ones are destroyed
    /// here. A process that still has a parent stays around for its
    /// `waitpid`; an orphan is destroyed when the caller drops its last
    /// handle.
    pub fn exit(&self, exit_code: i32, frames: &FrameAllocator) {
        let mut inner = self.inner.lock();
        assert!(inner.alive, "process {} exited twice", self.getpid());
        inner.alive = false;
        inner.exit_code = exit_code;
        if let Some(space) = inner.address_space.take() {
            space.destroy(frames);
        }

        for child in inner.children.drain(..) {
            let mut child_inner = child.inner.lock();
            child_inner.parent = None;
            if !child_inner.alive {
                debug!("orphan {} reaped by exiting parent", child.getpid());
            }
            // dropping the handle destroys a dead child; a live one now
            // destroys itself when it exits
        }

        let has_parent = inner.parent.as_ref().and_then(Weak::upgrade).is_some();
        info!("process {} exited with {}", self.getpid(), exit_code);
        if has_parent {
            self.exited.notify_all();
        } else {
            inner.parent = None;
            debug!("process {} has no parent: self-destructs", self.getpid());
        }
    }

    /// Wait for the child `pid` to exit, reap it and return its exit code.
    ///
    /// `ECHILD` if `pid` is not an unreaped child of this process.
    pub fn waitpid(&self, pid: usize) -> Result<i32, Errno> {
        let child = self
            .inner
            .lock()
            .children
            .iter()
            .find(|c| c.getpid() == pid)
            .cloned()
            .ok_or(Errno::ECHILD)?;

        let exit_code = {
            let mut child_inner = child.inner.lock();
            while child_inner.alive {
                child.exited.wait(&mut child_inner);
            }
            child_inner.exit_code
        };

        let mut inner = self.inner.lock();
        let before = inner.children.len();
        inner.children.retain(|c| !Arc::ptr_eq(c, &child));
        if inner.children.len() == before {
            // reaped by a concurrent waitpid on the same pid
            return Err(Errno::ECHILD);
        }
        debug!("process {} reaped {}", self.getpid(), pid);
        Ok(exit_code)
    }
}

impl Drop for ProcessControlBlock {
    fn drop(&mut self) {
        debug!("process {} destroyed", self.pid.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MachineConfig, PAGE_SIZE};
    use crate::mm::{MapPermission, PhysicalMemory, VirtAddr};
    use std::time::Duration;

    fn frames() -> Arc<FrameAllocator> {
        let ram = PhysicalMemory::new(&MachineConfig::with_ram_pages(128));
        let frames = FrameAllocator::new(Arc::new(ram));
        frames.bootstrap();
        Arc::new(frames)
    }

    fn process(frames: &FrameAllocator) -> Arc<ProcessControlBlock> {
        let mut space = AddressSpace::new();
        space
            .define_region(VirtAddr(0x1000), PAGE_SIZE, MapPermission::R)
            .unwrap();
        space
            .define_region(VirtAddr(0x4000), PAGE_SIZE, MapPermission::W)
            .unwrap();
        space.prepare_load(frames).unwrap();
        let process = ProcessControlBlock::new("test").unwrap();
        assert!(process.replace_address_space(space).is_none());
        process
    }

    #[test]
    fn waitpid_after_exit_returns_immediately() {
        let frames = frames();
        let parent = process(&frames);
        let child = parent.fork(&frames).unwrap();
        assert_eq!(child.parent().map(|p| p.getpid()), Some(parent.getpid()));
        child.exit(7, &frames);
        assert_eq!(child.exit_code(), Some(7));
        assert_eq!(parent.waitpid(child.getpid()), Ok(7));
        assert_eq!(parent.waitpid(child.getpid()), Err(Errno::ECHILD));
        parent.exit(0, &frames);
        assert_eq!(frames.used_pages(), 0);
    }

    #[test]
    fn waitpid_blocks_until_child_exits() {
        let frames = frames();
        let parent = process(&frames);
        let child = parent.fork(&frames).unwrap();
        let pid = child.getpid();
        let exiter = {
            let frames = Arc::clone(&frames);
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                child.exit(3, &frames);
            })
        };
        assert_eq!(parent.waitpid(pid), Ok(3));
        exiter.join().unwrap();
        parent.exit(0, &frames);
    }

    #[test]
    fn waitpid_on_a_stranger_is_echild() {
        let frames = frames();
        let a = process(&frames);
        let b = process(&frames);
        assert_eq!(a.waitpid(b.getpid()), Err(Errno::ECHILD));
        assert_eq!(a.waitpid(a.getpid()), Err(Errno::ECHILD));
        a.exit(0, &frames);
        b.exit(0, &frames);
    }

    #[test]
    fn exit_orphans_live_children_and_destroys_dead_ones() {
        let frames = frames();
        let parent = process(&frames);
        let live = parent.fork(&frames).unwrap();
        let dead = parent.fork(&frames).unwrap();
        dead.exit(1, &frames);
        let dead_weak = Arc::downgrade(&dead);
        drop(dead);
        assert!(dead_weak.upgrade().is_some(), "parent keeps the zombie");

        parent.exit(0, &frames);
        assert!(dead_weak.upgrade().is_none(), "zombie destroyed during parent exit");
        assert!(live.parent().is_none());
        assert!(live.is_alive());
        assert!(parent.children_pids().is_empty());

        live.exit(2, &frames);
        assert_eq!(frames.used_pages(), 0);
    }

    #[test]
    fn failed_fork_leaves_nothing_registered() {
        let ram = PhysicalMemory::new(&MachineConfig::with_ram_pages(24));
        let frames = FrameAllocator::new(Arc::new(ram));
        frames.bootstrap();
        let parent = process(&frames);
        let used = frames.used_pages();
        assert_eq!(parent.fork(&frames).err(), Some(Errno::ENOMEM));
        assert!(parent.children_pids().is_empty());
        assert_eq!(frames.used_pages(), used);
        parent.exit(0, &frames);
    }

    #[test]
    fn unregister_child_returns_its_frames() {
        let frames = frames();
        let parent = process(&frames);
        let used = frames.used_pages();
        let child = parent.fork(&frames).unwrap();
        parent.unregister_child(&child, &frames);
        assert!(parent.children_pids().is_empty());
        assert_eq!(frames.used_pages(), used);
        parent.exit(0, &frames);
    }
}
