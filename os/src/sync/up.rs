use core::cell::{Cell, RefCell, RefMut};
use core::ops::{Deref, DerefMut};

/// Used to enable/disable interrupts on the current processor depending on the
/// number of nested exclusive accesses.
///
/// Every host thread is one processor, so the state is thread-local.
pub struct IntrMaskingInfo {
    /// exclusive access count
    nested_level: Cell<usize>,
    /// Interrupt state saved by the outermost `enter`.
    enabled_before_masking: Cell<bool>,
    /// Current interrupt-enable bit of this processor.
    enabled: Cell<bool>,
}

thread_local! {
    static INTR_MASKING_INFO: IntrMaskingInfo = const {
        IntrMaskingInfo {
            nested_level: Cell::new(0),
            enabled_before_masking: Cell::new(false),
            enabled: Cell::new(true),
        }
    };
}

impl IntrMaskingInfo {
    /// Increment nested level.
    ///
    /// Clear the interrupt-enable bit, remembering it if this is the outermost level.
    fn enter(&self) {
        let enabled = self.enabled.replace(false);
        if self.nested_level.get() == 0 {
            self.enabled_before_masking.set(enabled);
        }
        self.nested_level.set(self.nested_level.get() + 1);
    }

    /// Decrement nested level.
    ///
    /// Restore the interrupt-enable bit once the outermost level is left.
    fn exit(&self) {
        let level = self.nested_level.get();
        assert!(level > 0, "interrupt masking underflow");
        self.nested_level.set(level - 1);
        if level == 1 && self.enabled_before_masking.get() {
            self.enabled.set(true);
        }
    }
}

/// Whether interrupts are currently enabled on this processor.
pub fn interrupts_enabled() -> bool {
    INTR_MASKING_INFO.with(|info| info.enabled.get())
}

/// Interrupt priority raised to "high" until the guard is dropped.
pub struct SplGuard {
    _private: (),
}

/// Disable interrupts on this processor; they are restored when the guard drops.
pub fn splhigh() -> SplGuard {
    INTR_MASKING_INFO.with(IntrMaskingInfo::enter);
    SplGuard { _private: () }
}

impl Drop for SplGuard {
    fn drop(&mut self) {
        INTR_MASKING_INFO.with(IntrMaskingInfo::exit);
    }
}

/// `RefCell` wrapper that disables interrupts during exclusive access.
///
/// Only meant for per-processor state (kept in a `thread_local!`), so unlike a
/// lock it never has to wait for another processor.
pub struct UPIntrFreeCell<T> {
    /// inner data
    inner: RefCell<T>,
}

/// `RefMut` wrapper that keeps interrupts disabled while it is alive.
///
/// - During exclusive access, interrupts are off.
/// - At the end of exclusive access (drop time), the saved interrupt state is restored.
pub struct UPIntrRefMut<'a, T> {
    inner: Option<RefMut<'a, T>>,
    _spl: SplGuard,
}

impl<T> UPIntrFreeCell<T> {
    /// Creates a new cell containing `value`.
    pub fn new(value: T) -> Self {
        Self {
            inner: RefCell::new(value),
        }
    }

    /// Mutably borrows the wrapped value with interrupts masked.
    ///
    /// # Panics
    ///
    /// Panics if the value is currently borrowed.
    pub fn exclusive_access(&self) -> UPIntrRefMut<'_, T> {
        let spl = splhigh();
        UPIntrRefMut {
            inner: Some(self.inner.borrow_mut()),
            _spl: spl,
        }
    }

    /// Temporary exclusive access through callback functions
    ///
    /// - `f`: Function to affect exclusive access to a resource
    pub fn exclusive_session<F, V>(&self, f: F) -> V
    where
        F: FnOnce(&mut T) -> V,
    {
        let mut inner = self.exclusive_access();
        f(inner.deref_mut())
    }
}

impl<'a, T> Drop for UPIntrRefMut<'a, T> {
    fn drop(&mut self) {
        // release the borrow before interrupts come back on
        self.inner = None;
    }
}

impl<'a, T> Deref for UPIntrRefMut<'a, T> {
    type Target = T;
    fn deref(&self) -> &Self::Target {
        self.inner.as_deref().expect("borrow released early")
    }
}

impl<'a, T> DerefMut for UPIntrRefMut<'a, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.inner.as_deref_mut().expect("borrow released early")
    }
}
