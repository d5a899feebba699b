//! Synchronization primitives that are local to one processor.
//!
//! Cross-processor state is guarded with `spin` and `parking_lot` locks at
//! the point of use; what lives here is interrupt masking for per-processor
//! state such as the TLB.

mod up;

pub use up::{interrupts_enabled, splhigh, SplGuard, UPIntrFreeCell, UPIntrRefMut};
