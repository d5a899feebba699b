#![cfg(test)]
//! Property-based tests for the coremap allocator.
//!
//! A random sequence of allocations and frees is replayed against the
//! allocator and a plain model of outstanding runs:
//!   - used frames are exactly the union of outstanding runs, none overlap
//!   - every run records its length on its first frame only
//!   - allocation is first fit, and a failed one changes nothing
//!   - free releases exactly the run it names, a repeated free nothing

use super::{FrameAllocator, PhysAddr, PhysicalMemory};
use crate::config::{MachineConfig, PAGE_SIZE};
use proptest::prelude::*;
use std::sync::Arc;

#[derive(Clone, Debug)]
enum Op {
    Alloc(usize),
    /// free the outstanding run at this index (modulo the count)
    Free(usize),
    /// free a run that was already freed
    FreeAgain,
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0usize..6).prop_map(Op::Alloc),
        2 => any::<usize>().prop_map(Op::Free),
        1 => Just(Op::FreeAgain),
    ]
}

fn booted(pages: usize) -> FrameAllocator {
    let frames = FrameAllocator::new(Arc::new(PhysicalMemory::new(&MachineConfig {
        ram_size: pages * PAGE_SIZE,
        kernel_reserved: PAGE_SIZE,
    })));
    frames.bootstrap();
    frames
}

fn index(frames: &FrameAllocator, pa: PhysAddr) -> usize {
    (pa.0 - frames.mem_begin().0) as usize / PAGE_SIZE
}

/// Lowest start of `n` frames that are free in `used`.
fn model_first_fit(used: &[bool], n: usize) -> Option<usize> {
    if n == 0 {
        return None;
    }
    (0..used.len()).find(|&s| s + n <= used.len() && used[s..s + n].iter().all(|u| !u))
}

proptest! {
    #[test]
    fn coremap_matches_outstanding_runs(ops in proptest::collection::vec(arb_op(), 1..80)) {
        let frames = booted(40);
        let total = frames.total_pages();
        let mut outstanding: Vec<(PhysAddr, usize)> = Vec::new();
        let mut freed: Vec<PhysAddr> = Vec::new();

        for op in ops {
            let mut used = vec![false; total];
            for (pa, n) in &outstanding {
                let start = index(&frames, *pa);
                for u in &mut used[start..start + n] {
                    prop_assert!(!*u, "outstanding runs overlap");
                    *u = true;
                }
            }

            match op {
                Op::Alloc(n) => {
                    let before = frames.snapshot();
                    let expected = model_first_fit(&used, n);
                    let got = frames.alloc_ppages(n);
                    prop_assert_eq!(got.map(|pa| index(&frames, pa)), expected);
                    match got {
                        Some(pa) => outstanding.push((pa, n)),
                        None => prop_assert_eq!(frames.snapshot(), before),
                    }
                }
                Op::Free(i) => {
                    if !outstanding.is_empty() {
                        let (pa, n) = outstanding.remove(i % outstanding.len());
                        let used_before = frames.used_pages();
                        frames.free_ppages(pa);
                        prop_assert_eq!(frames.used_pages(), used_before - n);
                        freed.push(pa);
                    }
                }
                Op::FreeAgain => {
                    // only runs whose frames nobody reallocated yet
                    if let Some(pa) = freed.iter().copied().find(|pa| {
                        !outstanding.iter().any(|(o, n)| {
                            let s = index(&frames, *o);
                            let i = index(&frames, *pa);
                            i >= s && i < s + n
                        })
                    }) {
                        let before = frames.snapshot();
                        frames.free_ppages(pa);
                        prop_assert_eq!(frames.snapshot(), before);
                    }
                }
            }

            let map = frames.snapshot();
            let mut expected_used = 0;
            for (pa, n) in &outstanding {
                let start = index(&frames, *pa);
                prop_assert_eq!(map[start].run_length as usize, *n);
                for entry in &map[start..start + n] {
                    prop_assert!(entry.used);
                }
                expected_used += n;
            }
            prop_assert_eq!(frames.used_pages(), expected_used);
        }
    }
}
