/*
Copyright 2026  The Rtio Authors.

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

//! Fixed-capacity index pool with generation-validated slot tokens.
//!
//! Submission entries, completion entries, and fallback work items are all
//! borrowed from pools of this shape: a fixed arena addressed by index, a
//! free list of indices, and a flat bitmap tracking which slots are live.
//! The bitmap makes double-release detection a single membership test, and
//! a per-slot generation counter (bumped on every release) invalidates any
//! token that outlives its borrow.
//!
//! Acquisition never blocks: an empty pool reports exhaustion immediately,
//! which is what keeps submission paths safe to call from latency-sensitive
//! contexts.

use std::sync::{Mutex, MutexGuard, PoisonError};

use fixedbitset::FixedBitSet;

use crate::error::{Result, RtioError};

/// Lock a mutex, recovering the inner value if a previous holder panicked.
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A borrowed slot: an index into the pool's arena plus the generation the
/// slot had when it was acquired. Tokens are plain data; returning one to
/// the wrong pool or returning it twice is caught by validation, not by the
/// type system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SlotToken {
    pub(crate) index: u16,
    pub(crate) generation: u32,
}

#[derive(Debug)]
struct PoolInner {
    /// Bitmap of currently borrowed slots.
    live: FixedBitSet,
    /// Free indices, used as a LIFO stack.
    free: Vec<u16>,
    /// Per-slot generation, bumped when the slot is released.
    generations: Vec<u32>,
}

/// A fixed-capacity pool of slot indices.
#[derive(Debug)]
pub(crate) struct IndexPool {
    inner: Mutex<PoolInner>,
    capacity: usize,
}

impl IndexPool {
    pub(crate) fn new(capacity: usize) -> Self {
        let free = (0..capacity as u16).rev().collect();
        Self {
            inner: Mutex::new(PoolInner {
                live: FixedBitSet::with_capacity(capacity),
                free,
                generations: vec![0; capacity],
            }),
            capacity,
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    pub(crate) fn free_count(&self) -> usize {
        lock(&self.inner).free.len()
    }

    /// Borrow a slot. Returns `None` when the pool is exhausted; never
    /// blocks waiting for a release.
    pub(crate) fn try_acquire(&self) -> Option<SlotToken> {
        let mut inner = lock(&self.inner);
        let index = inner.free.pop()?;
        inner.live.insert(index as usize);
        Some(SlotToken {
            index,
            generation: inner.generations[index as usize],
        })
    }

    /// Return a slot to the pool. Rejects tokens whose slot is not live or
    /// whose generation no longer matches (double release, stale handle).
    pub(crate) fn release(&self, token: SlotToken) -> Result<()> {
        let mut inner = lock(&self.inner);
        let idx = token.index as usize;

        if idx >= self.capacity
            || !inner.live.contains(idx)
            || inner.generations[idx] != token.generation
        {
            return Err(RtioError::StaleSlot(idx));
        }

        inner.live.set(idx, false);
        inner.generations[idx] = inner.generations[idx].wrapping_add(1);
        inner.free.push(token.index);
        Ok(())
    }
}


#[cfg(test)]
mod fuzz {
    use quickcheck::{Arbitrary, Gen, QuickCheck};

    use super::*;

    const MAX_CAPACITY: usize = 16;
    const MAX_OPS: usize = 64;

    #[derive(Clone, Debug)]
    enum Op {
        Acquire,
        Release(usize),
        DoubleRelease(usize),
    }

    impl Arbitrary for Op {
        fn arbitrary(g: &mut Gen) -> Self {
            match u8::arbitrary(g) % 4 {
                0 | 1 => Op::Acquire,
                2 => Op::Release(usize::arbitrary(g)),
                3 => Op::DoubleRelease(usize::arbitrary(g)),
                _ => unreachable!(),
            }
        }
    }

    #[derive(Clone, Debug)]
    struct Scenario {
        capacity: usize,
        ops: Vec<Op>,
    }

    impl Arbitrary for Scenario {
        fn arbitrary(g: &mut Gen) -> Self {
            let capacity = usize::arbitrary(g) % MAX_CAPACITY + 1;
            let num_ops = usize::arbitrary(g) % MAX_OPS + 1;
            let ops = (0..num_ops).map(|_| Op::arbitrary(g)).collect();
            Scenario { capacity, ops }
        }
    }

    fn run_scenario(s: Scenario) -> bool {
        let pool = IndexPool::new(s.capacity);
        let mut held: Vec<SlotToken> = Vec::new();
        let mut released: Vec<SlotToken> = Vec::new();

        for op in &s.ops {
            match op {
                Op::Acquire => match pool.try_acquire() {
                    Some(tok) => {
                        // No index may be live twice.
                        if held.iter().any(|h| h.index == tok.index) {
                            return false;
                        }
                        held.push(tok);
                    }
                    None => {
                        // Exhaustion must coincide with all slots held.
                        if held.len() != s.capacity {
                            return false;
                        }
                    }
                },
                Op::Release(idx) => {
                    if held.is_empty() {
                        continue;
                    }
                    let tok = held.swap_remove(idx % held.len());
                    if pool.release(tok).is_err() {
                        return false;
                    }
                    released.push(tok);
                }
                Op::DoubleRelease(idx) => {
                    if released.is_empty() {
                        continue;
                    }
                    let tok = released[idx % released.len()];
                    // A spent token must always be rejected.
                    if pool.release(tok).is_ok() {
                        return false;
                    }
                }
            }

            if held.len() + pool.free_count() != s.capacity {
                return false;
            }
        }

        for tok in held.drain(..) {
            if pool.release(tok).is_err() {
                return false;
            }
        }

        pool.free_count() == s.capacity
    }

    #[test]
    fn prop_pool_conservation() {
        QuickCheck::new()
            .tests(500)
            .quickcheck(run_scenario as fn(Scenario) -> bool);
    }
}
