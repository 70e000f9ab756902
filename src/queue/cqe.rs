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

//! Completion queue entries and the shared completion state.
//!
//! Exactly one completion is produced per submitted entry unless the entry
//! carried the no-reply flag. Posting never blocks: when the completion
//! pool is exhausted the completion is counted as an overflow and dropped,
//! and the submission slot is recycled regardless so the engine cannot leak
//! capacity. Consumption is the only suspension point in the crate.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use bytes::Bytes;
use log::warn;

use super::pool::{lock, IndexPool, SlotToken};
use super::sqe::SqeFlags;
use crate::error::Result;

struct CqState {
    ready: VecDeque<Cqe>,
    /// Monotonic count of finished links, including overflowed and
    /// no-reply ones, so waiters always observe progress.
    completed: u64,
}

/// Completion-side state shared between the context, its devices, and the
/// fallback workers.
pub(crate) struct CqShared {
    cqe_slots: IndexPool,
    sqe_slots: Arc<IndexPool>,
    state: Mutex<CqState>,
    cond: Condvar,
    overflows: AtomicU64,
}

impl CqShared {
    pub(crate) fn new(cqe_capacity: usize, sqe_slots: Arc<IndexPool>) -> Self {
        Self {
            cqe_slots: IndexPool::new(cqe_capacity),
            sqe_slots,
            state: Mutex::new(CqState {
                ready: VecDeque::with_capacity(cqe_capacity),
                completed: 0,
            }),
            cond: Condvar::new(),
            overflows: AtomicU64::new(0),
        }
    }

    /// Post the completion for one finished link.
    ///
    /// Honors `NO_REPLY` by recycling the submission slot without producing
    /// an entry. On completion-pool exhaustion the result is dropped (and
    /// counted), never blocked on.
    pub(crate) fn post(
        self: &Arc<Self>,
        sqe_slot: SlotToken,
        flags: SqeFlags,
        userdata: u64,
        result: i32,
        data: Bytes,
    ) {
        if flags.contains(SqeFlags::NO_REPLY) {
            let _ = self.sqe_slots.release(sqe_slot);
            self.bump_completed();
            return;
        }

        let Some(cqe_slot) = self.cqe_slots.try_acquire() else {
            self.overflows.fetch_add(1, Ordering::Relaxed);
            warn!(
                "completion queue full, dropping result {} for userdata {:#x}",
                result, userdata
            );
            let _ = self.sqe_slots.release(sqe_slot);
            self.bump_completed();
            return;
        };

        let cqe = Cqe {
            shared: Arc::clone(self),
            cqe_slot,
            sqe_slot: Some(sqe_slot),
            result,
            userdata,
            data,
            released: false,
        };

        let mut state = lock(&self.state);
        state.ready.push_back(cqe);
        state.completed += 1;
        drop(state);
        self.cond.notify_all();
    }

    fn bump_completed(&self) {
        let mut state = lock(&self.state);
        state.completed += 1;
        drop(state);
        self.cond.notify_all();
    }

    /// Pop the oldest ready completion without blocking.
    pub(crate) fn try_consume(&self) -> Option<Cqe> {
        lock(&self.state).ready.pop_front()
    }

    /// Pop the oldest ready completion, suspending the caller until one is
    /// available.
    pub(crate) fn consume(&self) -> Cqe {
        let mut state = lock(&self.state);
        loop {
            if let Some(cqe) = state.ready.pop_front() {
                return cqe;
            }
            state = self
                .cond
                .wait(state)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
        }
    }

    /// Current value of the monotonic completion counter.
    pub(crate) fn completed(&self) -> u64 {
        lock(&self.state).completed
    }

    /// Block until the completion counter reaches `target`.
    pub(crate) fn wait_completed(&self, target: u64) {
        let mut state = lock(&self.state);
        while state.completed < target {
            state = self
                .cond
                .wait(state)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
        }
    }

    pub(crate) fn overflows(&self) -> u64 {
        self.overflows.load(Ordering::Relaxed)
    }
}

/// A consumed completion entry.
///
/// Carries the integer result of the operation, the opaque userdata copied
/// from the originating submission, and (for reads) the data the device
/// produced. Releasing the entry returns both its own slot and the
/// originating submission's slot to their pools; dropping an unreleased
/// entry releases it as well, so explicit release is for callers that want
/// the validation result.
pub struct Cqe {
    shared: Arc<CqShared>,
    cqe_slot: SlotToken,
    sqe_slot: Option<SlotToken>,
    result: i32,
    userdata: u64,
    data: Bytes,
    released: bool,
}

impl Cqe {
    /// Result of the operation: `0` on success, a negative errno-style code
    /// otherwise.
    pub fn result(&self) -> i32 {
        self.result
    }

    /// Opaque correlation value copied from the originating submission.
    pub fn userdata(&self) -> u64 {
        self.userdata
    }

    /// Data produced by the device, empty for writes.
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Return this entry (and its submission slot) to the pools.
    pub fn release(mut self) -> Result<()> {
        self.release_now()
    }

    fn release_now(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        self.shared.cqe_slots.release(self.cqe_slot)?;
        if let Some(slot) = self.sqe_slot.take() {
            self.shared.sqe_slots.release(slot)?;
        }
        Ok(())
    }
}

impl Drop for Cqe {
    fn drop(&mut self) {
        let _ = self.release_now();
    }
}

impl fmt::Debug for Cqe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cqe")
            .field("result", &self.result)
            .field("userdata", &self.userdata)
            .field("data_len", &self.data.len())
            .finish()
    }
}
