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

//! The submission/completion context.
//!
//! An [`Rtio`] owns two fixed pools, one for submission entries and one for
//! completion entries, plus the dispatch logic that walks staged entries in
//! submission order, glues flagged groups together, and hands each group to
//! its target device. Capacities are fixed at construction; nothing in the
//! engine grows and nothing on the submission path blocks.
//!
//! Contexts are self-contained, so independent instances can run in
//! parallel (one per test, one per subsystem) without shared state.

pub mod cqe;
pub(crate) mod pool;
pub mod sqe;

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use smallvec::SmallVec;
use tracing::instrument;

pub use cqe::Cqe;
pub use sqe::{Op, SqeFlags, SqeRef, TINY_TX_MAX};

use self::cqe::CqShared;
use self::pool::{lock, IndexPool};
use self::sqe::StagedSqe;
use crate::error::{Result, EINVAL};
use crate::iodev::{Completer, GroupKind, IoDev, SubmitGroup, SubmitLink};

/// Pool capacities for a context. Fixed for the context's lifetime.
#[derive(Debug, Clone, Copy)]
pub struct RtioConfig {
    /// Number of submission entry slots.
    pub sqe_capacity: usize,
    /// Number of completion entry slots.
    pub cqe_capacity: usize,
}

impl Default for RtioConfig {
    fn default() -> Self {
        Self {
            sqe_capacity: 8,
            cqe_capacity: 8,
        }
    }
}

/// A submission/completion context.
pub struct Rtio {
    pub(crate) sqe_slots: Arc<IndexPool>,
    pub(crate) cq: Arc<CqShared>,
    pub(crate) staging: Mutex<Vec<StagedSqe>>,
}

impl Rtio {
    pub fn new(config: RtioConfig) -> Self {
        let sqe_slots = Arc::new(IndexPool::new(config.sqe_capacity));
        let cq = Arc::new(CqShared::new(config.cqe_capacity, Arc::clone(&sqe_slots)));
        Self {
            sqe_slots,
            cq,
            staging: Mutex::new(Vec::with_capacity(config.sqe_capacity)),
        }
    }

    /// Borrow a submission entry from the pool and stage it.
    ///
    /// Returns `None` when the pool is exhausted; never blocks, so it is
    /// safe to call from contexts that must not suspend. The slot is
    /// recycled when the entry's completion is released (or immediately at
    /// completion time for no-reply entries).
    pub fn acquire_sqe(&self) -> Option<SqeRef<'_>> {
        let slot = self.sqe_slots.try_acquire()?;
        lock(&self.staging).push(StagedSqe {
            slot,
            op: Op::Nop,
            iodev: None,
            prio: 0,
            flags: SqeFlags::empty(),
            userdata: 0,
        });
        Some(SqeRef { rtio: self, slot })
    }

    /// Dispatch everything staged since the last submit, in submission
    /// order, then optionally wait for `wait_count` new completions.
    ///
    /// Returns the number of entries dispatched. Entries glued with
    /// `TRANSACTION` or `CHAINED` are delivered to their device as one
    /// group; a group whose links disagree on the target device (or lack
    /// one) is completed wholesale with [`EINVAL`] and never reaches a
    /// driver.
    #[instrument(skip_all, level = "trace")]
    pub fn submit(&self, wait_count: usize) -> usize {
        let staged: Vec<StagedSqe> = lock(&self.staging).drain(..).collect();
        let before = self.cq.completed();
        let dispatched = staged.len();

        let mut links: SmallVec<[StagedSqe; 2]> = SmallVec::new();
        let mut kind = GroupKind::Single;

        for entry in staged {
            if links.is_empty() && matches!(entry.op, Op::Callback { .. }) {
                // Engine-executed; glue flags on a callback are ignored.
                if let Op::Callback { f } = entry.op {
                    f();
                }
                self.cq
                    .post(entry.slot, entry.flags, entry.userdata, 0, Bytes::new());
                continue;
            }

            let glue = entry.flags & (SqeFlags::TRANSACTION | SqeFlags::CHAINED);
            if kind == GroupKind::Single && !glue.is_empty() {
                kind = if glue.contains(SqeFlags::TRANSACTION) {
                    GroupKind::Transaction
                } else {
                    GroupKind::Chain
                };
            }

            links.push(entry);
            if glue.is_empty() {
                self.flush_group(std::mem::take(&mut links), kind);
                kind = GroupKind::Single;
            }
        }

        // A trailing glue flag still terminates the batch.
        if !links.is_empty() {
            self.flush_group(links, kind);
        }

        if wait_count > 0 {
            self.cq.wait_completed(before + wait_count as u64);
        }
        dispatched
    }

    fn flush_group(&self, links: SmallVec<[StagedSqe; 2]>, kind: GroupKind) {
        let first_dev = links.first().and_then(|l| l.iodev.clone());
        let coherent = match &first_dev {
            Some(dev) => links
                .iter()
                .all(|l| l.iodev.as_ref().is_some_and(|d| Arc::ptr_eq(d, dev))),
            None => false,
        };

        let Some(dev) = first_dev.filter(|_| coherent) else {
            for l in links {
                self.cq
                    .post(l.slot, l.flags, l.userdata, EINVAL, Bytes::new());
            }
            return;
        };

        let group = SubmitGroup {
            kind,
            links: links
                .into_iter()
                .map(|l| SubmitLink {
                    slot: l.slot,
                    op: l.op,
                    prio: l.prio,
                    flags: l.flags,
                    userdata: l.userdata,
                })
                .collect(),
        };

        dev.submit(group, Completer::new(Arc::clone(&self.cq)));
    }

    /// Pop the oldest completion, suspending until one is available.
    #[instrument(skip_all, level = "trace")]
    pub fn consume_cqe(&self) -> Cqe {
        self.cq.consume()
    }

    /// Pop the oldest completion, or `None` if nothing is ready.
    pub fn try_consume_cqe(&self) -> Option<Cqe> {
        self.cq.try_consume()
    }

    /// Return a consumed completion (and its submission slot) to the pools.
    pub fn release_cqe(&self, cqe: Cqe) -> Result<()> {
        cqe.release()
    }

    /// Discard every staged, not-yet-dispatched entry. Test/teardown use.
    pub fn drop_all_sqe(&self) {
        let staged: Vec<StagedSqe> = lock(&self.staging).drain(..).collect();
        for entry in staged {
            let _ = self.sqe_slots.release(entry.slot);
        }
    }

    /// Number of completions dropped because the completion pool was full.
    pub fn completion_overflows(&self) -> u64 {
        self.cq.overflows()
    }
}
