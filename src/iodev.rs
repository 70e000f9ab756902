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

//! Polymorphic I/O targets and the completion interface handed to them.
//!
//! A device is anything with a [`submit`](IoDev::submit) entry point. The
//! dispatcher delivers one [`SubmitGroup`] per logical request: either a
//! single entry or every link of a glued transaction/chain, in submission
//! order. Devices that complete in place (native-async hardware queues) call
//! the [`Completer`] before returning; devices wrapping a blocking driver
//! hand the group to the fallback executor and complete from a worker.

use std::sync::Arc;

use bytes::Bytes;
use smallvec::SmallVec;

use crate::error::ECANCELED;
use crate::queue::cqe::CqShared;
use crate::queue::pool::SlotToken;
use crate::queue::sqe::{Op, SqeFlags};

/// How the links of a [`SubmitGroup`] relate to each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKind {
    /// A single ungrouped entry.
    Single,
    /// One atomic multi-part operation. A failing link's status pads the
    /// completions of every unexecuted link.
    Transaction,
    /// Sequential links where each runs only after its predecessor
    /// succeeds. Unexecuted links complete with [`ECANCELED`].
    Chain,
}

impl GroupKind {
    /// Completion status for links skipped after `err` stopped the group.
    pub fn padding_for(&self, err: i32) -> i32 {
        match self {
            GroupKind::Chain => ECANCELED,
            _ => err,
        }
    }
}

/// One submission entry as delivered to a device.
pub struct SubmitLink {
    pub(crate) slot: SlotToken,
    pub op: Op,
    pub prio: u8,
    pub flags: SqeFlags,
    pub userdata: u64,
}

/// A logical request: one entry, or all links of a glued group, for a
/// single device.
pub struct SubmitGroup {
    pub kind: GroupKind,
    pub links: SmallVec<[SubmitLink; 2]>,
}

/// An addressable I/O target owning a submit handler.
pub trait IoDev: Send + Sync {
    /// Take ownership of a request. The implementation must eventually
    /// complete every link through `completer`, in link order, from
    /// whatever context suits it. It must not block the caller waiting for
    /// a resource; admission failures are reported as completions.
    fn submit(&self, group: SubmitGroup, completer: Completer);
}

/// Posts completions for the links of one dispatched group.
pub struct Completer {
    cq: Arc<CqShared>,
}

impl Completer {
    pub(crate) fn new(cq: Arc<CqShared>) -> Self {
        Self { cq }
    }

    /// Complete one link. `data` carries device-produced bytes for reads
    /// and is empty otherwise. Consuming the link makes a second completion
    /// for it unrepresentable.
    pub fn complete(&self, link: SubmitLink, result: i32, data: Bytes) {
        self.cq
            .post(link.slot, link.flags, link.userdata, result, data);
    }

    /// Complete every remaining link of a group with the same status, e.g.
    /// on admission failure before any link ran.
    pub fn complete_group(&self, group: SubmitGroup, result: i32) {
        for link in group.links {
            self.complete(link, result, Bytes::new());
        }
    }
}
