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

//! Submission queue entries and their preparation API.
//!
//! An entry is borrowed from the context with [`Rtio::acquire_sqe`], shaped
//! with one of the `prep_*` builders, optionally flagged to glue it to the
//! following entry, and made visible to the dispatcher with
//! [`Rtio::submit`]. Write payloads are handed over as owned [`Bytes`] and
//! read results come back inside the completion entry, so no submitted
//! buffer is ever shared between the caller and a worker.
//!
//! [`Rtio::acquire_sqe`]: super::Rtio::acquire_sqe
//! [`Rtio::submit`]: super::Rtio::submit

use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;
use bytes::Bytes;
use smallvec::SmallVec;

use super::pool::{lock, SlotToken};
use super::Rtio;
use crate::error::{Result, RtioError};
use crate::iodev::IoDev;

/// Maximum payload of a tiny write, stored inline in the entry itself so the
/// caller has no buffer lifetime to manage.
pub const TINY_TX_MAX: usize = 8;

bitflags! {
    /// Submission entry flags.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct SqeFlags: u8 {
        /// The next entry is part of the same atomic multi-part operation.
        /// The whole group is delivered to the device in one request and,
        /// on a fallback device, executes inside a single work item.
        const TRANSACTION = 1 << 0;
        /// The next entry runs only after this one succeeds. Unlike
        /// `TRANSACTION` the links are independent driver calls; a failure
        /// cancels the remainder.
        const CHAINED = 1 << 1;
        /// Do not produce a completion entry for this link. Its slot is
        /// recycled as soon as the link finishes.
        const NO_REPLY = 1 << 2;
    }
}

/// One I/O operation, as described by a submission entry.
pub enum Op {
    /// No device action. A device that receives one (rather than the engine
    /// short-circuiting it) reports it as unrecognized.
    Nop,
    /// Read up to `cap` bytes from the device. The data arrives in the
    /// completion entry.
    Rx { cap: usize },
    /// Write the payload to the device.
    Tx { data: Bytes },
    /// Write a payload small enough to live inline in the entry.
    TinyTx { data: SmallVec<[u8; TINY_TX_MAX]> },
    /// Combined write-then-read in one bus transaction: the bus is held
    /// between the halves and the read half returns `data.len()` bytes.
    Txrx { data: Bytes },
    /// Run a closure on the engine and post a successful completion. Never
    /// delivered to a device.
    Callback { f: Box<dyn FnOnce() + Send> },
}

impl fmt::Debug for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::Nop => write!(f, "Nop"),
            Op::Rx { cap } => f.debug_struct("Rx").field("cap", cap).finish(),
            Op::Tx { data } => f.debug_struct("Tx").field("len", &data.len()).finish(),
            Op::TinyTx { data } => f.debug_struct("TinyTx").field("len", &data.len()).finish(),
            Op::Txrx { data } => f.debug_struct("Txrx").field("len", &data.len()).finish(),
            Op::Callback { .. } => write!(f, "Callback"),
        }
    }
}

/// A prepared-but-not-yet-dispatched entry, staged inside the context.
pub(crate) struct StagedSqe {
    pub(crate) slot: SlotToken,
    pub(crate) op: Op,
    pub(crate) iodev: Option<Arc<dyn IoDev>>,
    pub(crate) prio: u8,
    pub(crate) flags: SqeFlags,
    pub(crate) userdata: u64,
}

/// A handle to a staged submission entry.
///
/// The handle stays valid until the next [`Rtio::submit`] or
/// [`Rtio::drop_all_sqe`] on the owning context; preparation through a
/// handle that outlived its entry fails with [`RtioError::StaleSlot`].
///
/// [`Rtio::drop_all_sqe`]: super::Rtio::drop_all_sqe
pub struct SqeRef<'r> {
    pub(crate) rtio: &'r Rtio,
    pub(crate) slot: SlotToken,
}

impl SqeRef<'_> {
    fn with_entry<R>(&mut self, f: impl FnOnce(&mut StagedSqe) -> R) -> Result<R> {
        let mut staging = lock(&self.rtio.staging);
        let entry = staging
            .iter_mut()
            .find(|e| e.slot == self.slot)
            .ok_or(RtioError::StaleSlot(self.slot.index as usize))?;
        Ok(f(entry))
    }

    fn prep(&mut self, iodev: &Arc<dyn IoDev>, prio: u8, op: Op, userdata: u64) -> Result<()> {
        let iodev = Arc::clone(iodev);
        self.with_entry(|e| {
            e.op = op;
            e.iodev = Some(iodev);
            e.prio = prio;
            e.flags = SqeFlags::empty();
            e.userdata = userdata;
        })
    }

    /// Configure this entry as a no-op against `iodev`.
    pub fn prep_nop(&mut self, iodev: &Arc<dyn IoDev>, userdata: u64) -> Result<()> {
        self.prep(iodev, 0, Op::Nop, userdata)
    }

    /// Configure this entry as a read of up to `cap` bytes.
    pub fn prep_read(
        &mut self,
        iodev: &Arc<dyn IoDev>,
        prio: u8,
        cap: usize,
        userdata: u64,
    ) -> Result<()> {
        self.prep(iodev, prio, Op::Rx { cap }, userdata)
    }

    /// Configure this entry as a write of `data`.
    pub fn prep_write(
        &mut self,
        iodev: &Arc<dyn IoDev>,
        prio: u8,
        data: impl Into<Bytes>,
        userdata: u64,
    ) -> Result<()> {
        self.prep(iodev, prio, Op::Tx { data: data.into() }, userdata)
    }

    /// Configure this entry as a write whose payload is copied inline.
    /// Fails with [`RtioError::TinyWriteTooLarge`] beyond [`TINY_TX_MAX`]
    /// bytes.
    pub fn prep_tiny_write(
        &mut self,
        iodev: &Arc<dyn IoDev>,
        prio: u8,
        data: &[u8],
        userdata: u64,
    ) -> Result<()> {
        if data.len() > TINY_TX_MAX {
            return Err(RtioError::TinyWriteTooLarge(data.len()));
        }
        let data = SmallVec::from_slice(data);
        self.prep(iodev, prio, Op::TinyTx { data }, userdata)
    }

    /// Configure this entry as a combined write-then-read. The read half
    /// returns as many bytes as were written and arrives in the completion
    /// entry's data.
    pub fn prep_transceive(
        &mut self,
        iodev: &Arc<dyn IoDev>,
        prio: u8,
        tx: impl Into<Bytes>,
        userdata: u64,
    ) -> Result<()> {
        self.prep(iodev, prio, Op::Txrx { data: tx.into() }, userdata)
    }

    /// Configure this entry to run `f` on the engine during dispatch.
    pub fn prep_callback(
        &mut self,
        f: impl FnOnce() + Send + 'static,
        userdata: u64,
    ) -> Result<()> {
        self.with_entry(|e| {
            e.op = Op::Callback { f: Box::new(f) };
            e.iodev = None;
            e.prio = 0;
            e.flags = SqeFlags::empty();
            e.userdata = userdata;
        })
    }

    /// Or additional flags into the entry. Call after the `prep_*` builder,
    /// which resets flags.
    pub fn or_flags(&mut self, flags: SqeFlags) -> Result<()> {
        self.with_entry(|e| e.flags |= flags)
    }
}
