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

//! Adaptation layer for blocking I2C drivers.
//!
//! [`I2cFallbackDev`] turns a synchronous [`I2cBus`] into an [`IoDev`]: each
//! dispatched group is translated into driver message sequences and executed
//! on a [`WorkPool`] worker, so a slow bus never stalls the submitter. When
//! the pool has no free work item the whole group completes immediately with
//! [`ENOMEM`], in keeping with the engine's fail-fast admission rule.

use std::sync::Arc;

use bitflags::bitflags;
use bytes::Bytes;
use log::debug;

use crate::error::{EIO, ENOMEM};
use crate::iodev::{Completer, GroupKind, IoDev, SubmitGroup};
use crate::queue::sqe::Op;
use crate::work::WorkPool;

bitflags! {
    /// Per-message I2C transfer flags. A message without `READ` is a write.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct I2cMsgFlags: u8 {
        /// Transfer direction: device to controller.
        const READ = 1 << 0;
        /// Issue a stop condition after this message.
        const STOP = 1 << 1;
        /// Issue a repeated start before this message, keeping the bus
        /// held since the previous one.
        const RESTART = 1 << 2;
    }
}

/// One message of an I2C transfer.
///
/// For writes `data` is the payload to send; for reads it is a scratch
/// buffer the driver fills, sized to the requested length.
#[derive(Debug)]
pub struct I2cMsg {
    pub data: Vec<u8>,
    pub flags: I2cMsgFlags,
}

impl I2cMsg {
    /// A read message for `len` bytes.
    pub fn read(len: usize) -> Self {
        Self {
            data: vec![0; len],
            flags: I2cMsgFlags::READ,
        }
    }

    /// A write message carrying a copy of `payload`.
    pub fn write(payload: &[u8]) -> Self {
        Self {
            data: payload.to_vec(),
            flags: I2cMsgFlags::empty(),
        }
    }

    fn with(mut self, extra: I2cMsgFlags) -> Self {
        self.flags |= extra;
        self
    }
}

/// A blocking I2C bus driver.
///
/// `transfer` executes the message sequence against the target address as
/// one bus transaction and may block for its duration. Failures are
/// reported as a negative errno-style code, which the adaptation layer
/// propagates verbatim into the completion.
pub trait I2cBus: Send + Sync {
    fn transfer(&self, addr: u16, msgs: &mut [I2cMsg]) -> core::result::Result<(), i32>;
}

/// An I/O device backed by a blocking I2C bus, executing via a work pool.
pub struct I2cFallbackDev {
    bus: Arc<dyn I2cBus>,
    addr: u16,
    pool: Arc<WorkPool>,
}

impl I2cFallbackDev {
    pub fn new(bus: Arc<dyn I2cBus>, addr: u16, pool: Arc<WorkPool>) -> Self {
        Self { bus, addr, pool }
    }
}

impl IoDev for I2cFallbackDev {
    fn submit(&self, group: SubmitGroup, completer: Completer) {
        let Ok(permit) = self.pool.try_reserve() else {
            completer.complete_group(group, ENOMEM);
            return;
        };

        let bus = Arc::clone(&self.bus);
        let addr = self.addr;
        self.pool.dispatch(permit, move || {
            run_group(bus.as_ref(), addr, group, &completer);
        });
    }
}

fn run_group(bus: &dyn I2cBus, addr: u16, group: SubmitGroup, completer: &Completer) {
    let kind: GroupKind = group.kind;
    let mut failed: Option<i32> = None;

    for link in group.links {
        if let Some(err) = failed {
            completer.complete(link, kind.padding_for(err), Bytes::new());
            continue;
        }
        match exec_link(bus, addr, &link.op) {
            Ok(data) => completer.complete(link, 0, data),
            Err(err) => {
                debug!("i2c transfer failed on addr {addr:#x}: {err}");
                failed = Some(err);
                completer.complete(link, err, Bytes::new());
            }
        }
    }
}

/// Execute one link against the bus. Returns the read-back bytes on
/// success (empty for writes) or the driver's error code.
fn exec_link(bus: &dyn I2cBus, addr: u16, op: &Op) -> core::result::Result<Bytes, i32> {
    match op {
        Op::Rx { cap } => {
            let mut msgs = [I2cMsg::read(*cap).with(I2cMsgFlags::STOP)];
            bus.transfer(addr, &mut msgs)?;
            let [msg] = msgs;
            Ok(Bytes::from(msg.data))
        }
        Op::Tx { data } => {
            let mut msgs = [I2cMsg::write(data).with(I2cMsgFlags::STOP)];
            bus.transfer(addr, &mut msgs)?;
            Ok(Bytes::new())
        }
        Op::TinyTx { data } => {
            let mut msgs = [I2cMsg::write(data).with(I2cMsgFlags::STOP)];
            bus.transfer(addr, &mut msgs)?;
            Ok(Bytes::new())
        }
        Op::Txrx { data } => {
            // Write then read under one bus hold: no stop after the write,
            // repeated start before the read.
            let mut msgs = [
                I2cMsg::write(data),
                I2cMsg::read(data.len()).with(I2cMsgFlags::RESTART | I2cMsgFlags::STOP),
            ];
            bus.transfer(addr, &mut msgs)?;
            let [_, rx] = msgs;
            Ok(Bytes::from(rx.data))
        }
        // Nothing this bus recognizes; never reaches the driver.
        Op::Nop | Op::Callback { .. } => Err(EIO),
    }
}
