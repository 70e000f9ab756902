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

#![cfg_attr(not(any(test, debug_assertions)), warn(clippy::panic))]
#![cfg_attr(not(any(test, debug_assertions)), warn(clippy::expect_used))]
#![cfg_attr(not(any(test, debug_assertions)), warn(clippy::unwrap_used))]

//! An asynchronous submission/completion engine for device I/O, built
//! around two fixed pools: callers borrow submission entries, shape them
//! with `prep_*` builders, and submit batches to polymorphic devices; each
//! finished operation surfaces as a completion entry carrying a result
//! code, the caller's correlation value, and any read-back data.
//!
//! Entries can be glued into transactions (one atomic multi-part request)
//! or chains (run the next link only if this one succeeded). Devices that
//! wrap blocking drivers borrow a bounded work item per request; when none
//! is free the request fails fast with [`ENOMEM`] instead of blocking the
//! submitter. [`i2c`] provides such an adaptation for synchronous I2C
//! buses.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use rtio::{I2cFallbackDev, IoDev, Rtio, RtioConfig, WorkPool};
//! # let bus: Arc<dyn rtio::I2cBus> = unimplemented!();
//!
//! let pool = Arc::new(WorkPool::new(2, 2));
//! let dev: Arc<dyn IoDev> = Arc::new(I2cFallbackDev::new(bus, 0x48, pool));
//! let rtio = Rtio::new(RtioConfig::default());
//!
//! let mut sqe = rtio.acquire_sqe().unwrap();
//! sqe.prep_read(&dev, 0, 4, 0x1234).unwrap();
//! rtio.submit(1);
//!
//! let cqe = rtio.consume_cqe();
//! assert_eq!(cqe.result(), 0);
//! assert_eq!(cqe.userdata(), 0x1234);
//! ```

pub mod error;
pub mod i2c;
pub mod iodev;
pub mod queue;
pub mod work;

pub use error::{RtioError, ECANCELED, EINVAL, EIO, ENOMEM};
pub use i2c::{I2cBus, I2cFallbackDev, I2cMsg, I2cMsgFlags};
pub use iodev::{Completer, GroupKind, IoDev, SubmitGroup, SubmitLink};
pub use queue::{Cqe, Op, Rtio, RtioConfig, SqeFlags, SqeRef, TINY_TX_MAX};
pub use work::{WorkPermit, WorkPool};
