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

//! Error types and completion status codes.
//!
//! Two distinct error surfaces exist:
//!
//! - [`RtioError`] reports structural/API misuse to the immediate caller
//!   (pool exhaustion at acquire time, stale slot handles, oversized inline
//!   payloads). These never travel through the completion queue.
//! - Completion status codes are raw `i32` values carried in the `result`
//!   field of every completion entry: `0` for success, a negative
//!   errno-style code otherwise. Driver transfer status is propagated
//!   verbatim, so the constants below only name the codes the engine itself
//!   produces.

use thiserror::Error;

/// Out of resources: no free work item or completion slot.
pub const ENOMEM: i32 = -12;
/// I/O error: an operation the target device does not recognize.
pub const EIO: i32 = -5;
/// Invalid submission: malformed group or missing target device.
pub const EINVAL: i32 = -22;
/// A link was skipped because an earlier link of its chain failed.
pub const ECANCELED: i32 = -125;

/// The error type for submission-side operations.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RtioError {
    /// A slot handle no longer matches the pool's generation counter,
    /// typically because it was already released.
    #[error("slot {0} is stale or already released")]
    StaleSlot(usize),

    /// The fallback work-item pool has no free slots.
    #[error("work item pool exhausted")]
    WorkPoolExhausted,

    /// An inline write payload does not fit the fixed inline capacity.
    #[error("tiny write payload of {0} bytes exceeds inline capacity")]
    TinyWriteTooLarge(usize),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = core::result::Result<T, RtioError>;
