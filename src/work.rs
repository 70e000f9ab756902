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

//! Bounded work-queue executor for devices wrapping blocking drivers.
//!
//! A [`WorkPool`] owns a fixed number of work-item permits and a set of
//! worker threads. Reserving a permit never blocks: a device that cannot
//! get one reports the failure as a completion instead of stalling the
//! submitter. The permit rides inside the dispatched job and is returned
//! to the pool when the job finishes, so in-flight work is bounded by the
//! permit count no matter how many devices share the pool.

use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{unbounded, Sender};
use log::warn;
use tracing::instrument;

use crate::error::{Result, RtioError};
use crate::queue::pool::{IndexPool, SlotToken};

type Job = Box<dyn FnOnce() + Send>;

/// A reserved work item. Returned to the pool on drop, so a job that
/// panics still frees its permit when the closure is unwound.
pub struct WorkPermit {
    permits: Arc<IndexPool>,
    slot: Option<SlotToken>,
}

impl Drop for WorkPermit {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            let _ = self.permits.release(slot);
        }
    }
}

/// A fixed-size pool of work items serviced by dedicated worker threads.
pub struct WorkPool {
    permits: Arc<IndexPool>,
    tx: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkPool {
    /// Create a pool with `items` work-item permits serviced by `workers`
    /// threads.
    pub fn new(items: usize, workers: usize) -> Self {
        let (tx, rx) = unbounded::<Job>();
        let handles = (0..workers)
            .map(|i| {
                let rx = rx.clone();
                std::thread::Builder::new()
                    .name(format!("rtio-work-{i}"))
                    .spawn(move || {
                        while let Ok(job) = rx.recv() {
                            job();
                        }
                    })
            })
            .filter_map(|h| match h {
                Ok(h) => Some(h),
                Err(e) => {
                    warn!("failed to spawn worker thread: {e}");
                    None
                }
            })
            .collect();

        Self {
            permits: Arc::new(IndexPool::new(items)),
            tx: Some(tx),
            workers: handles,
        }
    }

    /// Reserve a work item without blocking. Fails with
    /// [`RtioError::WorkPoolExhausted`] when every permit is in flight.
    pub fn try_reserve(&self) -> Result<WorkPermit> {
        let slot = self
            .permits
            .try_acquire()
            .ok_or(RtioError::WorkPoolExhausted)?;
        Ok(WorkPermit {
            permits: Arc::clone(&self.permits),
            slot: Some(slot),
        })
    }

    /// Hand a job to the workers. The permit is released when the job
    /// returns.
    #[instrument(skip_all, level = "trace")]
    pub fn dispatch(&self, permit: WorkPermit, job: impl FnOnce() + Send + 'static) {
        let wrapped: Job = Box::new(move || {
            job();
            drop(permit);
        });

        match &self.tx {
            Some(tx) => {
                // The channel only closes during teardown; finish the job
                // on the caller so its completions are still posted.
                if let Err(e) = tx.send(wrapped) {
                    (e.0)();
                }
            }
            None => wrapped(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.permits.capacity()
    }

    /// Number of permits currently riding in dispatched jobs.
    pub fn in_flight(&self) -> usize {
        self.permits.capacity() - self.permits.free_count()
    }
}

impl Drop for WorkPool {
    fn drop(&mut self) {
        // Closing the channel lets workers drain what is queued and exit.
        drop(self.tx.take());
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}
