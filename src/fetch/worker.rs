//! Worker Roster
//!
//! Long-lived fetch workers shared by every request. A request borrows a
//! group of idle workers, feeds them jobs, and hands the group back when done.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, OwnedSemaphorePermit, Semaphore};

use super::memory::MemoryReservation;
use super::{HydratedFile, ObjectStore};
use crate::error::{Result, SeisError};

/// One object fetch assigned to a worker
pub(crate) struct Job {
    pub bucket: Arc<str>,
    pub version: Option<Arc<str>>,
    pub key: String,
    /// Chunks for this object; released as soon as the fetch completes
    pub memory: MemoryReservation,
    /// Output slot whose receiver already sits in the reception queue
    pub output: oneshot::Sender<HydratedFile>,
    /// Where to announce that this worker is free again
    pub ready: mpsc::UnboundedSender<usize>,
    /// Position of the worker within its borrowing group
    pub slot: usize,
}

/// Input side of one worker task
#[derive(Debug, Clone)]
pub(crate) struct WorkerHandle {
    pub id: usize,
    jobs: mpsc::Sender<Job>,
}

impl WorkerHandle {
    /// Hand a job to this worker; gives the job back if the worker is gone
    pub async fn assign(&self, job: Job) -> std::result::Result<(), Job> {
        self.jobs.send(job).await.map_err(|e| e.0)
    }
}

/// All workers of one fetcher plus a count of the idle ones
pub(crate) struct WorkerRoster {
    idle: Mutex<Vec<WorkerHandle>>,
    available: Arc<Semaphore>,
    size: usize,
}

impl WorkerRoster {
    /// Spawn `count` workers reading from `store`
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(store: Arc<dyn ObjectStore>, count: usize) -> Arc<Self> {
        let count = count.max(1);
        let mut handles = Vec::with_capacity(count);
        for id in 0..count {
            let (tx, rx) = mpsc::channel(1);
            tokio::spawn(run_worker(id, Arc::clone(&store), rx));
            handles.push(WorkerHandle { id, jobs: tx });
        }
        tracing::debug!(workers = count, "fetch worker roster started");

        Arc::new(Self {
            idle: Mutex::new(handles),
            available: Arc::new(Semaphore::new(count)),
            size: count,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn idle(&self) -> usize {
        self.available.available_permits()
    }

    /// Wait for `count` idle workers and take them
    pub async fn borrow(self: &Arc<Self>, count: usize) -> Result<WorkerGroup> {
        let count = count.clamp(1, self.size);
        let permit = Arc::clone(&self.available)
            .acquire_many_owned(count as u32)
            .await
            .map_err(|_| SeisError::Storage("worker roster closed".into()))?;

        let workers = {
            let mut idle = self.idle.lock();
            let split_at = idle.len().saturating_sub(count);
            idle.split_off(split_at)
        };

        Ok(WorkerGroup {
            roster: Arc::clone(self),
            workers,
            _permit: permit,
        })
    }
}

/// Workers borrowed by one request; returned to the roster on drop
pub(crate) struct WorkerGroup {
    roster: Arc<WorkerRoster>,
    workers: Vec<WorkerHandle>,
    // Released after `Drop::drop` has pushed the handles back
    _permit: OwnedSemaphorePermit,
}

impl WorkerGroup {
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn worker(&self, slot: usize) -> &WorkerHandle {
        &self.workers[slot]
    }
}

impl Drop for WorkerGroup {
    fn drop(&mut self) {
        let returned = std::mem::take(&mut self.workers);
        self.roster.idle.lock().extend(returned);
    }
}

async fn run_worker(id: usize, store: Arc<dyn ObjectStore>, mut jobs: mpsc::Receiver<Job>) {
    while let Some(job) = jobs.recv().await {
        let Job {
            bucket,
            version,
            key,
            memory,
            output,
            ready,
            slot,
        } = job;

        let data = store.get_object(&bucket, version.as_deref(), &key).await;
        if let Err(e) = &data {
            tracing::debug!(worker = id, key = %key, error = %e, "object fetch failed");
        }

        // Step 1: give the chunks back
        drop(memory);
        // Step 2: publish the result into its reserved place in line
        let _ = output.send(HydratedFile { key, data });
        // Step 3: tell the group this worker is free
        let _ = ready.send(slot);
    }
    tracing::trace!(worker = id, "fetch worker stopped");
}
