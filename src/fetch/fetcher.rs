//! Concurrent Fetcher
//!
//! Entry point of the fetch module: reserve, borrow, dispatch, drain.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use super::memory::{MemoryPool, MemoryReservation};
use super::worker::{Job, WorkerGroup, WorkerRoster};
use super::{FetchConfig, HydratedFile, ObjectRequest, ObjectStore};
use crate::error::{Result, SeisError};

/// Output slot receivers in request order
type ReceptionQueue = mpsc::UnboundedSender<(String, oneshot::Receiver<HydratedFile>)>;

/// Ordered, bounded object hydration shared by every request
///
/// Construct once per process and share by `Arc`; the worker roster and the
/// memory pool live inside.
pub struct ConcurrentFetcher {
    config: FetchConfig,
    memory: MemoryPool,
    roster: Arc<WorkerRoster>,
}

impl ConcurrentFetcher {
    /// Spawn the worker roster; must be called from within a tokio runtime
    pub fn new(store: Arc<dyn ObjectStore>, config: FetchConfig) -> Self {
        let memory = MemoryPool::new(config.chunk_size(), config.max_workers);
        let roster = WorkerRoster::spawn(store, config.max_workers);
        tracing::info!(
            workers = config.max_workers,
            per_request = config.max_workers_per_request,
            chunk_size = memory.chunk_size(),
            "concurrent fetcher ready"
        );
        Self {
            config,
            memory,
            roster,
        }
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    pub fn memory(&self) -> &MemoryPool {
        &self.memory
    }

    /// Workers not currently borrowed by any request
    pub fn idle_workers(&self) -> usize {
        self.roster.idle()
    }

    /// Hydrate `requests`, delivering one [`HydratedFile`] per request in order
    ///
    /// Returns once memory and workers are secured; results then stream
    /// through the receiver, which closes after the last one. Per-object
    /// failures are carried inside each file. Cancelling `cancel` stops new
    /// assignments; jobs already assigned still complete and are delivered.
    pub async fn get_all_concurrently(
        &self,
        bucket: &str,
        version: Option<&str>,
        requests: Vec<ObjectRequest>,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<HydratedFile>> {
        let (output, receiver) = mpsc::channel(self.config.max_workers_per_request.max(1));
        if requests.is_empty() {
            return Ok(receiver);
        }

        // Step 1: reject what could never fit
        let needed: u64 = requests
            .iter()
            .map(|r| self.memory.chunks_for(r.size))
            .sum();
        if needed > self.memory.total_chunks() {
            return Err(SeisError::CapacityExceeded {
                what: "memory chunks",
                found: needed,
                limit: self.memory.total_chunks(),
            });
        }

        // Step 2: reserve memory for the whole request
        let memory = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SeisError::Cancelled),
            reserved = self.memory.reserve(needed) => reserved?,
        };

        // Step 3: borrow workers
        let wanted = self.config.max_workers_per_request.min(requests.len());
        let group = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SeisError::Cancelled),
            borrowed = self.roster.borrow(wanted) => borrowed?,
        };

        tracing::debug!(
            objects = requests.len(),
            chunks = needed,
            workers = group.len(),
            "hydration started"
        );

        // Step 4: dispatch in order, drain in order
        let (reception, queued) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher {
            group,
            memory,
            pool: self.memory.clone(),
            bucket: Arc::from(bucket),
            version: version.map(Arc::from),
            reception,
            cancel,
        };
        tokio::spawn(dispatcher.run(requests));
        tokio::spawn(drain(queued, output));

        Ok(receiver)
    }
}

/// Per-request assignment loop
struct Dispatcher {
    group: WorkerGroup,
    memory: MemoryReservation,
    pool: MemoryPool,
    bucket: Arc<str>,
    version: Option<Arc<str>>,
    reception: ReceptionQueue,
    cancel: CancellationToken,
}

impl Dispatcher {
    async fn run(mut self, requests: Vec<ObjectRequest>) {
        let group_size = self.group.len();
        let (ready_tx, mut ready_rx) = mpsc::unbounded_channel();
        for slot in 0..group_size {
            let _ = ready_tx.send(slot);
        }
        let mut idle = group_size;
        let mut assigned = 0usize;

        for request in requests {
            let slot = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    tracing::debug!(assigned, "hydration cancelled, no further assignments");
                    break;
                }
                slot = ready_rx.recv() => match slot {
                    Some(slot) => slot,
                    None => break,
                },
            };
            idle -= 1;

            let (output, slot_rx) = oneshot::channel();
            if self.reception.send((request.key.clone(), slot_rx)).is_err() {
                // Caller dropped the receiver; nobody is listening
                let _ = ready_tx.send(slot);
                break;
            }

            let job = Job {
                bucket: Arc::clone(&self.bucket),
                version: self.version.clone(),
                memory: self.memory.split(self.pool.chunks_for(request.size)),
                key: request.key,
                output,
                ready: ready_tx.clone(),
                slot,
            };
            if let Err(job) = self.group.worker(slot).assign(job).await {
                let worker = self.group.worker(slot).id;
                tracing::warn!(worker, key = %job.key, "fetch worker unavailable");
                let _ = job.output.send(HydratedFile {
                    data: Err(SeisError::Storage(format!("fetch worker {} unavailable", worker))),
                    key: job.key,
                });
                let _ = ready_tx.send(slot);
            }
            assigned += 1;
        }

        // No more slots will be queued; the drainer finishes what is there
        drop(self.reception);
        drop(ready_tx);

        // Hold the group until every assigned job has reported back
        while idle < group_size {
            match ready_rx.recv().await {
                Some(_) => idle += 1,
                None => break,
            }
        }

        tracing::debug!(assigned, "hydration dispatch finished, workers returned");
        // Dropping `self` returns the group and any unused chunks
    }
}

/// Forward output slots to the caller strictly in queue order
async fn drain(
    mut queued: mpsc::UnboundedReceiver<(String, oneshot::Receiver<HydratedFile>)>,
    output: mpsc::Sender<HydratedFile>,
) {
    while let Some((key, slot)) = queued.recv().await {
        let file = match slot.await {
            Ok(file) => file,
            Err(_) => HydratedFile {
                key,
                data: Err(SeisError::Storage("fetch job dropped before completing".into())),
            },
        };
        if output.send(file).await.is_err() {
            break;
        }
    }
}
