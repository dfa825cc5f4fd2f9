//! Fixed-size async worker pool with per-key in-flight deduplication.
//!
//! - `W` workers share one bounded queue; submission waits while the queue
//!   is full (back-pressure) and never drops an accepted job.
//! - A key stays in the in-flight set from submission until its job has
//!   finished, whatever the outcome. Submitting a key that is already queued
//!   or running is a silent no-op.
//! - Handler errors and panics are logged and counted, never retried here.
//! - [`WorkerPool::shutdown`] stops intake, drains the queue and waits for
//!   every worker to finish its current job.

use crate::{EngineError, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::fmt::Display;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;

/// Processes one job. Implementations may run in parallel with themselves.
#[async_trait]
pub trait JobHandler<K, P>: Send + Sync + 'static {
    async fn handle(&self, key: &K, payload: P) -> Result<()>;
}

/// Snapshot of pool counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub submitted: u64,
    pub deduplicated: u64,
    pub succeeded: u64,
    pub failed: u64,
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    deduplicated: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
}

struct Job<K, P> {
    key: K,
    payload: P,
}

type KeySet<K> = Arc<Mutex<HashSet<K>>>;

/// Removes a key from the in-flight set unless the job was handed off.
///
/// Keeps the set consistent when a blocked `submit` future is dropped.
struct Reservation<'a, K: Eq + Hash> {
    keys: &'a KeySet<K>,
    key: Option<K>,
}

impl<K: Eq + Hash> Reservation<'_, K> {
    fn commit(mut self) {
        self.key = None;
    }
}

impl<K: Eq + Hash> Drop for Reservation<'_, K> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.keys
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&key);
        }
    }
}

pub struct WorkerPool<K, P> {
    name: String,
    sender: Mutex<Option<mpsc::Sender<Job<K, P>>>>,
    in_flight: KeySet<K>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    counters: Arc<Counters>,
}

impl<K, P> WorkerPool<K, P>
where
    K: Eq + Hash + Clone + Display + Send + Sync + 'static,
    P: Send + 'static,
{
    /// Spawn `workers` workers on the current tokio runtime.
    ///
    /// `workers` and `queue_capacity` are raised to at least one.
    pub fn start<H>(
        name: impl Into<String>,
        workers: usize,
        queue_capacity: usize,
        handler: Arc<H>,
    ) -> Self
    where
        H: JobHandler<K, P>,
    {
        let name = name.into();
        let (sender, receiver) = mpsc::channel(queue_capacity.max(1));
        let receiver = Arc::new(AsyncMutex::new(receiver));
        let in_flight: KeySet<K> = Arc::new(Mutex::new(HashSet::new()));
        let counters = Arc::new(Counters::default());

        let handles = (0..workers.max(1))
            .map(|worker_id| {
                tokio::spawn(run_worker(
                    name.clone(),
                    worker_id,
                    Arc::clone(&receiver),
                    Arc::clone(&handler),
                    Arc::clone(&in_flight),
                    Arc::clone(&counters),
                ))
            })
            .collect();

        tracing::info!(pool = %name, workers = workers.max(1), queue_capacity, "worker pool started");

        Self {
            name,
            sender: Mutex::new(Some(sender)),
            in_flight,
            workers: Mutex::new(handles),
            counters,
        }
    }

    /// Enqueue a job under `key`.
    ///
    /// Returns `Ok(true)` when accepted and `Ok(false)` when a job with the
    /// same key is already queued or running. Waits while the queue is full.
    ///
    /// # Errors
    ///
    /// [`EngineError::PoolClosed`] after [`WorkerPool::shutdown`].
    pub async fn submit(&self, key: K, payload: P) -> Result<bool> {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or(EngineError::PoolClosed)?;

        let reservation = {
            let mut keys = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
            if !keys.insert(key.clone()) {
                self.counters.deduplicated.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(pool = %self.name, %key, "job already in flight, skipping");
                return Ok(false);
            }
            Reservation {
                keys: &self.in_flight,
                key: Some(key.clone()),
            }
        };

        sender
            .send(Job { key, payload })
            .await
            .map_err(|_| EngineError::PoolClosed)?;
        reservation.commit();
        self.counters.submitted.fetch_add(1, Ordering::Relaxed);
        Ok(true)
    }

    /// Stop accepting jobs, let queued and running jobs finish, then return.
    ///
    /// Calling it again is a no-op.
    pub async fn shutdown(&self) {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        drop(sender);

        let handles: Vec<JoinHandle<()>> = std::mem::take(
            &mut *self.workers.lock().unwrap_or_else(|e| e.into_inner()),
        );
        if handles.is_empty() {
            return;
        }
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(pool = %self.name, error = %e, "worker task failed");
            }
        }

        let stats = self.stats();
        tracing::info!(
            pool = %self.name,
            submitted = stats.submitted,
            deduplicated = stats.deduplicated,
            succeeded = stats.succeeded,
            failed = stats.failed,
            "worker pool stopped"
        );
    }

    pub fn is_closed(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_none()
    }

    /// Keys currently queued or running.
    pub fn in_flight(&self) -> usize {
        self.in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            deduplicated: self.counters.deduplicated.load(Ordering::Relaxed),
            succeeded: self.counters.succeeded.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }
}

async fn run_worker<K, P, H>(
    pool: String,
    worker_id: usize,
    receiver: Arc<AsyncMutex<mpsc::Receiver<Job<K, P>>>>,
    handler: Arc<H>,
    in_flight: KeySet<K>,
    counters: Arc<Counters>,
) where
    K: Eq + Hash + Clone + Display + Send + Sync + 'static,
    P: Send + 'static,
    H: JobHandler<K, P>,
{
    loop {
        let job = receiver.lock().await.recv().await;
        let Some(Job { key, payload }) = job else {
            break;
        };

        tracing::debug!(%pool, worker_id, %key, "job started");
        let task_handler = Arc::clone(&handler);
        let task_key = key.clone();
        // Run on its own task so a panicking handler cannot take the worker down.
        let outcome =
            tokio::spawn(async move { task_handler.handle(&task_key, payload).await }).await;

        match outcome {
            Ok(Ok(())) => {
                counters.succeeded.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(%pool, worker_id, %key, "job finished");
            }
            Ok(Err(e)) if e.is_not_found() => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(%pool, worker_id, %key, error = %e, "job skipped, record missing");
            }
            Ok(Err(e @ EngineError::Store(_))) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                tracing::error!(%pool, worker_id, %key, error = %e, "job failed in store");
            }
            Ok(Err(e)) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(%pool, worker_id, %key, error = %e, "job failed");
            }
            Err(e) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                tracing::error!(%pool, worker_id, %key, error = %e, "job panicked");
            }
        }

        in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&key);
    }

    tracing::debug!(%pool, worker_id, "worker exiting");
}
