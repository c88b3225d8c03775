//! Per-kind task dispatcher.
//!
//! Each entity kind gets its own pool. `submit` never blocks: by default
//! tasks queue without limit while the workers are busy, and a configured
//! capacity turns a full queue into a rejection. In key-affinity mode every worker owns a lane and
//! a task always lands on the lane its key hashes to, so tasks for one key
//! execute one at a time, in submission order.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TrySendError};
use tracing::{debug, error};

use crate::config::{DispatcherConfig, OrderingMode};
use crate::entity::{ResourceKey, SouthboundEntity};
use crate::error::{ExecutionError, SyncError, SyncResult};
use crate::southbound::{Exporter, RestSink};
use crate::task::Task;

/// Snapshot of dispatcher counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatcherStats {
    /// Tasks accepted by `submit`.
    pub submitted: u64,
    /// Tasks rejected because a bounded queue was full.
    pub rejected: u64,
    /// Tasks that finished executing.
    pub executed: u64,
    /// Successful southbound calls.
    pub calls_ok: u64,
    /// Failed southbound calls.
    pub calls_failed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    submitted: AtomicU64,
    rejected: AtomicU64,
    executed: AtomicU64,
    calls_ok: AtomicU64,
    calls_failed: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> DispatcherStats {
        DispatcherStats {
            submitted: self.submitted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            executed: self.executed.load(Ordering::Relaxed),
            calls_ok: self.calls_ok.load(Ordering::Relaxed),
            calls_failed: self.calls_failed.load(Ordering::Relaxed),
        }
    }
}

fn lane_index(key: &ResourceKey, lanes: usize) -> usize {
    let hash = blake3::hash(key.as_str().as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&hash.as_bytes()[..8]);
    // Lane counts are small; the modulo always fits in usize.
    (u64::from_le_bytes(prefix) % lanes as u64) as usize
}

/// Worker pool for one entity kind.
pub struct Dispatcher<T: SouthboundEntity> {
    config: DispatcherConfig,
    lanes: RwLock<Vec<Sender<Task<T>>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    counters: Arc<Counters>,
}

impl<T: SouthboundEntity> std::fmt::Debug for Dispatcher<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("kind", &T::KIND)
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl<T: SouthboundEntity> Dispatcher<T> {
    /// Start the pool. Tasks are exported with `exporter` and delivered
    /// through `sink`.
    pub fn start(
        config: &DispatcherConfig,
        sink: Arc<dyn RestSink>,
        exporter: Arc<dyn Exporter<T>>,
    ) -> SyncResult<Self> {
        let workers = config.workers.max(1);
        let capacity = config.queue_capacity.map(|c| c.max(1));
        let channel = || match capacity {
            Some(c) => bounded(c),
            None => unbounded(),
        };
        let counters = Arc::new(Counters::default());

        let mut lanes = Vec::new();
        let mut receivers: Vec<Receiver<Task<T>>> = Vec::with_capacity(workers);
        match config.ordering {
            OrderingMode::KeyAffinity => {
                for _ in 0..workers {
                    let (tx, rx) = channel();
                    lanes.push(tx);
                    receivers.push(rx);
                }
            }
            OrderingMode::SharedQueue => {
                let (tx, rx) = channel();
                lanes.push(tx);
                receivers.extend(std::iter::repeat(rx).take(workers));
            }
        }

        let mut handles = Vec::with_capacity(workers);
        for (idx, rx) in receivers.into_iter().enumerate() {
            let sink = Arc::clone(&sink);
            let exporter = Arc::clone(&exporter);
            let counters = Arc::clone(&counters);
            let name = format!("sbsync-{}-{idx}", T::KIND);
            let handle = thread::Builder::new()
                .name(name.clone())
                .spawn(move || worker_loop(&rx, sink.as_ref(), exporter.as_ref(), &counters))
                .map_err(|e| ExecutionError::Spawn {
                    name,
                    message: e.to_string(),
                })?;
            handles.push(handle);
        }

        debug!(kind = %T::KIND, workers, ?capacity, ordering = ?config.ordering, "dispatcher started");
        Ok(Self {
            config: DispatcherConfig {
                workers,
                queue_capacity: capacity,
                ordering: config.ordering,
            },
            lanes: RwLock::new(lanes),
            workers: Mutex::new(handles),
            counters,
        })
    }

    /// Effective configuration.
    #[must_use]
    pub const fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Enqueue `task` without blocking.
    ///
    /// Fails with `ExecutionError::QueueFull` when a bounded target queue is
    /// full and `ExecutionError::Disconnected` after shutdown.
    pub fn submit(&self, task: Task<T>) -> SyncResult<()> {
        let path = T::KIND.as_str();
        let lanes = self
            .lanes
            .read()
            .map_err(|_| SyncError::internal("poisoned lock: dispatcher lanes"))?;
        if lanes.is_empty() {
            return Err(ExecutionError::Disconnected { path: path.to_string() }.into());
        }

        let lane = &lanes[lane_index(&task.key(), lanes.len())];
        match lane.try_send(task) {
            Ok(()) => {
                self.counters.submitted.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                Err(ExecutionError::QueueFull {
                    path: path.to_string(),
                    capacity: self.config.queue_capacity.unwrap_or_default(),
                }
                .into())
            }
            Err(TrySendError::Disconnected(_)) => Err(ExecutionError::Disconnected { path: path.to_string() }.into()),
        }
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> DispatcherStats {
        self.counters.snapshot()
    }

    /// Wait until every accepted task has executed.
    ///
    /// Returns false if that did not happen within `timeout`.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let stats = self.stats();
            if stats.executed >= stats.submitted {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(2));
        }
    }

    /// Stop accepting tasks, run the queued ones and join the workers.
    /// Idempotent.
    pub fn shutdown(&self) {
        if let Ok(mut lanes) = self.lanes.write() {
            lanes.clear();
        }
        let handles = self
            .workers
            .lock()
            .map(|mut w| std::mem::take(&mut *w))
            .unwrap_or_default();
        if handles.is_empty() {
            return;
        }
        for handle in handles {
            let _ = handle.join();
        }
        debug!(kind = %T::KIND, stats = ?self.stats(), "dispatcher stopped");
    }
}

impl<T: SouthboundEntity> Drop for Dispatcher<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop<T: SouthboundEntity>(
    rx: &Receiver<Task<T>>,
    sink: &dyn RestSink,
    exporter: &dyn Exporter<T>,
    counters: &Counters,
) {
    for task in rx {
        let result = panic::catch_unwind(AssertUnwindSafe(|| task.execute(sink, exporter)));
        match result {
            Ok(outcome) => {
                counters.calls_ok.fetch_add(outcome.succeeded as u64, Ordering::Relaxed);
                counters.calls_failed.fetch_add(outcome.failed as u64, Ordering::Relaxed);
            }
            Err(_) => {
                error!(task = %task.id(), kind = %T::KIND, "task panicked");
                counters.calls_failed.fetch_add(1, Ordering::Relaxed);
            }
        }
        counters.executed.fetch_add(1, Ordering::Relaxed);
    }
}
