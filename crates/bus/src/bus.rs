//! The event bus: channel registry, bounded work queue and worker pool.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::FutureExt;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use sb_domain::config::BusConfig;
use sb_domain::message::Message;

use crate::handler::Handler;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Work items
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One handler invocation waiting for a worker.
struct WorkItem {
    channel: Arc<str>,
    handler: Arc<dyn Handler>,
    message: Message,
}

type SharedReceiver = Arc<tokio::sync::Mutex<mpsc::Receiver<WorkItem>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Idle,
    Running,
    Stopped,
}

/// Errors returned by bus lifecycle calls.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("event bus has been stopped")]
    Stopped,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// EventBus
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// In-process publish/subscribe dispatcher with a fixed worker pool.
///
/// `publish` never blocks: each handler's work item is `try_send`-ed into
/// the shared queue and dropped (with a warning) when the queue is full.
/// With a single worker, items for the same `(channel, handler)` pair run
/// in publish order; with more workers they *start* in queue order.
pub struct EventBus {
    workers: usize,
    queue_capacity: usize,
    subscribers: RwLock<HashMap<String, Vec<Arc<dyn Handler>>>>,
    tx: mpsc::Sender<WorkItem>,
    rx: SharedReceiver,
    handles: Mutex<Vec<JoinHandle<()>>>,
    lifecycle: Mutex<Lifecycle>,
    shutdown: CancellationToken,
    dropped: AtomicU64,
}

impl EventBus {
    /// Build a bus sized from config. Workers are not started yet.
    pub fn new(config: &BusConfig) -> Self {
        Self::with_capacity(config.workers, config.queue_capacity)
    }

    /// Build a bus with `workers` loops draining a queue of `queue_capacity`.
    ///
    /// Both values are clamped to at least 1.
    pub fn with_capacity(workers: usize, queue_capacity: usize) -> Self {
        if workers == 0 || queue_capacity == 0 {
            tracing::warn!(workers, queue_capacity, "bus sizing must be non-zero, clamping to 1");
        }
        let workers = workers.max(1);
        let queue_capacity = queue_capacity.max(1);
        let (tx, rx) = mpsc::channel(queue_capacity);

        Self {
            workers,
            queue_capacity,
            subscribers: RwLock::new(HashMap::new()),
            tx,
            rx: Arc::new(tokio::sync::Mutex::new(rx)),
            handles: Mutex::new(Vec::new()),
            lifecycle: Mutex::new(Lifecycle::Idle),
            shutdown: CancellationToken::new(),
            dropped: AtomicU64::new(0),
        }
    }

    /// Register `handler` for every future message on `channel`.
    pub fn subscribe<H: Handler>(&self, channel: &str, handler: H) {
        self.subscribe_arc(channel, Arc::new(handler));
    }

    /// Register a pre-wrapped handler.
    pub fn subscribe_arc(&self, channel: &str, handler: Arc<dyn Handler>) {
        tracing::debug!(channel, handler = handler.name(), "bus subscription added");
        self.subscribers
            .write()
            .entry(channel.to_owned())
            .or_default()
            .push(handler);
    }

    /// Number of handlers currently subscribed to `channel`.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.subscribers.read().get(channel).map_or(0, Vec::len)
    }

    /// Spawn the worker pool. Calling it again while running is a no-op.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self) -> Result<(), BusError> {
        let mut lifecycle = self.lifecycle.lock();
        match *lifecycle {
            Lifecycle::Running => return Ok(()),
            Lifecycle::Stopped => return Err(BusError::Stopped),
            Lifecycle::Idle => {}
        }

        let mut handles = self.handles.lock();
        for id in 0..self.workers {
            let rx = self.rx.clone();
            let shutdown = self.shutdown.clone();
            handles.push(tokio::spawn(worker_loop(id, rx, shutdown)));
        }
        *lifecycle = Lifecycle::Running;

        tracing::info!(
            workers = self.workers,
            queue_capacity = self.queue_capacity,
            "event bus started"
        );
        Ok(())
    }

    /// Queue one work item per handler subscribed to `channel`.
    ///
    /// Returns how many items were queued. Items that do not fit in the
    /// queue are dropped and logged; nothing is queued once the bus has
    /// been stopped.
    pub fn publish(&self, channel: &str, message: Message) -> usize {
        if self.shutdown.is_cancelled() {
            tracing::debug!(channel, "bus stopped, ignoring publish");
            return 0;
        }

        let handlers = match self.subscribers.read().get(channel) {
            Some(handlers) if !handlers.is_empty() => handlers.clone(),
            _ => return 0,
        };

        let channel_name: Arc<str> = Arc::from(channel);
        let mut queued = 0;
        for handler in handlers {
            let item = WorkItem {
                channel: channel_name.clone(),
                handler,
                message: message.clone(),
            };
            match self.tx.try_send(item) {
                Ok(()) => queued += 1,
                Err(TrySendError::Full(item)) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        channel,
                        handler = item.handler.name(),
                        capacity = self.queue_capacity,
                        "message bus queue full ({}), dropping message for channel: {}",
                        self.queue_capacity,
                        channel
                    );
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!(channel, "bus queue closed, ignoring publish");
                    return queued;
                }
            }
        }
        queued
    }

    /// Work items waiting for a worker.
    pub fn queued(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    /// Work items dropped because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Stop the worker pool.
    ///
    /// Idle workers return at once; a handler that is mid-flight is
    /// cancelled at its next suspension point. Queued items that no worker
    /// had started are discarded. Safe to call repeatedly, and before
    /// [`start`](Self::start).
    pub async fn stop(&self) {
        {
            let mut lifecycle = self.lifecycle.lock();
            if *lifecycle == Lifecycle::Stopped {
                return;
            }
            *lifecycle = Lifecycle::Stopped;
        }
        self.shutdown.cancel();

        let handles = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "bus worker ended abnormally");
            }
        }

        let mut rx = self.rx.lock().await;
        rx.close();
        let mut discarded = 0usize;
        while rx.try_recv().is_ok() {
            discarded += 1;
        }

        tracing::info!(
            discarded,
            dropped = self.dropped(),
            "event bus stopped"
        );
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Workers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn worker_loop(id: usize, rx: SharedReceiver, shutdown: CancellationToken) {
    loop {
        let next = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            item = recv_next(&rx) => item,
        };
        let Some(item) = next else {
            break;
        };
        if !run_item(id, item, &shutdown).await {
            break;
        }
    }
    tracing::trace!(worker = id, "bus worker exiting");
}

/// Take the next item; the receiver lock is released before the handler runs.
async fn recv_next(rx: &SharedReceiver) -> Option<WorkItem> {
    let mut rx = rx.lock().await;
    rx.recv().await
}

/// Run one handler to completion. Returns `false` when shutdown interrupted it.
async fn run_item(worker: usize, item: WorkItem, shutdown: &CancellationToken) -> bool {
    let WorkItem {
        channel,
        handler,
        message,
    } = item;

    let outcome = tokio::select! {
        biased;
        _ = shutdown.cancelled() => {
            tracing::debug!(
                worker,
                channel = %channel,
                handler = handler.name(),
                "bus handler cancelled by shutdown"
            );
            return false;
        }
        // catch_unwind: a panicking handler must not take the worker down.
        outcome = AssertUnwindSafe(handler.handle(message)).catch_unwind() => outcome,
    };

    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::error!(
                worker,
                channel = %channel,
                handler = handler.name(),
                error = %e,
                "bus handler failed"
            );
        }
        Err(_panic) => {
            tracing::error!(
                worker,
                channel = %channel,
                handler = handler.name(),
                "bus handler panicked"
            );
        }
    }
    true
}
