//! Process-wide typed event bus.
//!
//! Published events are queued to a fixed pool of dispatch workers. Each
//! subscriber is pinned to one worker, which forwards events in the order
//! they were queued, so delivery is FIFO per (publisher, subscriber) pair.
//! Subscriber channels are bounded by the same queue size, so a subscriber
//! that stops draining holds back its worker and, once the worker queue is
//! full, the publishers. Cancelling the `done` token stops the workers and
//! closes every subscriber channel.

pub mod event;
pub mod matcher;
pub mod subscriber;
pub mod types;

pub use event::{Event, Outcome, Payload};
pub use matcher::Matcher;
pub use subscriber::{Callback, Subscriber};

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_QUEUE_SIZE: usize = 100;
pub const DEFAULT_WORKERS: usize = 16;

/// Sizing of the dispatch pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusConfig {
    /// Capacity of each worker queue and of each subscriber channel.
    pub queue_size: usize,
    pub workers: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            queue_size: DEFAULT_QUEUE_SIZE,
            workers: DEFAULT_WORKERS,
        }
    }
}

type Subscribers = Arc<Mutex<BTreeMap<u64, mpsc::Sender<Event>>>>;

struct Shard {
    queue: mpsc::Sender<Event>,
    subscribers: Subscribers,
}

struct Inner {
    done: CancellationToken,
    next_id: AtomicU64,
    queue_size: usize,
    shards: Vec<Shard>,
}

#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Inner>,
}

impl EventBus {
    /// Start the dispatch workers. Must be called inside a tokio runtime.
    pub fn new(done: CancellationToken, config: BusConfig) -> Self {
        let workers = config.workers.max(1);
        let queue_size = config.queue_size.max(1);

        let shards = (0..workers)
            .map(|worker| {
                let (queue, rx) = mpsc::channel(queue_size);
                let subscribers: Subscribers = Arc::default();
                tokio::spawn(run_worker(worker, rx, subscribers.clone(), done.clone()));
                Shard { queue, subscribers }
            })
            .collect();

        tracing::debug!(
            "event bus started with {} workers, queue size {}",
            workers,
            queue_size
        );

        Self {
            inner: Arc::new(Inner {
                done,
                next_id: AtomicU64::new(1),
                queue_size,
                shards,
            }),
        }
    }

    pub fn done(&self) -> &CancellationToken {
        &self.inner.done
    }

    pub fn is_closed(&self) -> bool {
        self.inner.done.is_cancelled()
    }

    /// A fresh subscriber. After shutdown the returned subscriber's channel
    /// is already closed.
    pub fn subscribe(&self) -> Subscriber {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.inner.queue_size);
        let shard = &self.inner.shards[(id as usize) % self.inner.shards.len()];

        let mut subscribers = shard
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !self.inner.done.is_cancelled() {
            subscribers.insert(id, tx);
        }
        Subscriber::new(id, rx)
    }

    /// Queue `event` for every subscriber. Waits while a worker queue is
    /// full; returns early once the bus is shut down.
    pub async fn publish(&self, event: Event) {
        tracing::debug!("publish {}", event.type_name());
        for shard in &self.inner.shards {
            tokio::select! {
                _ = self.inner.done.cancelled() => {
                    tracing::debug!("bus closed, dropping {}", event.type_name());
                    return;
                }
                sent = shard.queue.send(event.clone()) => {
                    if sent.is_err() {
                        return;
                    }
                }
            }
        }
    }
}

async fn run_worker(
    worker: usize,
    mut rx: mpsc::Receiver<Event>,
    subscribers: Subscribers,
    done: CancellationToken,
) {
    'dispatch: loop {
        let event = tokio::select! {
            biased;
            _ = done.cancelled() => break,
            next = rx.recv() => match next {
                Some(event) => event,
                None => break,
            },
        };

        let targets: Vec<(u64, mpsc::Sender<Event>)> = subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, tx)| (*id, tx.clone()))
            .collect();
        let mut gone = Vec::new();
        for (id, tx) in targets {
            tokio::select! {
                biased;
                _ = done.cancelled() => break 'dispatch,
                sent = tx.send(event.clone()) => {
                    if sent.is_err() {
                        gone.push(id);
                    }
                }
            }
        }
        if !gone.is_empty() {
            let mut subscribers = subscribers.lock().unwrap_or_else(PoisonError::into_inner);
            for id in gone {
                subscribers.remove(&id);
            }
        }
    }
    // Dropping the senders closes every subscriber channel of this shard.
    subscribers
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clear();
    tracing::debug!("event bus worker {} stopped", worker);
}
