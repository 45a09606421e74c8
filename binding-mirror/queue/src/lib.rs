//! A deduplicating work queue with per-key exponential backoff.
//!
//! Each key is handed out to at most one consumer at a time. An item added
//! while its key is queued is coalesced into the queued item; an item added
//! while its key is being processed is held until the consumer calls
//! [`Queue::done`], at which point it is queued again. Likewise, items added
//! while their key is backing off are held until the retried item returns
//! and are merged into it.
//!
//! The queue does not enforce a retry ceiling. Consumers read
//! [`Queue::num_requeues`] and decide whether to call
//! [`Queue::add_rate_limited`], [`Queue::forget`] or [`Queue::give_up`].

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

mod backoff;
mod metrics;


pub use self::{
    backoff::ExponentialBackoff,
    metrics::{QueueFamilies, QueueMetrics},
};
use parking_lot::Mutex;
use std::{
    collections::{HashMap, HashSet, VecDeque},
    fmt,
    hash::Hash,
    sync::Arc,
};
use tokio::{sync::Notify, time};

/// A unit of work that can be queued.
pub trait Item: Send + 'static {
    type Key: Clone + Eq + Hash + fmt::Display + Send + Sync + 'static;

    fn key(&self) -> &Self::Key;

    /// Merges a newer item for the same key into this one.
    fn coalesce(self, newer: Self) -> Self
    where
        Self: Sized,
    {
        newer
    }
}

pub struct Queue<T: Item> {
    inner: Arc<Inner<T>>,
}

struct Inner<T: Item> {
    state: Mutex<State<T>>,
    notify: Notify,
    backoff: ExponentialBackoff,
    metrics: QueueMetrics,
}

struct State<T: Item> {
    /// Keys ready to be handed out, in arrival order.
    order: VecDeque<T::Key>,

    /// Items waiting to be handed out, either queued in `order` or parked
    /// until their key is released by `done`.
    pending: HashMap<T::Key, T>,

    /// Keys currently held by a consumer.
    processing: HashSet<T::Key>,

    /// Keys with a rate-limited item waiting out its delay.
    backing_off: HashSet<T::Key>,

    /// Number of rate-limited requeues per key since it was last forgotten.
    failures: HashMap<T::Key, u32>,

    shutting_down: bool,
}

// === impl Queue ===

impl<T: Item> Clone for Queue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Item> Queue<T> {
    pub fn new(backoff: ExponentialBackoff, metrics: QueueMetrics) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    order: VecDeque::new(),
                    pending: HashMap::new(),
                    processing: HashSet::new(),
                    backing_off: HashSet::new(),
                    failures: HashMap::new(),
                    shutting_down: false,
                }),
                notify: Notify::new(),
                backoff,
                metrics,
            }),
        }
    }

    /// Enqueues an item, coalescing it with any item already waiting for the
    /// same key. Items added after shutdown are dropped.
    pub fn add(&self, item: T) {
        self.push(item, false);
    }

    fn push(&self, item: T, retry: bool) {
        let mut state = self.inner.state.lock();
        if state.shutting_down {
            tracing::debug!(key = %item.key(), "Queue is shutting down; dropping item");
            return;
        }
        self.inner.metrics.add();

        let key = item.key().clone();
        if retry {
            state.backing_off.remove(&key);
        }
        let ready = !state.processing.contains(&key) && !state.backing_off.contains(&key);

        let (item, queued) = match state.pending.remove(&key) {
            // A retried item predates anything that arrived while it was
            // backing off. Those items were parked, so the key is not queued.
            Some(parked) if retry => (item.coalesce(parked), false),
            Some(prior) => (prior.coalesce(item), ready),
            None => (item, false),
        };
        state.pending.insert(key.clone(), item);

        if !ready || queued {
            return;
        }
        state.order.push_back(key);
        self.inner.metrics.set_depth(state.order.len());
        drop(state);
        self.inner.notify.notify_one();
    }

    /// Waits for the next item.
    ///
    /// Returns `None` once the queue has been shut down, even if items remain.
    pub async fn get(&self) -> Option<T> {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.inner.state.lock();
                if state.shutting_down {
                    return None;
                }
                while let Some(key) = state.order.pop_front() {
                    // Held keys are queued again by `done` or by their retry.
                    if state.processing.contains(&key) || state.backing_off.contains(&key) {
                        continue;
                    }
                    if let Some(item) = state.pending.remove(&key) {
                        state.processing.insert(key);
                        self.inner.metrics.set_depth(state.order.len());
                        return Some(item);
                    }
                }
            }

            notified.await;
        }
    }

    /// Releases a key handed out by `get`. If an item for the key arrived
    /// while it was being processed, that item is queued, unless the key is
    /// backing off.
    pub fn done(&self, key: &T::Key) {
        let mut state = self.inner.state.lock();
        state.processing.remove(key);
        if state.shutting_down
            || state.backing_off.contains(key)
            || !state.pending.contains_key(key)
        {
            return;
        }
        state.order.push_back(key.clone());
        self.inner.metrics.set_depth(state.order.len());
        drop(state);
        self.inner.notify.notify_one();
    }

    /// Clears the retry history for a key.
    pub fn forget(&self, key: &T::Key) {
        self.inner.state.lock().failures.remove(key);
    }

    /// Forgets a key whose retries are exhausted and records the drop.
    pub fn give_up(&self, key: &T::Key) {
        self.forget(key);
        self.inner.metrics.drop_item();
    }

    /// Re-enqueues an item after its key's backoff delay. Items added for the
    /// key in the meantime are held until the delay elapses and are merged as
    /// newer than the retried item.
    pub fn add_rate_limited(&self, item: T) {
        let delay = {
            let mut state = self.inner.state.lock();
            if state.shutting_down {
                return;
            }
            let key = item.key().clone();
            let failures = state.failures.entry(key.clone()).or_default();
            let delay = self.inner.backoff.delay(*failures);
            *failures = failures.saturating_add(1);
            state.backing_off.insert(key);
            delay
        };
        self.inner.metrics.retry();
        tracing::debug!(key = %item.key(), ?delay, "Requeueing after backoff");

        let queue = self.clone();
        tokio::spawn(async move {
            time::sleep(delay).await;
            queue.push(item, true);
        });
    }

    /// The number of rate-limited requeues recorded for a key.
    pub fn num_requeues(&self, key: &T::Key) -> u32 {
        self.inner
            .state
            .lock()
            .failures
            .get(key)
            .copied()
            .unwrap_or(0)
    }

    /// The number of keys ready to be handed out.
    pub fn len(&self) -> usize {
        self.inner.state.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stops handing out items and wakes all waiting consumers.
    pub fn shutdown(&self) {
        self.inner.state.lock().shutting_down = true;
        self.inner.notify.notify_waiters();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.state.lock().shutting_down
    }
}
