//! Bounded FIFO decoupling producer rate from network rate.
//!
//! ```text
//! producers (many):  enqueue() ──► [ VecDeque, len <= capacity ] ──► recv() / drain()  (single reader)
//!                        │                                                │
//!                        └── Block: wait on `not_full`                    └── wait on `not_empty`
//!                            DropOldest: pop_front, then push
//! ```
//!
//! The queue itself sits behind a short, never-awaited `parking_lot` lock.
//! Waiting is done on `tokio::sync::Notify`, so `enqueue` never performs I/O
//! and only suspends under [`OverflowPolicy::Block`].

use std::collections::VecDeque;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use parking_lot::Mutex;
use serde::Deserialize;
use serde::Serialize;
use tokio::sync::Notify;
use tracing::trace;
use tracing::warn;

use crate::metrics::DROPPED_ITEMS;
use crate::metrics::DROP_REASON_CLOSED;
use crate::metrics::DROP_REASON_OVERFLOW;

/// Behaviour of `enqueue` when the buffer is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Producer waits until the reader frees space (backpressure)
    Block,
    /// Newest item wins, the single oldest queued item is discarded
    DropOldest,
}

impl OverflowPolicy {
    pub fn from_overflow_flag(overflow: bool) -> Self {
        if overflow {
            OverflowPolicy::DropOldest
        } else {
            OverflowPolicy::Block
        }
    }
}

#[derive(Debug)]
pub struct BoundedBuffer<T> {
    queue: Mutex<VecDeque<T>>,
    capacity: usize,
    policy: OverflowPolicy,
    closed: AtomicBool,
    dropped: AtomicU64,
    not_empty: Notify,
    not_full: Notify,
}

impl<T> BoundedBuffer<T> {
    /// # Panics
    /// Panics if `capacity` is 0; configuration validation rejects it earlier.
    pub fn new(
        capacity: usize,
        policy: OverflowPolicy,
    ) -> Self {
        assert!(capacity > 0, "buffer capacity must be greater than 0");
        Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            policy,
            closed: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
            not_empty: Notify::new(),
            not_full: Notify::new(),
        }
    }

    /// Accepts an item.
    ///
    /// Never fails from the caller's point of view: the item is queued, or
    /// it displaces the oldest queued item (`DropOldest`), or it is dropped
    /// because the buffer was closed. Under `Block` the call suspends while
    /// the buffer is full.
    pub async fn enqueue(
        &self,
        item: T,
    ) {
        match self.policy {
            OverflowPolicy::DropOldest => self.push_overwriting(item),
            OverflowPolicy::Block => self.push_blocking(item).await,
        }
    }

    fn push_overwriting(
        &self,
        item: T,
    ) {
        if self.is_closed() {
            self.record_drop(DROP_REASON_CLOSED);
            return;
        }

        let displaced = {
            let mut queue = self.queue.lock();
            let displaced = if queue.len() >= self.capacity {
                queue.pop_front()
            } else {
                None
            };
            queue.push_back(item);
            displaced
        };

        if displaced.is_some() {
            trace!(capacity = self.capacity, "buffer full, oldest item discarded");
            self.record_drop(DROP_REASON_OVERFLOW);
        }
        self.not_empty.notify_one();
    }

    async fn push_blocking(
        &self,
        item: T,
    ) {
        loop {
            // Register interest before checking, so a drain between the
            // check and the await still wakes us.
            let notified = self.not_full.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_closed() {
                self.record_drop(DROP_REASON_CLOSED);
                return;
            }

            {
                let mut queue = self.queue.lock();
                if queue.len() < self.capacity {
                    queue.push_back(item);
                    drop(queue);
                    self.not_empty.notify_one();
                    return;
                }
            }

            trace!(capacity = self.capacity, "buffer full, producer waiting");
            notified.await;
        }
    }

    /// Waits for the next item.
    ///
    /// Returns `None` once the buffer is closed and empty. Cancel safe: an
    /// item is only removed in the same poll that returns it.
    pub async fn recv(&self) -> Option<T> {
        loop {
            let notified = self.not_empty.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(item) = self.pop() {
                return Some(item);
            }
            if self.is_closed() {
                return None;
            }

            notified.await;
        }
    }

    fn pop(&self) -> Option<T> {
        let item = self.queue.lock().pop_front();
        if item.is_some() {
            self.not_full.notify_waiters();
        }
        item
    }

    /// Removes everything queued at this instant.
    ///
    /// Items enqueued after the snapshot stay for the next cycle, so one
    /// drain is bounded even while producers keep writing.
    pub fn drain(&self) -> Vec<T> {
        let items: Vec<T> = {
            let mut queue = self.queue.lock();
            queue.drain(..).collect()
        };
        if !items.is_empty() {
            self.not_full.notify_waiters();
        }
        items
    }

    /// Stops accepting items and wakes every waiter.
    ///
    /// `recv` keeps returning queued items until the buffer is empty.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            let remaining = self.len();
            if remaining > 0 {
                warn!(remaining, "buffer closed with items still queued");
            }
        }
        self.not_empty.notify_waiters();
        self.not_full.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    /// Items discarded by overflow or rejected after close
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn record_drop(
        &self,
        reason: &str,
    ) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        DROPPED_ITEMS.with_label_values(&[reason]).inc();
    }
}
