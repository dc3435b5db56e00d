/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */

//! Bounded per-component inbound queue.
//!
//! A [`Mailbox`] is owned by the router and drained by exactly one dispatch task.
//! Messages and requests count against the capacity and are subject to the
//! configured [`BackpressureStrategy`]. Callbacks are pushed past capacity and
//! are never chosen for eviction, so a resolved request always reaches a live
//! requester.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{trace, warn};

use crate::mailbox::{BackpressureStrategy, MailboxConfig};
use crate::message::{ComponentId, Delivery, MessagePriority};

/// Why a mailbox refused a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MailboxError {
    /// At capacity and the strategy did not make room.
    #[error("mailbox is full")]
    Full,
    /// The owner has been unregistered.
    #[error("mailbox is closed")]
    Closed,
}

/// Result of a successful enqueue.
#[derive(Debug)]
#[must_use]
pub enum EnqueueOutcome {
    /// Queued without displacing anything.
    Enqueued,
    /// Queued after evicting this older delivery.
    Evicted(Delivery),
}

/// Counters for a single mailbox.
#[derive(Debug, Default)]
pub struct MailboxStats {
    /// Deliveries accepted, callbacks included.
    pub enqueued: AtomicUsize,
    /// Deliveries handed to the dispatch task.
    pub dequeued: AtomicUsize,
    /// Deliveries refused because the mailbox was full.
    pub rejected: AtomicUsize,
    /// Deliveries evicted to make room.
    pub evicted: AtomicUsize,
}

impl MailboxStats {
    /// Deliveries accepted.
    #[must_use]
    pub fn enqueued(&self) -> usize {
        self.enqueued.load(Ordering::Relaxed)
    }

    /// Deliveries dequeued.
    #[must_use]
    pub fn dequeued(&self) -> usize {
        self.dequeued.load(Ordering::Relaxed)
    }

    /// Deliveries refused.
    #[must_use]
    pub fn rejected(&self) -> usize {
        self.rejected.load(Ordering::Relaxed)
    }

    /// Deliveries evicted.
    #[must_use]
    pub fn evicted(&self) -> usize {
        self.evicted.load(Ordering::Relaxed)
    }
}

struct MailboxEntry {
    delivery: Delivery,
    priority: MessagePriority,
}

#[derive(Default)]
struct QueueState {
    entries: VecDeque<MailboxEntry>,
    /// Entries that count against capacity (everything except callbacks).
    bounded: usize,
}

impl QueueState {
    fn push(&mut self, entry: MailboxEntry) {
        if !entry.delivery.is_callback() {
            self.bounded += 1;
        }
        self.entries.push_back(entry);
    }

    fn pop(&mut self) -> Option<MailboxEntry> {
        let entry = self.entries.pop_front()?;
        if !entry.delivery.is_callback() {
            self.bounded -= 1;
        }
        Some(entry)
    }

    fn remove(&mut self, index: usize) -> Option<MailboxEntry> {
        let entry = self.entries.remove(index)?;
        if !entry.delivery.is_callback() {
            self.bounded -= 1;
        }
        Some(entry)
    }

    fn oldest_evictable(&self) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| !entry.delivery.is_callback())
    }

    /// Oldest entry among the lowest priority present. `min_by_key` keeps the first minimum.
    fn lowest_priority_evictable(&self) -> Option<(usize, MessagePriority)> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| !entry.delivery.is_callback())
            .min_by_key(|(_, entry)| entry.priority)
            .map(|(index, entry)| (index, entry.priority))
    }
}

/// A component's inbound queue.
pub struct Mailbox {
    owner: ComponentId,
    config: MailboxConfig,
    state: Mutex<QueueState>,
    closed: AtomicBool,
    item_ready: Notify,
    space_freed: Notify,
    stats: MailboxStats,
}

impl std::fmt::Debug for Mailbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mailbox")
            .field("owner", &self.owner)
            .field("config", &self.config)
            .field("len", &self.len())
            .field("closed", &self.is_closed())
            .field("stats", &self.stats)
            .finish()
    }
}

impl Mailbox {
    /// Creates an empty, open mailbox for `owner`.
    #[must_use]
    pub fn new(owner: ComponentId, config: MailboxConfig) -> Self {
        Self {
            owner,
            config,
            state: Mutex::new(QueueState::default()),
            closed: AtomicBool::new(false),
            item_ready: Notify::new(),
            space_freed: Notify::new(),
            stats: MailboxStats::default(),
        }
    }

    /// Queues a message or request, applying the backpressure strategy when full.
    ///
    /// Only `Block` ever suspends, and only until space frees up, the mailbox
    /// closes, or `max_wait_ms` passes.
    ///
    /// # Errors
    ///
    /// [`MailboxError::Full`] when the strategy could not make room,
    /// [`MailboxError::Closed`] when the owner has been unregistered.
    pub async fn enqueue(
        &self,
        delivery: Delivery,
        priority: MessagePriority,
    ) -> Result<EnqueueOutcome, MailboxError> {
        let Some(max_wait) = self.config.backpressure.max_wait() else {
            return self.try_enqueue(delivery, priority).map_err(|(err, _)| err);
        };

        let deadline = Instant::now() + max_wait;
        let mut delivery = delivery;
        loop {
            let notified = self.space_freed.notified();
            tokio::pin!(notified);
            // Register before checking so a concurrent dequeue cannot slip between.
            notified.as_mut().enable();

            match self.try_enqueue_quiet(delivery, priority) {
                Ok(outcome) => return Ok(outcome),
                Err((MailboxError::Closed, _)) => return Err(MailboxError::Closed),
                Err((MailboxError::Full, returned)) => delivery = returned,
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                self.stats.rejected.fetch_add(1, Ordering::Relaxed);
                warn!(owner = %self.owner, "Mailbox still full after blocking; rejecting");
                return Err(MailboxError::Full);
            }
        }
    }

    /// Queues without waiting, handing the delivery back on failure.
    ///
    /// # Errors
    ///
    /// See [`Mailbox::enqueue`].
    pub fn try_enqueue(
        &self,
        delivery: Delivery,
        priority: MessagePriority,
    ) -> Result<EnqueueOutcome, (MailboxError, Delivery)> {
        let result = self.try_enqueue_quiet(delivery, priority);
        if matches!(result, Err((MailboxError::Full, _))) {
            self.stats.rejected.fetch_add(1, Ordering::Relaxed);
            trace!(owner = %self.owner, "Mailbox full; rejecting");
        }
        result
    }

    fn try_enqueue_quiet(
        &self,
        delivery: Delivery,
        priority: MessagePriority,
    ) -> Result<EnqueueOutcome, (MailboxError, Delivery)> {
        let mut state = self.state.lock();
        if self.is_closed() {
            return Err((MailboxError::Closed, delivery));
        }

        let entry = MailboxEntry { delivery, priority };
        if state.bounded < self.config.capacity {
            state.push(entry);
            drop(state);
            self.accepted();
            return Ok(EnqueueOutcome::Enqueued);
        }

        let victim = match self.config.backpressure {
            BackpressureStrategy::Reject | BackpressureStrategy::Block { .. } => None,
            BackpressureStrategy::DropOldest => state.oldest_evictable(),
            BackpressureStrategy::DropByPriority => state
                .lowest_priority_evictable()
                .filter(|(_, lowest)| *lowest < priority)
                .map(|(index, _)| index),
        };

        let Some(evicted) = victim.and_then(|index| state.remove(index)) else {
            return Err((MailboxError::Full, entry.delivery));
        };
        state.push(entry);
        drop(state);

        self.stats.evicted.fetch_add(1, Ordering::Relaxed);
        self.accepted();
        trace!(owner = %self.owner, evicted_priority = ?evicted.priority, "Evicted delivery to make room");
        Ok(EnqueueOutcome::Evicted(evicted.delivery))
    }

    /// Queues a callback regardless of capacity.
    ///
    /// # Errors
    ///
    /// [`MailboxError::Closed`] when the owner has been unregistered.
    pub fn push_callback(&self, delivery: Delivery) -> Result<(), MailboxError> {
        let mut state = self.state.lock();
        if self.is_closed() {
            return Err(MailboxError::Closed);
        }
        state.push(MailboxEntry {
            delivery,
            priority: MessagePriority::Critical,
        });
        drop(state);
        self.accepted();
        Ok(())
    }

    fn accepted(&self) {
        self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
        self.item_ready.notify_one();
    }

    /// Takes the oldest delivery, if any.
    pub fn try_recv(&self) -> Option<Delivery> {
        let entry = self.state.lock().pop()?;
        self.stats.dequeued.fetch_add(1, Ordering::Relaxed);
        if !entry.delivery.is_callback() {
            self.space_freed.notify_one();
        }
        Some(entry.delivery)
    }

    /// Waits for the next delivery. Returns `None` once the mailbox is closed and empty.
    pub async fn recv(&self) -> Option<Delivery> {
        loop {
            let notified = self.item_ready.notified();
            if let Some(delivery) = self.try_recv() {
                return Some(delivery);
            }
            if self.is_closed() {
                return None;
            }
            notified.await;
        }
    }

    /// Closes the mailbox and returns whatever was still queued.
    ///
    /// Wakes the dispatch task and any blocked senders.
    pub fn close(&self) -> Vec<Delivery> {
        let drained: Vec<Delivery> = {
            let mut state = self.state.lock();
            self.closed.store(true, Ordering::Release);
            state.bounded = 0;
            state.entries.drain(..).map(|entry| entry.delivery).collect()
        };
        self.item_ready.notify_waiters();
        self.item_ready.notify_one();
        self.space_freed.notify_waiters();
        drained
    }

    /// Number of queued deliveries, callbacks included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Whether nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Configured capacity.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.config.capacity
    }

    /// Configured strategy.
    #[inline]
    #[must_use]
    pub const fn strategy(&self) -> BackpressureStrategy {
        self.config.backpressure
    }

    /// Whether [`Mailbox::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// The owning component.
    #[inline]
    #[must_use]
    pub const fn owner(&self) -> &ComponentId {
        &self.owner
    }

    /// Counters.
    #[inline]
    #[must_use]
    pub const fn stats(&self) -> &MailboxStats {
        &self.stats
    }
}
