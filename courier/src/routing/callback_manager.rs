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

//! In-flight request correlation.
//!
//! Every accepted request owns one entry in the pending table and one timer
//! task. All terminal paths (response, timeout, cancellation, participant
//! removal) go through a single atomic remove on that table. Whichever path
//! removes the entry resolves the request; every other path sees nothing and
//! does nothing.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, trace};

use crate::common::CallbackOutcome;
use crate::message::{CallbackError, ComponentId, RequestId, RoutingError};

/// Timeout bounds and table size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallbackConfig {
    /// Timeout applied when a request asks for zero milliseconds.
    pub default_timeout_ms: u64,
    /// Longest timeout a request may ask for.
    pub max_timeout_ms: u64,
    /// Requests that may be pending at once, host-wide.
    pub max_pending_requests: usize,
}

impl Default for CallbackConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 30_000,
            max_timeout_ms: 300_000,
            max_pending_requests: 10_000,
        }
    }
}

impl CallbackConfig {
    /// The timeout actually used for a request asking for `requested_ms`.
    ///
    /// Zero selects the default; anything else is clamped to `[1, max_timeout_ms]`.
    #[must_use]
    pub fn effective_timeout(&self, requested_ms: u64) -> Duration {
        let millis = if requested_ms == 0 {
            self.default_timeout_ms
        } else {
            requested_ms
        };
        Duration::from_millis(millis.clamp(1, self.max_timeout_ms.max(1)))
    }
}

/// A request that has not been resolved yet.
#[derive(Debug)]
pub struct PendingCallback {
    requester: ComponentId,
    target: ComponentId,
    created_at: Instant,
    timeout: Duration,
    timer: CancellationToken,
}

impl PendingCallback {
    /// The component that issued the request.
    #[inline]
    #[must_use]
    pub const fn requester(&self) -> &ComponentId {
        &self.requester
    }

    /// The component the request was sent to.
    #[inline]
    #[must_use]
    pub const fn target(&self) -> &ComponentId {
        &self.target
    }

    /// When the request was registered.
    #[inline]
    #[must_use]
    pub const fn created_at(&self) -> Instant {
        self.created_at
    }

    /// The effective timeout.
    #[inline]
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// When the timer fires.
    #[must_use]
    pub fn deadline(&self) -> Instant {
        self.created_at + self.timeout
    }
}

/// A request resolved because one of its participants was removed.
#[derive(Debug)]
pub struct ResolvedCallback {
    /// The resolved request.
    pub request_id: RequestId,
    /// Its table entry.
    pub pending: PendingCallback,
    /// `Cancelled` if the requester was removed, `TargetUnavailable` if the target was.
    pub outcome: CallbackOutcome,
}

/// Lifetime counters.
#[derive(Debug, Default)]
pub struct CallbackStats {
    /// Requests registered.
    pub registered: AtomicUsize,
    /// Requests resolved by a response or a handler failure.
    pub completed: AtomicUsize,
    /// Requests resolved by their timer.
    pub timed_out: AtomicUsize,
    /// Requests cancelled by their requester, or whose requester was removed.
    pub cancelled: AtomicUsize,
    /// Requests whose target disappeared.
    pub target_unavailable: AtomicUsize,
}

impl CallbackStats {
    /// Requests registered.
    #[must_use]
    pub fn registered(&self) -> usize {
        self.registered.load(Ordering::Relaxed)
    }

    /// Requests completed.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Relaxed)
    }

    /// Requests timed out.
    #[must_use]
    pub fn timed_out(&self) -> usize {
        self.timed_out.load(Ordering::Relaxed)
    }

    /// Requests cancelled.
    #[must_use]
    pub fn cancelled(&self) -> usize {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Requests resolved as `TargetUnavailable`.
    #[must_use]
    pub fn target_unavailable(&self) -> usize {
        self.target_unavailable.load(Ordering::Relaxed)
    }
}

/// The pending-request table and its timers.
pub struct CallbackManager {
    config: CallbackConfig,
    pending: Arc<DashMap<RequestId, PendingCallback>>,
    /// Slots reserved against `max_pending_requests`; taken before insert, freed on removal.
    occupied: Arc<AtomicUsize>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
    stats: Arc<CallbackStats>,
}

impl std::fmt::Debug for CallbackManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackManager")
            .field("config", &self.config)
            .field("pending", &self.pending.len())
            .field("timers", &self.tracker.len())
            .field("stats", &self.stats)
            .finish()
    }
}

impl CallbackManager {
    /// An empty table.
    #[must_use]
    pub fn new(config: CallbackConfig) -> Self {
        Self {
            config,
            pending: Arc::new(DashMap::new()),
            occupied: Arc::new(AtomicUsize::new(0)),
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
            stats: Arc::new(CallbackStats::default()),
        }
    }

    /// Configured bounds.
    #[must_use]
    pub const fn config(&self) -> &CallbackConfig {
        &self.config
    }

    /// Inserts a pending entry and starts its timer.
    ///
    /// If the timer wins the race to resolve the entry, `on_timeout` runs on the
    /// timer task with the removed entry. It never runs otherwise.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// [`RoutingError::TooManyPendingRequests`] when the table is full,
    /// [`RoutingError::DuplicateRequest`] when `request_id` is already pending.
    pub fn register<F>(
        &self,
        request_id: RequestId,
        requester: ComponentId,
        target: ComponentId,
        timeout: Duration,
        on_timeout: F,
    ) -> Result<(), RoutingError>
    where
        F: FnOnce(RequestId, PendingCallback) + Send + 'static,
    {
        let limit = self.config.max_pending_requests;
        if self
            .occupied
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                (count < limit).then_some(count + 1)
            })
            .is_err()
        {
            return Err(RoutingError::TooManyPendingRequests(limit));
        }

        let timer = self.shutdown.child_token();
        match self.pending.entry(request_id) {
            Entry::Occupied(_) => {
                self.release_slot();
                return Err(RoutingError::DuplicateRequest(request_id));
            }
            Entry::Vacant(slot) => {
                slot.insert(PendingCallback {
                    requester,
                    target,
                    created_at: Instant::now(),
                    timeout,
                    timer: timer.clone(),
                });
            }
        }
        self.stats.registered.fetch_add(1, Ordering::Relaxed);
        trace!(%request_id, ?timeout, "Registered pending request");

        let pending = Arc::clone(&self.pending);
        let occupied = Arc::clone(&self.occupied);
        let stats = Arc::clone(&self.stats);
        self.tracker.spawn(async move {
            tokio::select! {
                () = timer.cancelled() => {}
                () = tokio::time::sleep(timeout) => {
                    if let Some((request_id, entry)) = pending.remove(&request_id) {
                        occupied.fetch_sub(1, Ordering::AcqRel);
                        stats.timed_out.fetch_add(1, Ordering::Relaxed);
                        debug!(%request_id, "Request timed out");
                        on_timeout(request_id, entry);
                    }
                }
            }
        });
        Ok(())
    }

    /// Resolves `request_id` if it is still pending. The gate every path goes through.
    pub fn complete(&self, request_id: RequestId) -> Option<PendingCallback> {
        let pending = self.take(request_id)?;
        self.stats.completed.fetch_add(1, Ordering::Relaxed);
        Some(pending)
    }

    /// Like [`CallbackManager::complete`], but only if `accept` approves the entry.
    pub fn complete_if(
        &self,
        request_id: RequestId,
        accept: impl FnOnce(&PendingCallback) -> bool,
    ) -> Option<PendingCallback> {
        let (_, pending) = self
            .pending
            .remove_if(&request_id, |_, pending| accept(pending))?;
        self.release_slot();
        pending.timer.cancel();
        self.stats.completed.fetch_add(1, Ordering::Relaxed);
        Some(pending)
    }

    /// Resolves `request_id` as cancelled by `requester`.
    ///
    /// # Errors
    ///
    /// [`RoutingError::NotRequester`] when someone else issued the request,
    /// [`RoutingError::UnknownRequest`] when it is not pending.
    pub fn cancel(
        &self,
        request_id: RequestId,
        requester: &ComponentId,
    ) -> Result<PendingCallback, RoutingError> {
        if let Some((_, pending)) = self
            .pending
            .remove_if(&request_id, |_, pending| &pending.requester == requester)
        {
            self.release_slot();
            pending.timer.cancel();
            self.stats.cancelled.fetch_add(1, Ordering::Relaxed);
            return Ok(pending);
        }
        if self.pending.contains_key(&request_id) {
            Err(RoutingError::NotRequester {
                request_id,
                requester: requester.clone(),
            })
        } else {
            Err(RoutingError::UnknownRequest(request_id))
        }
    }

    /// Removes an entry whose request never reached the target. Not counted as resolved.
    pub fn discard(&self, request_id: RequestId) -> Option<PendingCallback> {
        let pending = self.take(request_id)?;
        self.stats.registered.fetch_sub(1, Ordering::Relaxed);
        Some(pending)
    }

    /// Resolves `request_id` as `TargetUnavailable`.
    pub fn fail_target(&self, request_id: RequestId) -> Option<PendingCallback> {
        let pending = self.take(request_id)?;
        self.stats.target_unavailable.fetch_add(1, Ordering::Relaxed);
        Some(pending)
    }

    fn take(&self, request_id: RequestId) -> Option<PendingCallback> {
        let (_, pending) = self.pending.remove(&request_id)?;
        self.release_slot();
        pending.timer.cancel();
        Some(pending)
    }

    fn release_slot(&self) {
        self.occupied.fetch_sub(1, Ordering::AcqRel);
    }

    /// Resolves every request `component` takes part in.
    ///
    /// As requester the outcome is `Cancelled`, as target it is `TargetUnavailable`.
    /// Delivery of the outcomes is up to the caller.
    pub fn cleanup_on_component_removal(&self, component: &ComponentId) -> Vec<ResolvedCallback> {
        // Collect first; removing while iterating would deadlock the shard.
        let affected: Vec<RequestId> = self
            .pending
            .iter()
            .filter(|entry| &entry.requester == component || &entry.target == component)
            .map(|entry| *entry.key())
            .collect();

        affected
            .into_iter()
            .filter_map(|request_id| {
                let pending = self.take(request_id)?;
                let outcome = if &pending.requester == component {
                    self.stats.cancelled.fetch_add(1, Ordering::Relaxed);
                    Err(CallbackError::Cancelled)
                } else {
                    self.stats.target_unavailable.fetch_add(1, Ordering::Relaxed);
                    Err(CallbackError::TargetUnavailable)
                };
                Some(ResolvedCallback {
                    request_id,
                    pending,
                    outcome,
                })
            })
            .collect()
    }

    /// Whether `request_id` is still pending.
    #[must_use]
    pub fn is_pending(&self, request_id: RequestId) -> bool {
        self.pending.contains_key(&request_id)
    }

    /// Number of pending requests.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Lifetime counters.
    #[must_use]
    pub fn stats(&self) -> &CallbackStats {
        &self.stats
    }

    /// Stops every timer and forgets every pending request.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        self.pending.clear();
        self.occupied.store(0, Ordering::Release);
    }
}
