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

//! The routing orchestrator.
//!
//! [`MessageRouter`] owns every mailbox, the security enforcer, the edge circuit
//! breakers and the callback manager. A routing call runs admission control in
//! a fixed order and, if everything passes, performs exactly one mailbox
//! enqueue on the caller's path:
//!
//! ```text
//! target exists → capability → codec → size → circuit → rate limit → enqueue
//! ```
//!
//! Requests are registered with the callback manager before they are enqueued,
//! so a response can never overtake its own registration.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use dashmap::mapref::entry::Entry;
use tracing::{debug, instrument, trace, warn};

use crate::common::{CallbackOutcome, CourierConfig, MailboxMap};
use crate::mailbox::{EnqueueOutcome, Mailbox, MailboxConfig, MailboxError};
use crate::message::{
    CallbackError, ComponentId, Delivery, Envelope, MessagePriority, RequestId, RoutingError,
};
use crate::resilience::{CircuitBreakerRegistry, CircuitState};
use crate::routing::{CallbackManager, CallbackStats, PendingCallback};
use crate::security::{CapabilityGrant, SecurityEnforcer};

/// Router-wide counters.
#[derive(Debug, Default)]
pub struct RouterStats {
    /// One-way messages enqueued.
    pub messages_routed: AtomicUsize,
    /// Requests enqueued.
    pub requests_routed: AtomicUsize,
    /// Callbacks handed to requester mailboxes.
    pub callbacks_delivered: AtomicUsize,
    /// Responses that arrived after their request was already resolved.
    pub late_responses: AtomicUsize,
    /// Routing calls refused synchronously.
    pub rejected: AtomicUsize,
    /// Deliveries evicted by backpressure.
    pub evicted: AtomicUsize,
}

impl RouterStats {
    /// Messages routed.
    #[must_use]
    pub fn messages_routed(&self) -> usize {
        self.messages_routed.load(Ordering::Relaxed)
    }

    /// Requests routed.
    #[must_use]
    pub fn requests_routed(&self) -> usize {
        self.requests_routed.load(Ordering::Relaxed)
    }

    /// Callbacks delivered.
    #[must_use]
    pub fn callbacks_delivered(&self) -> usize {
        self.callbacks_delivered.load(Ordering::Relaxed)
    }

    /// Late responses discarded.
    #[must_use]
    pub fn late_responses(&self) -> usize {
        self.late_responses.load(Ordering::Relaxed)
    }

    /// Routing calls refused.
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

pub(crate) struct RouterInner {
    mailboxes: MailboxMap,
    security: SecurityEnforcer,
    circuits: CircuitBreakerRegistry,
    callbacks: CallbackManager,
    mailbox_defaults: MailboxConfig,
    stats: RouterStats,
}

/// Routes messages, requests and callbacks between registered components.
///
/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct MessageRouter(pub(crate) Arc<RouterInner>);

impl std::fmt::Debug for MessageRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageRouter")
            .field("components", &self.0.mailboxes.len())
            .field("pending_requests", &self.0.callbacks.pending_count())
            .field("edges", &self.0.circuits.len())
            .field("stats", &self.0.stats)
            .finish()
    }
}

impl MessageRouter {
    /// A router with no components.
    #[must_use]
    pub fn new(config: &CourierConfig) -> Self {
        Self(Arc::new(RouterInner {
            mailboxes: MailboxMap::new(),
            security: SecurityEnforcer::new(&config.security),
            circuits: CircuitBreakerRegistry::new(config.circuit_breaker),
            callbacks: CallbackManager::new(config.callbacks),
            mailbox_defaults: config.mailbox,
            stats: RouterStats::default(),
        }))
    }

    /// Registers the component named by `grant` with the default mailbox settings.
    ///
    /// # Errors
    ///
    /// [`RoutingError::AlreadyRegistered`] if the id is live.
    pub fn register_component(&self, grant: CapabilityGrant) -> Result<Arc<Mailbox>, RoutingError> {
        self.register_component_with_mailbox(grant, self.0.mailbox_defaults)
    }

    /// Registers the component named by `grant` with its own mailbox settings.
    ///
    /// # Errors
    ///
    /// [`RoutingError::AlreadyRegistered`] if the id is live.
    #[instrument(skip(self, grant), fields(component = %grant.from()))]
    pub fn register_component_with_mailbox(
        &self,
        grant: CapabilityGrant,
        mailbox_config: MailboxConfig,
    ) -> Result<Arc<Mailbox>, RoutingError> {
        let id = grant.from().clone();
        let mailbox = match self.0.mailboxes.entry(id.clone()) {
            Entry::Occupied(_) => return Err(RoutingError::AlreadyRegistered(id)),
            Entry::Vacant(slot) => {
                let mailbox = Arc::new(Mailbox::new(id, mailbox_config));
                slot.insert(Arc::clone(&mailbox));
                mailbox
            }
        };
        self.0.security.install_grant(grant);
        debug!(capacity = mailbox_config.capacity, strategy = ?mailbox_config.backpressure, "Registered component");
        Ok(mailbox)
    }

    /// Removes a component.
    ///
    /// Its mailbox is closed and drained. Requests it issued resolve as
    /// `Cancelled` with nothing delivered. Requests sent to it resolve as
    /// `TargetUnavailable` and are delivered to their requesters. Its grant,
    /// rate bucket and every circuit touching it are dropped.
    ///
    /// # Errors
    ///
    /// [`RoutingError::TargetNotFound`] if the id is not registered.
    #[instrument(skip(self), fields(component = %id))]
    pub fn unregister_component(&self, id: &ComponentId) -> Result<(), RoutingError> {
        let (_, mailbox) = self
            .0
            .mailboxes
            .remove(id)
            .ok_or_else(|| RoutingError::TargetNotFound(id.clone()))?;
        let dropped = mailbox.close();
        if !dropped.is_empty() {
            debug!(count = dropped.len(), "Dropped undelivered items on removal");
        }

        self.0.security.revoke(id);
        self.0.circuits.remove_component(id);

        for resolved in self.0.callbacks.cleanup_on_component_removal(id) {
            if resolved.pending.requester() != id {
                self.0.deliver_callback(
                    resolved.pending.requester(),
                    resolved.request_id,
                    resolved.outcome,
                );
            }
        }
        debug!("Unregistered component");
        Ok(())
    }

    /// Sends a one-way message at normal priority.
    ///
    /// # Errors
    ///
    /// Any admission or mailbox error; see [`RoutingError`].
    pub async fn route_message(
        &self,
        from: &ComponentId,
        to: &ComponentId,
        envelope: Envelope,
    ) -> Result<(), RoutingError> {
        self.route_message_with_priority(from, to, envelope, MessagePriority::Normal)
            .await
    }

    /// Sends a one-way message. At most once; the outcome reaches the sender only as logs.
    ///
    /// # Errors
    ///
    /// Any admission or mailbox error; see [`RoutingError`].
    #[instrument(skip(self, envelope), fields(from = %from, to = %to, codec = envelope.codec_id()))]
    pub async fn route_message_with_priority(
        &self,
        from: &ComponentId,
        to: &ComponentId,
        envelope: Envelope,
        priority: MessagePriority,
    ) -> Result<(), RoutingError> {
        let mailbox = self.0.admit(from, to, &envelope)?;
        let delivery = Delivery::Message {
            from: from.clone(),
            envelope,
        };
        match mailbox.enqueue(delivery, priority).await {
            Ok(outcome) => {
                self.0.on_enqueued(&mailbox, outcome);
                self.0.stats.messages_routed.fetch_add(1, Ordering::Relaxed);
                trace!("Message enqueued");
                Ok(())
            }
            Err(err) => Err(self.0.on_enqueue_failed(from, to, err)),
        }
    }

    /// Sends a request at normal priority.
    ///
    /// # Errors
    ///
    /// Any admission, callback-table or mailbox error; see [`RoutingError`].
    pub async fn route_request(
        &self,
        from: &ComponentId,
        to: &ComponentId,
        envelope: Envelope,
        timeout_ms: u64,
    ) -> Result<RequestId, RoutingError> {
        self.route_request_with_priority(from, to, envelope, timeout_ms, MessagePriority::Normal)
            .await
    }

    /// Sends a request. Exactly one callback will reach `from` for the returned id.
    ///
    /// `timeout_ms` of zero selects the configured default; larger values are
    /// clamped to the configured maximum.
    ///
    /// # Errors
    ///
    /// Any admission, callback-table or mailbox error; see [`RoutingError`]. No
    /// callback is delivered for a request that returned an error.
    #[instrument(skip(self, envelope), fields(from = %from, to = %to, codec = envelope.codec_id()))]
    pub async fn route_request_with_priority(
        &self,
        from: &ComponentId,
        to: &ComponentId,
        envelope: Envelope,
        timeout_ms: u64,
        priority: MessagePriority,
    ) -> Result<RequestId, RoutingError> {
        let mailbox = self.0.admit(from, to, &envelope)?;

        let request_id = RequestId::generate();
        let timeout = self.0.callbacks.config().effective_timeout(timeout_ms);
        let router: Weak<RouterInner> = Arc::downgrade(&self.0);
        if let Err(err) = self.0.callbacks.register(
            request_id,
            from.clone(),
            to.clone(),
            timeout,
            move |request_id, pending| {
                if let Some(router) = router.upgrade() {
                    router.on_timeout(request_id, &pending);
                }
            },
        ) {
            self.0.circuits.abandon(from, to);
            self.0.stats.rejected.fetch_add(1, Ordering::Relaxed);
            return Err(err);
        }

        let delivery = Delivery::Request {
            request_id,
            from: from.clone(),
            envelope,
        };
        match mailbox.enqueue(delivery, priority).await {
            Ok(outcome) => {
                self.0.on_enqueued(&mailbox, outcome);
                self.0.stats.requests_routed.fetch_add(1, Ordering::Relaxed);
                trace!(%request_id, ?timeout, "Request enqueued");
                Ok(request_id)
            }
            Err(err) => {
                let err = self.0.on_enqueue_failed(from, to, err);
                if self.0.callbacks.discard(request_id).is_some() {
                    Err(err)
                } else {
                    // The timer resolved it while a blocked enqueue was waiting;
                    // the requester already has its callback.
                    debug!(%request_id, "Request timed out before it could be enqueued");
                    Ok(request_id)
                }
            }
        }
    }

    /// Resolves a request with `responder`'s outcome and delivers it to the requester.
    ///
    /// Returns `false` when the request is no longer pending (a late response,
    /// which is discarded) or `responder` is not its target.
    #[instrument(skip(self, outcome), fields(request_id = %request_id, responder = %responder))]
    pub fn route_callback(
        &self,
        request_id: RequestId,
        responder: &ComponentId,
        outcome: CallbackOutcome,
    ) -> bool {
        let Some(pending) = self
            .0
            .callbacks
            .complete_if(request_id, |pending| pending.target() == responder)
        else {
            self.0.stats.late_responses.fetch_add(1, Ordering::Relaxed);
            trace!("Discarding response for a request that is no longer pending");
            return false;
        };

        if outcome.is_ok() {
            self.0.circuits.record_success(pending.requester(), responder);
        } else {
            self.0.circuits.record_failure(pending.requester(), responder);
        }
        self.0
            .deliver_callback(pending.requester(), request_id, outcome);
        true
    }

    /// Cancels a pending request on behalf of its requester.
    ///
    /// The requester receives exactly one `Cancelled` callback. The target is
    /// not interrupted; its eventual response is discarded.
    ///
    /// # Errors
    ///
    /// [`RoutingError::NotRequester`] or [`RoutingError::UnknownRequest`].
    #[instrument(skip(self), fields(request_id = %request_id, requester = %requester))]
    pub fn cancel_request(
        &self,
        request_id: RequestId,
        requester: &ComponentId,
    ) -> Result<(), RoutingError> {
        let pending = self.0.callbacks.cancel(request_id, requester)?;
        self.0.circuits.abandon(pending.requester(), pending.target());
        self.0
            .deliver_callback(requester, request_id, Err(CallbackError::Cancelled));
        debug!("Request cancelled");
        Ok(())
    }

    /// Feeds the result of handling a one-way message into the edge breaker.
    pub fn record_delivery_outcome(&self, from: &ComponentId, to: &ComponentId, success: bool) {
        if success {
            self.0.circuits.record_success(from, to);
        } else {
            self.0.circuits.record_failure(from, to);
        }
    }

    /// The mailbox of a registered component.
    #[must_use]
    pub fn mailbox(&self, id: &ComponentId) -> Option<Arc<Mailbox>> {
        self.0.mailbox(id)
    }

    /// Queue length of a registered component's mailbox.
    #[must_use]
    pub fn mailbox_len(&self, id: &ComponentId) -> Option<usize> {
        self.0.mailboxes.get(id).map(|mailbox| mailbox.len())
    }

    /// Whether `id` is registered.
    #[must_use]
    pub fn is_registered(&self, id: &ComponentId) -> bool {
        self.0.mailboxes.contains_key(id)
    }

    /// Number of registered components.
    #[must_use]
    pub fn component_count(&self) -> usize {
        self.0.mailboxes.len()
    }

    /// Whether `request_id` is still pending.
    #[must_use]
    pub fn is_pending(&self, request_id: RequestId) -> bool {
        self.0.callbacks.is_pending(request_id)
    }

    /// Number of pending requests.
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.0.callbacks.pending_count()
    }

    /// State of the `(from, to)` circuit.
    #[must_use]
    pub fn circuit_state(&self, from: &ComponentId, to: &ComponentId) -> CircuitState {
        self.0.circuits.state(from, to)
    }

    /// The admission controller, e.g. to register extra codecs.
    #[must_use]
    pub fn security(&self) -> &SecurityEnforcer {
        &self.0.security
    }

    /// Router counters.
    #[must_use]
    pub fn stats(&self) -> &RouterStats {
        &self.0.stats
    }

    /// Callback manager counters.
    #[must_use]
    pub fn callback_stats(&self) -> &CallbackStats {
        self.0.callbacks.stats()
    }

    /// Closes every mailbox and stops every request timer.
    pub async fn shutdown(&self) {
        for entry in self.0.mailboxes.iter() {
            let _ = entry.value().close();
        }
        self.0.callbacks.shutdown().await;
        trace!("Router shut down");
    }
}

impl RouterInner {
    fn mailbox(&self, id: &ComponentId) -> Option<Arc<Mailbox>> {
        self.mailboxes.get(id).map(|entry| Arc::clone(entry.value()))
    }

    fn admit(
        &self,
        from: &ComponentId,
        to: &ComponentId,
        envelope: &Envelope,
    ) -> Result<Arc<Mailbox>, RoutingError> {
        let result = self.check(from, to, envelope);
        if let Err(err) = &result {
            self.stats.rejected.fetch_add(1, Ordering::Relaxed);
            trace!(error = %err, "Routing refused");
        }
        result
    }

    fn check(
        &self,
        from: &ComponentId,
        to: &ComponentId,
        envelope: &Envelope,
    ) -> Result<Arc<Mailbox>, RoutingError> {
        let mailbox = self
            .mailbox(to)
            .ok_or_else(|| RoutingError::TargetNotFound(to.clone()))?;
        self.security.check_admission(from, to, envelope)?;
        if !self.circuits.try_acquire(from, to) {
            return Err(RoutingError::CircuitOpen {
                from: from.clone(),
                to: to.clone(),
            });
        }
        if let Err(err) = self.security.check_rate_limit(from) {
            self.circuits.abandon(from, to);
            return Err(err);
        }
        Ok(mailbox)
    }

    fn on_enqueue_failed(
        &self,
        from: &ComponentId,
        to: &ComponentId,
        err: MailboxError,
    ) -> RoutingError {
        self.stats.rejected.fetch_add(1, Ordering::Relaxed);
        match err {
            MailboxError::Full => {
                self.circuits.record_failure(from, to);
                RoutingError::MailboxFull(to.clone())
            }
            MailboxError::Closed => {
                self.circuits.abandon(from, to);
                RoutingError::MailboxClosed(to.clone())
            }
        }
    }

    fn on_enqueued(&self, mailbox: &Mailbox, outcome: EnqueueOutcome) {
        let EnqueueOutcome::Evicted(evicted) = outcome else {
            return;
        };
        self.stats.evicted.fetch_add(1, Ordering::Relaxed);
        let owner = mailbox.owner();
        match evicted {
            Delivery::Message { from, .. } => {
                warn!(%from, to = %owner, "Message evicted by backpressure");
                self.circuits.record_failure(&from, owner);
            }
            Delivery::Request {
                request_id, from, ..
            } => {
                warn!(%request_id, %from, to = %owner, "Request evicted by backpressure");
                self.circuits.record_failure(&from, owner);
                if let Some(pending) = self.callbacks.fail_target(request_id) {
                    self.deliver_callback(
                        pending.requester(),
                        request_id,
                        Err(CallbackError::TargetUnavailable),
                    );
                }
            }
            // Never chosen for eviction.
            Delivery::Callback { .. } => {}
        }
    }

    fn on_timeout(&self, request_id: RequestId, pending: &PendingCallback) {
        warn!(%request_id, requester = %pending.requester(), target = %pending.target(), timeout = ?pending.timeout(), "Request timed out");
        self.circuits
            .record_failure(pending.requester(), pending.target());
        self.deliver_callback(pending.requester(), request_id, Err(CallbackError::Timeout));
    }

    fn deliver_callback(
        &self,
        requester: &ComponentId,
        request_id: RequestId,
        outcome: CallbackOutcome,
    ) {
        let Some(mailbox) = self.mailbox(requester) else {
            debug!(%request_id, %requester, "Requester gone; dropping callback");
            return;
        };
        match mailbox.push_callback(Delivery::Callback {
            request_id,
            outcome,
        }) {
            Ok(()) => {
                self.stats.callbacks_delivered.fetch_add(1, Ordering::Relaxed);
                trace!(%request_id, %requester, "Callback delivered");
            }
            Err(err) => debug!(%request_id, %requester, error = %err, "Callback not delivered"),
        }
    }
}
