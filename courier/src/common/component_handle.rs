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

use std::hash::{Hash, Hasher};

use tracing::instrument;

use crate::message::{ComponentId, Envelope, MessagePriority, RequestId, RoutingError};
use crate::routing::MessageRouter;

/// The host functions available to one component.
///
/// Every call is made on behalf of the component the handle belongs to; a
/// component cannot send as anyone else. Handles are cheap to clone.
///
/// Equality and hashing are based solely on the component id.
#[derive(Debug, Clone)]
pub struct ComponentHandle {
    id: ComponentId,
    router: MessageRouter,
}

impl PartialEq for ComponentHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ComponentHandle {}

impl Hash for ComponentHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl ComponentHandle {
    pub(crate) const fn new(id: ComponentId, router: MessageRouter) -> Self {
        Self { id, router }
    }

    /// The component this handle acts for.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> &ComponentId {
        &self.id
    }

    /// Sends a one-way message.
    ///
    /// # Errors
    ///
    /// Any synchronous [`RoutingError`]; delivery failures after enqueue are not reported.
    #[instrument(skip(self, envelope), fields(from = %self.id, to = %target))]
    pub async fn send_message(
        &self,
        target: &ComponentId,
        envelope: Envelope,
    ) -> Result<(), RoutingError> {
        self.router.route_message(&self.id, target, envelope).await
    }

    /// Sends a one-way message with an explicit priority.
    ///
    /// # Errors
    ///
    /// Any synchronous [`RoutingError`].
    pub async fn send_message_with_priority(
        &self,
        target: &ComponentId,
        envelope: Envelope,
        priority: MessagePriority,
    ) -> Result<(), RoutingError> {
        self.router
            .route_message_with_priority(&self.id, target, envelope, priority)
            .await
    }

    /// Sends a request. The outcome arrives later through
    /// [`Component::handle_callback`](crate::traits::Component::handle_callback).
    ///
    /// A `timeout_ms` of zero selects the configured default.
    ///
    /// # Errors
    ///
    /// Any synchronous [`RoutingError`]. No callback follows an error.
    #[instrument(skip(self, envelope), fields(from = %self.id, to = %target))]
    pub async fn send_request(
        &self,
        target: &ComponentId,
        envelope: Envelope,
        timeout_ms: u64,
    ) -> Result<RequestId, RoutingError> {
        self.router
            .route_request(&self.id, target, envelope, timeout_ms)
            .await
    }

    /// Cancels a request this component issued.
    ///
    /// # Errors
    ///
    /// [`RoutingError::UnknownRequest`] if it already resolved,
    /// [`RoutingError::NotRequester`] if another component issued it.
    pub fn cancel_request(&self, request_id: RequestId) -> Result<(), RoutingError> {
        self.router.cancel_request(request_id, &self.id)
    }

    /// The router this handle sends through. Crate-internal: the router takes
    /// arbitrary sender ids, so components only ever see the methods above.
    #[must_use]
    pub(crate) const fn router(&self) -> &MessageRouter {
        &self.router
    }
}
