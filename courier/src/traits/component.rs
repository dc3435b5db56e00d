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

use async_trait::async_trait;

use crate::common::{CallbackOutcome, ComponentHandle};
use crate::message::{ComponentId, Envelope, RequestId};

/// An isolated execution unit hosted by a [`ComponentRuntime`](crate::common::ComponentRuntime).
///
/// The host calls these methods from the component's own dispatch task, one
/// delivery at a time, in mailbox order. A component never sees another
/// component's state; it reaches other components only through the
/// [`ComponentHandle`] passed to every call.
///
/// Errors and panics are treated alike: for a request the requester receives
/// `CallbackError::Application`, for a one-way message the failure is logged
/// and counted against the edge circuit.
#[async_trait]
pub trait Component: Send + Sync + 'static {
    /// Handles a one-way message or a request.
    ///
    /// For a request the returned bytes become the response payload; for a
    /// one-way message they are ignored.
    async fn handle_message(
        &self,
        ctx: &ComponentHandle,
        sender: &ComponentId,
        envelope: Envelope,
    ) -> anyhow::Result<Vec<u8>>;

    /// Receives the terminal outcome of a request this component issued.
    ///
    /// Called exactly once per [`RequestId`] returned by
    /// [`ComponentHandle::send_request`]. The default ignores it.
    async fn handle_callback(
        &self,
        ctx: &ComponentHandle,
        request_id: RequestId,
        outcome: CallbackOutcome,
    ) -> anyhow::Result<()> {
        let _ = (ctx, request_id, outcome);
        Ok(())
    }
}
