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

//! The per-component dispatch loop.
//!
//! One task per installed component drains its mailbox and invokes the
//! component. Handler errors and panics are caught here and turned into
//! circuit failures and `Application` callbacks; they never take the task down.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{error, instrument, trace, warn};

use crate::common::{CallbackOutcome, ComponentHandle};
use crate::mailbox::Mailbox;
use crate::message::{CallbackError, ComponentId, Delivery, Envelope, RequestId};
use crate::traits::Component;

pub(crate) struct Dispatcher {
    component: Arc<dyn Component>,
    handle: ComponentHandle,
    mailbox: Arc<Mailbox>,
    cancellation_token: CancellationToken,
}

impl Dispatcher {
    pub(crate) fn new(
        component: Arc<dyn Component>,
        handle: ComponentHandle,
        mailbox: Arc<Mailbox>,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            component,
            handle,
            mailbox,
            cancellation_token,
        }
    }

    /// Runs until the mailbox closes and drains, or the token is cancelled.
    #[instrument(skip(self), fields(component = %self.handle.id()))]
    pub(crate) async fn run(self) {
        let cancel = self.cancellation_token.clone();
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    trace!("Dispatch cancelled");
                    break;
                }
                next = self.mailbox.recv() => {
                    let Some(delivery) = next else {
                        trace!("Mailbox closed; dispatch finished");
                        break;
                    };
                    tokio::select! {
                        () = cancel.cancelled() => {
                            warn!("Dispatch cancelled while a handler was running");
                            break;
                        }
                        () = self.dispatch(delivery) => {}
                    }
                }
            }
        }
    }

    async fn dispatch(&self, delivery: Delivery) {
        let me = self.handle.id();
        match delivery {
            Delivery::Message { from, envelope } => {
                let result = self.invoke_handle_message(&from, envelope).await;
                if let Err(err) = &result {
                    warn!(%from, error = %err, "One-way message handler failed");
                }
                self.handle
                    .router()
                    .record_delivery_outcome(&from, me, result.is_ok());
            }
            Delivery::Request {
                request_id,
                from,
                envelope,
            } => {
                let outcome = self
                    .invoke_handle_message(&from, envelope)
                    .await
                    .map_err(|err| CallbackError::Application(err.to_string()));
                if !self.handle.router().route_callback(request_id, me, outcome) {
                    trace!(%request_id, "Response discarded; request already resolved");
                }
            }
            Delivery::Callback {
                request_id,
                outcome,
            } => self.invoke_handle_callback(request_id, outcome).await,
        }
    }

    async fn invoke_handle_message(
        &self,
        from: &ComponentId,
        envelope: Envelope,
    ) -> anyhow::Result<Vec<u8>> {
        let call = self.component.handle_message(&self.handle, from, envelope);
        match AssertUnwindSafe(call).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(anyhow::anyhow!(
                "handler panicked: {}",
                panic_message(panic.as_ref())
            )),
        }
    }

    async fn invoke_handle_callback(&self, request_id: RequestId, outcome: CallbackOutcome) {
        let call = self
            .component
            .handle_callback(&self.handle, request_id, outcome);
        match AssertUnwindSafe(call).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => error!(%request_id, error = %err, "Callback handler failed"),
            Err(panic) => error!(
                %request_id,
                "Callback handler panicked: {}",
                panic_message(panic.as_ref())
            ),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
