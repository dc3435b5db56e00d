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
#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Courier routes messages between isolated components.
//!
//! Each installed component owns a bounded mailbox and is driven by its own
//! dispatch task. Components talk to each other in two ways:
//!
//! *   **One-way messages**, delivered at most once, in order per sender/target pair.
//! *   **Requests**, which are correlated by a [`RequestId`](prelude::RequestId),
//!     timed out automatically, and resolved exactly once: by the target's
//!     response, a timeout, a cancellation, or the removal of either party.
//!
//! Every routing call is admitted through a fixed pipeline before anything is
//! enqueued: target lookup, capability grant, codec allow-list, size limit,
//! the per-edge circuit breaker, and finally the sender's token bucket.
//!
//! # Example
//!
//! ```rust,ignore
//! use courier::prelude::*;
//!
//! #[courier_component]
//! struct Echo;
//!
//! #[async_trait]
//! impl Component for Echo {
//!     async fn handle_message(
//!         &self,
//!         _ctx: &ComponentHandle,
//!         _sender: &ComponentId,
//!         envelope: Envelope,
//!     ) -> anyhow::Result<Vec<u8>> {
//!         Ok(envelope.into_payload())
//!     }
//! }
//!
//! let runtime = CourierApp::launch();
//! let echo = ComponentId::new("echo")?;
//! let client = ComponentId::new("client")?;
//! runtime.install(CapabilityGrant::new(echo.clone()), Echo)?;
//! let handle = runtime.install(
//!     CapabilityGrant::new(client.clone()).allow_target(echo.clone()),
//!     Client::default(),
//! )?;
//! let request_id = handle.send_request(&echo, Envelope::raw(b"hi".to_vec()), 1_000).await?;
//! ```

/// The component host, handle, configuration and shared types.
pub(crate) mod common;
/// Bounded mailboxes and backpressure.
pub(crate) mod mailbox;
/// Ids, envelopes, deliveries and errors.
pub(crate) mod message;
/// Edge circuit breakers.
pub(crate) mod resilience;
/// The router and the callback manager.
pub(crate) mod routing;
/// Capability grants, rate limiting and admission checks.
pub(crate) mod security;
/// Traits implemented by hosted components.
pub(crate) mod traits;

static_assertions::assert_impl_all!(prelude::MessageRouter: Send, Sync, Clone);
static_assertions::assert_impl_all!(prelude::ComponentRuntime: Send, Sync, Clone);
static_assertions::assert_impl_all!(prelude::ComponentHandle: Send, Sync, Clone);
static_assertions::assert_impl_all!(prelude::Delivery: Send, Sync);
static_assertions::assert_impl_all!(prelude::RoutingError: Send, Sync, std::error::Error);

/// A prelude module for conveniently importing the most commonly used items.
///
/// # Re-exports
///
/// ## Macros (from `courier-macro`)
/// *   [`courier_macro::courier_payload`]: Attribute macro for payload types.
/// *   [`courier_macro::courier_component`]: Attribute macro for component types.
///
/// ## External Crates
/// *   [`acton_ern::Ern`]: The resource name behind every [`ComponentId`](crate::prelude::ComponentId).
/// *   [`async_trait::async_trait`]: Needed to implement [`Component`](crate::prelude::Component).
pub mod prelude {
    // Macros from courier-macro
    pub use courier_macro::*;

    // External crate re-exports
    pub use acton_ern::Ern;
    pub use async_trait::async_trait;

    // Host
    pub use crate::common::config::CONFIG;
    pub use crate::common::{
        CallbackOutcome, ComponentHandle, ComponentRuntime, CourierApp, CourierConfig,
        TimeoutConfig,
    };
    pub use crate::traits::Component;

    // Messages
    pub use crate::message::{
        codecs, decode_varint, encode_varint, varint_len, CallbackError, CodecError, ComponentId,
        Delivery, Envelope, MessagePriority, RequestId, RoutingError, MAX_VARINT_LEN,
    };

    // Mailboxes
    pub use crate::mailbox::{
        BackpressureStrategy, EnqueueOutcome, Mailbox, MailboxConfig, MailboxError, MailboxStats,
        DEFAULT_MAILBOX_CAPACITY,
    };

    // Routing
    pub use crate::routing::{
        CallbackConfig, CallbackManager, CallbackStats, MessageRouter, PendingCallback,
        ResolvedCallback, RouterStats,
    };

    // Security
    pub use crate::security::{
        CapabilityGrant, CapabilityTable, RateBucket, RateLimitConfig, SecurityConfig,
        SecurityEnforcer, TargetSet, DEFAULT_MAX_MESSAGE_SIZE,
    };

    // Resilience
    pub use crate::resilience::{
        CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitState, Edge,
    };
}
