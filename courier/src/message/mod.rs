//! Identities, envelopes and deliveries.
//!
//! *   [`ComponentId`] and [`RequestId`]: the two ids every routing decision keys on.
//! *   [`Envelope`]: a payload tagged with its codec id, plus the varint helpers
//!     behind its wire form.
//! *   [`Delivery`]: what a mailbox holds, with its [`MessagePriority`].
//! *   [`RoutingError`], [`CallbackError`] and [`CodecError`]: the error taxonomy.

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

// --- Public Re-exports ---
pub use component_id::ComponentId;
pub use delivery::{Delivery, MessagePriority};
pub use envelope::{codecs, decode_varint, encode_varint, varint_len, Envelope, MAX_VARINT_LEN};
pub use request_id::RequestId;
pub use routing_error::{CallbackError, CodecError, RoutingError};

// --- Submodules ---

/// Defines [`ComponentId`].
mod component_id;
/// Defines [`Delivery`] and [`MessagePriority`].
mod delivery;
/// Defines [`Envelope`] and its wire form.
mod envelope;
/// Defines [`RequestId`].
mod request_id;
/// Defines the routing, callback and codec error enums.
mod routing_error;
