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

use thiserror::Error;

use crate::message::{ComponentId, RequestId};

/// Synchronous failures of a routing call.
///
/// Every admission check reports through this type before anything is
/// enqueued, so a caller that receives one knows the target saw nothing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingError {
    /// No component is registered under this id.
    #[error("target component not found: {0}")]
    TargetNotFound(ComponentId),

    /// The sender's capability grant does not cover the target.
    #[error("{from} is not permitted to send to {to}")]
    PermissionDenied {
        /// The sending component.
        from: ComponentId,
        /// The rejected target.
        to: ComponentId,
    },

    /// The codec is not supported by the host or not allowed for the sender.
    #[error("unsupported codec: {0:#x}")]
    UnsupportedCodec(u64),

    /// The encoded envelope exceeds the configured maximum.
    #[error("message of {size} bytes exceeds limit of {limit} bytes")]
    MessageTooLarge {
        /// Encoded envelope length.
        size: usize,
        /// Configured maximum.
        limit: usize,
    },

    /// The sender has no rate tokens left.
    #[error("rate limit exceeded for {0}")]
    RateLimitExceeded(ComponentId),

    /// The edge circuit is open.
    #[error("circuit open from {from} to {to}")]
    CircuitOpen {
        /// The sending component.
        from: ComponentId,
        /// The target component.
        to: ComponentId,
    },

    /// The target's mailbox refused the delivery.
    #[error("mailbox full: {0}")]
    MailboxFull(ComponentId),

    /// The target's mailbox has been closed.
    #[error("mailbox closed: {0}")]
    MailboxClosed(ComponentId),

    /// The pending-request table is at capacity.
    #[error("too many pending requests (limit {0})")]
    TooManyPendingRequests(usize),

    /// A request with this id is already pending.
    #[error("duplicate request id: {0}")]
    DuplicateRequest(RequestId),

    /// No pending request has this id; it was never issued or is already resolved.
    #[error("unknown request id: {0}")]
    UnknownRequest(RequestId),

    /// Only the component that issued a request may cancel it.
    #[error("{requester} did not issue request {request_id}")]
    NotRequester {
        /// The request being cancelled.
        request_id: RequestId,
        /// The component that attempted the cancellation.
        requester: ComponentId,
    },

    /// A live component already holds this id.
    #[error("component already registered: {0}")]
    AlreadyRegistered(ComponentId),
}

/// Why a request resolved without a response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallbackError {
    /// No response arrived within the request's timeout.
    #[error("request timed out")]
    Timeout,
    /// The requester cancelled the request.
    #[error("request cancelled")]
    Cancelled,
    /// The target was removed, or the request was evicted from its mailbox.
    #[error("target unavailable")]
    TargetUnavailable,
    /// The target's handler failed.
    #[error("application error: {0}")]
    Application(String),
}

/// Envelope encoding and decoding failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Input ended inside the codec id.
    #[error("envelope truncated")]
    Truncated,
    /// The codec id does not fit in 64 bits.
    #[error("codec id varint overflows u64")]
    VarintOverflow,
    /// A typed payload could not be serialized or deserialized.
    #[error("payload serialization failed: {0}")]
    Serialization(String),
    /// The envelope carries a different codec than the one asked for.
    #[error("expected codec {expected:#x}, found {actual:#x}")]
    CodecMismatch {
        /// The codec the caller asked for.
        expected: u64,
        /// The codec the envelope carries.
        actual: u64,
    },
}
