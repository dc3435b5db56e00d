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

use serde::{Deserialize, Serialize};

use crate::common::CallbackOutcome;
use crate::message::{ComponentId, Envelope, RequestId};

/// Relative importance of a delivery, consulted by
/// [`BackpressureStrategy::DropByPriority`](crate::prelude::BackpressureStrategy::DropByPriority).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessagePriority {
    /// Shed first under pressure.
    Low,
    /// The default.
    #[default]
    Normal,
    /// Preferred over normal traffic.
    High,
    /// Never shed in favour of lower-priority traffic.
    Critical,
}

/// An item sitting in a component's mailbox.
#[derive(Debug, Clone)]
pub enum Delivery {
    /// A one-way notification.
    Message {
        /// The sending component.
        from: ComponentId,
        /// The payload.
        envelope: Envelope,
    },
    /// A request awaiting a response.
    Request {
        /// Correlation id to answer under.
        request_id: RequestId,
        /// The requesting component.
        from: ComponentId,
        /// The payload.
        envelope: Envelope,
    },
    /// The terminal outcome of a request this component made.
    Callback {
        /// The request being resolved.
        request_id: RequestId,
        /// Response bytes, or why there is no response.
        outcome: CallbackOutcome,
    },
}

impl Delivery {
    /// The sender, for message and request deliveries.
    #[must_use]
    pub const fn sender(&self) -> Option<&ComponentId> {
        match self {
            Self::Message { from, .. } | Self::Request { from, .. } => Some(from),
            Self::Callback { .. } => None,
        }
    }

    /// The correlation id, for request and callback deliveries.
    #[must_use]
    pub const fn request_id(&self) -> Option<RequestId> {
        match self {
            Self::Request { request_id, .. } | Self::Callback { request_id, .. } => {
                Some(*request_id)
            }
            Self::Message { .. } => None,
        }
    }

    /// Callbacks bypass capacity limits and are never evicted.
    #[inline]
    #[must_use]
    pub const fn is_callback(&self) -> bool {
        matches!(self, Self::Callback { .. })
    }
}
