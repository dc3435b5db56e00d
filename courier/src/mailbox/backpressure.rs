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

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default mailbox capacity, matching the inbox size of an installed component.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 255;

/// What a full mailbox does with a new delivery.
///
/// In TOML the variant is selected with a `strategy` key:
///
/// ```toml
/// [mailbox.backpressure]
/// strategy = "block"
/// max_wait_ms = 50
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum BackpressureStrategy {
    /// Refuse the new delivery.
    #[default]
    Reject,
    /// Suspend the sender until space frees up, for at most `max_wait_ms`.
    Block {
        /// Longest time a sender may wait, in milliseconds.
        max_wait_ms: u64,
    },
    /// Evict the oldest queued message or request to make room.
    DropOldest,
    /// Evict the oldest of the lowest-priority queued items, provided it is
    /// strictly less important than the new delivery. Otherwise refuse.
    DropByPriority,
}

impl BackpressureStrategy {
    /// The wait bound of a `Block` strategy.
    #[must_use]
    pub const fn max_wait(&self) -> Option<Duration> {
        match self {
            Self::Block { max_wait_ms } => Some(Duration::from_millis(*max_wait_ms)),
            _ => None,
        }
    }

    /// Whether this strategy may evict queued deliveries.
    #[must_use]
    pub const fn evicts(&self) -> bool {
        matches!(self, Self::DropOldest | Self::DropByPriority)
    }
}

/// Per-mailbox settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MailboxConfig {
    /// Maximum number of queued messages and requests. Callbacks are not counted.
    pub capacity: usize,
    /// Behaviour once `capacity` is reached.
    pub backpressure: BackpressureStrategy,
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_MAILBOX_CAPACITY,
            backpressure: BackpressureStrategy::default(),
        }
    }
}

impl MailboxConfig {
    /// A config with the given capacity and strategy.
    #[must_use]
    pub const fn new(capacity: usize, backpressure: BackpressureStrategy) -> Self {
        Self {
            capacity,
            backpressure,
        }
    }
}
