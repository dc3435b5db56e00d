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

//! Admission control for routing calls.
//!
//! Checks run in a fixed order and the first failure wins:
//!
//! 1. capability: the sender's grant must cover the target
//! 2. codec: the host must support the codec and the grant must allow it
//! 3. size: the encoded envelope must fit `max_message_size`
//! 4. rate limit: one token from the sender's bucket
//!
//! The router runs the edge circuit check between 3 and 4, so an open circuit
//! never costs the sender a token.

use std::collections::HashSet;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::message::{codecs, ComponentId, Envelope, RoutingError};
use crate::security::{CapabilityGrant, CapabilityTable, RateBucket, RateLimitConfig};

/// Default upper bound on an encoded envelope, 1 MiB.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Host-wide admission settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Largest encoded envelope accepted, in bytes.
    pub max_message_size: usize,
    /// Codec ids the host accepts.
    pub supported_codecs: Vec<u64>,
    /// Rate limit for senders whose grant has no override.
    pub rate_limit: RateLimitConfig,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            supported_codecs: vec![codecs::RAW, codecs::JSON, codecs::CBOR, codecs::BORSH],
            rate_limit: RateLimitConfig::default(),
        }
    }
}

/// Capability table, codec allow-list, size limit and rate buckets.
#[derive(Debug)]
pub struct SecurityEnforcer {
    capabilities: CapabilityTable,
    supported_codecs: RwLock<HashSet<u64>>,
    max_message_size: usize,
    default_rate_limit: RateLimitConfig,
    buckets: DashMap<ComponentId, Mutex<RateBucket>>,
}

impl SecurityEnforcer {
    /// Builds an enforcer with no grants installed.
    #[must_use]
    pub fn new(config: &SecurityConfig) -> Self {
        Self {
            capabilities: CapabilityTable::default(),
            supported_codecs: RwLock::new(config.supported_codecs.iter().copied().collect()),
            max_message_size: config.max_message_size,
            default_rate_limit: config.rate_limit,
            buckets: DashMap::new(),
        }
    }

    /// Installs `grant` and gives its sender a fresh, full bucket.
    pub fn install_grant(&self, grant: CapabilityGrant) {
        let limit = grant.rate_limit().copied().unwrap_or(self.default_rate_limit);
        let from = grant.from().clone();
        self.capabilities.install(grant);
        self.buckets.insert(from.clone(), Mutex::new(RateBucket::new(&limit)));
        debug!(component = %from, "Installed capability grant");
    }

    /// Drops the grant and bucket of `component`.
    pub fn revoke(&self, component: &ComponentId) {
        self.capabilities.revoke(component);
        self.buckets.remove(component);
    }

    /// Adds a codec to the host table.
    pub fn register_codec(&self, codec_id: u64) {
        self.supported_codecs.write().insert(codec_id);
    }

    /// Whether the host accepts `codec_id` at all.
    #[must_use]
    pub fn supports_codec(&self, codec_id: u64) -> bool {
        self.supported_codecs.read().contains(&codec_id)
    }

    /// Configured size limit.
    #[must_use]
    pub const fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    /// The installed grants.
    #[must_use]
    pub const fn capabilities(&self) -> &CapabilityTable {
        &self.capabilities
    }

    /// Capability, codec and size checks, in that order. Consumes nothing.
    ///
    /// # Errors
    ///
    /// [`RoutingError::PermissionDenied`], [`RoutingError::UnsupportedCodec`]
    /// or [`RoutingError::MessageTooLarge`].
    pub fn check_admission(
        &self,
        from: &ComponentId,
        to: &ComponentId,
        envelope: &Envelope,
    ) -> Result<(), RoutingError> {
        let Some(grant) = self.capabilities.get(from) else {
            trace!(%from, %to, "No grant installed for sender");
            return Err(RoutingError::PermissionDenied {
                from: from.clone(),
                to: to.clone(),
            });
        };
        if !grant.permits_target(to) {
            return Err(RoutingError::PermissionDenied {
                from: from.clone(),
                to: to.clone(),
            });
        }

        let codec_id = envelope.codec_id();
        if !self.supports_codec(codec_id) || !grant.permits_codec(codec_id) {
            return Err(RoutingError::UnsupportedCodec(codec_id));
        }

        let size = envelope.encoded_len();
        if size > self.max_message_size {
            return Err(RoutingError::MessageTooLarge {
                size,
                limit: self.max_message_size,
            });
        }
        Ok(())
    }

    /// Takes one token from `from`'s bucket.
    ///
    /// # Errors
    ///
    /// [`RoutingError::RateLimitExceeded`] when the bucket is empty or the
    /// sender has no bucket.
    pub fn check_rate_limit(&self, from: &ComponentId) -> Result<(), RoutingError> {
        let admitted = self
            .buckets
            .get(from)
            .is_some_and(|bucket| bucket.lock().try_acquire());
        if admitted {
            Ok(())
        } else {
            trace!(%from, "Rate limit exceeded");
            Err(RoutingError::RateLimitExceeded(from.clone()))
        }
    }
}
