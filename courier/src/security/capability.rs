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

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;

use crate::message::ComponentId;
use crate::security::RateLimitConfig;

/// The components a sender may address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSet {
    /// Any registered component.
    Wildcard,
    /// Exactly these components.
    Only(HashSet<ComponentId>),
}

impl Default for TargetSet {
    fn default() -> Self {
        Self::Only(HashSet::new())
    }
}

impl TargetSet {
    /// Whether `target` is covered.
    #[must_use]
    pub fn contains(&self, target: &ComponentId) -> bool {
        match self {
            Self::Wildcard => true,
            Self::Only(targets) => targets.contains(target),
        }
    }
}

/// What one component is allowed to send, and to whom.
///
/// Grants are built before installation and are immutable afterwards; replace
/// the grant to change them.
///
/// ```rust,ignore
/// let grant = CapabilityGrant::new(client.clone())
///     .allow_target(server.clone())
///     .allow_codec(codecs::JSON)
///     .with_rate_limit(RateLimitConfig::new(10.0, 5));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct CapabilityGrant {
    from: ComponentId,
    allowed_targets: TargetSet,
    allowed_codecs: HashSet<u64>,
    rate_limit: Option<RateLimitConfig>,
}

impl CapabilityGrant {
    /// A grant for `from` that permits nothing yet.
    #[must_use]
    pub fn new(from: ComponentId) -> Self {
        Self {
            from,
            allowed_targets: TargetSet::default(),
            allowed_codecs: HashSet::new(),
            rate_limit: None,
        }
    }

    /// A grant for `from` that may address any component.
    #[must_use]
    pub fn wildcard(from: ComponentId) -> Self {
        Self::new(from).allow_any_target()
    }

    /// Adds one permitted target. Has no effect on a wildcard grant.
    #[must_use]
    pub fn allow_target(mut self, target: ComponentId) -> Self {
        if let TargetSet::Only(targets) = &mut self.allowed_targets {
            targets.insert(target);
        }
        self
    }

    /// Adds several permitted targets.
    #[must_use]
    pub fn allow_targets(self, targets: impl IntoIterator<Item = ComponentId>) -> Self {
        targets
            .into_iter()
            .fold(self, CapabilityGrant::allow_target)
    }

    /// Permits every target.
    #[must_use]
    pub fn allow_any_target(mut self) -> Self {
        self.allowed_targets = TargetSet::Wildcard;
        self
    }

    /// Restricts the sender to the listed codecs. With no codecs listed, any
    /// codec the host supports is accepted.
    #[must_use]
    pub fn allow_codec(mut self, codec_id: u64) -> Self {
        self.allowed_codecs.insert(codec_id);
        self
    }

    /// Overrides the host-wide rate limit for this sender.
    #[must_use]
    pub fn with_rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.rate_limit = Some(rate_limit);
        self
    }

    /// The component this grant belongs to.
    #[inline]
    #[must_use]
    pub const fn from(&self) -> &ComponentId {
        &self.from
    }

    /// Permitted targets.
    #[inline]
    #[must_use]
    pub const fn allowed_targets(&self) -> &TargetSet {
        &self.allowed_targets
    }

    /// Per-sender rate limit override, if any.
    #[inline]
    #[must_use]
    pub const fn rate_limit(&self) -> Option<&RateLimitConfig> {
        self.rate_limit.as_ref()
    }

    /// Whether this grant covers `target`.
    #[must_use]
    pub fn permits_target(&self, target: &ComponentId) -> bool {
        self.allowed_targets.contains(target)
    }

    /// Whether this grant covers `codec_id`.
    #[must_use]
    pub fn permits_codec(&self, codec_id: u64) -> bool {
        self.allowed_codecs.is_empty() || self.allowed_codecs.contains(&codec_id)
    }
}

/// Installed grants, keyed by sender.
#[derive(Debug, Default)]
pub struct CapabilityTable {
    grants: DashMap<ComponentId, Arc<CapabilityGrant>>,
}

impl CapabilityTable {
    /// Installs `grant`, replacing any previous grant for the same sender.
    pub fn install(&self, grant: CapabilityGrant) {
        self.grants.insert(grant.from().clone(), Arc::new(grant));
    }

    /// Removes the grant for `from`.
    pub fn revoke(&self, from: &ComponentId) -> Option<Arc<CapabilityGrant>> {
        self.grants.remove(from).map(|(_, grant)| grant)
    }

    /// The grant for `from`, if installed.
    #[must_use]
    pub fn get(&self, from: &ComponentId) -> Option<Arc<CapabilityGrant>> {
        self.grants.get(from).map(|entry| Arc::clone(entry.value()))
    }

    /// Number of installed grants.
    #[must_use]
    pub fn len(&self) -> usize {
        self.grants.len()
    }

    /// Whether no grants are installed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }
}
