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

use std::fmt;

use acton_ern::{Account, Category, Domain, EntityRoot, Ern, Parts};

/// Opaque, stable identity of an installed component.
///
/// A `ComponentId` wraps an [`Ern`] and is passed by value everywhere: mailboxes,
/// capability grants, circuit edges and pending callbacks all key on it. No
/// component ever holds a reference to another component's state, only its id.
///
/// Equality and hashing delegate to the wrapped `Ern`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ComponentId(Ern);

impl ComponentId {
    /// Creates an id rooted at `name`, under `ern:courier:routing:host`.
    ///
    /// # Errors
    ///
    /// Returns an error if `name` is not a valid `Ern` root.
    pub fn new(name: impl Into<String>) -> anyhow::Result<Self> {
        Ok(Self(Ern::new(
            Domain::new("courier")?,
            Category::new("routing")?,
            Account::new("host")?,
            EntityRoot::new(name.into())?,
            Parts::default(),
        )))
    }

    /// The underlying [`Ern`].
    #[inline]
    #[must_use]
    pub const fn ern(&self) -> &Ern {
        &self.0
    }

    /// The root segment of the id, usually the name the component was created with.
    #[inline]
    #[must_use]
    pub fn name(&self) -> String {
        self.0.root.to_string()
    }
}

impl From<Ern> for ComponentId {
    fn from(ern: Ern) -> Self {
        Self(ern)
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_round_trips_root() {
        let id = ComponentId::new("billing").unwrap();
        assert!(id.name().starts_with("billing"));
    }

    #[test]
    fn test_ids_live_in_the_courier_domain() {
        let id = ComponentId::new("billing").unwrap();
        assert_eq!(id.ern().domain.as_str(), "courier");
        assert_eq!(id.ern().category.as_str(), "routing");
        assert!(id.to_string().starts_with("ern:courier:routing:host:billing"));
    }

    #[test]
    fn test_clone_is_equal() {
        let id = ComponentId::new("ledger").unwrap();
        assert_eq!(id.clone(), id);
    }
}
