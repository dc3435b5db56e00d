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

use std::path::Path;
use std::time::Duration;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::mailbox::MailboxConfig;
use crate::resilience::CircuitBreakerConfig;
use crate::routing::CallbackConfig;
use crate::security::SecurityConfig;

/// Configuration for a Courier host.
///
/// Every section is optional in TOML; missing sections and keys take their
/// defaults:
///
/// ```toml
/// [mailbox]
/// capacity = 512
///
/// [mailbox.backpressure]
/// strategy = "drop_oldest"
///
/// [security]
/// max_message_size = 65536
///
/// [security.rate_limit]
/// refill_per_second = 20.0
/// capacity = 10
///
/// [circuit_breaker]
/// failure_threshold = 3
/// cooldown_ms = 5000
///
/// [callbacks]
/// default_timeout_ms = 1000
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CourierConfig {
    /// Default mailbox settings for new components.
    pub mailbox: MailboxConfig,
    /// Admission control.
    pub security: SecurityConfig,
    /// Edge circuit breakers.
    pub circuit_breaker: CircuitBreakerConfig,
    /// Request timeouts and the pending-request limit.
    pub callbacks: CallbackConfig,
    /// Host timeouts.
    pub timeouts: TimeoutConfig,
}

/// Host timeouts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// How long `shutdown_all` waits for dispatch tasks before cancelling them.
    pub system_shutdown_timeout_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            system_shutdown_timeout_ms: 30_000,
        }
    }
}

impl CourierConfig {
    /// The system shutdown timeout as a `Duration`.
    #[must_use]
    pub const fn system_shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.system_shutdown_timeout_ms)
    }

    /// Parses a TOML document.
    ///
    /// # Errors
    ///
    /// Returns the parse error for malformed input.
    pub fn from_toml_str(source: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(source)
    }

    /// Reads and parses a TOML file.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or parsed.
    pub fn load_from(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)?;
        Ok(Self::from_toml_str(&source)?)
    }

    /// Loads `courier/config.toml` from the XDG config directories.
    ///
    /// A missing file yields the defaults. An unreadable or malformed file is
    /// logged and also yields the defaults.
    #[must_use]
    pub fn load() -> Self {
        let xdg_dirs = match xdg::BaseDirectories::with_prefix("courier") {
            Ok(dirs) => dirs,
            Err(e) => {
                error!("Failed to initialize XDG directories: {}", e);
                return Self::default();
            }
        };

        let Some(path) = xdg_dirs.find_config_file("config.toml") else {
            info!("No configuration file found, using defaults");
            return Self::default();
        };

        info!("Loading configuration from: {}", path.display());
        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load configuration file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }
}

lazy_static! {
    /// Host configuration loaded from the XDG config directories on first use.
    pub static ref CONFIG: CourierConfig = CourierConfig::load();
}
