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

use std::sync::Arc;

use tracing::trace;

use crate::common::config::CONFIG;
use crate::common::runtime_inner::RuntimeInner;
use crate::common::{ComponentRuntime, CourierConfig};

/// Entry point for starting a Courier host.
///
/// ```rust,ignore
/// let runtime = CourierApp::launch();
/// let echo = ComponentId::new("echo")?;
/// runtime.install(CapabilityGrant::new(echo.clone()), Echo)?;
/// // ...
/// runtime.shutdown_all().await?;
/// ```
#[derive(Default, Debug, Clone)]
pub struct CourierApp;

impl CourierApp {
    /// Launches a host configured from the XDG config file, or defaults.
    #[must_use]
    pub fn launch() -> ComponentRuntime {
        Self::launch_with_config(CONFIG.clone())
    }

    /// Launches a host with explicit configuration.
    #[must_use]
    pub fn launch_with_config(config: CourierConfig) -> ComponentRuntime {
        trace!("Configuration: {:?}", config);
        let runtime = ComponentRuntime(Arc::new(RuntimeInner::new(config)));
        trace!("Courier host ready");
        runtime
    }
}
