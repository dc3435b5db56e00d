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

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::common::{ComponentHandle, CourierConfig};
use crate::message::ComponentId;
use crate::routing::MessageRouter;

/// Bookkeeping for one installed component.
#[derive(Debug)]
pub(crate) struct InstalledComponent {
    /// Handle given to the component.
    pub(crate) handle: ComponentHandle,
    /// Stops this component's dispatch task.
    pub(crate) cancellation_token: CancellationToken,
}

/// Internal state of a [`ComponentRuntime`](crate::common::ComponentRuntime).
#[derive(Debug)]
pub(crate) struct RuntimeInner {
    /// Routing, admission and correlation.
    pub(crate) router: MessageRouter,

    /// Installed components, keyed by id.
    pub(crate) components: DashMap<ComponentId, InstalledComponent>,

    /// Tracks every dispatch task.
    pub(crate) tracker: TaskTracker,

    /// Parent of every dispatch task's token; cancelling it forces shutdown.
    pub(crate) cancellation_token: CancellationToken,

    /// Configuration the runtime was launched with.
    pub(crate) config: CourierConfig,
}

impl RuntimeInner {
    pub(crate) fn new(config: CourierConfig) -> Self {
        Self {
            router: MessageRouter::new(&config),
            components: DashMap::new(),
            tracker: TaskTracker::new(),
            cancellation_token: CancellationToken::new(),
            config,
        }
    }
}
