//! The component host and shared types.
//!
//! *   [`CourierApp`]: entry point that launches a host.
//! *   [`ComponentRuntime`]: installs, uninstalls and shuts down components.
//! *   [`ComponentHandle`]: the host functions given to each component.
//! *   [`CourierConfig`]: configuration loaded from XDG locations.

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
pub use component_handle::ComponentHandle;
pub use component_runtime::ComponentRuntime;
pub use config::{CourierConfig, TimeoutConfig};
pub use courier_app::CourierApp;

// --- Crate-Internal Re-exports ---
pub use types::*;

// --- Submodules ---

/// Defines shared type aliases.
mod types;

/// Defines [`ComponentHandle`].
mod component_handle;
/// Defines [`ComponentRuntime`].
mod component_runtime;
/// Defines the configuration system.
pub mod config;
/// Defines [`CourierApp`].
mod courier_app;
/// The per-component dispatch loop.
mod dispatcher;
/// Defines the internal state of the runtime.
mod runtime_inner;
