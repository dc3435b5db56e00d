//! Message routing and request/response correlation.
//!
//! *   [`MessageRouter`]: admission control, delivery and callback routing.
//! *   [`CallbackManager`]: the pending-request table, its timers and the
//!     exactly-once resolution gate.

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

pub use callback_manager::{
    CallbackConfig, CallbackManager, CallbackStats, PendingCallback, ResolvedCallback,
};
pub use message_router::{MessageRouter, RouterStats};

/// Defines [`CallbackManager`] and its configuration.
mod callback_manager;
/// Defines [`MessageRouter`].
mod message_router;
