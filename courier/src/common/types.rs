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

//! Shared type aliases.

use std::sync::Arc;

use dashmap::DashMap;

use crate::mailbox::Mailbox;
use crate::message::{CallbackError, ComponentId};

/// The terminal outcome of a request: response bytes, or why there are none.
pub type CallbackOutcome = Result<Vec<u8>, CallbackError>;

/// Crate-internal: every registered component's mailbox, keyed by id.
pub(crate) type MailboxMap = DashMap<ComponentId, Arc<Mailbox>>;
