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

use tracing::{debug, error, instrument, trace};

use crate::common::dispatcher::Dispatcher;
use crate::common::runtime_inner::{InstalledComponent, RuntimeInner};
use crate::common::{ComponentHandle, CourierConfig};
use crate::mailbox::MailboxConfig;
use crate::message::ComponentId;
use crate::routing::MessageRouter;
use crate::security::CapabilityGrant;
use crate::traits::Component;

/// A running host: installed components, their dispatch tasks and the router
/// between them.
///
/// Created by [`CourierApp::launch`](crate::common::CourierApp::launch). Cheap
/// to clone; clones share all state.
#[derive(Debug, Clone)]
pub struct ComponentRuntime(pub(crate) Arc<RuntimeInner>);

impl ComponentRuntime {
    /// Installs `component` under the id named by `grant`, using the default
    /// mailbox settings, and starts its dispatch task.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Fails if the id is already installed.
    pub fn install<C: Component>(
        &self,
        grant: CapabilityGrant,
        component: C,
    ) -> anyhow::Result<ComponentHandle> {
        self.install_with_mailbox(grant, self.0.config.mailbox, component)
    }

    /// Like [`ComponentRuntime::install`], with explicit mailbox settings.
    ///
    /// # Errors
    ///
    /// Fails if the id is already installed.
    #[instrument(skip(self, grant, component), fields(component = %grant.from()))]
    pub fn install_with_mailbox<C: Component>(
        &self,
        grant: CapabilityGrant,
        mailbox_config: MailboxConfig,
        component: C,
    ) -> anyhow::Result<ComponentHandle> {
        let id = grant.from().clone();
        let mailbox = self
            .0
            .router
            .register_component_with_mailbox(grant, mailbox_config)?;

        let handle = ComponentHandle::new(id.clone(), self.0.router.clone());
        let cancellation_token = self.0.cancellation_token.child_token();
        let dispatcher = Dispatcher::new(
            Arc::new(component),
            handle.clone(),
            mailbox,
            cancellation_token.clone(),
        );
        self.0.tracker.spawn(dispatcher.run());
        self.0.components.insert(
            id,
            InstalledComponent {
                handle: handle.clone(),
                cancellation_token,
            },
        );
        debug!("Component installed");
        Ok(handle)
    }

    /// Stops and removes a component.
    ///
    /// Pending requests it issued are cancelled silently; pending requests sent
    /// to it resolve as `TargetUnavailable` at their requesters.
    ///
    /// # Errors
    ///
    /// Fails if the id is not installed.
    #[instrument(skip(self), fields(component = %id))]
    pub fn uninstall(&self, id: &ComponentId) -> anyhow::Result<()> {
        self.0.router.unregister_component(id)?;
        if let Some((_, installed)) = self.0.components.remove(id) {
            installed.cancellation_token.cancel();
        }
        debug!("Component uninstalled");
        Ok(())
    }

    /// The handle of an installed component.
    #[must_use]
    pub fn handle(&self, id: &ComponentId) -> Option<ComponentHandle> {
        self.0
            .components
            .get(id)
            .map(|installed| installed.handle.clone())
    }

    /// Number of installed components.
    #[must_use]
    pub fn component_count(&self) -> usize {
        self.0.components.len()
    }

    /// The router shared by every component.
    #[must_use]
    pub fn router(&self) -> &MessageRouter {
        &self.0.router
    }

    /// The configuration this runtime was launched with.
    #[must_use]
    pub fn config(&self) -> &CourierConfig {
        &self.0.config
    }

    /// Shuts the host down.
    ///
    /// Closes every mailbox and stops every request timer, then waits up to
    /// `timeouts.system_shutdown_timeout_ms` for dispatch tasks to finish their
    /// current delivery. Tasks still running after that are cancelled.
    ///
    /// # Errors
    ///
    /// Returns an error if the shutdown timeout expired and tasks had to be cancelled.
    #[instrument(skip(self))]
    pub async fn shutdown_all(&self) -> anyhow::Result<()> {
        trace!("Closing mailboxes and stopping request timers");
        self.0.router.shutdown().await;
        self.0.tracker.close();

        let timeout = self.0.config.system_shutdown_timeout();
        let graceful = tokio::time::timeout(timeout, self.0.tracker.wait())
            .await
            .is_ok();
        self.0.components.clear();

        if graceful {
            trace!("All dispatch tasks completed gracefully");
            return Ok(());
        }

        error!(
            "System-wide shutdown timeout expired after {:?}. Forcefully cancelling remaining tasks.",
            timeout
        );
        self.0.cancellation_token.cancel();
        self.0.tracker.wait().await;
        Err(anyhow::anyhow!(
            "Timeout while waiting for components to shut down after {timeout:?}"
        ))
    }
}
