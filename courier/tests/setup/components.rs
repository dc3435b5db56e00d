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
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use courier::prelude::*;
use tokio::sync::mpsc;
use tracing::info;

use super::payloads::{PriceQuery, PriceQuote};

/// Something a [`Recorder`] observed.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Message {
        from: ComponentId,
        payload: Vec<u8>,
    },
    Callback {
        request_id: RequestId,
        outcome: CallbackOutcome,
    },
}

/// Forwards every message and callback it receives to a channel.
#[courier_component(no_default)]
pub struct Recorder {
    events: mpsc::UnboundedSender<Event>,
}

impl Recorder {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (events, receiver) = mpsc::unbounded_channel();
        (Self { events }, receiver)
    }
}

#[async_trait]
impl Component for Recorder {
    async fn handle_message(
        &self,
        _ctx: &ComponentHandle,
        sender: &ComponentId,
        envelope: Envelope,
    ) -> anyhow::Result<Vec<u8>> {
        let payload = envelope.into_payload();
        let _ = self.events.send(Event::Message {
            from: sender.clone(),
            payload: payload.clone(),
        });
        Ok(payload)
    }

    async fn handle_callback(
        &self,
        _ctx: &ComponentHandle,
        request_id: RequestId,
        outcome: CallbackOutcome,
    ) -> anyhow::Result<()> {
        let _ = self.events.send(Event::Callback {
            request_id,
            outcome,
        });
        Ok(())
    }
}

/// Replies with the payload it was sent.
#[courier_component]
pub struct Echo {
    pub handled: AtomicUsize,
}

#[async_trait]
impl Component for Echo {
    async fn handle_message(
        &self,
        _ctx: &ComponentHandle,
        _sender: &ComponentId,
        envelope: Envelope,
    ) -> anyhow::Result<Vec<u8>> {
        self.handled.fetch_add(1, Ordering::SeqCst);
        Ok(envelope.into_payload())
    }
}

/// Echoes after a fixed delay.
#[courier_component(no_default)]
pub struct SlowResponder {
    delay: Duration,
}

impl SlowResponder {
    pub const fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl Component for SlowResponder {
    async fn handle_message(
        &self,
        _ctx: &ComponentHandle,
        _sender: &ComponentId,
        envelope: Envelope,
    ) -> anyhow::Result<Vec<u8>> {
        tokio::time::sleep(self.delay).await;
        Ok(envelope.into_payload())
    }
}

/// Echoes after a random delay below `max_delay_ms`.
#[courier_component(no_default)]
pub struct JitteryResponder {
    max_delay_ms: u64,
}

impl JitteryResponder {
    pub const fn new(max_delay_ms: u64) -> Self {
        Self { max_delay_ms }
    }
}

#[async_trait]
impl Component for JitteryResponder {
    async fn handle_message(
        &self,
        _ctx: &ComponentHandle,
        _sender: &ComponentId,
        envelope: Envelope,
    ) -> anyhow::Result<Vec<u8>> {
        let delay = rand::random_range(0..self.max_delay_ms);
        tokio::time::sleep(Duration::from_millis(delay)).await;
        Ok(envelope.into_payload())
    }
}

/// Always fails.
#[courier_component]
pub struct Failing;

#[async_trait]
impl Component for Failing {
    async fn handle_message(
        &self,
        _ctx: &ComponentHandle,
        _sender: &ComponentId,
        _envelope: Envelope,
    ) -> anyhow::Result<Vec<u8>> {
        Err(anyhow::anyhow!("refused"))
    }
}

/// Fails until its switch is flipped.
#[courier_component(no_default)]
pub struct Switchable {
    healthy: Arc<AtomicBool>,
}

impl Switchable {
    pub fn new() -> (Self, Arc<AtomicBool>) {
        let healthy = Arc::new(AtomicBool::new(false));
        (
            Self {
                healthy: Arc::clone(&healthy),
            },
            healthy,
        )
    }
}

#[async_trait]
impl Component for Switchable {
    async fn handle_message(
        &self,
        _ctx: &ComponentHandle,
        _sender: &ComponentId,
        envelope: Envelope,
    ) -> anyhow::Result<Vec<u8>> {
        if self.healthy.load(Ordering::SeqCst) {
            Ok(envelope.into_payload())
        } else {
            Err(anyhow::anyhow!("not ready"))
        }
    }
}

/// Panics on the first delivery and echoes afterwards.
#[courier_component]
pub struct PanicsOnce {
    calls: AtomicUsize,
}

#[async_trait]
impl Component for PanicsOnce {
    async fn handle_message(
        &self,
        _ctx: &ComponentHandle,
        _sender: &ComponentId,
        envelope: Envelope,
    ) -> anyhow::Result<Vec<u8>> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            panic!("first call explodes");
        }
        Ok(envelope.into_payload())
    }
}

/// Answers JSON price queries.
#[courier_component]
pub struct PriceOracle;

#[async_trait]
impl Component for PriceOracle {
    async fn handle_message(
        &self,
        _ctx: &ComponentHandle,
        sender: &ComponentId,
        envelope: Envelope,
    ) -> anyhow::Result<Vec<u8>> {
        let query: PriceQuery = envelope.decode_json()?;
        info!(%sender, symbol = %query.symbol, "Pricing");
        let quote = PriceQuote {
            cents: query.symbol.len() as u64 * 100,
            symbol: query.symbol,
        };
        Ok(Envelope::json(&quote)?.into_payload())
    }
}

/// On any one-way message, asks `upstream` the same thing and reports the
/// callback to a channel. Exercises sending from inside a handler.
#[courier_component(no_default)]
pub struct Relay {
    upstream: ComponentId,
    timeout_ms: u64,
    events: mpsc::UnboundedSender<Event>,
}

impl Relay {
    pub fn new(upstream: ComponentId, timeout_ms: u64) -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (events, receiver) = mpsc::unbounded_channel();
        (
            Self {
                upstream,
                timeout_ms,
                events,
            },
            receiver,
        )
    }
}

#[async_trait]
impl Component for Relay {
    async fn handle_message(
        &self,
        ctx: &ComponentHandle,
        _sender: &ComponentId,
        envelope: Envelope,
    ) -> anyhow::Result<Vec<u8>> {
        ctx.send_request(&self.upstream, envelope, self.timeout_ms)
            .await?;
        Ok(Vec::new())
    }

    async fn handle_callback(
        &self,
        _ctx: &ComponentHandle,
        request_id: RequestId,
        outcome: CallbackOutcome,
    ) -> anyhow::Result<()> {
        let _ = self.events.send(Event::Callback {
            request_id,
            outcome,
        });
        Ok(())
    }
}
