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

use std::sync::Once;
use std::time::Duration;

use courier::prelude::*;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::Level;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

pub mod components;
pub mod payloads;

use components::Event;

// Ensures tracing initialization happens only once across all tests.
static INIT: Once = Once::new();

/// Initializes the global tracing subscriber for tests.
///
/// Logs go to `logs/courier_tests.txt` so that test output stays readable.
pub fn initialize_tracing() {
    INIT.call_once(|| {
        std::fs::create_dir_all("logs").expect("could not create logs dir");

        let file_appender = RollingFileAppender::new(Rotation::NEVER, "logs", "courier_tests.txt");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        // Leak the guard so the non-blocking writer is not dropped before process exit
        Box::leak(Box::new(guard));

        let filter = EnvFilter::new("info")
            .add_directive("courier::routing=trace".parse().unwrap())
            .add_directive("courier::common::dispatcher=trace".parse().unwrap())
            .add_directive("courier::mailbox=debug".parse().unwrap());

        let subscriber = FmtSubscriber::builder()
            .with_span_events(FmtSpan::NONE)
            .with_max_level(Level::TRACE)
            .compact()
            .with_line_number(true)
            .without_time()
            .with_target(true)
            .with_env_filter(filter)
            .with_writer(non_blocking)
            .finish();

        tracing::subscriber::set_global_default(subscriber)
            .expect("setting default subscriber failed");
    });
}

/// A fresh component id. Ids carry a unique suffix, so clone rather than
/// calling this twice for the same component.
pub fn id(name: &str) -> ComponentId {
    ComponentId::new(name).expect("valid component id")
}

/// Defaults with rate limiting and circuit breaking switched off, for tests
/// that push many deliveries through one edge.
pub fn unthrottled_config() -> CourierConfig {
    let mut config = CourierConfig::default();
    config.security.rate_limit = RateLimitConfig::disabled();
    config.circuit_breaker = CircuitBreakerConfig::disabled();
    config
}

/// The next event a recorder saw. Panics if none arrives within a minute of
/// (possibly paused) time.
pub async fn next_event(events: &mut UnboundedReceiver<Event>) -> Event {
    tokio::time::timeout(Duration::from_secs(60), events.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event channel closed")
}

/// Unwraps a callback event.
pub fn expect_callback(event: Event) -> (RequestId, CallbackOutcome) {
    match event {
        Event::Callback {
            request_id,
            outcome,
        } => (request_id, outcome),
        other => panic!("expected a callback, got {other:?}"),
    }
}
