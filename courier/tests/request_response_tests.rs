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

use std::collections::HashMap;
use std::time::Duration;

use courier::prelude::*;
use tokio::time::Instant;

use crate::setup::components::{
    Echo, Event, Failing, JitteryResponder, PanicsOnce, PriceOracle, Recorder, Relay,
    SlowResponder,
};
use crate::setup::payloads::{PriceQuery, PriceQuote};
use crate::setup::{expect_callback, id, initialize_tracing, next_event, unthrottled_config};

mod setup;

/// A request to an echoing component resolves with the echoed payload.
#[tokio::test(start_paused = true)]
async fn test_request_round_trip() -> anyhow::Result<()> {
    initialize_tracing();
    let runtime = CourierApp::launch_with_config(CourierConfig::default());
    let client = id("client");
    let echo = id("echo");
    let (recorder, mut events) = Recorder::new();
    let client_handle = runtime.install(
        CapabilityGrant::new(client.clone()).allow_target(echo.clone()),
        recorder,
    )?;
    runtime.install(CapabilityGrant::new(echo.clone()), Echo::default())?;

    let request_id = client_handle
        .send_request(&echo, Envelope::raw(b"ping".to_vec()), 1_000)
        .await?;
    let (resolved, outcome) = expect_callback(next_event(&mut events).await);
    assert_eq!(resolved, request_id);
    assert_eq!(outcome, Ok(b"ping".to_vec()));

    assert!(!runtime.router().is_pending(request_id));
    assert_eq!(runtime.router().callback_stats().completed(), 1);
    assert_eq!(runtime.router().stats().requests_routed(), 1);
    runtime.shutdown_all().await?;
    Ok(())
}

/// A requester with a 100 ms timeout asks a component that needs 150 ms.
/// The requester sees exactly one `Timeout`; the response that arrives later
/// is dropped.
#[tokio::test(start_paused = true)]
async fn test_timeout_wins_and_late_response_is_discarded() -> anyhow::Result<()> {
    initialize_tracing();
    let runtime = CourierApp::launch_with_config(CourierConfig::default());
    let a = id("a");
    let b = id("b");
    let (recorder, mut events) = Recorder::new();
    let handle_a = runtime.install(
        CapabilityGrant::new(a.clone()).allow_target(b.clone()),
        recorder,
    )?;
    runtime.install(
        CapabilityGrant::new(b.clone()),
        SlowResponder::new(Duration::from_millis(150)),
    )?;

    let started = Instant::now();
    let request_id = handle_a
        .send_request(&b, Envelope::raw(b"slow".to_vec()), 100)
        .await?;
    let (resolved, outcome) = expect_callback(next_event(&mut events).await);
    let elapsed = started.elapsed();
    assert_eq!(resolved, request_id);
    assert_eq!(outcome, Err(CallbackError::Timeout));
    assert!(elapsed >= Duration::from_millis(100), "fired early: {elapsed:?}");
    assert!(elapsed < Duration::from_millis(150), "fired late: {elapsed:?}");

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(runtime.router().stats().late_responses(), 1);
    assert!(events.try_recv().is_err(), "no second callback expected");
    assert_eq!(runtime.router().callback_stats().timed_out(), 1);
    assert_eq!(runtime.router().pending_requests(), 0);
    runtime.shutdown_all().await?;
    Ok(())
}

/// A timeout of zero selects the configured default.
#[tokio::test(start_paused = true)]
async fn test_zero_timeout_uses_default() -> anyhow::Result<()> {
    initialize_tracing();
    let mut config = CourierConfig::default();
    config.callbacks.default_timeout_ms = 200;
    let runtime = CourierApp::launch_with_config(config);
    let a = id("a");
    let b = id("b");
    let (recorder, mut events) = Recorder::new();
    let handle_a = runtime.install(
        CapabilityGrant::new(a.clone()).allow_target(b.clone()),
        recorder,
    )?;
    runtime.install(
        CapabilityGrant::new(b.clone()),
        SlowResponder::new(Duration::from_secs(5)),
    )?;

    let started = Instant::now();
    handle_a
        .send_request(&b, Envelope::raw(Vec::new()), 0)
        .await?;
    let (_, outcome) = expect_callback(next_event(&mut events).await);
    assert_eq!(outcome, Err(CallbackError::Timeout));
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(200));
    assert!(elapsed < Duration::from_secs(1));
    runtime.shutdown_all().await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_handler_error_becomes_application_error() -> anyhow::Result<()> {
    initialize_tracing();
    let runtime = CourierApp::launch_with_config(CourierConfig::default());
    let a = id("a");
    let b = id("b");
    let (recorder, mut events) = Recorder::new();
    let handle_a = runtime.install(
        CapabilityGrant::new(a.clone()).allow_target(b.clone()),
        recorder,
    )?;
    runtime.install(CapabilityGrant::new(b.clone()), Failing)?;

    handle_a
        .send_request(&b, Envelope::raw(Vec::new()), 1_000)
        .await?;
    let (_, outcome) = expect_callback(next_event(&mut events).await);
    assert_eq!(outcome, Err(CallbackError::Application("refused".to_string())));
    runtime.shutdown_all().await?;
    Ok(())
}

/// A panicking handler fails its request but the component keeps serving.
#[tokio::test(start_paused = true)]
async fn test_panicking_handler_is_contained() -> anyhow::Result<()> {
    initialize_tracing();
    let runtime = CourierApp::launch_with_config(CourierConfig::default());
    let a = id("a");
    let b = id("b");
    let (recorder, mut events) = Recorder::new();
    let handle_a = runtime.install(
        CapabilityGrant::new(a.clone()).allow_target(b.clone()),
        recorder,
    )?;
    runtime.install(CapabilityGrant::new(b.clone()), PanicsOnce::default())?;

    let first = handle_a
        .send_request(&b, Envelope::raw(b"one".to_vec()), 1_000)
        .await?;
    let second = handle_a
        .send_request(&b, Envelope::raw(b"two".to_vec()), 1_000)
        .await?;

    let (resolved, outcome) = expect_callback(next_event(&mut events).await);
    assert_eq!(resolved, first);
    match outcome {
        Err(CallbackError::Application(reason)) => {
            assert!(reason.contains("first call explodes"), "reason: {reason}");
        }
        other => panic!("expected an application error, got {other:?}"),
    }

    let (resolved, outcome) = expect_callback(next_event(&mut events).await);
    assert_eq!(resolved, second);
    assert_eq!(outcome, Ok(b"two".to_vec()));
    runtime.shutdown_all().await?;
    Ok(())
}

/// Typed payloads travel as JSON envelopes.
#[tokio::test(start_paused = true)]
async fn test_json_request() -> anyhow::Result<()> {
    initialize_tracing();
    let runtime = CourierApp::launch_with_config(CourierConfig::default());
    let trader = id("trader");
    let oracle = id("oracle");
    let (recorder, mut events) = Recorder::new();
    let trader_handle = runtime.install(
        CapabilityGrant::new(trader.clone())
            .allow_target(oracle.clone())
            .allow_codec(codecs::JSON),
        recorder,
    )?;
    runtime.install(CapabilityGrant::new(oracle.clone()), PriceOracle)?;

    let query = PriceQuery {
        symbol: "AAPL".to_string(),
    };
    trader_handle
        .send_request(&oracle, Envelope::json(&query)?, 1_000)
        .await?;
    let (_, outcome) = expect_callback(next_event(&mut events).await);
    let response = Envelope::new(codecs::JSON, outcome?);
    let quote: PriceQuote = response.decode_json()?;
    assert_eq!(
        quote,
        PriceQuote {
            symbol: "AAPL".to_string(),
            cents: 400,
        }
    );

    // The grant only allows JSON.
    let refused = trader_handle
        .send_request(&oracle, Envelope::raw(b"AAPL".to_vec()), 1_000)
        .await;
    assert_eq!(refused, Err(RoutingError::UnsupportedCodec(codecs::RAW)));
    runtime.shutdown_all().await?;
    Ok(())
}

/// A component can send requests from inside its own handler and receives
/// the callback through its own mailbox.
#[tokio::test(start_paused = true)]
async fn test_request_issued_from_a_handler() -> anyhow::Result<()> {
    initialize_tracing();
    let runtime = CourierApp::launch_with_config(CourierConfig::default());
    let client = id("client");
    let relay = id("relay");
    let echo = id("echo");
    let client_handle = runtime.install(
        CapabilityGrant::new(client.clone()).allow_target(relay.clone()),
        Echo::default(),
    )?;
    let (relay_component, mut relay_events) = Relay::new(echo.clone(), 1_000);
    runtime.install(
        CapabilityGrant::new(relay.clone()).allow_target(echo.clone()),
        relay_component,
    )?;
    runtime.install(CapabilityGrant::new(echo.clone()), Echo::default())?;

    client_handle
        .send_message(&relay, Envelope::raw(b"hop".to_vec()))
        .await?;
    let (_, outcome) = expect_callback(next_event(&mut relay_events).await);
    assert_eq!(outcome, Ok(b"hop".to_vec()));
    runtime.shutdown_all().await?;
    Ok(())
}

/// Many requests with random handler delays, random timeouts and some
/// cancellations still resolve exactly once each.
#[tokio::test(start_paused = true)]
async fn test_every_request_resolves_exactly_once() -> anyhow::Result<()> {
    initialize_tracing();
    let runtime = CourierApp::launch_with_config(unthrottled_config());
    let a = id("a");
    let b = id("b");
    let (recorder, mut events) = Recorder::new();
    let handle_a = runtime.install(
        CapabilityGrant::new(a.clone()).allow_target(b.clone()),
        recorder,
    )?;
    runtime.install(CapabilityGrant::new(b.clone()), JitteryResponder::new(20))?;

    let mut issued = Vec::new();
    for i in 0..100_u32 {
        let timeout_ms = rand::random_range(1..40_u64);
        let request_id = handle_a
            .send_request(&b, Envelope::raw(i.to_be_bytes().to_vec()), timeout_ms)
            .await?;
        if i % 7 == 0 {
            // May already have resolved; either way one callback follows.
            let _ = handle_a.cancel_request(request_id);
        }
        if i % 10 == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        issued.push(request_id);
    }

    tokio::time::sleep(Duration::from_secs(5)).await;

    let mut seen: HashMap<RequestId, usize> = HashMap::new();
    while let Ok(event) = events.try_recv() {
        if let Event::Callback { request_id, .. } = event {
            *seen.entry(request_id).or_default() += 1;
        }
    }
    assert_eq!(seen.len(), issued.len());
    for request_id in &issued {
        assert_eq!(seen.get(request_id), Some(&1), "request {request_id}");
    }
    assert_eq!(runtime.router().pending_requests(), 0);

    let stats = runtime.router().callback_stats();
    assert_eq!(
        stats.completed() + stats.timed_out() + stats.cancelled() + stats.target_unavailable(),
        issued.len()
    );
    runtime.shutdown_all().await?;
    Ok(())
}

/// Cancelling delivers one `Cancelled` callback and the target's eventual
/// response is dropped.
#[tokio::test(start_paused = true)]
async fn test_cancel_request() -> anyhow::Result<()> {
    initialize_tracing();
    let runtime = CourierApp::launch_with_config(CourierConfig::default());
    let a = id("a");
    let b = id("b");
    let c = id("c");
    let (recorder, mut events) = Recorder::new();
    let handle_a = runtime.install(
        CapabilityGrant::new(a.clone()).allow_target(b.clone()),
        recorder,
    )?;
    runtime.install(
        CapabilityGrant::new(b.clone()),
        SlowResponder::new(Duration::from_millis(100)),
    )?;
    runtime.install(CapabilityGrant::new(c.clone()), Echo::default())?;

    let request_id = handle_a
        .send_request(&b, Envelope::raw(Vec::new()), 1_000)
        .await?;

    assert_eq!(
        runtime.router().cancel_request(request_id, &c),
        Err(RoutingError::NotRequester {
            request_id,
            requester: c.clone(),
        })
    );
    assert!(runtime.router().is_pending(request_id));

    handle_a.cancel_request(request_id)?;
    let (resolved, outcome) = expect_callback(next_event(&mut events).await);
    assert_eq!(resolved, request_id);
    assert_eq!(outcome, Err(CallbackError::Cancelled));
    assert_eq!(
        handle_a.cancel_request(request_id),
        Err(RoutingError::UnknownRequest(request_id))
    );

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(events.try_recv().is_err());
    assert_eq!(runtime.router().stats().late_responses(), 1);
    runtime.shutdown_all().await?;
    Ok(())
}
