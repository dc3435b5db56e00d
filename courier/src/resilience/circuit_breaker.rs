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

//! Per-edge circuit breaking.
//!
//! Each directed `(from, to)` edge has its own breaker:
//!
//! ```text
//!            failures >= failure_threshold
//!   Closed ─────────────────────────────────▶ Open
//!     ▲                                        │ cooldown elapsed
//!     │ successes >= success_threshold         ▼
//!     └──────────────────────────────────── HalfOpen
//!                                              │ any failure
//!                                              └──────▶ Open (cooldown restarts)
//! ```
//!
//! While half-open, at most `half_open_max_trials` deliveries are in flight.
//! A trial whose outcome never arrives is forgotten after another cooldown.

use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::message::ComponentId;

/// Thresholds and timing for every edge breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// When `false`, every edge is permanently closed.
    pub enabled: bool,
    /// Consecutive failures that open a closed circuit.
    pub failure_threshold: u32,
    /// Consecutive half-open successes that close the circuit.
    pub success_threshold: u32,
    /// Time an open circuit waits before admitting trials, in milliseconds.
    pub cooldown_ms: u64,
    /// Deliveries admitted at once while half-open.
    pub half_open_max_trials: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: 5,
            success_threshold: 1,
            cooldown_ms: 30_000,
            half_open_max_trials: 1,
        }
    }
}

impl CircuitBreakerConfig {
    /// A config that never opens.
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            enabled: false,
            failure_threshold: 0,
            success_threshold: 0,
            cooldown_ms: 0,
            half_open_max_trials: 0,
        }
    }

    /// The cooldown as a `Duration`.
    #[must_use]
    pub const fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

/// Health of one edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CircuitState {
    /// Traffic flows.
    Closed,
    /// Traffic is refused until the cooldown elapses.
    Open,
    /// A limited number of trials are admitted.
    HalfOpen,
}

/// State machine for a single edge.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    opened_at: Option<Instant>,
    trials_in_flight: u32,
    trial_window_started: Option<Instant>,
}

impl CircuitBreaker {
    /// A closed breaker.
    #[must_use]
    pub const fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: CircuitState::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
            opened_at: None,
            trials_in_flight: 0,
            trial_window_started: None,
        }
    }

    /// Current state, advancing Open to HalfOpen if the cooldown has passed.
    pub fn state(&mut self) -> CircuitState {
        self.advance();
        self.state
    }

    /// Consecutive failures observed while closed.
    #[must_use]
    pub const fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Consecutive successes observed while half-open.
    #[must_use]
    pub const fn consecutive_successes(&self) -> u32 {
        self.consecutive_successes
    }

    /// When the circuit last opened.
    #[must_use]
    pub const fn opened_at(&self) -> Option<Instant> {
        self.opened_at
    }

    /// Asks to send one delivery. `false` means the circuit refuses it.
    pub fn try_acquire(&mut self) -> bool {
        if !self.config.enabled {
            return true;
        }
        self.advance();
        match self.state {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen => {
                let now = Instant::now();
                let stale = self
                    .trial_window_started
                    .is_some_and(|started| now.duration_since(started) >= self.config.cooldown());
                if stale {
                    debug!(abandoned = self.trials_in_flight, "Re-arming half-open trials");
                    self.trials_in_flight = 0;
                }
                if self.trials_in_flight < self.config.half_open_max_trials.max(1) {
                    if self.trials_in_flight == 0 {
                        self.trial_window_started = Some(now);
                    }
                    self.trials_in_flight += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Records a successful delivery.
    pub fn record_success(&mut self) {
        if !self.config.enabled {
            return;
        }
        self.advance();
        match self.state {
            CircuitState::Closed => self.consecutive_failures = 0,
            CircuitState::HalfOpen => {
                self.release_trial();
                self.consecutive_successes += 1;
                if self.consecutive_successes >= self.config.success_threshold {
                    self.close();
                }
            }
            // Outcome of a delivery admitted before the circuit opened.
            CircuitState::Open => {}
        }
    }

    /// Records a failed delivery.
    pub fn record_failure(&mut self) {
        if !self.config.enabled {
            return;
        }
        self.advance();
        match self.state {
            CircuitState::Closed => {
                self.consecutive_failures += 1;
                if self.consecutive_failures >= self.config.failure_threshold {
                    self.open();
                }
            }
            CircuitState::HalfOpen => self.open(),
            CircuitState::Open => {}
        }
    }

    /// Returns an acquired slot without an outcome, e.g. when a later check refused the delivery.
    pub fn abandon(&mut self) {
        if self.state == CircuitState::HalfOpen {
            self.release_trial();
        }
    }

    fn release_trial(&mut self) {
        self.trials_in_flight = self.trials_in_flight.saturating_sub(1);
    }

    fn advance(&mut self) {
        if self.state != CircuitState::Open {
            return;
        }
        let cooled = self
            .opened_at
            .is_some_and(|opened| opened.elapsed() >= self.config.cooldown());
        if cooled {
            debug!("Circuit cooldown elapsed; half-open");
            self.state = CircuitState::HalfOpen;
            self.consecutive_successes = 0;
            self.trials_in_flight = 0;
            self.trial_window_started = None;
        }
    }

    fn open(&mut self) {
        warn!(failures = self.consecutive_failures, "Circuit opened");
        self.state = CircuitState::Open;
        self.opened_at = Some(Instant::now());
        self.consecutive_successes = 0;
        self.trials_in_flight = 0;
        self.trial_window_started = None;
    }

    fn close(&mut self) {
        debug!("Circuit closed");
        self.state = CircuitState::Closed;
        self.consecutive_failures = 0;
        self.consecutive_successes = 0;
        self.opened_at = None;
        self.trials_in_flight = 0;
        self.trial_window_started = None;
    }
}

/// A directed sender to target pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Edge {
    /// The sending component.
    pub from: ComponentId,
    /// The target component.
    pub to: ComponentId,
}

impl Edge {
    /// The edge from `from` to `to`.
    #[must_use]
    pub fn new(from: &ComponentId, to: &ComponentId) -> Self {
        Self {
            from: from.clone(),
            to: to.clone(),
        }
    }

    fn touches(&self, component: &ComponentId) -> bool {
        &self.from == component || &self.to == component
    }
}

/// Lazily created breakers for every edge that has carried traffic.
#[derive(Debug)]
pub struct CircuitBreakerRegistry {
    config: CircuitBreakerConfig,
    breakers: DashMap<Edge, Mutex<CircuitBreaker>>,
}

impl CircuitBreakerRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: DashMap::new(),
        }
    }

    fn with_breaker<R>(
        &self,
        from: &ComponentId,
        to: &ComponentId,
        f: impl FnOnce(&mut CircuitBreaker) -> R,
    ) -> R {
        let edge = Edge::new(from, to);
        if let Some(breaker) = self.breakers.get(&edge) {
            return f(&mut *breaker.lock());
        }
        let breaker = self
            .breakers
            .entry(edge)
            .or_insert_with(|| Mutex::new(CircuitBreaker::new(self.config)));
        // The guard must drop before `breaker` does.
        #[allow(clippy::let_and_return)]
        let result = f(&mut *breaker.lock());
        result
    }

    /// Asks the edge breaker to admit one delivery.
    pub fn try_acquire(&self, from: &ComponentId, to: &ComponentId) -> bool {
        if !self.config.enabled {
            return true;
        }
        self.with_breaker(from, to, CircuitBreaker::try_acquire)
    }

    /// Records a success on the edge.
    pub fn record_success(&self, from: &ComponentId, to: &ComponentId) {
        if self.config.enabled {
            self.with_breaker(from, to, CircuitBreaker::record_success);
        }
    }

    /// Records a failure on the edge.
    pub fn record_failure(&self, from: &ComponentId, to: &ComponentId) {
        if self.config.enabled {
            self.with_breaker(from, to, CircuitBreaker::record_failure);
        }
    }

    /// Returns an acquired slot on the edge without an outcome.
    pub fn abandon(&self, from: &ComponentId, to: &ComponentId) {
        if let Some(breaker) = self.breakers.get(&Edge::new(from, to)) {
            breaker.lock().abandon();
        }
    }

    /// Current state of the edge. Edges that never carried traffic are closed.
    #[must_use]
    pub fn state(&self, from: &ComponentId, to: &ComponentId) -> CircuitState {
        self.breakers
            .get(&Edge::new(from, to))
            .map_or(CircuitState::Closed, |breaker| breaker.lock().state())
    }

    /// Forgets every edge touching `component`.
    pub fn remove_component(&self, component: &ComponentId) {
        self.breakers.retain(|edge, _| !edge.touches(component));
    }

    /// Number of tracked edges.
    #[must_use]
    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    /// Whether no edges are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}
