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

//! Per-sender token bucket.
//!
//! Every routing attempt that passes the capability, codec, size and circuit
//! checks costs its sender one token. Tokens refill continuously up to the
//! bucket's capacity; the balance never goes negative.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Rate limit settings for one sending component.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// When `false`, every attempt is admitted.
    pub enabled: bool,
    /// Sustained rate, in tokens per second.
    pub refill_per_second: f64,
    /// Burst size; also the starting balance.
    pub capacity: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            refill_per_second: 100.0,
            capacity: 50,
        }
    }
}

impl RateLimitConfig {
    /// A limit of `refill_per_second` sustained with bursts up to `capacity`.
    #[must_use]
    pub const fn new(refill_per_second: f64, capacity: u32) -> Self {
        Self {
            enabled: true,
            refill_per_second,
            capacity,
        }
    }

    /// No limit at all.
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            enabled: false,
            refill_per_second: 0.0,
            capacity: 0,
        }
    }
}

/// A continuously refilled token bucket.
#[derive(Debug)]
pub struct RateBucket {
    tokens: f64,
    capacity: f64,
    refill_rate: f64,
    last_refill: Instant,
    enabled: bool,
}

impl RateBucket {
    /// A full bucket.
    #[must_use]
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            tokens: f64::from(config.capacity),
            capacity: f64::from(config.capacity),
            refill_rate: config.refill_per_second.max(0.0),
            last_refill: Instant::now(),
            enabled: config.enabled,
        }
    }

    /// Takes one token if one is available.
    pub fn try_acquire(&mut self) -> bool {
        if !self.enabled {
            return true;
        }
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// How long until a token is available. Zero when one already is.
    ///
    /// A bucket that never refills reports [`Duration::MAX`] once empty.
    #[must_use]
    pub fn time_until_available(&mut self) -> Duration {
        if !self.enabled {
            return Duration::ZERO;
        }
        self.refill();
        if self.tokens >= 1.0 {
            Duration::ZERO
        } else if self.refill_rate <= 0.0 {
            Duration::MAX
        } else {
            Duration::from_secs_f64((1.0 - self.tokens) / self.refill_rate)
        }
    }

    /// Current balance after refilling.
    #[must_use]
    pub fn available_tokens(&mut self) -> f64 {
        self.refill();
        self.tokens
    }

    /// Whether this bucket limits anything.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.last_refill = now;
        self.tokens = elapsed
            .mul_add(self.refill_rate, self.tokens)
            .min(self.capacity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_burst_then_refused() {
        let mut bucket = RateBucket::new(&RateLimitConfig::new(10.0, 5));
        for _ in 0..5 {
            assert!(bucket.try_acquire(), "burst should be admitted");
        }
        assert!(!bucket.try_acquire(), "sixth attempt should be refused");
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_token_after_one_refill_period() {
        let mut bucket = RateBucket::new(&RateLimitConfig::new(4.0, 2));
        assert!(bucket.try_acquire());
        assert!(bucket.try_acquire());
        assert!(!bucket.try_acquire());

        tokio::time::advance(Duration::from_millis(250)).await;
        assert!(bucket.try_acquire());
        assert!(!bucket.try_acquire());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refill_caps_at_capacity() {
        let mut bucket = RateBucket::new(&RateLimitConfig::new(100.0, 3));
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!((bucket.available_tokens() - 3.0).abs() < f64::EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn test_time_until_available() {
        let mut bucket = RateBucket::new(&RateLimitConfig::new(4.0, 1));
        assert_eq!(bucket.time_until_available(), Duration::ZERO);
        assert!(bucket.try_acquire());
        assert_eq!(bucket.time_until_available(), Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_admits_everything() {
        let mut bucket = RateBucket::new(&RateLimitConfig::disabled());
        assert!(!bucket.is_enabled());
        for _ in 0..1_000 {
            assert!(bucket.try_acquire());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_rate_never_refills() {
        let mut bucket = RateBucket::new(&RateLimitConfig::new(0.0, 1));
        assert!(bucket.try_acquire());
        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(!bucket.try_acquire());
        assert_eq!(bucket.time_until_available(), Duration::MAX);
    }
}
