// SPDX-FileCopyrightText: 2026 Apiary Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-bot circuit breaker for LLM calls.
//!
//! Closed counts consecutive failures; at the threshold the breaker
//! opens and rejects immediately. After the cooldown it half-opens and
//! admits a bounded number of probes; enough consecutive successes
//! close it again, any failure reopens it and restarts the cooldown.
//!
//! State is process-local. Breakers protect this process's resources;
//! no cross-process coordination is needed.

use apiary_core::{ApiaryError, BotId};
use dashmap::DashMap;
use tokio::time::{Duration, Instant};
use tracing::{info, warn};

use apiary_prometheus::recording;

/// Breaker state for one bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half_open",
        }
    }
}

/// Breaker thresholds.
#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    /// Consecutive failures that open the breaker.
    pub failure_threshold: u32,
    /// Cooldown before a probe is admitted.
    pub recovery_timeout: Duration,
    /// Consecutive half-open successes that close the breaker.
    pub success_threshold: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
            success_threshold: 2,
        }
    }
}

#[derive(Debug)]
struct BreakerCell {
    state: BreakerState,
    consecutive_failures: u32,
    half_open_successes: u32,
    half_open_probes: u32,
    last_failure_at: Option<Instant>,
}

impl Default for BreakerCell {
    fn default() -> Self {
        Self {
            state: BreakerState::Closed,
            consecutive_failures: 0,
            half_open_successes: 0,
            half_open_probes: 0,
            last_failure_at: None,
        }
    }
}

/// Per-bot circuit breaker map.
#[derive(Default)]
pub struct CircuitBreaker {
    config: BreakerConfig,
    cells: DashMap<BotId, BreakerCell>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            cells: DashMap::new(),
        }
    }

    /// Admit or reject a request for this bot. Rejection carries the
    /// `circuit_breaker_open` code.
    pub fn try_acquire(&self, bot_id: BotId) -> Result<(), ApiaryError> {
        let mut cell = self.cells.entry(bot_id).or_default();
        match cell.state {
            BreakerState::Closed => Ok(()),
            BreakerState::Open => {
                let cooled_down = cell
                    .last_failure_at
                    .map(|at| at.elapsed() >= self.config.recovery_timeout)
                    .unwrap_or(true);
                if cooled_down {
                    cell.state = BreakerState::HalfOpen;
                    cell.half_open_successes = 0;
                    cell.half_open_probes = 1;
                    info!(bot_id = %bot_id, "circuit breaker half-open");
                    recording::record_breaker_transition(bot_id, "half_open");
                    Ok(())
                } else {
                    recording::record_breaker_rejection(bot_id);
                    Err(ApiaryError::CircuitOpen(bot_id.to_string()))
                }
            }
            BreakerState::HalfOpen => {
                if cell.half_open_probes < self.config.success_threshold {
                    cell.half_open_probes += 1;
                    Ok(())
                } else {
                    recording::record_breaker_rejection(bot_id);
                    Err(ApiaryError::CircuitOpen(bot_id.to_string()))
                }
            }
        }
    }

    pub fn record_success(&self, bot_id: BotId) {
        let mut cell = self.cells.entry(bot_id).or_default();
        match cell.state {
            BreakerState::Closed => {
                cell.consecutive_failures = 0;
            }
            BreakerState::HalfOpen => {
                cell.half_open_successes += 1;
                if cell.half_open_successes >= self.config.success_threshold {
                    *cell = BreakerCell::default();
                    info!(bot_id = %bot_id, "circuit breaker closed");
                    recording::record_breaker_transition(bot_id, "closed");
                }
            }
            BreakerState::Open => {}
        }
    }

    pub fn record_failure(&self, bot_id: BotId) {
        let mut cell = self.cells.entry(bot_id).or_default();
        cell.consecutive_failures += 1;
        cell.last_failure_at = Some(Instant::now());
        match cell.state {
            BreakerState::HalfOpen => {
                cell.state = BreakerState::Open;
                cell.half_open_successes = 0;
                warn!(bot_id = %bot_id, "circuit breaker reopened by failed probe");
                recording::record_breaker_transition(bot_id, "open");
            }
            BreakerState::Closed => {
                if cell.consecutive_failures >= self.config.failure_threshold {
                    cell.state = BreakerState::Open;
                    warn!(
                        bot_id = %bot_id,
                        failures = cell.consecutive_failures,
                        "circuit breaker opened"
                    );
                    recording::record_breaker_transition(bot_id, "open");
                }
            }
            BreakerState::Open => {}
        }
    }

    pub fn state(&self, bot_id: BotId) -> BreakerState {
        self.cells
            .get(&bot_id)
            .map(|cell| cell.state)
            .unwrap_or(BreakerState::Closed)
    }

    /// Admin reset back to closed.
    pub fn reset(&self, bot_id: BotId) {
        self.cells.insert(bot_id, BreakerCell::default());
        info!(bot_id = %bot_id, "circuit breaker reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn five_consecutive_failures_open_the_breaker() {
        let breaker = CircuitBreaker::default();
        let bot = BotId::new();
        for _ in 0..4 {
            breaker.try_acquire(bot).unwrap();
            breaker.record_failure(bot);
            assert_eq!(breaker.state(bot), BreakerState::Closed);
        }
        breaker.try_acquire(bot).unwrap();
        breaker.record_failure(bot);
        assert_eq!(breaker.state(bot), BreakerState::Open);
        assert_eq!(
            breaker.try_acquire(bot).unwrap_err().code(),
            "circuit_breaker_open"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn a_success_resets_the_failure_streak() {
        let breaker = CircuitBreaker::default();
        let bot = BotId::new();
        for _ in 0..4 {
            breaker.record_failure(bot);
        }
        breaker.record_success(bot);
        for _ in 0..4 {
            breaker.record_failure(bot);
        }
        assert_eq!(breaker.state(bot), BreakerState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn two_half_open_successes_close_the_breaker() {
        let breaker = CircuitBreaker::default();
        let bot = BotId::new();
        for _ in 0..5 {
            breaker.record_failure(bot);
        }
        assert_eq!(breaker.state(bot), BreakerState::Open);

        tokio::time::advance(Duration::from_secs(31)).await;
        breaker.try_acquire(bot).unwrap();
        assert_eq!(breaker.state(bot), BreakerState::HalfOpen);
        breaker.record_success(bot);
        breaker.try_acquire(bot).unwrap();
        breaker.record_success(bot);
        assert_eq!(breaker.state(bot), BreakerState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_probe_reopens_and_restarts_the_cooldown() {
        let breaker = CircuitBreaker::default();
        let bot = BotId::new();
        for _ in 0..5 {
            breaker.record_failure(bot);
        }
        tokio::time::advance(Duration::from_secs(31)).await;
        breaker.try_acquire(bot).unwrap();
        breaker.record_failure(bot);
        assert_eq!(breaker.state(bot), BreakerState::Open);

        // Cooldown restarted: still rejected shortly after.
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(breaker.try_acquire(bot).is_err());
        tokio::time::advance(Duration::from_secs(21)).await;
        assert!(breaker.try_acquire(bot).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn breakers_are_isolated_per_bot() {
        let breaker = CircuitBreaker::default();
        let (bot_a, bot_b) = (BotId::new(), BotId::new());
        for _ in 0..5 {
            breaker.record_failure(bot_a);
        }
        assert_eq!(breaker.state(bot_a), BreakerState::Open);
        assert_eq!(breaker.state(bot_b), BreakerState::Closed);
        assert!(breaker.try_acquire(bot_b).is_ok());
    }
}
