// SPDX-FileCopyrightText: 2026 Apiary Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-(bot, user) fixed-window rate limit for LLM requests.
//!
//! Checked before the breaker, so a rate-limited request never touches
//! the failure counters.

use apiary_core::{ApiaryError, BotId};
use dashmap::DashMap;
use tokio::time::{Duration, Instant};

const WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy)]
struct Window {
    started_at: Instant,
    count: u32,
}

/// Fixed 60-second window counter per (bot, user).
pub struct RateLimiter {
    allowance: u32,
    windows: DashMap<(BotId, i64), Window>,
}

impl RateLimiter {
    pub fn new(allowance_per_min: u32) -> Self {
        Self {
            allowance: allowance_per_min,
            windows: DashMap::new(),
        }
    }

    /// Count one request; rejects with `rate_limit_exceeded` when the
    /// window allowance is spent.
    pub fn check(&self, bot_id: BotId, user_id: i64) -> Result<(), ApiaryError> {
        let mut window = self.windows.entry((bot_id, user_id)).or_insert(Window {
            started_at: Instant::now(),
            count: 0,
        });
        if window.started_at.elapsed() >= WINDOW {
            window.started_at = Instant::now();
            window.count = 0;
        }
        if window.count >= self.allowance {
            return Err(ApiaryError::RateLimited);
        }
        window.count += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn eleventh_request_in_a_minute_is_rejected() {
        let limiter = RateLimiter::new(10);
        let bot = BotId::new();
        for _ in 0..10 {
            limiter.check(bot, 1).unwrap();
        }
        assert_eq!(limiter.check(bot, 1).unwrap_err().code(), "rate_limit_exceeded");
        // A different user is unaffected.
        limiter.check(bot, 2).unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn window_resets_after_a_minute() {
        let limiter = RateLimiter::new(10);
        let bot = BotId::new();
        for _ in 0..10 {
            limiter.check(bot, 1).unwrap();
        }
        assert!(limiter.check(bot, 1).is_err());
        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(limiter.check(bot, 1).is_ok());
    }
}
