// SPDX-FileCopyrightText: 2026 Apiary Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Leaky-bucket-style delivery shaper with one-second granularity.
//!
//! Global for one broadcast: at most `per_sec` sends are admitted per
//! wall-clock second; the next send past the allowance waits for the
//! window to roll over.

use tokio::time::{sleep_until, Duration, Instant};

/// Per-broadcast send shaper.
pub struct Throttle {
    per_sec: u32,
    window_started: Instant,
    sent_in_window: u32,
}

impl Throttle {
    pub fn new(per_sec: u32) -> Self {
        Self {
            per_sec: per_sec.max(1),
            window_started: Instant::now(),
            sent_in_window: 0,
        }
    }

    /// Admit one send, sleeping into the next window if this one's
    /// allowance is spent.
    pub async fn acquire(&mut self) {
        let now = Instant::now();
        if now.duration_since(self.window_started) >= Duration::from_secs(1) {
            self.window_started = now;
            self.sent_in_window = 0;
        }
        if self.sent_in_window >= self.per_sec {
            let next_window = self.window_started + Duration::from_secs(1);
            sleep_until(next_window).await;
            self.window_started = next_window;
            self.sent_in_window = 0;
        }
        self.sent_in_window += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn hundred_sends_at_ten_per_sec_take_at_least_nine_seconds() {
        let started = Instant::now();
        let mut throttle = Throttle::new(10);
        for _ in 0..100 {
            throttle.acquire().await;
        }
        assert!(started.elapsed() >= Duration::from_secs(9));
    }

    #[tokio::test(start_paused = true)]
    async fn allowance_within_one_window_does_not_sleep() {
        let started = Instant::now();
        let mut throttle = Throttle::new(10);
        for _ in 0..10 {
            throttle.acquire().await;
        }
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
