//! Token-bucket admission control shared by every outbound request of a run.
//!
//! Tokens refill continuously from elapsed time. The bucket mutex is held
//! only for the refill + check-and-decrement; waiting for tokens and the
//! post-acquire jitter both happen with the lock released.

use std::time::Duration;

use rand::Rng;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Mutable bucket state.
#[derive(Debug)]
struct RateBudget {
    tokens: f64,
    last_refill: Instant,
}

pub struct RateLimiter {
    budget: Mutex<RateBudget>,
    capacity: f64,
    /// Tokens per second.
    refill_rate: f64,
    jitter_min: Duration,
    jitter_max: Duration,
}

impl RateLimiter {
    /// Bucket holding `requests_per_minute` tokens and refilling at the same
    /// rate. Starts full.
    pub fn new(requests_per_minute: u32) -> Self {
        Self::with_capacity(requests_per_minute, requests_per_minute)
    }

    /// Bucket with a capacity independent of the refill rate.
    pub fn with_capacity(capacity: u32, requests_per_minute: u32) -> Self {
        let capacity = f64::from(capacity.max(1));
        Self {
            budget: Mutex::new(RateBudget {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
            capacity,
            refill_rate: f64::from(requests_per_minute.max(1)) / 60.0,
            jitter_min: Duration::ZERO,
            jitter_max: Duration::ZERO,
        }
    }

    /// Random delay added after each acquisition, drawn uniformly from `[min, max]`.
    pub fn with_jitter(mut self, min: Duration, max: Duration) -> Self {
        self.jitter_min = min.min(max);
        self.jitter_max = max.max(min);
        self
    }

    /// Wait for a token and consume it, then sleep a jittered delay.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut budget = self.budget.lock().await;
                self.refill(&mut budget);
                if budget.tokens >= 1.0 {
                    budget.tokens -= 1.0;
                    None
                } else {
                    let needed = 1.0 - budget.tokens;
                    Some(Duration::from_secs_f64(needed / self.refill_rate))
                }
            };

            match wait {
                None => break,
                Some(wait) => {
                    debug!(wait_ms = wait.as_millis() as u64, "Rate limit reached, waiting for token");
                    tokio::time::sleep(wait).await;
                }
            }
        }

        let jitter = self.jitter();
        if !jitter.is_zero() {
            tokio::time::sleep(jitter).await;
        }
    }

    /// Tokens currently available, after refilling for elapsed time.
    pub async fn available_tokens(&self) -> f64 {
        let mut budget = self.budget.lock().await;
        self.refill(&mut budget);
        budget.tokens
    }

    fn refill(&self, budget: &mut RateBudget) {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(budget.last_refill).as_secs_f64();
        budget.tokens = (budget.tokens + elapsed * self.refill_rate).min(self.capacity);
        budget.last_refill = now;
    }

    fn jitter(&self) -> Duration {
        if self.jitter_max.is_zero() || self.jitter_min == self.jitter_max {
            return self.jitter_min;
        }
        let min = self.jitter_min.as_millis() as u64;
        let max = self.jitter_max.as_millis() as u64;
        Duration::from_millis(rand::rng().random_range(min..=max))
    }
}
