use std::time::{Duration, Instant};

/// Per-connection token bucket, sized for bursts of answer edits
#[derive(Debug, Clone)]
pub struct RateLimiter {
    tokens: u32,
    max_tokens: u32,
    refill_every: Duration,
    last_refill: Instant,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::new_with_limits(60, Duration::from_millis(100))
    }

    pub fn new_with_limits(max_tokens: u32, refill_every: Duration) -> Self {
        Self {
            tokens: max_tokens,
            max_tokens,
            refill_every,
            last_refill: Instant::now(),
        }
    }

    pub fn check_rate_limit(&mut self) -> bool {
        self.refill_tokens();

        if self.tokens > 0 {
            self.tokens -= 1;
            true
        } else {
            false
        }
    }

    fn refill_tokens(&mut self) {
        let elapsed = self.last_refill.elapsed();
        let earned = (elapsed.as_millis() / self.refill_every.as_millis().max(1)) as u32;

        if earned > 0 {
            self.tokens = self.tokens.saturating_add(earned).min(self.max_tokens);
            self.last_refill += self.refill_every * earned;
        }
    }

    pub fn remaining_tokens(&mut self) -> u32 {
        self.refill_tokens();
        self.tokens
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
