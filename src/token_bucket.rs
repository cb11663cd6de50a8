use tokio::time::Instant;

/// Per-identity token bucket.
///
/// All time-dependent methods take `now` explicitly so callers can read the
/// clock before entering a critical section.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refill_rate: f64, // tokens per second
    last_refill: Instant,
    last_seen: Instant,
}

impl TokenBucket {
    /// A full bucket, as created on an identity's first request.
    pub fn new(capacity: u32, refill_rate: f64, now: Instant) -> Self {
        Self {
            capacity: capacity as f64,
            tokens: capacity as f64,
            refill_rate,
            last_refill: now,
            last_seen: now,
        }
    }

    pub fn try_consume(&mut self, tokens: u32, now: Instant) -> bool {
        self.refill(now);
        self.last_seen = now;

        if self.tokens >= tokens as f64 {
            self.tokens -= tokens as f64;
            true
        } else {
            false
        }
    }

    #[cfg(test)]
    fn available_tokens(&mut self, now: Instant) -> u32 {
        self.refill(now);
        self.tokens.floor() as u32
    }

    pub fn last_seen(&self) -> Instant {
        self.last_seen
    }

    /// True when the bucket has not been checked since `cutoff`.
    pub fn idle_since(&self, cutoff: Instant) -> bool {
        self.last_seen < cutoff
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        let tokens_to_add = self.refill_rate * elapsed.as_secs_f64();

        self.tokens = (self.tokens + tokens_to_add).min(self.capacity);
        self.last_refill = self.last_refill.max(now);
    }
}
