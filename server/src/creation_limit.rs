use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::{debug, instrument, warn};

#[derive(Debug)]
pub struct TokenBucket {
    last_refill: Instant,
    tokens: u32,
    capacity: u32,
    refill_interval: Duration,
}

impl TokenBucket {
    fn new(capacity: u32, refill_interval: Duration, now: Instant) -> Self {
        debug!(
            "Creating new token bucket: capacity={}, interval={}s",
            capacity,
            refill_interval.as_secs()
        );
        Self {
            last_refill: now,
            tokens: capacity,
            capacity,
            refill_interval,
        }
    }

    fn try_consume_at(&mut self, now: Instant) -> bool {
        self.refill(now);
        if self.tokens > 0 {
            self.tokens -= 1;
            debug!("Token consumed, remaining: {}", self.tokens);
            true
        } else {
            debug!("No tokens available for consumption");
            false
        }
    }

    /// Tops the bucket back up to capacity once per elapsed interval.
    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        if elapsed >= self.refill_interval {
            if self.tokens != self.capacity {
                debug!("Token bucket refilled: {} -> {} tokens", self.tokens, self.capacity);
            }
            self.tokens = self.capacity;
            self.last_refill = now;
        }
    }
}

/// How many boards each session may start per interval.
pub struct CreationLimiter {
    buckets: DashMap<String, TokenBucket>,
    capacity: u32,
    refill_interval: Duration,
}

impl CreationLimiter {
    pub fn new(capacity: u32, refill_interval: Duration) -> Self {
        Self {
            buckets: DashMap::new(),
            capacity,
            refill_interval: refill_interval.max(Duration::from_secs(1)),
        }
    }

    pub fn per_minute(capacity: u32) -> Self {
        Self::new(capacity, Duration::from_secs(60))
    }

    #[instrument(level = "trace", skip(self))]
    pub fn check(&self, session: &str) -> bool {
        self.check_at(session, Instant::now())
    }

    fn check_at(&self, session: &str, now: Instant) -> bool {
        let mut bucket = self
            .buckets
            .entry(session.to_string())
            .or_insert_with(|| TokenBucket::new(self.capacity, self.refill_interval, now));

        if bucket.try_consume_at(now) {
            true
        } else {
            warn!("Board creation limit exceeded for session {}", session);
            false
        }
    }
}
