//! Throttling for board message updates.
//!
//! Each game owns an [`UpdateLimiter`]: a bucket of permits that refills when
//! its window resets. The window comes from the chat host's rate limit headers
//! when it reports them and from a fixed local window otherwise. Pushes that
//! find the bucket empty are deferred to the reset; while one is pending,
//! further requests ride along on it.

use std::{
    future::Future,
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use tokio::{
    sync::Mutex,
    time::{self, Instant},
};
use tracing::{debug, trace};

/// Furthest into the future a host-reported reset is trusted.
const MAX_RESET_HORIZON: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheduled {
    /// A permit was spent and the action ran before returning.
    Now,
    /// The action will run once the window resets.
    Deferred(Instant),
    /// An action is already waiting for the reset; this one was dropped.
    Coalesced,
}

#[derive(Debug)]
struct Bucket {
    permits_remaining: u32,
    window_reset_at: Instant,
    pending_deferred: bool,
}

#[derive(Debug)]
pub struct UpdateLimiter {
    permits_per_window: u32,
    window: Duration,
    anchor: (Instant, SystemTime),
    bucket: Mutex<Bucket>,
}

impl UpdateLimiter {
    pub fn new(permits_per_window: u32, window: Duration) -> Self {
        let now = Instant::now();
        Self {
            permits_per_window,
            window,
            anchor: (now, SystemTime::now()),
            bucket: Mutex::new(Bucket {
                permits_remaining: permits_per_window,
                window_reset_at: now + window,
                pending_deferred: false,
            }),
        }
    }

    /// Merges a budget reported by the host. A report for the window already
    /// being tracked can only lower the remaining permits; a report for a
    /// different window replaces it.
    pub async fn insert_observed_rates(&self, reset_at: Instant, remaining: u32) {
        let mut bucket = self.bucket.lock().await;
        if bucket.window_reset_at == reset_at {
            bucket.permits_remaining = bucket.permits_remaining.min(remaining);
        } else {
            bucket.window_reset_at = reset_at;
            bucket.permits_remaining = remaining;
        }
        trace!(
            "Observed rates: {} permits until {:?}",
            bucket.permits_remaining, bucket.window_reset_at
        );
    }

    /// Converts a reset time in seconds since the Unix epoch to an instant.
    /// The same epoch value always maps to the same instant.
    pub fn instant_from_epoch(&self, epoch_secs: f64) -> Instant {
        let (anchor_instant, anchor_time) = self.anchor;
        let anchor_secs = anchor_time
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs_f64())
            .unwrap_or(0.0);
        let offset = epoch_secs - anchor_secs;
        if !offset.is_finite() {
            return anchor_instant;
        }

        let magnitude = Duration::try_from_secs_f64(offset.abs())
            .unwrap_or(MAX_RESET_HORIZON)
            .min(MAX_RESET_HORIZON);
        if offset >= 0.0 {
            anchor_instant + magnitude
        } else {
            anchor_instant
                .checked_sub(magnitude)
                .unwrap_or(anchor_instant)
        }
    }

    pub async fn permits_remaining(&self) -> u32 {
        let mut bucket = self.bucket.lock().await;
        self.refresh(&mut bucket, Instant::now());
        bucket.permits_remaining
    }

    /// Runs `action` now if a permit is left, otherwise schedules it for the
    /// window reset. Only one deferred action is kept at a time, so it should
    /// read whatever it sends when it runs rather than when it is scheduled.
    pub async fn run_now_or_deferred<F, Fut>(self: &Arc<Self>, action: F) -> Scheduled
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let scheduled = {
            let mut bucket = self.bucket.lock().await;
            self.refresh(&mut bucket, Instant::now());

            if bucket.permits_remaining > 0 {
                bucket.permits_remaining -= 1;
                Scheduled::Now
            } else if bucket.pending_deferred {
                Scheduled::Coalesced
            } else {
                bucket.pending_deferred = true;
                Scheduled::Deferred(bucket.window_reset_at)
            }
        };

        match scheduled {
            Scheduled::Now => action().await,
            Scheduled::Deferred(at) => {
                debug!("Out of update permits, deferring until {:?}", at);
                let limiter = Arc::clone(self);
                tokio::spawn(async move {
                    limiter.wait_for_permit(at).await;
                    action().await;
                });
            }
            Scheduled::Coalesced => trace!("Update already deferred, coalescing"),
        }

        scheduled
    }

    /// Sleeps until a permit is available, following the reset time if the
    /// host moves it, then spends the permit and clears the pending flag.
    async fn wait_for_permit(&self, mut at: Instant) {
        loop {
            time::sleep_until(at).await;

            let mut bucket = self.bucket.lock().await;
            self.refresh(&mut bucket, Instant::now());
            if bucket.permits_remaining > 0 {
                bucket.permits_remaining -= 1;
                bucket.pending_deferred = false;
                return;
            }
            at = bucket.window_reset_at;
        }
    }

    fn refresh(&self, bucket: &mut Bucket, now: Instant) {
        if now >= bucket.window_reset_at {
            bucket.permits_remaining = self.permits_per_window;
            bucket.window_reset_at = now + self.window;
        }
    }
}
