//! Send-rate limiting for dispatch workers.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{Instant, sleep};

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// A token bucket shared by dispatch workers.
///
/// Capacity equals the per-second rate, so a full bucket admits one
/// second's worth of sends as a burst and refills continuously after.
pub struct TokenBucket {
    capacity: f64,
    refill_per_second: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// Creates a bucket admitting `rate_per_second` sends per second.
    ///
    /// A rate of zero is treated as one per second.
    #[must_use]
    pub fn new(rate_per_second: u32) -> Self {
        let capacity = f64::from(rate_per_second.max(1));
        Self {
            capacity,
            refill_per_second: capacity,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Take one token, sleeping until the bucket refills if necessary.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                let now = Instant::now();
                let elapsed = now.duration_since(state.last_refill).as_secs_f64();
                state.tokens =
                    self.refill_per_second.mul_add(elapsed, state.tokens).min(self.capacity);
                state.last_refill = now;

                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return;
                }
                Duration::from_secs_f64((1.0 - state.tokens) / self.refill_per_second)
            };
            sleep(wait).await;
        }
    }
}
