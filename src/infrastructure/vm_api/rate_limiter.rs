//! Token-bucket rate limiter guarding outbound VM API calls (§4.1).
//! Hand-rolled rather than via `governor` — see DESIGN.md.

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::domain::models::config::RateLimitConfig;

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

pub struct TokenBucketRateLimiter {
    capacity: f64,
    refill_per_sec: f64,
    bucket: Mutex<Bucket>,
}

impl TokenBucketRateLimiter {
    pub fn new(cfg: &RateLimitConfig) -> Self {
        Self {
            capacity: f64::from(cfg.capacity),
            refill_per_sec: f64::from(cfg.refill_per_sec),
            bucket: Mutex::new(Bucket {
                tokens: f64::from(cfg.capacity),
                last_refill: Instant::now(),
            }),
        }
    }

    /// Block until a token is available, then consume it.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut bucket = self.bucket.lock().await;
                let now = Instant::now();
                let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
                bucket.tokens = (bucket.tokens + elapsed * self.refill_per_sec).min(self.capacity);
                bucket.last_refill = now;

                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    None
                } else {
                    let deficit = 1.0 - bucket.tokens;
                    Some(std::time::Duration::from_secs_f64(deficit / self.refill_per_sec))
                }
            };

            match wait {
                None => return,
                Some(duration) => tokio::time::sleep(duration).await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allows_burst_up_to_capacity() {
        let limiter = TokenBucketRateLimiter::new(&RateLimitConfig {
            capacity: 3,
            refill_per_sec: 1,
        });
        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        limiter.acquire().await;
        assert!(start.elapsed() < std::time::Duration::from_millis(100));
    }

    #[tokio::test]
    async fn blocks_past_capacity() {
        let limiter = TokenBucketRateLimiter::new(&RateLimitConfig {
            capacity: 1,
            refill_per_sec: 20,
        });
        limiter.acquire().await;
        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() >= std::time::Duration::from_millis(30));
    }
}
