//! Token bucket admission control for outbound provider requests.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    updated_at: Instant,
}

impl Bucket {
    fn refill(&mut self, now: Instant, rate: f64, capacity: f64) {
        let elapsed = now.saturating_duration_since(self.updated_at).as_secs_f64();
        self.tokens = (self.tokens + elapsed * rate).min(capacity);
        self.updated_at = now;
    }
}

/// Token bucket shared by every request issued through one transport.
///
/// The bucket holds at most `capacity` tokens (the configured rate by default)
/// and refills continuously at `rate` tokens per second. Accounting happens
/// under a mutex, but the lock is released before waiting for the next token.
#[derive(Debug)]
pub struct RateLimiter {
    rate: f64,
    capacity: f64,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    /// Create a limiter admitting `rate` requests per second.
    pub fn new(rate: f64) -> Self {
        Self::with_capacity(rate, rate)
    }

    pub fn with_capacity(rate: f64, capacity: f64) -> Self {
        let rate = if rate > 0.0 { rate } else { f64::MIN_POSITIVE };
        let capacity = capacity.max(1.0);
        Self {
            rate,
            capacity,
            bucket: Mutex::new(Bucket {
                tokens: capacity,
                updated_at: Instant::now(),
            }),
        }
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Wait until a token is available, then take it.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut bucket = self.bucket.lock().await;
                bucket.refill(Instant::now(), self.rate, self.capacity);
                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    return;
                }
                Duration::from_secs_f64((1.0 - bucket.tokens) / self.rate)
            };
            tokio::time::sleep(wait).await;
        }
    }

    /// Take a token only if one is available right now.
    pub async fn try_acquire(&self) -> bool {
        let mut bucket = self.bucket.lock().await;
        bucket.refill(Instant::now(), self.rate, self.capacity);
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Tokens currently available, after refilling.
    pub async fn available(&self) -> f64 {
        let mut bucket = self.bucket.lock().await;
        bucket.refill(Instant::now(), self.rate, self.capacity);
        bucket.tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_initial_burst_up_to_capacity() {
        let limiter = RateLimiter::new(5.0);
        for _ in 0..5 {
            assert!(limiter.try_acquire().await);
        }
        assert!(!limiter.try_acquire().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refill_is_continuous_and_capped() {
        let limiter = RateLimiter::new(4.0);
        for _ in 0..4 {
            limiter.acquire().await;
        }
        tokio::time::advance(Duration::from_millis(500)).await;
        let available = limiter.available().await;
        assert!((available - 2.0).abs() < 1e-6, "got {}", available);

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!((limiter.available().await - 4.0).abs() < 1e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_waits_for_token() {
        let limiter = RateLimiter::new(2.0);
        limiter.acquire().await;
        limiter.acquire().await;

        let start = Instant::now();
        limiter.acquire().await;
        let waited = start.elapsed();
        assert!(waited >= Duration::from_millis(499), "waited {:?}", waited);
        assert!(waited <= Duration::from_millis(520), "waited {:?}", waited);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sustained_grants_respect_rate() {
        let rate = 5.0;
        let limiter = Arc::new(RateLimiter::new(rate));
        let origin = Instant::now();
        let grants = Arc::new(Mutex::new(Vec::new()));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let limiter = limiter.clone();
            let grants = grants.clone();
            tasks.push(tokio::spawn(async move {
                for _ in 0..10 {
                    limiter.acquire().await;
                    grants.lock().await.push(origin.elapsed().as_secs_f64());
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let mut times = grants.lock().await.clone();
        times.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(times.len(), 80);

        // Once the initial burst is spent, any window of T seconds admits at most rate*T + 1.
        let steady = &times[rate as usize..];
        for (i, &window_start) in steady.iter().enumerate() {
            for window in [0.5_f64, 1.0, 2.0, 3.7] {
                let granted = steady[i..]
                    .iter()
                    .take_while(|&&t| t < window_start + window)
                    .count();
                assert!(
                    granted as f64 <= rate * window + 1.0 + 1e-9,
                    "{} grants in {}s window",
                    granted,
                    window
                );
            }
        }
    }
}
