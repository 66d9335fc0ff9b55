use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Fixed-delay retry policy for fallible exchange calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// Candle and balance fetches: 5 attempts, 5 s apart
    pub const fn market_data() -> Self {
        Self::new(5, Duration::from_secs(5))
    }

    /// Market close attempts on price-band rejections: 3 attempts, 1 s apart
    pub const fn close_order() -> Self {
        Self::new(3, Duration::from_secs(1))
    }

    /// Position re-fetch after an open: 3 attempts, 1 s apart
    pub const fn open_confirmation() -> Self {
        Self::new(3, Duration::from_secs(1))
    }

    /// Notification delivery: 3 attempts, 5 s apart
    pub const fn notification() -> Self {
        Self::new(3, Duration::from_secs(5))
    }

    /// Same attempt count, no waiting
    pub const fn immediate(self) -> Self {
        Self::new(self.max_attempts, Duration::ZERO)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempts run out. The last error is returned. `op` receives the
    /// 1-based attempt number.
    pub async fn run<T, E, F, Fut, P>(&self, label: &str, is_retryable: P, mut op: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: Display,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match op(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!("✓ {} succeeded after {} attempts", label, attempt);
                    }
                    return Ok(value);
                }
                Err(e) if attempt < max_attempts && is_retryable(&e) => {
                    tracing::warn!(
                        "{} attempt {}/{} failed: {}. Retrying in {:?}...",
                        label,
                        attempt,
                        max_attempts,
                        e,
                        self.delay
                    );
                    if !self.delay.is_zero() {
                        tokio::time::sleep(self.delay).await;
                    }
                    attempt += 1;
                }
                Err(e) => {
                    if attempt > 1 {
                        tracing::error!("{} failed after {} attempts: {}", label, attempt, e);
                    }
                    return Err(e);
                }
            }
        }
    }
}
