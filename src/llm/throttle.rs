use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;

/// Per-analyzer minimum interval between calls.
///
/// The interval is measured from the completion of the previous call. Callers
/// hold a [`ThrottlePermit`] for the duration of their call; dropping it records
/// the completion time. Concurrent callers on the same throttle are serialised.
#[derive(Debug)]
pub struct Throttle {
    min_interval: Duration,
    last_completed: Mutex<Option<Instant>>,
}

impl Throttle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_completed: Mutex::new(None),
        }
    }

    /// A throttle that never waits
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait out the remainder of the interval, then hand out the permit
    pub async fn acquire(&self) -> ThrottlePermit<'_> {
        let guard = self.last_completed.lock().await;
        if let Some(last) = *guard {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                let wait = self.min_interval - elapsed;
                tracing::debug!(wait_ms = wait.as_millis() as u64, "Throttling analyzer call");
                tokio::time::sleep(wait).await;
            }
        }
        ThrottlePermit { guard }
    }
}

/// Held while a throttled call is in flight
pub struct ThrottlePermit<'a> {
    guard: MutexGuard<'a, Option<Instant>>,
}

impl Drop for ThrottlePermit<'_> {
    fn drop(&mut self) {
        *self.guard = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn assert_within(actual: Duration, expected: Duration) {
        assert!(
            actual >= expected && actual <= expected + Duration::from_millis(5),
            "expected ~{:?}, got {:?}",
            expected,
            actual
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_call_is_not_delayed() {
        let throttle = Throttle::new(Duration::from_secs(5));
        let start = Instant::now();
        drop(throttle.acquire().await);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_call_waits_remainder() {
        let throttle = Throttle::new(Duration::from_secs(5));
        drop(throttle.acquire().await);

        tokio::time::sleep(Duration::from_secs(2)).await;
        let before = Instant::now();
        drop(throttle.acquire().await);
        assert_within(before.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_counts_from_completion() {
        let throttle = Throttle::new(Duration::from_secs(5));
        {
            let _permit = throttle.acquire().await;
            // a slow call
            tokio::time::sleep(Duration::from_secs(10)).await;
        }
        let before = Instant::now();
        drop(throttle.acquire().await);
        assert_within(before.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_wait_after_interval_elapsed() {
        let throttle = Throttle::new(Duration::from_secs(5));
        drop(throttle.acquire().await);
        tokio::time::sleep(Duration::from_secs(6)).await;
        let before = Instant::now();
        drop(throttle.acquire().await);
        assert_eq!(before.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_independent_throttles_do_not_interact() {
        let a = Arc::new(Throttle::new(Duration::from_secs(5)));
        let b = Arc::new(Throttle::new(Duration::from_secs(5)));
        drop(a.acquire().await);

        let before = Instant::now();
        drop(b.acquire().await);
        assert_eq!(before.elapsed(), Duration::ZERO);
    }
}
