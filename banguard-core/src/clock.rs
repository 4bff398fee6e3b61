//! Time source for everything that waits.

use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

#[allow(async_fn_in_trait)]
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;

    async fn sleep(&self, duration: Duration);

    /// Wall time since `earlier`, clamped at zero.
    fn since(&self, earlier: DateTime<Utc>) -> Duration {
        (self.now() - earlier).to_std().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Virtual clock: sleeping returns immediately and advances time.
///
/// Every requested sleep is recorded so callers can assert on the exact
/// waiting schedule.
#[derive(Debug)]
pub struct ManualClock {
    inner: Mutex<ManualInner>,
}

#[derive(Debug)]
struct ManualInner {
    now: DateTime<Utc>,
    sleeps: Vec<Duration>,
}

impl ManualClock {
    pub fn starting_at(now: DateTime<Utc>) -> Self {
        Self {
            inner: Mutex::new(ManualInner {
                now,
                sleeps: Vec::new(),
            }),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut inner = self.inner.lock();
        inner.now += chrono::Duration::from_std(by).unwrap_or(chrono::Duration::MAX);
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.inner.lock().sleeps.clone()
    }

    pub fn total_slept(&self) -> Duration {
        self.inner.lock().sleeps.iter().sum()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::starting_at(DateTime::<Utc>::UNIX_EPOCH)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.inner.lock().now
    }

    async fn sleep(&self, duration: Duration) {
        self.inner.lock().sleeps.push(duration);
        self.advance(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn manual_clock_advances_on_sleep() {
        let clock = ManualClock::default();
        let start = clock.now();
        clock.sleep(Duration::from_secs(2)).await;
        clock.sleep(Duration::from_secs(3)).await;
        assert_eq!(clock.since(start), Duration::from_secs(5));
        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_secs(2), Duration::from_secs(3)]
        );
    }

    #[test]
    fn since_never_negative() {
        let clock = ManualClock::default();
        let later = clock.now() + chrono::Duration::seconds(10);
        assert_eq!(clock.since(later), Duration::ZERO);
    }
}
