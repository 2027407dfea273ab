use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};

use super::time::calendar_day;

/// Represents an entity responsible for providing dates and timers across the application. This
/// allows tests to run against a fixed point in time.
#[async_trait]
pub trait Clock: Sync + Send + 'static {
    fn time(&self) -> DateTime<Utc>;

    async fn sleep(&self, duration: Duration);

    /// Calendar day of the current moment in the reference timezone.
    fn today(&self, reference: &FixedOffset) -> NaiveDate {
        calendar_day(self.time(), reference)
    }
}

pub struct DefaultClock;

#[async_trait]
impl Clock for DefaultClock {
    fn time(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Clock frozen at a given moment. Timers still go through tokio so paused-time tests can
/// advance them.
#[derive(Clone)]
pub struct FixedClock(pub DateTime<Utc>);

#[async_trait]
impl Clock for FixedClock {
    fn time(&self) -> DateTime<Utc> {
        self.0
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
