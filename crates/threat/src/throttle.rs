//! Rate limiting for security notifications.

use std::sync::Arc;
use std::time::Duration;

use crate::counters::{CounterStore, CounterStoreError};

/// One-per-window gate, keyed by the caller.
///
/// Piggybacks on the counter store: the first increment in a window wins and
/// everything else in the same window is suppressed. Keeps alert channels
/// useful during a sustained attack instead of drowning them.
pub struct NotificationThrottle {
    counters: Arc<dyn CounterStore>,
    window: Duration,
}

impl NotificationThrottle {
    pub fn new(counters: Arc<dyn CounterStore>, window: Duration) -> Self {
        Self { counters, window }
    }

    /// True when the caller may notify; false when a notification for `key`
    /// already went out this window.
    pub async fn try_acquire(&self, key: &str) -> Result<bool, CounterStoreError> {
        Ok(self.counters.incr(key, self.window).await? == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counters::InMemoryCounterStore;
    use chrono::{TimeZone, Utc};
    use crewdesk_core::FixedClock;

    #[tokio::test]
    async fn one_notification_per_window_per_key() {
        let clock = FixedClock::at(Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap());
        let counters = Arc::new(InMemoryCounterStore::new(Arc::new(clock.clone())));
        let throttle = NotificationThrottle::new(counters, Duration::from_secs(3600));

        assert!(throttle.try_acquire("tenant:suspicious:1.2.3.4").await.unwrap());
        assert!(!throttle.try_acquire("tenant:suspicious:1.2.3.4").await.unwrap());
        // Different key, independent window.
        assert!(throttle.try_acquire("tenant:suspicious:5.6.7.8").await.unwrap());

        clock.advance(chrono::Duration::seconds(3601));
        assert!(throttle.try_acquire("tenant:suspicious:1.2.3.4").await.unwrap());
    }
}
