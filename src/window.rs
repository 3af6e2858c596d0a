//! Throughput estimation over a trailing window of successful completions.

use std::{collections::VecDeque, sync::Mutex, time::Duration};

use conv::ConvUtil;
use tokio::time::Instant;

/// Timestamps of recent successful completions, oldest first.
///
/// Entries are only ever appended or pruned from the front, so the queue stays time-ordered.
#[derive(Debug)]
pub(crate) struct CompletionWindow {
    length: Duration,
    completions: Mutex<VecDeque<Instant>>,
}

impl CompletionWindow {
    pub(crate) fn new(length: Duration) -> Self {
        Self {
            length,
            completions: Mutex::new(VecDeque::new()),
        }
    }

    /// Record a successful completion at the current time.
    pub(crate) fn record(&self) {
        let mut completions = self.completions.lock().expect("lock should not be poisoned");
        // Taken under the lock so that entries are pushed in time order.
        let now = Instant::now();
        self.prune(&mut completions, now);
        completions.push_back(now);
    }

    /// Prune expired completions and return the rate, in events per second, over the window.
    pub(crate) fn rate(&self) -> f64 {
        self.live_count()
            .approx_as::<f64>()
            .unwrap_or(f64::MAX)
            / self.length.as_secs_f64()
    }

    /// The number of completions no older than the window length.
    pub(crate) fn live_count(&self) -> usize {
        let mut completions = self.completions.lock().expect("lock should not be poisoned");
        self.prune(&mut completions, Instant::now());
        completions.len()
    }

    /// Completions held, including any not yet pruned.
    #[cfg(test)]
    pub(crate) fn stored(&self) -> usize {
        self.completions.lock().unwrap().len()
    }

    fn prune(&self, completions: &mut VecDeque<Instant>, now: Instant) {
        while completions
            .front()
            .is_some_and(|recorded| now.duration_since(*recorded) > self.length)
        {
            completions.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time;

    use super::CompletionWindow;

    #[tokio::test(start_paused = true)]
    async fn empty_window_has_zero_rate() {
        let window = CompletionWindow::new(Duration::from_secs(15));

        assert_eq!(window.live_count(), 0);
        assert_eq!(window.rate(), 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_is_live_count_over_window_length() {
        let window = CompletionWindow::new(Duration::from_secs(15));

        for _ in 0..30 {
            window.record();
        }

        assert_eq!(window.live_count(), 30);
        assert!((window.rate() - 2.0).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_completions_are_pruned() {
        let window = CompletionWindow::new(Duration::from_secs(15));

        for _ in 0..10 {
            window.record();
        }
        time::advance(Duration::from_secs(10)).await;
        for _ in 0..5 {
            window.record();
        }

        // Exactly one window old: still live.
        time::advance(Duration::from_secs(5)).await;
        assert_eq!(window.live_count(), 15);

        time::advance(Duration::from_millis(1)).await;
        assert_eq!(window.live_count(), 5);
        assert!((window.rate() - 5.0 / 15.0).abs() < 1e-9);

        time::advance(Duration::from_secs(10)).await;
        assert_eq!(window.live_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn recording_prunes_expired_completions() {
        let window = CompletionWindow::new(Duration::from_secs(1));

        for _ in 0..20 {
            for _ in 0..100 {
                window.record();
            }
            time::advance(Duration::from_millis(500)).await;
        }
        window.record();

        // Only the last second's worth is kept, even though nothing asked for the rate.
        assert_eq!(window.stored(), 201);
    }
}
