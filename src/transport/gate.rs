use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Default spacing between two outbound requests.
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(200);

/// Single clock gate shared by every transport caller.
///
/// The lock is held while waiting, so callers leave the gate one at a time in
/// FIFO order and consecutive sends are never closer than `min_interval`.
pub struct RateGate {
    min_interval: Duration,
    last_sent: Mutex<Option<Instant>>,
}

impl RateGate {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_sent: Mutex::new(None),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait until this caller may send, then stamp the send time.
    ///
    /// Returns the instant recorded as the send time.
    pub async fn await_turn(&self) -> Instant {
        let mut last_sent = self.last_sent.lock().await;
        if let Some(previous) = *last_sent {
            let ready_at = previous + self.min_interval;
            if Instant::now() < ready_at {
                tracing::trace!(
                    wait_ms = (ready_at - Instant::now()).as_millis(),
                    "Throttling outbound request"
                );
                tokio::time::sleep_until(ready_at).await;
            }
        }
        let now = Instant::now();
        *last_sent = Some(now);
        now
    }
}

impl Default for RateGate {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn first_turn_is_immediate() {
        let gate = RateGate::new(Duration::from_secs(5));
        let started = Instant::now();
        gate.await_turn().await;
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn sequential_turns_are_spaced() {
        let gate = RateGate::new(Duration::from_millis(40));
        let first = gate.await_turn().await;
        let second = gate.await_turn().await;
        assert!(second - first >= Duration::from_millis(40));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_turns_respect_min_interval() {
        let interval = Duration::from_millis(30);
        let gate = Arc::new(RateGate::new(interval));

        let mut handles = Vec::new();
        for _ in 0..6 {
            let gate = gate.clone();
            handles.push(tokio::spawn(async move { gate.await_turn().await }));
        }

        let mut stamps = Vec::new();
        for handle in handles {
            stamps.push(handle.await.unwrap());
        }
        stamps.sort();

        for pair in stamps.windows(2) {
            assert!(
                pair[1] - pair[0] >= interval,
                "sends {:?} apart, expected at least {:?}",
                pair[1] - pair[0],
                interval
            );
        }
    }

    #[tokio::test]
    async fn idle_gap_longer_than_interval_does_not_wait() {
        let gate = RateGate::new(Duration::from_millis(20));
        gate.await_turn().await;
        tokio::time::sleep(Duration::from_millis(40)).await;
        let before = Instant::now();
        gate.await_turn().await;
        assert!(before.elapsed() < Duration::from_millis(20));
    }
}
