//! Minimum-interval request spacing.

use std::time::Duration;

use tokio::time::Instant;

/// Spacing guard owned by exactly one client.
///
/// The interval is measured from the *end* of the previous request, so a slow
/// response does not eat into the gap before the next one.
#[derive(Debug, Clone)]
pub struct IntervalGuard {
    min_interval: Duration,
    last_finished: Option<Instant>,
}

impl IntervalGuard {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_finished: None,
        }
    }

    /// Time still to wait at `now` before the next request may start.
    pub fn remaining(&self, now: Instant) -> Duration {
        match self.last_finished {
            Some(last) => self.min_interval.saturating_sub(now.saturating_duration_since(last)),
            None => Duration::ZERO,
        }
    }

    /// Sleep until the next request may start.
    pub async fn wait(&self) {
        let delay = self.remaining(Instant::now());
        if !delay.is_zero() {
            tracing::debug!(
                target: "funnel_sync::http",
                delay_ms = delay.as_millis() as u64,
                "waiting out provider request interval"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Record that a request (successful or not) just finished.
    pub fn mark_finished(&mut self) {
        self.last_finished = Some(Instant::now());
    }
}
