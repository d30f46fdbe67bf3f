//! Detection of a stream that stopped delivering without an error or an
//! end-of-stream signal.

use std::time::Duration;

use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};

/// Heartbeat counting consecutive periods without an assembled frame.
///
/// The first heartbeat fires one period after [`start`](Self::start). Every
/// frame resets the count; reaching the threshold means the stream stalled.
#[derive(Debug)]
pub struct LivenessMonitor {
    ticker: Interval,
    silent: u32,
    threshold: u32,
}

impl LivenessMonitor {
    pub fn start(period: Duration, threshold: u32) -> Self {
        let period = period.max(Duration::from_millis(1));
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            ticker,
            silent: 0,
            threshold: threshold.max(1),
        }
    }

    /// A frame was delivered.
    pub fn reset(&mut self) {
        self.silent = 0;
    }

    /// Consecutive heartbeats without a frame.
    pub fn silent_ticks(&self) -> u32 {
        self.silent
    }

    /// Wait for the next heartbeat. Returns `true` once the threshold of
    /// silent heartbeats is reached. Cancel safe.
    pub async fn tick(&mut self) -> bool {
        self.ticker.tick().await;
        self.silent += 1;
        tracing::trace!(silent_ticks = self.silent, threshold = self.threshold, "liveness heartbeat");
        self.silent >= self.threshold
    }
}
