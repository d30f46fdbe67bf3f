//! Reconnect loop around session attempts.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::protocol::{Connector, StreamUrl};
use crate::session::{Session, SessionOutcome};
use crate::source::SourceConfig;
use crate::subscribers::Subscribers;

/// Delay schedule between attempts, in multiples of `unit`.
///
/// The multiplier starts at `initial` and doubles after every attempt; once
/// it has reached `ceiling` the next one restarts at `restart` instead of
/// saturating. The defaults give 1, 2, 4, 8, 2, 4, 8, 2, ... seconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub unit: Duration,
    pub initial: u32,
    pub ceiling: u32,
    pub restart: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            unit: Duration::from_secs(1),
            initial: 1,
            ceiling: 8,
            restart: 2,
        }
    }
}

/// Running position in a [`ReconnectPolicy`] schedule.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: ReconnectPolicy,
    current: u32,
}

impl Backoff {
    pub fn new(policy: ReconnectPolicy) -> Self {
        let current = policy.initial.max(1);
        Self { policy, current }
    }

    /// Delay to wait now, advancing the schedule.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.policy.unit * self.current;
        self.current = if self.current >= self.policy.ceiling {
            self.policy.restart.max(1)
        } else {
            self.current.saturating_mul(2)
        };
        delay
    }
}

/// Runs session attempts back to back until cancelled.
///
/// Neither a failed nor a cleanly closed attempt stops the loop; both are
/// followed by a backoff wait. The schedule is never reset by a successful
/// session, only by building a new supervisor.
pub struct Supervisor {
    url: StreamUrl,
    connector: Arc<dyn Connector>,
    config: Arc<SourceConfig>,
    subscribers: Subscribers,
    cancel: CancellationToken,
    backoff: Backoff,
    attempts: u64,
}

impl Supervisor {
    pub fn new(
        url: StreamUrl,
        connector: Arc<dyn Connector>,
        config: Arc<SourceConfig>,
        subscribers: Subscribers,
        cancel: CancellationToken,
    ) -> Self {
        let backoff = Backoff::new(config.reconnect.clone());
        Self {
            url,
            connector,
            config,
            subscribers,
            cancel,
            backoff,
            attempts: 0,
        }
    }

    /// Attempts started so far.
    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    pub async fn run(&mut self) {
        tracing::info!(url = %self.url, "stream supervisor started");

        while !self.cancel.is_cancelled() {
            self.attempts += 1;
            let span = tracing::info_span!("attempt", attempt = self.attempts);
            self.attempt().instrument(span).await;

            let delay = self.backoff.next_delay();
            tracing::info!(delay_ms = delay.as_millis() as u64, "waiting before reconnecting");
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = sleep(delay) => {}
            }
        }

        tracing::info!(url = %self.url, attempts = self.attempts, "stream supervisor stopped");
    }

    async fn attempt(&self) {
        tracing::info!(url = %self.url, "connecting");

        let connected = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return,
            connected = self.connector.connect(&self.url) => connected,
        };
        let client = match connected {
            Ok(client) => client,
            Err(e) => {
                tracing::warn!(url = %self.url, error = %e, "failed to connect");
                return;
            }
        };

        let mut session =
            Session::new(client, &self.config, &self.subscribers, self.cancel.clone());
        match session.run().await {
            SessionOutcome::Closed(reason) => tracing::info!(?reason, "session ended"),
            SessionOutcome::Failed(e) => tracing::info!(error = %e, "session attempt failed"),
        }
    }
}

/// Body of the worker thread: build the single-threaded scheduler and drive
/// the supervisor on it until cancelled.
pub fn run_worker(mut supervisor: Supervisor) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!(error = %e, "failed to build worker scheduler");
            return;
        }
    };
    runtime.block_on(supervisor.run());
}
