use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::media::Frame;
use crate::protocol::{Connector, StreamUrl, TransportPreference};
use crate::subscribers::{Subscribers, Subscription, SubscriptionId};
use crate::supervisor::{ReconnectPolicy, Supervisor, run_worker};

/// Tunables for one stream source.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// Transport requested first in SETUP; a 461 response switches the
    /// attempt to [`TransportPreference::Stream`].
    pub transport: TransportPreference,
    /// Liveness heartbeat period.
    pub liveness_interval: Duration,
    /// Consecutive heartbeats without a frame before the session is torn
    /// down.
    pub liveness_threshold: u32,
    /// Added to a finite advertised duration before the session ends.
    pub duration_slack: Duration,
    /// Upper bound on the best-effort TEARDOWN.
    pub teardown_timeout: Duration,
    /// How long DESCRIBE, SETUP and PLAY may go unanswered before the
    /// attempt fails.
    pub request_timeout: Duration,
    /// Receive buffer size per subsession. Larger units arrive truncated and
    /// are reassembled from several deliveries.
    pub max_delivery_size: usize,
    /// Channel identifier stamped on every frame.
    pub channel: u32,
    /// Pre-load parameter-set caches from the SDP `fmtp` attributes.
    pub seed_parameter_sets: bool,
    pub reconnect: ReconnectPolicy,
    /// Name of the worker thread.
    pub thread_name: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            transport: TransportPreference::Datagram,
            liveness_interval: Duration::from_secs(1),
            liveness_threshold: 5,
            duration_slack: Duration::from_secs(2),
            teardown_timeout: Duration::from_secs(1),
            request_timeout: Duration::from_secs(5),
            max_delivery_size: 2 * 1024 * 1024,
            channel: 0,
            seed_parameter_sets: true,
            reconnect: ReconnectPolicy::default(),
            thread_name: "rtsp-source".to_string(),
        }
    }
}

struct Worker {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// A resilient RTSP stream: connects, plays, reconnects on failure and hands
/// every assembled frame to its subscribers.
///
/// Owns one dedicated worker thread while running. Frames are delivered on
/// that thread, in assembly order.
///
/// ```no_run
/// # use std::sync::Arc;
/// # use rtsp::{Connector, StreamSource};
/// # fn demo(connector: Arc<dyn Connector>) -> rtsp::Result<()> {
/// let mut source = StreamSource::new("rtsp://10.0.0.5/live", connector)?;
/// source.subscribe(|frame| println!("{} bytes, key={}", frame.len(), frame.is_key()));
/// source.start()?;
/// // ...
/// source.stop();
/// # Ok(())
/// # }
/// ```
pub struct StreamSource {
    url: StreamUrl,
    config: Arc<SourceConfig>,
    connector: Arc<dyn Connector>,
    subscribers: Subscribers,
    worker: Option<Worker>,
}

impl StreamSource {
    pub fn new(url: &str, connector: Arc<dyn Connector>) -> Result<Self> {
        Self::with_config(url, connector, SourceConfig::default())
    }

    pub fn with_config(
        url: &str,
        connector: Arc<dyn Connector>,
        config: SourceConfig,
    ) -> Result<Self> {
        Ok(Self {
            url: StreamUrl::parse(url)?,
            config: Arc::new(config),
            connector,
            subscribers: Subscribers::new(),
            worker: None,
        })
    }

    /// Start the worker. Does nothing if it is already running.
    pub fn start(&mut self) -> Result<()> {
        if self.worker.is_some() {
            tracing::debug!(url = %self.url, "stream source already running");
            return Ok(());
        }

        let cancel = CancellationToken::new();
        let supervisor = Supervisor::new(
            self.url.clone(),
            Arc::clone(&self.connector),
            Arc::clone(&self.config),
            self.subscribers.clone(),
            cancel.clone(),
        );

        let handle = thread::Builder::new()
            .name(self.config.thread_name.clone())
            .spawn(move || run_worker(supervisor))?;

        tracing::info!(url = %self.url, "stream source started");
        self.worker = Some(Worker { cancel, handle });
        Ok(())
    }

    /// Cancel the worker and wait for it to exit. No frame is delivered after
    /// this returns. Does nothing if the worker is not running.
    pub fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };

        tracing::info!(url = %self.url, "stream source stopping");
        worker.cancel.cancel();
        if worker.handle.join().is_err() {
            tracing::error!(url = %self.url, "stream worker panicked");
        }
        tracing::info!(url = %self.url, "stream source stopped");
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Register a frame callback. It runs on the worker thread.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Frame) + Send + Sync + 'static,
    {
        self.subscribers.subscribe(callback)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscribers.unsubscribe(id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn url(&self) -> &StreamUrl {
        &self.url
    }

    pub fn config(&self) -> &SourceConfig {
        &self.config
    }
}

impl Drop for StreamSource {
    fn drop(&mut self) {
        self.stop();
    }
}
