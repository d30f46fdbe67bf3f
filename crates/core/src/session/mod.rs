//! One connection attempt, from DESCRIBE to TEARDOWN.
//!
//! ## Session lifecycle
//!
//! ```text
//! Negotiating --DESCRIBE ok--> SettingUp(0) -> ... -> SettingUp(n-1) --> Playing
//!      |                          |  461: retry once over TCP              |
//!      |                          |  other failure: skip subsession        |  PLAY ok
//!      |                                                                   v
//!      |              sinks closed / end-of-stream / duration elapsed / stalled / stop
//!      |                                                                   |
//!      |                                                                   v
//!      |                                                                Ending --TEARDOWN--> Closed
//!      |
//!      `-- DESCRIBE failed, no media, PLAY failed, no response, stop --> Failed
//! ```
//!
//! Everything runs on the worker's single-threaded scheduler: protocol
//! completions, timer fires and frame deliveries are handled one at a time,
//! so the session needs no locking.

pub mod liveness;
mod sink;
pub mod subsession;

use std::future::Future;
use std::time::Duration;

use futures::StreamExt;
use futures::future::{FutureExt, LocalBoxFuture};
use futures::stream::FuturesUnordered;
use tokio::time::{Instant, sleep_until, timeout};
use tokio_util::sync::CancellationToken;

use crate::error::{Result, RtspError};
use crate::media::FrameAssembler;
use crate::protocol::{
    PlayRange, RtspClient, SessionDescription, SourceEvent, TransportPreference, UnitSource,
    sdp,
};
use crate::source::SourceConfig;
use crate::subscribers::Subscribers;
pub use liveness::LivenessMonitor;
use sink::Sink;
pub use subsession::{Subsession, SubsessionId, SubsessionState};

/// Session state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// DESCRIBE in flight.
    Negotiating,
    /// Setting up the subsession at this index.
    SettingUp(usize),
    /// PLAY issued; frames flowing.
    Playing,
    /// Releasing sinks and sending TEARDOWN.
    Ending,
    /// Torn down after playing.
    Closed,
    /// Aborted before playback; no TEARDOWN sent.
    Failed,
}

/// Why a playing session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// Every sink's source closed.
    SinksClosed,
    /// A subsession signalled an explicit end of stream (RTCP BYE).
    EndOfStream,
    /// The advertised duration plus slack elapsed.
    DurationElapsed,
    /// No frame within the liveness threshold.
    Stalled,
    /// A stop request arrived.
    Cancelled,
}

/// How an attempt finished. Neither variant is fatal to the stream source;
/// the supervisor reconnects after a backoff delay either way.
#[derive(Debug)]
pub enum SessionOutcome {
    /// Playback started and the session was torn down.
    Closed(EndReason),
    /// The attempt failed before playback started.
    Failed(RtspError),
}

/// One connection attempt.
///
/// Owns the protocol client, its subsessions and (while playing) their sinks
/// and timers; all of them are released when [`run`](Self::run) returns.
pub struct Session<'a> {
    client: Box<dyn RtspClient>,
    config: &'a SourceConfig,
    subscribers: &'a Subscribers,
    cancel: CancellationToken,
    state: SessionState,
    transport: TransportPreference,
    description: Option<SessionDescription>,
    subsessions: Vec<Subsession>,
    duration: Option<Duration>,
}

impl<'a> Session<'a> {
    pub fn new(
        client: Box<dyn RtspClient>,
        config: &'a SourceConfig,
        subscribers: &'a Subscribers,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            client,
            config,
            subscribers,
            cancel,
            state: SessionState::Negotiating,
            transport: config.transport,
            description: None,
            subsessions: Vec::new(),
            duration: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Current transport preference; switches to
    /// [`TransportPreference::Stream`] after a 461 response.
    pub fn transport(&self) -> TransportPreference {
        self.transport
    }

    pub fn subsessions(&self) -> &[Subsession] {
        &self.subsessions
    }

    /// Presentation length reported by the source, if finite.
    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    /// Drive the attempt to a terminal state.
    pub async fn run(&mut self) -> SessionOutcome {
        let started = async {
            self.negotiate().await?;
            let sinks = self.set_up().await?;
            let deadline = self.play().await?;
            Ok::<_, RtspError>((sinks, deadline))
        }
        .await;

        match started {
            Ok((sinks, deadline)) => {
                let reason = self.stream(sinks, deadline).await;
                self.end(reason).await;
                SessionOutcome::Closed(reason)
            }
            Err(e) => {
                self.fail(&e);
                SessionOutcome::Failed(e)
            }
        }
    }

    fn set_state(&mut self, state: SessionState) {
        tracing::debug!(old_state = ?self.state, new_state = ?state, "session state transition");
        self.state = state;
    }

    async fn negotiate(&mut self) -> Result<()> {
        self.set_state(SessionState::Negotiating);

        let description = request(
            &self.cancel,
            self.config.request_timeout,
            "DESCRIBE",
            self.client.describe(),
        )
        .await?;
        if description.media.is_empty() {
            return Err(RtspError::NoSubsessions);
        }

        tracing::info!(
            subsessions = description.media.len(),
            duration = ?description.duration(),
            "got session description"
        );

        self.subsessions = description
            .media
            .iter()
            .enumerate()
            .map(|(index, media)| Subsession::new(SubsessionId(index), media.clone()))
            .collect();
        self.description = Some(description);
        Ok(())
    }

    /// Set up every subsession in order. Failures skip the subsession; only
    /// cancellation and an unanswered SETUP abort.
    async fn set_up(&mut self) -> Result<Vec<Sink>> {
        let mut sinks = Vec::new();

        for index in 0..self.subsessions.len() {
            self.set_state(SessionState::SettingUp(index));
            let id = SubsessionId(index);

            if let Err(e) = self.client.initiate(id) {
                self.skip(id, "failed to initiate subsession", &e);
                continue;
            }

            match self.set_up_transport(id).await {
                Ok(()) => {}
                Err(e @ (RtspError::Cancelled | RtspError::TimedOut { .. })) => return Err(e),
                Err(e) => {
                    self.skip(id, "failed to set up subsession", &e);
                    continue;
                }
            }

            match self.client.open_source(id) {
                Ok(source) => sinks.push(self.attach(id, source)),
                Err(e) => self.skip(id, "failed to create a data sink", &e),
            }
        }

        Ok(sinks)
    }

    /// SETUP one subsession, falling back to the stream-oriented transport
    /// once when the server rejects datagrams with 461.
    async fn set_up_transport(&mut self, id: SubsessionId) -> Result<()> {
        loop {
            let setup = self.client.setup(id, self.transport);
            match request(&self.cancel, self.config.request_timeout, "SETUP", setup).await {
                Ok(()) => {
                    let subsession = &mut self.subsessions[id.index()];
                    subsession.set_transport(self.transport);
                    tracing::info!(
                        subsession = %id,
                        media = %subsession.description(),
                        transport = %self.transport,
                        "set up subsession"
                    );
                    return Ok(());
                }
                Err(e)
                    if e.is_incompatible_transport()
                        && self.transport == TransportPreference::Datagram =>
                {
                    tracing::warn!(subsession = %id, error = %e, "transport rejected, retrying over TCP");
                    self.transport = TransportPreference::Stream;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn skip(&mut self, id: SubsessionId, what: &'static str, error: &RtspError) {
        let subsession = &mut self.subsessions[id.index()];
        tracing::warn!(subsession = %id, media = %subsession.description(), error = %error, "{}", what);
        subsession.set_state(SubsessionState::Skipped);
    }

    fn attach(&mut self, id: SubsessionId, source: Box<dyn UnitSource>) -> Sink {
        let subsession = &mut self.subsessions[id.index()];
        let description = subsession.description();

        let mut assembler =
            FrameAssembler::for_subsession(description, self.config.channel, id.index() as u32);
        if self.config.seed_parameter_sets
            && let (Some(codec), Some(fmtp)) = (assembler.codec(), description.fmtp.as_deref())
        {
            assembler.seed_parameter_sets(sdp::parameter_sets(codec, fmtp));
        }
        if assembler.codec().is_none() {
            tracing::debug!(subsession = %id, media = %description, "no frame assembly for this media");
        }

        tracing::info!(subsession = %id, media = %description, "created a data sink");
        subsession.set_state(SubsessionState::Attached);
        Sink::new(id, source, assembler, self.config.max_delivery_size)
    }

    /// Send PLAY and arm the duration timer. Returns its deadline.
    async fn play(&mut self) -> Result<Option<Instant>> {
        self.set_state(SessionState::Playing);

        let (range, duration) = match &self.description {
            Some(description) => match description.play_range() {
                PlayRange::Full => (PlayRange::Full, description.duration()),
                absolute => (absolute, None),
            },
            None => (PlayRange::Full, None),
        };

        request(
            &self.cancel,
            self.config.request_timeout,
            "PLAY",
            self.client.play(&range),
        )
        .await?;

        self.duration = duration;
        let deadline = duration.map(|d| Instant::now() + d + self.config.duration_slack);

        match duration {
            Some(d) => tracing::info!(
                up_to_secs = (d + self.config.duration_slack).as_secs_f64(),
                "started playing session"
            ),
            None => tracing::info!("started playing session"),
        }
        Ok(deadline)
    }

    /// Pull from every sink until the session has to end.
    async fn stream(&mut self, sinks: Vec<Sink>, deadline: Option<Instant>) -> EndReason {
        let mut liveness =
            LivenessMonitor::start(self.config.liveness_interval, self.config.liveness_threshold);
        let mut pulls: FuturesUnordered<LocalBoxFuture<'static, (Sink, SourceEvent)>> =
            sinks.into_iter().map(|sink| sink.pull().boxed_local()).collect();

        loop {
            if pulls.is_empty() {
                tracing::info!("all subsession streams closed");
                return EndReason::SinksClosed;
            }

            let (mut sink, event) = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return EndReason::Cancelled,
                stalled = liveness.tick() => {
                    if stalled {
                        tracing::warn!(silent_ticks = liveness.silent_ticks(), "no frames received, shutting down stream");
                        return EndReason::Stalled;
                    }
                    continue;
                }
                _ = sleep_until_deadline(deadline) => {
                    tracing::info!("stream duration elapsed");
                    return EndReason::DurationElapsed;
                }
                Some(pulled) = pulls.next() => pulled,
            };

            match event {
                SourceEvent::Unit(delivery) => {
                    match sink.consume(delivery) {
                        Ok(Some(frame)) => {
                            liveness.reset();
                            let delivered = self.subscribers.publish(&frame);
                            tracing::trace!(
                                subsession = %sink.id,
                                sequence = frame.sequence,
                                subscribers = delivered,
                                "frame published"
                            );
                        }
                        Ok(None) => {}
                        Err(e) => {
                            tracing::debug!(subsession = %sink.id, error = %e, "delivery dropped");
                        }
                    }
                    pulls.push(sink.pull().boxed_local());
                }
                SourceEvent::EndOfStream => {
                    tracing::info!(subsession = %sink.id, "received end-of-stream");
                    self.release(sink.id);
                    return EndReason::EndOfStream;
                }
                SourceEvent::Closed => {
                    tracing::info!(subsession = %sink.id, "subsession source closed");
                    self.release(sink.id);
                }
            }
        }
    }

    fn release(&mut self, id: SubsessionId) {
        self.subsessions[id.index()].set_state(SubsessionState::Released);
    }

    fn release_all(&mut self) {
        for subsession in &mut self.subsessions {
            if subsession.has_sink() {
                subsession.set_state(SubsessionState::Released);
            }
        }
    }

    /// Close remaining sinks and send a best-effort TEARDOWN.
    async fn end(&mut self, reason: EndReason) {
        self.set_state(SessionState::Ending);
        self.release_all();

        if timeout(self.config.teardown_timeout, self.client.teardown())
            .await
            .is_err()
        {
            tracing::warn!("teardown did not complete in time");
        }

        self.set_state(SessionState::Closed);
        tracing::info!(?reason, "closing the stream");
    }

    fn fail(&mut self, error: &RtspError) {
        self.release_all();
        self.set_state(SessionState::Failed);
        match error {
            RtspError::Cancelled => tracing::info!("session cancelled"),
            e => tracing::warn!(error = %e, "session failed"),
        }
    }
}

/// Race a protocol request against cancellation and the response bound.
async fn request<T>(
    cancel: &CancellationToken,
    limit: Duration,
    name: &'static str,
    response: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(RtspError::Cancelled),
        result = timeout(limit, response) => result.unwrap_or_else(|_| {
            Err(RtspError::TimedOut {
                request: name,
                after: limit,
            })
        }),
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
