//! Scripted in-memory protocol collaborator for scenario tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use rtsp::protocol::PlayRange;
use rtsp::{
    Connector, Delivery, MediaDescription, Medium, Result, RtspClient, RtspError,
    SessionDescription, SourceEvent, StreamUrl, SubsessionId, TransportPreference, UnitSource,
};

pub const SPS: [u8; 4] = [0x67, 0x42, 0x00, 0x1e];
pub const PPS: [u8; 4] = [0x68, 0xce, 0x38, 0x80];
pub const IDR: [u8; 6] = [0x65, 0x88, 0x84, 0x00, 0x33, 0xff];
pub const SLICE: [u8; 4] = [0x41, 0x9a, 0x02, 0x10];

/// Route library logs to the test output; `RUST_LOG` filters them.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn h264_video() -> MediaDescription {
    MediaDescription::new(Medium::Video, "H264").with_dimensions(1280, 720)
}

pub fn audio() -> MediaDescription {
    MediaDescription::new(Medium::Audio, "MPEG4-GENERIC")
}

/// What a scripted source does on each pull.
#[derive(Debug, Clone)]
pub enum Step {
    /// Deliver a whole unit; it is split across pulls if the buffer is
    /// smaller.
    Unit(Vec<u8>),
    /// Sleep before the next step.
    Wait(Duration),
    EndOfStream,
    Close,
    /// Deliver `unit` every `period`, forever.
    Every(Duration, Vec<u8>),
    /// Deliver `unit` forever, yielding to the scheduler between units
    /// but never waiting on a timer.
    Backlog(Vec<u8>),
}

/// Behaviour of every client created by a [`ScriptedConnector`].
#[derive(Debug, Clone, Default)]
pub struct Plan {
    pub connect_fails: bool,
    /// `None` makes DESCRIBE fail with 404.
    pub description: Option<SessionDescription>,
    /// Status codes returned by successive SETUPs of a subsession; an empty
    /// queue means success.
    pub setup_status: HashMap<usize, VecDeque<u16>>,
    pub initiate_fails: Vec<usize>,
    pub play_status: Option<u16>,
    /// Script per subsession; subsessions without one never deliver.
    pub sources: HashMap<usize, Vec<Step>>,
    /// DESCRIBE answers with a description that cannot be used.
    pub malformed_description: bool,
    /// DESCRIBE never completes.
    pub hang_describe: bool,
    /// SETUP never completes.
    pub hang_setup: bool,
    /// PLAY never completes.
    pub hang_play: bool,
    /// TEARDOWN never completes.
    pub hang_teardown: bool,
}

impl Plan {
    pub fn with_media(media: Vec<MediaDescription>) -> Self {
        Self {
            description: Some(SessionDescription::new(media)),
            ..Self::default()
        }
    }

    pub fn setup_status(mut self, subsession: usize, codes: &[u16]) -> Self {
        self.setup_status
            .insert(subsession, codes.iter().copied().collect());
        self
    }

    pub fn source(mut self, subsession: usize, steps: Vec<Step>) -> Self {
        self.sources.insert(subsession, steps);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Connect,
    Describe,
    Initiate(usize),
    Setup(usize, TransportPreference),
    OpenSource(usize),
    Play(PlayRange),
    Teardown,
}

#[derive(Debug, Clone, Default)]
pub struct Recorder {
    calls: Arc<Mutex<Vec<Call>>>,
    connects: Arc<Mutex<Vec<tokio::time::Instant>>>,
}

impl Recorder {
    pub fn push(&self, call: Call) {
        if call == Call::Connect {
            self.connects.lock().push(tokio::time::Instant::now());
        }
        self.calls.lock().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn count(&self, call: &Call) -> usize {
        self.calls.lock().iter().filter(|c| *c == call).count()
    }

    pub fn connect_times(&self) -> Vec<tokio::time::Instant> {
        self.connects.lock().clone()
    }
}

pub struct ScriptedConnector {
    pub plan: Plan,
    pub recorder: Recorder,
}

impl ScriptedConnector {
    pub fn new(plan: Plan) -> Self {
        Self {
            plan,
            recorder: Recorder::default(),
        }
    }

    /// A client for driving a [`rtsp::Session`] directly.
    pub fn client(&self) -> Box<dyn RtspClient> {
        Box::new(ScriptedClient {
            plan: self.plan.clone(),
            recorder: self.recorder.clone(),
        })
    }
}

#[async_trait(?Send)]
impl Connector for ScriptedConnector {
    async fn connect(&self, _url: &StreamUrl) -> Result<Box<dyn RtspClient>> {
        self.recorder.push(Call::Connect);
        if self.plan.connect_fails {
            return Err(std::io::Error::from(std::io::ErrorKind::ConnectionRefused).into());
        }
        Ok(self.client())
    }
}

pub struct ScriptedClient {
    plan: Plan,
    recorder: Recorder,
}

#[async_trait(?Send)]
impl RtspClient for ScriptedClient {
    async fn describe(&mut self) -> Result<SessionDescription> {
        self.recorder.push(Call::Describe);
        if self.plan.hang_describe {
            std::future::pending::<()>().await;
        }
        if self.plan.malformed_description {
            return Err(RtspError::InvalidDescription("no c= line".to_string()));
        }
        self.plan
            .description
            .clone()
            .ok_or_else(|| RtspError::status(404, "Not Found"))
    }

    fn initiate(&mut self, subsession: SubsessionId) -> Result<()> {
        self.recorder.push(Call::Initiate(subsession.index()));
        if self.plan.initiate_fails.contains(&subsession.index()) {
            return Err(RtspError::Io(std::io::Error::from(
                std::io::ErrorKind::AddrInUse,
            )));
        }
        Ok(())
    }

    async fn setup(
        &mut self,
        subsession: SubsessionId,
        transport: TransportPreference,
    ) -> Result<()> {
        self.recorder.push(Call::Setup(subsession.index(), transport));
        if self.plan.hang_setup {
            std::future::pending::<()>().await;
        }
        let code = self
            .plan
            .setup_status
            .get_mut(&subsession.index())
            .and_then(VecDeque::pop_front);
        match code {
            Some(code) if code >= 300 => Err(RtspError::status(code, "Scripted")),
            _ => Ok(()),
        }
    }

    fn open_source(&mut self, subsession: SubsessionId) -> Result<Box<dyn UnitSource>> {
        self.recorder.push(Call::OpenSource(subsession.index()));
        let steps = self
            .plan
            .sources
            .get(&subsession.index())
            .cloned()
            .unwrap_or_default();
        Ok(Box::new(ScriptedSource::new(steps)))
    }

    async fn play(&mut self, range: &PlayRange) -> Result<()> {
        self.recorder.push(Call::Play(range.clone()));
        if self.plan.hang_play {
            std::future::pending::<()>().await;
        }
        match self.plan.play_status {
            Some(code) => Err(RtspError::status(code, "Scripted")),
            None => Ok(()),
        }
    }

    async fn teardown(&mut self) {
        self.recorder.push(Call::Teardown);
        if self.plan.hang_teardown {
            std::future::pending::<()>().await;
        }
    }
}

/// Plays a script of units, splitting each across pulls the way a
/// depacketizer truncates to the receive buffer.
pub struct ScriptedSource {
    steps: VecDeque<Step>,
    partial: Option<(Vec<u8>, usize)>,
    clock: Duration,
}

impl ScriptedSource {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: steps.into(),
            partial: None,
            clock: Duration::from_secs(1_760_000_000),
        }
    }

    fn deliver(&mut self, unit: Vec<u8>, offset: usize, buf: &mut [u8]) -> SourceEvent {
        let len = (unit.len() - offset).min(buf.len());
        buf[..len].copy_from_slice(&unit[offset..offset + len]);
        let missing = unit.len() - offset - len;
        if missing > 0 {
            self.partial = Some((unit, offset + len));
        }
        SourceEvent::Unit(Delivery {
            len,
            missing,
            presentation: self.clock,
        })
    }
}

#[async_trait(?Send)]
impl UnitSource for ScriptedSource {
    async fn next_unit(&mut self, buf: &mut [u8]) -> SourceEvent {
        if let Some((unit, offset)) = self.partial.take() {
            return self.deliver(unit, offset, buf);
        }

        loop {
            match self.steps.pop_front() {
                Some(Step::Unit(unit)) => {
                    self.clock += Duration::from_millis(40);
                    return self.deliver(unit, 0, buf);
                }
                Some(Step::Wait(d)) => tokio::time::sleep(d).await,
                Some(Step::EndOfStream) => return SourceEvent::EndOfStream,
                Some(Step::Close) => return SourceEvent::Closed,
                Some(Step::Every(period, unit)) => {
                    self.steps.push_front(Step::Every(period, unit.clone()));
                    tokio::time::sleep(period).await;
                    self.clock += period;
                    return self.deliver(unit, 0, buf);
                }
                Some(Step::Backlog(unit)) => {
                    self.steps.push_front(Step::Backlog(unit.clone()));
                    tokio::task::yield_now().await;
                    return self.deliver(unit, 0, buf);
                }
                None => std::future::pending::<()>().await,
            }
        }
    }
}

/// Record every published frame.
pub fn collect(subscribers: &rtsp::Subscribers) -> Arc<Mutex<Vec<rtsp::Frame>>> {
    let frames = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&frames);
    subscribers.subscribe(move |frame: &rtsp::Frame| sink.lock().push(frame.clone()));
    frames
}

/// Annex B framing of `units`, each behind a 4-byte start code.
pub fn annex_b(units: &[&[u8]]) -> Vec<u8> {
    let mut data = Vec::new();
    for unit in units {
        data.extend_from_slice(&[0, 0, 0, 1]);
        data.extend_from_slice(unit);
    }
    data
}
