//! Narrow interface to the RTSP protocol/transport collaborator.
//!
//! The wire-level exchange (request/response framing, SDP parsing, transport
//! negotiation, RTP depacketization) lives outside this crate. The session
//! state machine drives it through three traits:
//!
//! - [`Connector`]: creates one [`RtspClient`] per connection attempt.
//! - [`RtspClient`]: the signalling calls of one attempt.
//!
//!   ```text
//!   DESCRIBE            -> SessionDescription
//!   SETUP  (per track)  -> ok | status (461 = retry over TCP)
//!   PLAY                -> ok | status
//!   TEARDOWN            -> (response ignored)
//!   ```
//!
//! - [`UnitSource`]: pull-based delivery of elementary-stream units for one
//!   subsession, plus its end-of-stream and closure notifications.
//!
//! All three run on the worker's single-threaded scheduler, so their futures
//! need not be `Send`.

pub mod sdp;
pub mod url;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::session::SubsessionId;
pub use url::StreamUrl;

/// Transport requested in SETUP (RFC 2326 §12.39).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TransportPreference {
    /// RTP over UDP (`RTP/AVP`).
    #[default]
    Datagram,
    /// RTP interleaved on the RTSP connection (`RTP/AVP/TCP`), the fallback
    /// after a 461 response.
    Stream,
}

impl fmt::Display for TransportPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Datagram => write!(f, "RTP/AVP"),
            Self::Stream => write!(f, "RTP/AVP/TCP"),
        }
    }
}

/// Media kind of a subsession (the SDP `m=` media field).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Medium {
    Video,
    Audio,
    Other(String),
}

impl Medium {
    pub fn parse(name: &str) -> Self {
        if name.eq_ignore_ascii_case("video") {
            Medium::Video
        } else if name.eq_ignore_ascii_case("audio") {
            Medium::Audio
        } else {
            Medium::Other(name.to_string())
        }
    }
}

impl fmt::Display for Medium {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Video => write!(f, "video"),
            Self::Audio => write!(f, "audio"),
            Self::Other(name) => write!(f, "{}", name),
        }
    }
}

/// One sub-stream advertised by the session description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaDescription {
    pub medium: Medium,
    /// Encoding name from `a=rtpmap` (e.g. `H264`, `JPEG`, `MPEG4-GENERIC`).
    pub codec: String,
    /// Image width for video subsessions, when known.
    pub width: Option<u16>,
    /// Image height for video subsessions, when known.
    pub height: Option<u16>,
    /// Raw `a=fmtp` parameter string, without the payload type.
    pub fmtp: Option<String>,
}

impl MediaDescription {
    pub fn new(medium: Medium, codec: &str) -> Self {
        Self {
            medium,
            codec: codec.to_string(),
            width: None,
            height: None,
            fmtp: None,
        }
    }

    pub fn with_dimensions(mut self, width: u16, height: u16) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    pub fn with_fmtp(mut self, fmtp: &str) -> Self {
        self.fmtp = Some(fmtp.to_string());
        self
    }
}

impl fmt::Display for MediaDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.medium, self.codec)
    }
}

/// Absolute (clock-time) range advertised by `a=range:clock=...`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbsoluteRange {
    pub start: String,
    pub end: Option<String>,
}

/// Range sent with PLAY.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayRange {
    /// Whole presentation from its beginning.
    Full,
    /// Source is indexed by absolute time.
    Absolute(AbsoluteRange),
}

/// Result of DESCRIBE: the ordered subsessions plus timing information.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionDescription {
    pub media: Vec<MediaDescription>,
    /// Normal play time at which the presentation starts.
    pub play_start: Duration,
    /// Normal play time at which it ends; `None` for live sources.
    pub play_end: Option<Duration>,
    pub absolute_range: Option<AbsoluteRange>,
}

impl SessionDescription {
    pub fn new(media: Vec<MediaDescription>) -> Self {
        Self {
            media,
            ..Self::default()
        }
    }

    /// Finite presentation length, if the source advertises one.
    pub fn duration(&self) -> Option<Duration> {
        self.play_end?
            .checked_sub(self.play_start)
            .filter(|d| !d.is_zero())
    }

    /// Range to request in PLAY.
    pub fn play_range(&self) -> PlayRange {
        match &self.absolute_range {
            Some(range) => PlayRange::Absolute(range.clone()),
            None => PlayRange::Full,
        }
    }
}

/// One elementary-stream unit (or part of one) written into the caller's
/// buffer by [`UnitSource::next_unit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    /// Bytes written into the buffer.
    pub len: usize,
    /// Bytes of this unit that did not fit and will follow in later
    /// deliveries.
    pub missing: usize,
    /// Presentation time since the Unix epoch.
    pub presentation: Duration,
}

/// Outcome of one pull on a [`UnitSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceEvent {
    Unit(Delivery),
    /// Explicit end-of-stream for this subsession (RTCP BYE).
    EndOfStream,
    /// The underlying source closed.
    Closed,
}

/// Creates the protocol client for each connection attempt.
#[async_trait(?Send)]
pub trait Connector: Send + Sync + 'static {
    /// Open the signalling connection to `url`. A failure ends the attempt.
    async fn connect(&self, url: &StreamUrl) -> Result<Box<dyn RtspClient>>;
}

/// Signalling calls of one connection attempt.
#[async_trait(?Send)]
pub trait RtspClient {
    /// Send DESCRIBE and return the parsed session description.
    async fn describe(&mut self) -> Result<SessionDescription>;

    /// Prepare local receive resources for a subsession before SETUP.
    fn initiate(&mut self, subsession: SubsessionId) -> Result<()>;

    /// Send SETUP for one subsession. A [`RtspError::Status`] with code 461
    /// asks for the stream-oriented transport.
    ///
    /// [`RtspError::Status`]: crate::RtspError::Status
    async fn setup(
        &mut self,
        subsession: SubsessionId,
        transport: TransportPreference,
    ) -> Result<()>;

    /// Attach a sink to a set-up subsession's data source.
    fn open_source(&mut self, subsession: SubsessionId) -> Result<Box<dyn UnitSource>>;

    /// Send PLAY for every set-up subsession.
    async fn play(&mut self, range: &PlayRange) -> Result<()>;

    /// Send TEARDOWN. The response is not awaited for meaning.
    async fn teardown(&mut self);
}

/// Pull-based elementary-stream delivery for one subsession.
#[async_trait(?Send)]
pub trait UnitSource {
    /// Wait for the next unit and copy at most `buf.len()` bytes of it into
    /// `buf`; the remainder is reported as [`Delivery::missing`].
    async fn next_unit(&mut self, buf: &mut [u8]) -> SourceEvent;
}
