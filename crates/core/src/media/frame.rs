use std::fmt;
use std::time::Duration;

use super::Codec;

/// Decoding role of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Decodable on its own (H.264 IDR, H.265 IRAP); carries the parameter
    /// sets cached before it.
    Key,
    /// Depends on previously decoded frames.
    Delta,
    /// Self-contained still image (JPEG).
    Image,
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key => write!(f, "I"),
            Self::Delta => write!(f, "P"),
            Self::Image => write!(f, "image"),
        }
    }
}

/// A complete application frame, handed to every subscriber.
///
/// Frames are only published once fully assembled: `data` holds exactly the
/// bytes of the unit (plus, for NAL codecs, start codes and any prefixed
/// parameter sets).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Logical channel the stream belongs to.
    pub channel: u32,
    /// Subsession index within the session.
    pub stream_id: u32,
    /// Presentation timestamp in milliseconds since the Unix epoch.
    pub pts_ms: u64,
    /// Per-subsession frame counter.
    pub sequence: u32,
    pub codec: Codec,
    pub kind: FrameKind,
    /// Image dimensions, when the session description advertised them.
    pub width: Option<u16>,
    pub height: Option<u16>,
    pub data: Vec<u8>,
}

impl Frame {
    /// Presentation time as a [`Duration`] since the Unix epoch.
    pub fn presentation(&self) -> Duration {
        Duration::from_millis(self.pts_ms)
    }

    pub fn is_key(&self) -> bool {
        self.kind == FrameKind::Key
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
