//! Elementary-stream classification and frame reassembly.
//!
//! The protocol collaborator hands over elementary-stream units (H.264/H.265
//! NAL units, JPEG images) one delivery at a time. This module turns them
//! into application [`Frame`]s:
//!
//! - A codec-specific [`UnitClassifier`] tags each unit as a parameter set,
//!   a key frame, a delta frame, a standalone image, or something to skip.
//! - The [`FrameAssembler`](assembler::FrameAssembler) caches parameter sets,
//!   prefixes them to key frames and stitches truncated units back together.
//!
//! ## Supported codecs
//!
//! | Codec | Module | RFC | Parameter sets |
//! |-------|--------|-----|----------------|
//! | H.264 | [`h264`] | [RFC 6184](https://tools.ietf.org/html/rfc6184) | SPS, PPS, SEI |
//! | H.265 | [`h265`] | [RFC 7798](https://tools.ietf.org/html/rfc7798) | VPS, SPS, PPS, SEI |
//! | MJPEG | [`mjpeg`] | [RFC 2435](https://tools.ietf.org/html/rfc2435) | none |
//!
//! Audio subsessions are received but produce no frames.

pub mod assembler;
pub mod frame;
pub mod h264;
pub mod h265;
pub mod mjpeg;

use std::fmt;

use crate::protocol::{MediaDescription, Medium};
pub use assembler::FrameAssembler;
pub use frame::{Frame, FrameKind};

/// Annex B start code written in front of every NAL unit of a frame.
pub const START_CODE: [u8; 4] = [0x00, 0x00, 0x00, 0x01];

/// Codecs the assembler knows how to frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Codec {
    H264,
    H265,
    Jpeg,
}

impl Codec {
    /// Map a subsession's medium and encoding name to a supported codec.
    pub fn from_description(description: &MediaDescription) -> Option<Self> {
        if description.medium != Medium::Video {
            return None;
        }
        match description.codec.to_ascii_uppercase().as_str() {
            "H264" => Some(Codec::H264),
            "H265" | "HEVC" => Some(Codec::H265),
            "JPEG" | "MJPEG" => Some(Codec::Jpeg),
            _ => None,
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::H264 => write!(f, "H264"),
            Self::H265 => write!(f, "H265"),
            Self::Jpeg => write!(f, "JPEG"),
        }
    }
}

/// Cache slot for a parameter-set unit. A key frame carries the cached
/// units in slot order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterSet {
    Vps = 0,
    Sps = 1,
    Pps = 2,
    Sei = 3,
}

impl ParameterSet {
    /// Number of cache slots.
    pub const COUNT: usize = 4;

    pub fn slot(self) -> usize {
        self as usize
    }
}

/// What a unit contributes to frame assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    /// Cached until the next key frame.
    ParameterSet(ParameterSet),
    /// Starts a frame decodable on its own.
    KeyFrame,
    /// Starts a frame that depends on earlier frames.
    DeltaFrame,
    /// Starts a self-contained image frame.
    Image,
    /// Not framed; carries the codec's unit type for diagnostics.
    Ignored(u8),
}

/// Codec-specific unit classification.
///
/// Each supported codec implements this trait. Classification only looks at
/// the first delivered bytes of a unit, so it works on truncated units too.
///
/// ## Implementing a new codec
///
/// 1. Create a new module (e.g. `media/av1.rs`)
/// 2. Implement `UnitClassifier` for your type
/// 3. Return it from [`classifier_for`]
pub trait UnitClassifier: Send {
    fn codec(&self) -> Codec;

    /// Classify the unit whose first bytes are `unit`.
    fn classify(&self, unit: &[u8]) -> UnitKind;
}

/// Classifier for a subsession, or `None` when its frames are not assembled
/// (audio and unknown codecs).
pub fn classifier_for(description: &MediaDescription) -> Option<Box<dyn UnitClassifier>> {
    match Codec::from_description(description)? {
        Codec::H264 => Some(Box::new(h264::H264Classifier)),
        Codec::H265 => Some(Box::new(h265::H265Classifier)),
        Codec::Jpeg => Some(Box::new(mjpeg::JpegClassifier)),
    }
}
