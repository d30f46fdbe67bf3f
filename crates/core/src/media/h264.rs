//! H.264 unit classification (RFC 6184 §1.3, ITU-T H.264 Table 7-1).
//!
//! The NAL unit type is the low five bits of the first byte:
//!
//! ```text
//! +---------------+
//! |0|1|2|3|4|5|6|7|
//! +-+-+-+-+-+-+-+-+
//! |F|NRI|  Type   |
//! +---------------+
//! ```
//!
//! | Type | Unit | Role |
//! |------|------|------|
//! | 1 | coded slice, non-IDR | delta frame |
//! | 5 | coded slice, IDR | key frame |
//! | 6 | SEI | cached |
//! | 7 | SPS | cached |
//! | 8 | PPS | cached |

use super::{Codec, ParameterSet, UnitClassifier, UnitKind};

pub const NAL_SLICE: u8 = 1;
pub const NAL_IDR: u8 = 5;
pub const NAL_SEI: u8 = 6;
pub const NAL_SPS: u8 = 7;
pub const NAL_PPS: u8 = 8;

/// Extract the NAL unit type from the header byte.
pub fn nal_type(header: u8) -> u8 {
    header & 0x1f
}

#[derive(Debug, Clone, Copy, Default)]
pub struct H264Classifier;

impl UnitClassifier for H264Classifier {
    fn codec(&self) -> Codec {
        Codec::H264
    }

    fn classify(&self, unit: &[u8]) -> UnitKind {
        let Some(&header) = unit.first() else {
            return UnitKind::Ignored(0);
        };
        match nal_type(header) {
            NAL_SPS => UnitKind::ParameterSet(ParameterSet::Sps),
            NAL_PPS => UnitKind::ParameterSet(ParameterSet::Pps),
            NAL_SEI => UnitKind::ParameterSet(ParameterSet::Sei),
            NAL_IDR => UnitKind::KeyFrame,
            NAL_SLICE => UnitKind::DeltaFrame,
            other => UnitKind::Ignored(other),
        }
    }
}
