//! H.265 (HEVC) unit classification (RFC 7798 §1.1.4).
//!
//! Key differences from H.264:
//!
//! - **2-byte NAL unit header**; the type is bits 1..6 of the first byte.
//!
//!   ```text
//!   +---------------+---------------+
//!   |0|1|2|3|4|5|6|7|0|1|2|3|4|5|6|7|
//!   +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!   |F|   Type    |  LayerId  | TID |
//!   +-------------+-----------------+
//!   ```
//!
//! - **Four parameter-set categories**: VPS (32), SPS (33), PPS (34) and
//!   prefix SEI (39).
//! - **Random access points** (IRAP, types 16..=21: BLA, IDR, CRA) start key
//!   frames; VCL types 0..=9 start delta frames.

use super::{Codec, ParameterSet, UnitClassifier, UnitKind};

pub const NAL_VPS: u8 = 32;
pub const NAL_SPS: u8 = 33;
pub const NAL_PPS: u8 = 34;
pub const NAL_PREFIX_SEI: u8 = 39;

/// Extract the NAL unit type from the first header byte.
pub fn nal_type(header: u8) -> u8 {
    (header >> 1) & 0x3f
}

#[derive(Debug, Clone, Copy, Default)]
pub struct H265Classifier;

impl UnitClassifier for H265Classifier {
    fn codec(&self) -> Codec {
        Codec::H265
    }

    fn classify(&self, unit: &[u8]) -> UnitKind {
        let Some(&header) = unit.first() else {
            return UnitKind::Ignored(0);
        };
        match nal_type(header) {
            NAL_VPS => UnitKind::ParameterSet(ParameterSet::Vps),
            NAL_SPS => UnitKind::ParameterSet(ParameterSet::Sps),
            NAL_PPS => UnitKind::ParameterSet(ParameterSet::Pps),
            NAL_PREFIX_SEI => UnitKind::ParameterSet(ParameterSet::Sei),
            16..=21 => UnitKind::KeyFrame,
            0..=9 => UnitKind::DeltaFrame,
            other => UnitKind::Ignored(other),
        }
    }
}
