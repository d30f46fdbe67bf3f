//! MJPEG unit classification (RFC 2435).
//!
//! The depacketizer delivers one complete JPEG image per unit, so every
//! unit starts a standalone image frame. No start codes or parameter sets
//! are involved.

use super::{Codec, UnitClassifier, UnitKind};

#[derive(Debug, Clone, Copy, Default)]
pub struct JpegClassifier;

impl UnitClassifier for JpegClassifier {
    fn codec(&self) -> Codec {
        Codec::Jpeg
    }

    fn classify(&self, unit: &[u8]) -> UnitKind {
        if unit.is_empty() {
            UnitKind::Ignored(0)
        } else {
            UnitKind::Image
        }
    }
}
