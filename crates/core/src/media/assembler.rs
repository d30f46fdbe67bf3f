//! Frame reassembly from elementary-stream deliveries.
//!
//! The transport layer hands over each unit in one or more deliveries. A
//! delivery carries the bytes that fit the receive buffer and a count of the
//! bytes still missing; the missing bytes arrive in the following deliveries
//! with a shrinking count until it reaches zero.
//!
//! ```text
//! delivery 1:  [ IDR bytes 0..n1 ]          missing = m1
//! delivery 2:  [ IDR bytes n1..n2 ]         missing = m2 < m1
//! delivery 3:  [ IDR bytes n2..end ]        missing = 0   -> frame emitted
//!
//! frame:  SC SPS SC PPS SC SEI SC [ IDR .................................. ]
//!                                 ^ delivery 1 ^ delivery 2 ^ delivery 3
//! ```
//!
//! The first delivery sizes the whole frame (`delivered + missing`), so each
//! later delivery lands at `frame_len - (len + missing)`. A unit that fits a
//! single delivery is just the `missing = 0` case of the same algorithm.

use std::time::Duration;

use super::{Codec, Frame, FrameKind, ParameterSet, START_CODE, UnitClassifier, UnitKind};
use crate::error::AssemblyError;
use crate::protocol::MediaDescription;

/// Per-subsession reassembly state.
///
/// Holds the most recent unit of each parameter-set category, the frame
/// under construction (at most one) and the frame sequence counter.
pub struct FrameAssembler {
    classifier: Option<Box<dyn UnitClassifier>>,
    parameter_sets: [Option<Vec<u8>>; ParameterSet::COUNT],
    pending: Option<Frame>,
    /// Set after a unit was abandoned mid-way; its remaining deliveries are
    /// skipped until one reports zero missing bytes.
    discarding: bool,
    sequence: u32,
    channel: u32,
    stream_id: u32,
    width: Option<u16>,
    height: Option<u16>,
}

impl FrameAssembler {
    /// Create an assembler. Without a classifier every delivery is consumed
    /// and no frame is ever produced.
    pub fn new(classifier: Option<Box<dyn UnitClassifier>>) -> Self {
        Self {
            classifier,
            parameter_sets: Default::default(),
            pending: None,
            discarding: false,
            sequence: 0,
            channel: 0,
            stream_id: 0,
            width: None,
            height: None,
        }
    }

    /// Create the assembler for a negotiated subsession.
    pub fn for_subsession(description: &MediaDescription, channel: u32, stream_id: u32) -> Self {
        let mut assembler = Self::new(super::classifier_for(description));
        assembler.channel = channel;
        assembler.stream_id = stream_id;
        assembler.width = description.width;
        assembler.height = description.height;
        assembler
    }

    pub fn codec(&self) -> Option<Codec> {
        self.classifier.as_ref().map(|c| c.codec())
    }

    /// Sequence number the next frame will carry.
    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// Whether a frame is waiting for more deliveries.
    pub fn is_assembling(&self) -> bool {
        self.pending.is_some()
    }

    /// Cached parameter-set units, in the order a key frame carries them.
    pub fn cached_parameter_sets(&self) -> impl Iterator<Item = &[u8]> {
        self.parameter_sets.iter().flatten().map(Vec::as_slice)
    }

    /// Pre-load parameter sets obtained out of band (SDP `sprop-*`).
    /// Units that do not classify as parameter sets are skipped. Returns the
    /// number of units cached.
    pub fn seed_parameter_sets<I>(&mut self, units: I) -> usize
    where
        I: IntoIterator<Item = Vec<u8>>,
    {
        let Some(classifier) = self.classifier.as_deref() else {
            return 0;
        };
        let mut seeded = 0;
        for unit in units {
            if let UnitKind::ParameterSet(set) = classifier.classify(&unit) {
                self.parameter_sets[set.slot()] = Some(unit);
                seeded += 1;
            }
        }
        if seeded > 0 {
            tracing::debug!(subsession = self.stream_id, seeded, "parameter sets seeded from description");
        }
        seeded
    }

    /// Consume one delivery.
    ///
    /// `unit` holds the delivered bytes, `missing` the bytes of the same unit
    /// that will arrive later. Returns the completed frame when this delivery
    /// finishes one.
    ///
    /// A delivery that does not fit the frame under construction abandons
    /// that frame and returns [`AssemblyError::OutOfBounds`]; the rest of the
    /// unit is skipped and assembly resumes with the next unit.
    pub fn push(
        &mut self,
        unit: &[u8],
        missing: usize,
        presentation: Duration,
    ) -> Result<Option<Frame>, AssemblyError> {
        if self.discarding {
            if missing == 0 {
                self.discarding = false;
            }
            tracing::trace!(subsession = self.stream_id, bytes = unit.len(), missing, "skipping remainder of abandoned unit");
            return Ok(None);
        }

        if let Some(frame_len) = self.pending.as_ref().map(|f| f.data.len()) {
            let Some(offset) = frame_len.checked_sub(unit.len() + missing) else {
                self.pending = None;
                self.discarding = missing > 0;
                tracing::warn!(
                    subsession = self.stream_id,
                    bytes = unit.len(),
                    missing,
                    frame_len,
                    "delivery out of frame bounds, frame abandoned"
                );
                return Err(AssemblyError::OutOfBounds {
                    len: unit.len(),
                    missing,
                    frame_len,
                });
            };
            if let Some(frame) = self.pending.as_mut() {
                frame.data[offset..offset + unit.len()].copy_from_slice(unit);
            }
        } else if !self.begin(unit, missing, presentation) {
            return Ok(None);
        }

        if missing > 0 {
            return Ok(None);
        }

        let frame = self.pending.take();
        if let Some(frame) = &frame {
            tracing::trace!(
                subsession = self.stream_id,
                sequence = frame.sequence,
                kind = %frame.kind,
                bytes = frame.data.len(),
                pts_ms = frame.pts_ms,
                "frame assembled"
            );
        }
        Ok(frame)
    }

    /// Classify the first delivery of a unit and start a frame for it.
    /// Returns `false` when the unit does not start a frame.
    fn begin(&mut self, unit: &[u8], missing: usize, presentation: Duration) -> bool {
        let Some(classifier) = self.classifier.as_deref() else {
            self.discarding = missing > 0;
            return false;
        };
        let codec = classifier.codec();
        let kind = classifier.classify(unit);

        let (frame_kind, mut data) = match kind {
            UnitKind::ParameterSet(set) => {
                if missing > 0 {
                    tracing::warn!(subsession = self.stream_id, ?set, bytes = unit.len(), missing, "truncated parameter set dropped");
                    self.discarding = true;
                } else {
                    tracing::debug!(subsession = self.stream_id, ?set, bytes = unit.len(), "parameter set cached");
                    self.parameter_sets[set.slot()] = Some(unit.to_vec());
                }
                return false;
            }
            UnitKind::KeyFrame => {
                let prefix: usize = self
                    .cached_parameter_sets()
                    .map(|ps| START_CODE.len() + ps.len())
                    .sum();
                let mut data =
                    Vec::with_capacity(prefix + START_CODE.len() + unit.len() + missing);
                for ps in self.parameter_sets.iter_mut().filter_map(Option::take) {
                    data.extend_from_slice(&START_CODE);
                    data.extend_from_slice(&ps);
                }
                data.extend_from_slice(&START_CODE);
                data.extend_from_slice(unit);
                (FrameKind::Key, data)
            }
            UnitKind::DeltaFrame => {
                let mut data = Vec::with_capacity(START_CODE.len() + unit.len() + missing);
                data.extend_from_slice(&START_CODE);
                data.extend_from_slice(unit);
                (FrameKind::Delta, data)
            }
            UnitKind::Image => {
                let mut data = Vec::with_capacity(unit.len() + missing);
                data.extend_from_slice(unit);
                (FrameKind::Image, data)
            }
            UnitKind::Ignored(unit_type) => {
                tracing::debug!(subsession = self.stream_id, unit_type, bytes = unit.len(), "ignored unit");
                self.discarding = missing > 0;
                return false;
            }
        };

        data.resize(data.len() + missing, 0);

        let sequence = self.sequence;
        self.sequence = self.sequence.wrapping_add(1);

        self.pending = Some(Frame {
            channel: self.channel,
            stream_id: self.stream_id,
            pts_ms: presentation.as_millis() as u64,
            sequence,
            codec,
            kind: frame_kind,
            width: self.width,
            height: self.height,
            data,
        });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::h264::H264Classifier;
    use crate::media::mjpeg::JpegClassifier;
    use crate::protocol::Medium;
    use proptest::prelude::*;

    const SPS: &[u8] = &[0x67, 0x42, 0x00, 0x1e];
    const PPS: &[u8] = &[0x68, 0xce, 0x38, 0x80];
    const SEI: &[u8] = &[0x06, 0x05, 0x01];
    const IDR: &[u8] = &[0x65, 0x88, 0x84, 0x00, 0x33];
    const SLICE: &[u8] = &[0x41, 0x9a, 0x02];

    fn h264() -> FrameAssembler {
        FrameAssembler::new(Some(Box::new(H264Classifier)))
    }

    fn at(ms: u64) -> Duration {
        Duration::from_millis(ms)
    }

    fn concat(parts: &[&[u8]]) -> Vec<u8> {
        parts.concat()
    }

    #[test]
    fn delta_frame_without_parameter_sets() {
        let mut a = h264();
        let frame = a.push(SLICE, 0, at(40)).unwrap().expect("frame");
        assert_eq!(frame.kind, FrameKind::Delta);
        assert_eq!(frame.codec, Codec::H264);
        assert_eq!(frame.data, concat(&[&START_CODE, SLICE]));
        assert_eq!(frame.pts_ms, 40);
        assert_eq!(frame.sequence, 0);
        assert!(!a.is_assembling());
    }

    #[test]
    fn key_frame_carries_cached_parameter_sets_in_order() {
        let mut a = h264();
        // arrival order differs from framing order
        assert_eq!(a.push(SEI, 0, at(0)).unwrap(), None);
        assert_eq!(a.push(PPS, 0, at(0)).unwrap(), None);
        assert_eq!(a.push(SPS, 0, at(0)).unwrap(), None);

        let frame = a.push(IDR, 0, at(1000)).unwrap().expect("frame");
        assert_eq!(frame.kind, FrameKind::Key);
        assert_eq!(
            frame.data,
            concat(&[&START_CODE, SPS, &START_CODE, PPS, &START_CODE, SEI, &START_CODE, IDR])
        );
        assert_eq!(a.cached_parameter_sets().count(), 0, "caches cleared after use");

        let next = a.push(IDR, 0, at(2000)).unwrap().expect("frame");
        assert_eq!(next.data, concat(&[&START_CODE, IDR]));
    }

    #[test]
    fn most_recent_parameter_set_wins() {
        let mut a = h264();
        let newer_sps = [0x67, 0x64, 0x00, 0x28];
        a.push(SPS, 0, at(0)).unwrap();
        a.push(&newer_sps, 0, at(0)).unwrap();

        let frame = a.push(IDR, 0, at(0)).unwrap().expect("frame");
        assert_eq!(frame.data, concat(&[&START_CODE, &newer_sps, &START_CODE, IDR]));
    }

    #[test]
    fn unit_split_across_deliveries() {
        let mut a = h264();
        a.push(SPS, 0, at(0)).unwrap();
        let unit: Vec<u8> = std::iter::once(0x65).chain(1..=9).collect();

        assert_eq!(a.push(&unit[..4], 6, at(500)).unwrap(), None);
        assert!(a.is_assembling());
        assert_eq!(a.push(&unit[4..7], 3, at(501)).unwrap(), None);
        let frame = a.push(&unit[7..], 0, at(502)).unwrap().expect("frame");

        assert_eq!(frame.data, concat(&[&START_CODE, SPS, &START_CODE, &unit]));
        assert_eq!(frame.pts_ms, 500, "timestamp of the first delivery");
        assert_eq!(frame.sequence, 0);
    }

    #[test]
    fn jpeg_image_sized_to_declared_total() {
        let description = MediaDescription::new(Medium::Video, "JPEG").with_dimensions(640, 480);
        let mut a = FrameAssembler::for_subsession(&description, 3, 1);
        let image = [0xff, 0xd8, 0xff, 0xe0, 0x00, 0x10, 0xff, 0xd9];

        assert_eq!(a.push(&image[..5], 3, at(7)).unwrap(), None);
        let frame = a.push(&image[5..], 0, at(8)).unwrap().expect("frame");
        assert_eq!(frame.kind, FrameKind::Image);
        assert_eq!(frame.data, image);
        assert_eq!((frame.width, frame.height), (Some(640), Some(480)));
        assert_eq!((frame.channel, frame.stream_id), (3, 1));
    }

    #[test]
    fn sequence_counts_frames() {
        let mut a = FrameAssembler::new(Some(Box::new(JpegClassifier)));
        let seqs: Vec<u32> = (0..3)
            .map(|i| a.push(&[0xff, 0xd8], 0, at(i)).unwrap().unwrap().sequence)
            .collect();
        assert_eq!(seqs, vec![0, 1, 2]);

        let mut b = h264();
        b.push(SPS, 0, at(0)).unwrap();
        assert_eq!(b.sequence(), 0, "parameter sets do not consume a sequence number");
    }

    #[test]
    fn out_of_bounds_delivery_abandons_frame_then_recovers() {
        let mut a = h264();
        assert_eq!(a.push(SLICE, 2, at(0)).unwrap(), None);

        // frame is 4 + 3 + 2 = 9 bytes; this claims 4 + 16 = 20
        let err = a.push(&[0xaa; 4], 16, at(0)).unwrap_err();
        assert_eq!(
            err,
            AssemblyError::OutOfBounds {
                len: 4,
                missing: 16,
                frame_len: 9
            }
        );
        assert!(!a.is_assembling());

        // remainder of the bad unit is skipped, including its final delivery
        assert_eq!(a.push(&[0x65; 8], 8, at(0)).unwrap(), None);
        assert_eq!(a.push(&[0x65; 8], 0, at(0)).unwrap(), None);

        let frame = a.push(IDR, 0, at(9)).unwrap().expect("recovered");
        assert_eq!(frame.data, concat(&[&START_CODE, IDR]));
    }

    #[test]
    fn ignored_units_produce_nothing() {
        let mut a = h264();
        // access unit delimiter
        assert_eq!(a.push(&[0x09, 0xf0], 0, at(0)).unwrap(), None);
        assert!(!a.is_assembling());

        let mut audio = FrameAssembler::for_subsession(
            &MediaDescription::new(Medium::Audio, "MPEG4-GENERIC"),
            0,
            1,
        );
        assert_eq!(audio.codec(), None);
        assert_eq!(audio.push(&[0x21, 0x10], 4, at(0)).unwrap(), None);
        assert_eq!(audio.push(&[0x21, 0x10, 0, 0], 0, at(0)).unwrap(), None);
    }

    #[test]
    fn truncated_parameter_set_is_not_cached() {
        let mut a = h264();
        assert_eq!(a.push(&SPS[..2], 2, at(0)).unwrap(), None);
        assert_eq!(a.push(&SPS[2..], 0, at(0)).unwrap(), None);
        assert_eq!(a.cached_parameter_sets().count(), 0);

        let frame = a.push(IDR, 0, at(0)).unwrap().expect("frame");
        assert_eq!(frame.data, concat(&[&START_CODE, IDR]));
    }

    #[test]
    fn seeded_parameter_sets_prefix_first_key_frame() {
        let description = MediaDescription::new(Medium::Video, "H264");
        let mut a = FrameAssembler::for_subsession(&description, 0, 0);
        let seeded = a.seed_parameter_sets(vec![SPS.to_vec(), PPS.to_vec(), IDR.to_vec()]);
        assert_eq!(seeded, 2);

        let frame = a.push(IDR, 0, at(0)).unwrap().expect("frame");
        assert_eq!(
            frame.data,
            concat(&[&START_CODE, SPS, &START_CODE, PPS, &START_CODE, IDR])
        );
    }

    fn deliveries(payload: &[u8], chunk: usize) -> Vec<(&[u8], usize)> {
        let mut out = Vec::new();
        let mut offset = 0;
        while offset < payload.len() {
            let end = (offset + chunk).min(payload.len());
            out.push((&payload[offset..end], payload.len() - end));
            offset = end;
        }
        out
    }

    proptest! {
        #[test]
        fn prop_split_unit_reassembles_exactly(
            body in prop::collection::vec(any::<u8>(), 0..1024),
            chunk in 1usize..200,
            key in any::<bool>(),
        ) {
            let header = if key { 0x65 } else { 0x41 };
            let payload: Vec<u8> = std::iter::once(header).chain(body).collect();

            let mut a = h264();
            let mut frames = Vec::new();
            for (bytes, missing) in deliveries(&payload, chunk) {
                if let Some(frame) = a.push(bytes, missing, at(0)).unwrap() {
                    frames.push(frame);
                }
            }

            prop_assert_eq!(frames.len(), 1);
            prop_assert_eq!(frames[0].data.len(), START_CODE.len() + payload.len());
            prop_assert_eq!(&frames[0].data[..4], &START_CODE[..]);
            prop_assert_eq!(&frames[0].data[4..], &payload[..]);
        }

        #[test]
        fn prop_split_image_matches_declared_size(
            image in prop::collection::vec(any::<u8>(), 1..2048),
            chunk in 1usize..300,
        ) {
            let mut a = FrameAssembler::new(Some(Box::new(JpegClassifier)));
            let mut frames = Vec::new();
            for (bytes, missing) in deliveries(&image, chunk) {
                if let Some(frame) = a.push(bytes, missing, at(0)).unwrap() {
                    frames.push(frame);
                }
            }
            prop_assert_eq!(frames.len(), 1);
            prop_assert_eq!(&frames[0].data, &image);
        }
    }
}
