use crate::error::AssemblyError;
use crate::media::{Frame, FrameAssembler};
use crate::protocol::{Delivery, SourceEvent, UnitSource};

use super::SubsessionId;

/// A data sink attached to one subsession: the pull side of its source,
/// the receive buffer and the subsession's frame assembly state.
///
/// At most one unit is in flight per sink; the next pull is only issued
/// after the previous delivery has been consumed.
pub(crate) struct Sink {
    pub id: SubsessionId,
    source: Box<dyn UnitSource>,
    buffer: Vec<u8>,
    assembler: FrameAssembler,
}

impl Sink {
    pub fn new(
        id: SubsessionId,
        source: Box<dyn UnitSource>,
        assembler: FrameAssembler,
        buffer_size: usize,
    ) -> Self {
        Self {
            id,
            source,
            buffer: vec![0; buffer_size.max(1)],
            assembler,
        }
    }

    /// Wait for the next event of this sink's source. Takes the sink by value
    /// so the pull can sit in a set of concurrently polled futures.
    pub async fn pull(mut self) -> (Self, SourceEvent) {
        let event = self.source.next_unit(&mut self.buffer).await;
        (self, event)
    }

    /// Feed the delivery just written into the buffer to the assembler.
    ///
    /// A delivery claiming more bytes than the buffer holds keeps what fits;
    /// the excess is counted as missing so the frame is sized correctly.
    pub fn consume(&mut self, delivery: Delivery) -> Result<Option<Frame>, AssemblyError> {
        let len = delivery.len.min(self.buffer.len());
        let clipped = delivery.len - len;
        if clipped > 0 {
            tracing::warn!(
                subsession = %self.id,
                len = delivery.len,
                buffer = self.buffer.len(),
                "delivery longer than the receive buffer"
            );
        }
        self.assembler.push(
            &self.buffer[..len],
            delivery.missing + clipped,
            delivery.presentation,
        )
    }
}
