use std::{collections::VecDeque, rc::Rc};

use log::{debug, warn};

use metavoxel_serde::{BitReader, BitWrite, BitWriter, Serde};

use super::{
    error::{SequencerError, SpanError},
    message::Message,
    span_list::{Span, SpanList},
};
use crate::{bitstream::Bitstream, BitstreamError, Protocol};

/// Bytes preceding the data of every segment: offset and length
pub const SEGMENT_HEADER_SIZE: usize = 8;
const LENGTH_PREFIX_SIZE: usize = 4;

/// A range of a reliable channel's stream carried by one packet
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChannelSpan {
    pub channel: u32,
    pub offset: u32,
    pub length: u32,
}

/// An ordered, reliable byte stream carrying length-framed messages.
///
/// On the sending side the buffer holds every byte not yet acknowledged, and
/// `write_data` keeps cycling through the unacknowledged ranges until they
/// are. On the receiving side segments are assembled in order and complete
/// messages are decoded as soon as their last byte arrives.
pub struct ReliableChannel {
    index: u32,
    output: bool,
    bitstream: Bitstream,
    // output: unacknowledged bytes, input: assembled bytes not yet decoded
    buffer: Vec<u8>,
    // stream offset of the first byte of `buffer` (output) or `assembly` (input)
    offset: u32,
    // output: acknowledged ranges, input: received ranges
    spans: SpanList,
    assembly: Vec<u8>,
    window: usize,
    priority: f32,
    write_position: usize,
    write_position_reset_packet_number: u32,
    // (stream offset where the message ends, message size)
    outgoing_message_stats: VecDeque<(u32, u32)>,
}

impl ReliableChannel {
    pub fn new(index: u32, output: bool, protocol: Rc<Protocol>) -> Self {
        let window = protocol.sequencer.max_incoming_packet_size;
        Self {
            index,
            output,
            bitstream: Bitstream::new(protocol),
            buffer: Vec::new(),
            offset: 0,
            spans: SpanList::new(),
            assembly: Vec::new(),
            window,
            priority: 1.0,
            write_position: 0,
            write_position_reset_packet_number: 0,
            outgoing_message_stats: VecDeque::new(),
        }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn is_output(&self) -> bool {
        self.output
    }

    pub fn priority(&self) -> f32 {
        self.priority
    }

    /// Sets the weight used when several channels share a packet
    pub fn set_priority(&mut self, priority: f32) {
        self.priority = priority;
    }

    pub fn bitstream(&mut self) -> &mut Bitstream {
        &mut self.bitstream
    }

    /// Bytes written but not yet acknowledged
    pub fn bytes_available(&self) -> usize {
        self.buffer.len() - self.spans.total_set()
    }

    /// Stream offset of the first unacknowledged byte
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Total bytes ever written to the stream
    pub fn bytes_written(&self) -> u32 {
        self.offset.wrapping_add(self.buffer.len() as u32)
    }

    // Sending

    /// Appends `message` to the stream. Mappings created while writing it are
    /// persisted at once since the receiver reads messages in order.
    pub fn send_message<M: Message>(&mut self, message: &M) -> Result<(), BitstreamError> {
        let mut writer = BitWriter::new();
        if let Err(error) = message.write(&mut self.bitstream, &mut writer) {
            self.bitstream.get_and_reset_write_mappings();
            return Err(error);
        }
        self.bitstream.persist_and_reset_write_mappings();

        let body = writer.to_bytes();
        let length = body.len() as u32;
        self.buffer.extend_from_slice(&length.to_le_bytes());
        self.buffer.extend_from_slice(&body);

        self.prune_outgoing_message_stats();
        self.outgoing_message_stats
            .push_back((self.bytes_written(), length + LENGTH_PREFIX_SIZE as u32));
        Ok(())
    }

    /// Writes unacknowledged data using at most `budget` bytes, segment
    /// headers included, and records a span for each segment written.
    /// Returns the number of bytes used.
    pub fn write_data(
        &mut self,
        writer: &mut dyn BitWrite,
        budget: usize,
        spans: &mut Vec<ChannelSpan>,
    ) -> usize {
        let segments = self.next_segments(budget);
        (segments.len() as u32).ser(writer);

        let mut used = 0;
        for segment in segments {
            let span = ChannelSpan {
                channel: self.index,
                offset: self.offset.wrapping_add(segment.start as u32),
                length: segment.len() as u32,
            };
            span.offset.ser(writer);
            span.length.ser(writer);
            writer.write_bytes(&self.buffer[segment.start..segment.end]);
            spans.push(span);
            used += SEGMENT_HEADER_SIZE + segment.len();
        }
        used
    }

    // Picks the segments to send, starting at the write position and wrapping
    // around to the front of the buffer
    fn next_segments(&mut self, mut budget: usize) -> Vec<Span> {
        let mut segments = Vec::new();
        if self.buffer.is_empty() {
            return segments;
        }
        let length = self.buffer.len();
        self.write_position %= length;
        let position = self.write_position;

        let clip = |span: &Span, start: usize, end: usize| {
            let clipped = Span {
                start: span.start.max(start),
                end: span.end.min(end),
            };
            (clipped.start < clipped.end).then_some(clipped)
        };
        let unset = self.spans.unset(length);
        let after = unset.iter().filter_map(|span| clip(span, position, length));
        let before = unset.iter().filter_map(|span| clip(span, 0, position));

        for span in after.chain(before) {
            if budget <= SEGMENT_HEADER_SIZE {
                break;
            }
            let taken = span.len().min(budget - SEGMENT_HEADER_SIZE);
            segments.push(Span {
                start: span.start,
                end: span.start + taken,
            });
            budget -= SEGMENT_HEADER_SIZE + taken;
            self.write_position = span.start + taken;
        }
        segments
    }

    /// Records that `span` arrived. Once the front of the stream is
    /// acknowledged, its bytes are released.
    pub fn span_acknowledged(&mut self, span: &ChannelSpan) -> Result<(), SpanError> {
        let position = i64::from(span.offset.wrapping_sub(self.offset) as i32);
        let end = position + i64::from(span.length);
        if end <= 0 {
            return Ok(());
        }
        if end > self.buffer.len() as i64 {
            return Err(SpanError::BeyondWritten {
                offset: span.offset,
                length: span.length,
                written: self.bytes_written(),
            });
        }
        let start = position.max(0) as usize;
        let end = end as usize;

        let advancement = self.spans.set(start, end - start);
        if advancement > 0 {
            self.buffer.drain(..advancement);
            self.offset = self.offset.wrapping_add(advancement as u32);
            self.write_position = self.write_position.saturating_sub(advancement);
            self.prune_outgoing_message_stats();
        }
        Ok(())
    }

    /// Rewinds to the oldest unacknowledged byte, at most once per round trip
    pub fn span_lost(&mut self, packet_number: u32, next_outgoing_packet_number: u32) {
        if packet_number >= self.write_position_reset_packet_number {
            debug!(
                "Channel {} lost data in packet {}, rewinding",
                self.index, packet_number
            );
            self.write_position = 0;
            self.write_position_reset_packet_number = next_outgoing_packet_number;
        }
    }

    fn prune_outgoing_message_stats(&mut self) {
        let offset = self.offset;
        while let Some((end, _)) = self.outgoing_message_stats.front() {
            if (end.wrapping_sub(offset) as i32) > 0 {
                break;
            }
            self.outgoing_message_stats.pop_front();
        }
    }

    /// Bytes of the oldest unacknowledged message that have been
    /// acknowledged, and its total size
    pub fn message_send_progress(&self) -> Option<(u32, u32)> {
        let (end, size) = self.outgoing_message_stats.front()?;
        let outstanding = end.wrapping_sub(self.offset);
        Some((size.saturating_sub(outstanding), *size))
    }

    // Receiving

    /// Reads the segments written by `write_data` and returns every message
    /// they complete, in stream order
    pub fn read_data<M: Message>(&mut self, reader: &mut BitReader) -> Result<Vec<M>, SequencerError> {
        let segment_count = u32::de(reader)?;
        for _ in 0..segment_count {
            let offset = u32::de(reader)?;
            let length = u32::de(reader)?;
            let data = reader.read_bytes(length as usize)?;
            self.receive_segment(offset, &data)?;
        }
        Ok(self.read_messages())
    }

    fn receive_segment(&mut self, offset: u32, data: &[u8]) -> Result<(), SpanError> {
        let position = i64::from(offset.wrapping_sub(self.offset) as i32);
        let end = position + data.len() as i64;
        if end <= 0 {
            // already assembled
            return Ok(());
        }
        if end > self.window as i64 {
            return Err(SpanError::OutOfWindow {
                offset,
                length: data.len() as u32,
                channel_offset: self.offset,
                window: self.window,
            });
        }
        let start = position.max(0) as usize;
        let end = end as usize;
        let skipped = (start as i64 - position) as usize;

        if self.assembly.len() < end {
            self.assembly.resize(end, 0);
        }
        self.assembly[start..end].copy_from_slice(&data[skipped..]);

        let advancement = self.spans.set(start, end - start);
        if advancement > 0 {
            self.buffer.extend(self.assembly.drain(..advancement));
            self.offset = self.offset.wrapping_add(advancement as u32);
        }
        Ok(())
    }

    fn read_messages<M: Message>(&mut self) -> Vec<M> {
        let mut messages = Vec::new();
        let mut position = 0;
        while let Some(length) = self.message_length(position) {
            let start = position + LENGTH_PREFIX_SIZE;
            if self.buffer.len() - start < length {
                break;
            }
            let mut reader = BitReader::new(&self.buffer[start..start + length]);
            match M::read(&mut self.bitstream, &mut reader) {
                Ok(message) => messages.push(message),
                Err(error) => warn!("Dropping unreadable message on channel {}: {}", self.index, error),
            }
            self.bitstream.persist_and_reset_read_mappings();
            position = start + length;
        }
        self.buffer.drain(..position);
        messages
    }

    fn message_length(&self, position: usize) -> Option<usize> {
        let prefix = self.buffer.get(position..position + LENGTH_PREFIX_SIZE)?;
        let mut bytes = [0; LENGTH_PREFIX_SIZE];
        bytes.copy_from_slice(prefix);
        Some(u32::from_le_bytes(bytes) as usize)
    }

    /// Bytes received of the next incoming message, and its declared size
    pub fn message_receive_progress(&self) -> Option<(u32, u32)> {
        let length = self.message_length(0)?;
        let received = (self.buffer.len() - LENGTH_PREFIX_SIZE).min(length);
        Some((
            (received + LENGTH_PREFIX_SIZE) as u32,
            (length + LENGTH_PREFIX_SIZE) as u32,
        ))
    }
}
