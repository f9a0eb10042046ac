use std::{
    collections::{BTreeMap, HashSet, VecDeque},
    rc::Rc,
};

use log::trace;

use metavoxel_serde::{BitReader, BitWrite, BitWriter, Serde};

use super::{
    config::SequencerConfig,
    error::SequencerError,
    message::{Message, SequencerHandler},
    reliable_channel::{ChannelSpan, ReliableChannel},
};
use crate::{
    bitstream::{Bitstream, ReadMappings, WriteMappings},
    BitstreamError, Protocol,
};

/// Packet number, packet size and fragment offset
pub const FRAGMENT_HEADER_SIZE: usize = 12;
/// Channel count, channel index, segment count, segment offset and length
const MINIMUM_RELIABLE_SIZE: usize = 20;
const CHANNEL_COUNT_SIZE: usize = 4;
const CHANNEL_HEADER_SIZE: usize = 8;

struct SendRecord {
    packet_number: u32,
    last_received_packet_number: u32,
    mappings: WriteMappings,
    spans: Vec<ChannelSpan>,
}

struct ReceiveRecord {
    packet_number: u32,
    mappings: ReadMappings,
    new_high_priority_messages: usize,
}

struct HighPriorityMessage<M> {
    message: M,
    first_packet_number: u32,
}

/// Send and receive progress summed over every reliable channel
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReliableChannelStats {
    pub send_progress: u32,
    pub send_total: u32,
    pub receive_progress: u32,
    pub receive_total: u32,
}

/// Turns a stream of unreliable datagrams into numbered packets.
///
/// Each packet carries, in order: acknowledgements for received packets,
/// every high-priority message not yet known to be received, the caller's
/// payload, and as much reliable channel data as fits in
/// `SequencerConfig::max_packet_size`. Packets are split into datagrams of at
/// most `max_datagram_size` bytes, which the owner drains with
/// `pop_outgoing_datagram` and hands to its transport.
pub struct DatagramSequencer<M: Message> {
    config: SequencerConfig,
    protocol: Rc<Protocol>,
    output_stream: Bitstream,
    input_stream: Bitstream,

    send_records: VecDeque<SendRecord>,
    receive_records: VecDeque<ReceiveRecord>,

    outgoing_packet_number: u32,
    outgoing_datagrams: VecDeque<Box<[u8]>>,

    incoming_packet_number: u32,
    incoming_packet_data: Vec<u8>,
    offsets_received: HashSet<usize>,
    remaining_bytes: usize,

    high_priority_messages: VecDeque<HighPriorityMessage<M>>,
    received_high_priority_messages: usize,

    reliable_output_channels: BTreeMap<u32, ReliableChannel>,
    reliable_input_channels: BTreeMap<u32, ReliableChannel>,
}

impl<M: Message> DatagramSequencer<M> {
    pub fn new(protocol: Rc<Protocol>) -> Self {
        Self {
            config: protocol.sequencer.clone(),
            output_stream: Bitstream::new(protocol.clone()),
            input_stream: Bitstream::new(protocol.clone()),
            protocol,
            send_records: VecDeque::new(),
            receive_records: VecDeque::new(),
            outgoing_packet_number: 0,
            outgoing_datagrams: VecDeque::new(),
            incoming_packet_number: 0,
            incoming_packet_data: Vec::new(),
            offsets_received: HashSet::new(),
            remaining_bytes: 0,
            high_priority_messages: VecDeque::new(),
            received_high_priority_messages: 0,
            reliable_output_channels: BTreeMap::new(),
            reliable_input_channels: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &SequencerConfig {
        &self.config
    }

    pub fn protocol(&self) -> &Rc<Protocol> {
        &self.protocol
    }

    /// Number of the last packet sent, 0 before the first
    pub fn outgoing_packet_number(&self) -> u32 {
        self.outgoing_packet_number
    }

    /// Number of the newest packet seen, complete or not
    pub fn incoming_packet_number(&self) -> u32 {
        self.incoming_packet_number
    }

    /// Number of the packet recorded at `index` among unacknowledged sends
    pub fn sent_packet_number(&self, index: usize) -> Option<u32> {
        self.send_records.get(index).map(|record| record.packet_number)
    }

    pub fn send_record_count(&self) -> usize {
        self.send_records.len()
    }

    pub fn receive_record_count(&self) -> usize {
        self.receive_records.len()
    }

    /// Read mappings of the received packet recorded at `index`
    pub fn read_mappings(&self, index: usize) -> Option<&ReadMappings> {
        self.receive_records.get(index).map(|record| &record.mappings)
    }

    /// The stream payloads are written to
    pub fn output_stream(&mut self) -> &mut Bitstream {
        &mut self.output_stream
    }

    /// The stream payloads are read from
    pub fn input_stream(&mut self) -> &mut Bitstream {
        &mut self.input_stream
    }

    // High priority messages

    /// Queues a message that is repeated in every packet until one carrying
    /// it is acknowledged
    pub fn send_high_priority_message(&mut self, message: M) {
        self.high_priority_messages.push_back(HighPriorityMessage {
            message,
            first_packet_number: self.outgoing_packet_number + 1,
        });
    }

    pub fn high_priority_messages(&self) -> impl Iterator<Item = &M> {
        self.high_priority_messages.iter().map(|entry| &entry.message)
    }

    // Reliable channels

    pub fn reliable_output_channel(&mut self, index: u32) -> &mut ReliableChannel {
        let protocol = &self.protocol;
        self.reliable_output_channels
            .entry(index)
            .or_insert_with(|| ReliableChannel::new(index, true, protocol.clone()))
    }

    pub fn reliable_input_channel(&mut self, index: u32) -> &mut ReliableChannel {
        let protocol = &self.protocol;
        self.reliable_input_channels
            .entry(index)
            .or_insert_with(|| ReliableChannel::new(index, false, protocol.clone()))
    }

    pub fn reliable_channel_stats(&self) -> ReliableChannelStats {
        let mut stats = ReliableChannelStats::default();
        for channel in self.reliable_output_channels.values() {
            if let Some((sent, total)) = channel.message_send_progress() {
                stats.send_progress += sent;
                stats.send_total += total;
            }
        }
        for channel in self.reliable_input_channels.values() {
            if let Some((received, total)) = channel.message_receive_progress() {
                stats.receive_progress += received;
                stats.receive_total += total;
            }
        }
        stats
    }

    /// Drops the output stream's mappings for shared objects nobody else
    /// holds, and tells the remote side to do the same on reliable channel 0
    pub fn clear_unreferenced_shared_objects(&mut self) -> Result<Vec<u32>, BitstreamError> {
        let cleared = self.output_stream.collect_unreferenced_shared_objects();
        for id in &cleared {
            self.reliable_output_channel(0)
                .send_message(&M::clear_shared_object(*id))?;
        }
        Ok(cleared)
    }

    /// Returns how many packets to send for this update: the `desired`
    /// number plus enough to drain pending reliable data, capped by
    /// `max_packets_per_group`
    pub fn note_packet_group(&mut self, desired: usize) -> usize {
        let total_available: usize = self
            .reliable_output_channels
            .values()
            .map(ReliableChannel::bytes_available)
            .sum();
        let packet_size = self.config.max_packet_size.max(1);
        (desired + total_available / packet_size).min(self.config.max_packets_per_group)
    }

    // Sending

    /// Starts a packet with the acknowledgements and high-priority messages,
    /// returning the writer for the caller's payload
    pub fn start_packet(&mut self) -> Result<BitWriter, SequencerError> {
        let mut writer = BitWriter::with_capacity(self.config.max_packet_size);

        (self.receive_records.len() as u32).ser(&mut writer);
        for record in &self.receive_records {
            record.packet_number.ser(&mut writer);
        }

        (self.high_priority_messages.len() as u32).ser(&mut writer);
        for entry in &self.high_priority_messages {
            if let Err(error) = entry.message.write(&mut self.output_stream, &mut writer) {
                self.output_stream.get_and_reset_write_mappings();
                return Err(error.into());
            }
        }
        Ok(writer)
    }

    /// Fills the rest of the packet with reliable data and queues its datagrams
    pub fn end_packet(&mut self, mut writer: BitWriter) {
        let mut spans = Vec::new();
        let remaining = self
            .config
            .max_packet_size
            .saturating_sub(writer.bytes_written());
        if remaining > MINIMUM_RELIABLE_SIZE {
            self.append_reliable_data(&mut writer, remaining, &mut spans);
        } else {
            0u32.ser(&mut writer);
        }
        self.send_packet(writer.to_bytes(), spans);
    }

    /// Abandons a packet begun with `start_packet`
    pub fn cancel_packet(&mut self, writer: BitWriter) {
        drop(writer);
        self.output_stream.get_and_reset_write_mappings();
    }

    fn append_reliable_data(
        &mut self,
        writer: &mut dyn BitWrite,
        bytes: usize,
        spans: &mut Vec<ChannelSpan>,
    ) {
        let mut total_channels = 0;
        let mut total_priority = 0.0;
        for channel in self.reliable_output_channels.values() {
            if channel.bytes_available() > 0 {
                total_channels += 1;
                total_priority += channel.priority();
            }
        }
        (total_channels as u32).ser(writer);
        if total_channels == 0 {
            return;
        }

        let mut budget =
            bytes.saturating_sub(CHANNEL_COUNT_SIZE + total_channels * CHANNEL_HEADER_SIZE);
        for channel in self.reliable_output_channels.values_mut() {
            if channel.bytes_available() == 0 {
                continue;
            }
            channel.index().ser(writer);
            let share = if total_priority > 0.0 {
                ((budget as f32 * channel.priority() / total_priority) as usize).min(budget)
            } else {
                budget
            };
            let used = channel.write_data(writer, share, spans);
            budget = budget.saturating_sub(used);
            total_priority -= channel.priority();
        }
    }

    fn send_packet(&mut self, packet: Vec<u8>, spans: Vec<ChannelSpan>) {
        self.outgoing_packet_number += 1;

        self.send_records.push_back(SendRecord {
            packet_number: self.outgoing_packet_number,
            last_received_packet_number: self
                .receive_records
                .back()
                .map_or(0, |record| record.packet_number),
            mappings: self.output_stream.get_and_reset_write_mappings(),
            spans,
        });

        // break the packet into datagrams that fit the transport
        let header_size = self.config.datagram_header_size;
        let payload_size = self
            .config
            .max_datagram_size
            .saturating_sub(header_size + FRAGMENT_HEADER_SIZE)
            .max(1);
        let mut offset = 0;
        loop {
            let length = payload_size.min(packet.len() - offset);
            let mut writer = BitWriter::with_capacity(header_size + FRAGMENT_HEADER_SIZE + length);
            for _ in 0..header_size {
                writer.write_byte(0);
            }
            self.outgoing_packet_number.ser(&mut writer);
            (packet.len() as u32).ser(&mut writer);
            (offset as u32).ser(&mut writer);
            writer.write_bytes(&packet[offset..offset + length]);
            self.outgoing_datagrams
                .push_back(writer.to_bytes().into_boxed_slice());

            offset += length;
            if offset >= packet.len() {
                break;
            }
        }
    }

    pub fn has_outgoing_datagrams(&self) -> bool {
        !self.outgoing_datagrams.is_empty()
    }

    pub fn pop_outgoing_datagram(&mut self) -> Option<Box<[u8]>> {
        self.outgoing_datagrams.pop_front()
    }

    // Receiving

    /// Accepts one datagram. Once every fragment of a packet has arrived the
    /// packet is read, and its contents are handed to `handler`.
    pub fn received_datagram(
        &mut self,
        datagram: &[u8],
        handler: &mut dyn SequencerHandler<M>,
    ) -> Result<(), SequencerError> {
        let header_size = self.config.datagram_header_size + FRAGMENT_HEADER_SIZE;
        if datagram.len() < header_size {
            return Err(SequencerError::DatagramTooShort {
                length: datagram.len(),
                header: header_size,
            });
        }
        let mut reader = BitReader::new(&datagram[self.config.datagram_header_size..]);
        let packet_number = u32::de(&mut reader)?;
        let packet_size = u32::de(&mut reader)? as usize;
        let offset = u32::de(&mut reader)? as usize;
        let payload = &datagram[header_size..];

        if packet_number < self.incoming_packet_number {
            trace!("Dropping datagram of stale packet {}", packet_number);
            return Ok(());
        }

        if packet_number > self.incoming_packet_number {
            if packet_size > self.config.max_incoming_packet_size {
                return Err(SequencerError::PacketTooLarge {
                    size: packet_size,
                    max: self.config.max_incoming_packet_size,
                });
            }
            check_fragment(offset, payload.len(), packet_size)?;
            self.incoming_packet_number = packet_number;
            self.incoming_packet_data = vec![0; packet_size];
            self.offsets_received.clear();
            self.remaining_bytes = packet_size;
        } else {
            if self.remaining_bytes == 0 || self.offsets_received.contains(&offset) {
                trace!(
                    "Dropping duplicate fragment at offset {} of packet {}",
                    offset,
                    packet_number
                );
                return Ok(());
            }
            check_fragment(offset, payload.len(), self.incoming_packet_data.len())?;
        }

        self.offsets_received.insert(offset);
        self.incoming_packet_data[offset..offset + payload.len()].copy_from_slice(payload);
        self.remaining_bytes = self.remaining_bytes.saturating_sub(payload.len());
        if self.remaining_bytes > 0 {
            return Ok(());
        }

        let packet = std::mem::take(&mut self.incoming_packet_data);
        let mut reader = BitReader::new(&packet);
        let result = self.read_packet(&mut reader, handler);
        if result.is_err() {
            self.input_stream.get_and_reset_read_mappings();
        }
        result
    }

    fn read_packet(
        &mut self,
        reader: &mut BitReader,
        handler: &mut dyn SequencerHandler<M>,
    ) -> Result<(), SequencerError> {
        // acknowledgements
        let acknowledgement_count = u32::de(reader)?;
        for _ in 0..acknowledgement_count {
            let packet_number = u32::de(reader)?;
            self.acknowledge(packet_number, handler)?;
        }

        // high priority messages, dispatched once the whole packet has been read
        let high_priority_count = u32::de(reader)? as usize;
        let mut high_priority_messages = Vec::new();
        for index in 0..high_priority_count {
            let message = M::read(&mut self.input_stream, reader)?;
            if index >= self.received_high_priority_messages {
                high_priority_messages.push(message);
            }
        }

        handler.read_packet(&mut self.input_stream, reader)?;

        // reliable data; channels read before a failure have already advanced,
        // so their messages are delivered either way
        let mut reliable_messages = Vec::new();
        let result = self.read_reliable_data(reader, &mut reliable_messages);
        if result.is_ok() {
            for message in high_priority_messages {
                self.dispatch_high_priority_message(message, handler);
            }
        }
        for (index, message) in reliable_messages {
            match message.cleared_shared_object() {
                Some(id) => self.input_stream.clear_shared_object(id),
                None => handler.reliable_message(index, message),
            }
        }
        result?;

        let new_high_priority_messages =
            high_priority_count.saturating_sub(self.received_high_priority_messages);
        self.received_high_priority_messages = high_priority_count;
        self.receive_records.push_back(ReceiveRecord {
            packet_number: self.incoming_packet_number,
            mappings: self.input_stream.get_and_reset_read_mappings(),
            new_high_priority_messages,
        });
        handler.receive_recorded();
        Ok(())
    }

    fn read_reliable_data(
        &mut self,
        reader: &mut BitReader,
        messages: &mut Vec<(u32, M)>,
    ) -> Result<(), SequencerError> {
        let channel_count = u32::de(reader)?;
        for _ in 0..channel_count {
            let index = u32::de(reader)?;
            let channel_messages = self.reliable_input_channel(index).read_data::<M>(reader)?;
            messages.extend(channel_messages.into_iter().map(|message| (index, message)));
        }
        Ok(())
    }

    fn dispatch_high_priority_message(&mut self, message: M, handler: &mut dyn SequencerHandler<M>) {
        match message.cleared_shared_object() {
            Some(id) => self.input_stream.clear_shared_object(id),
            None => handler.high_priority_message(message),
        }
    }

    fn acknowledge(
        &mut self,
        packet_number: u32,
        handler: &mut dyn SequencerHandler<M>,
    ) -> Result<(), SequencerError> {
        let Some(first) = self.send_records.front() else {
            return Ok(());
        };
        if packet_number < first.packet_number {
            return Ok(());
        }
        let index = (packet_number - first.packet_number) as usize;
        if index >= self.send_records.len() {
            return Ok(());
        }

        // everything sent before an acknowledged packet is presumed lost
        for _ in 0..index {
            if let Some(record) = self.send_records.pop_front() {
                self.send_record_lost(&record);
            }
        }
        if let Some(record) = self.send_records.pop_front() {
            self.send_record_acknowledged(record, handler)?;
        }
        handler.send_acknowledged(index);
        Ok(())
    }

    fn send_record_acknowledged(
        &mut self,
        record: SendRecord,
        handler: &mut dyn SequencerHandler<M>,
    ) -> Result<(), SequencerError> {
        // the remote side now knows we received these, so stop acknowledging them
        while let Some(received) = self.receive_records.front() {
            if received.packet_number > record.last_received_packet_number {
                break;
            }
            handler.receive_acknowledged(0);
            if let Some(received) = self.receive_records.pop_front() {
                self.input_stream.persist_read_mappings(&received.mappings);
                self.received_high_priority_messages = self
                    .received_high_priority_messages
                    .saturating_sub(received.new_high_priority_messages);
            }
        }
        self.output_stream.persist_write_mappings(&record.mappings);

        if let Some(last) = self
            .high_priority_messages
            .iter()
            .rposition(|entry| entry.first_packet_number <= record.packet_number)
        {
            self.high_priority_messages.drain(..=last);
        }

        for span in &record.spans {
            if let Some(channel) = self.reliable_output_channels.get_mut(&span.channel) {
                channel.span_acknowledged(span)?;
            }
        }
        Ok(())
    }

    fn send_record_lost(&mut self, record: &SendRecord) {
        let next_packet_number = self.outgoing_packet_number + 1;
        for span in &record.spans {
            if let Some(channel) = self.reliable_output_channels.get_mut(&span.channel) {
                channel.span_lost(record.packet_number, next_packet_number);
            }
        }
    }
}

fn check_fragment(offset: usize, length: usize, size: usize) -> Result<(), SequencerError> {
    match offset.checked_add(length) {
        Some(end) if end <= size => Ok(()),
        _ => Err(SequencerError::FragmentOutOfBounds {
            offset,
            length,
            size,
        }),
    }
}
