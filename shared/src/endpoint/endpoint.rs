use std::{collections::VecDeque, rc::Rc};

use metavoxel_serde::{BitReader, BitWrite};

use super::{EndpointError, PacketRecord};
use crate::{
    bitstream::{Bitstream, BitstreamError},
    messages::MetavoxelMessage,
    sequencer::{DatagramSequencer, SequencerHandler},
    Protocol,
};

/// What one side of a metavoxel connection writes into and reads out of each
/// packet
pub trait EndpointBehavior {
    /// Writes the payload of an outgoing packet. `last_acknowledged` is the
    /// record of the newest packet the remote side is known to have.
    fn write_update_message(
        &mut self,
        bitstream: &mut Bitstream,
        writer: &mut dyn BitWrite,
        last_acknowledged: &PacketRecord,
    ) -> Result<(), BitstreamError>;

    /// Reads the payload of an incoming packet. `last_acknowledged` is the
    /// record of the newest received packet the remote side knows we have.
    fn read_update_message(
        &mut self,
        bitstream: &mut Bitstream,
        reader: &mut BitReader,
        last_acknowledged: &PacketRecord,
    ) -> Result<(), BitstreamError>;

    /// Handles a message received on a reliable channel
    fn handle_message(&mut self, _message: MetavoxelMessage) {}

    fn handle_high_priority_message(&mut self, message: MetavoxelMessage) {
        self.handle_message(message);
    }

    /// Records what a packet just sent carried
    fn create_send_record(&self) -> PacketRecord {
        PacketRecord::default()
    }

    /// Records what a packet just received carried
    fn create_receive_record(&self) -> PacketRecord {
        PacketRecord::default()
    }
}

struct EndpointState<B: EndpointBehavior> {
    behavior: B,
    // the front of each list is the last acknowledged record
    send_records: VecDeque<PacketRecord>,
    receive_records: VecDeque<PacketRecord>,
}

impl<B: EndpointBehavior> SequencerHandler<MetavoxelMessage> for EndpointState<B> {
    fn read_packet(&mut self, bitstream: &mut Bitstream, reader: &mut BitReader) -> Result<(), BitstreamError> {
        let baseline = PacketRecord::default();
        let last_acknowledged = self.receive_records.front().unwrap_or(&baseline);
        self.behavior
            .read_update_message(bitstream, reader, last_acknowledged)
    }

    fn high_priority_message(&mut self, message: MetavoxelMessage) {
        self.behavior.handle_high_priority_message(message);
    }

    fn reliable_message(&mut self, _channel: u32, message: MetavoxelMessage) {
        self.behavior.handle_message(message);
    }

    fn send_acknowledged(&mut self, index: usize) {
        let end = (index + 1).min(self.send_records.len());
        self.send_records.drain(..end);
    }

    fn receive_acknowledged(&mut self, index: usize) {
        let end = (index + 1).min(self.receive_records.len());
        self.receive_records.drain(..end);
    }

    fn receive_recorded(&mut self) {
        let record = self.behavior.create_receive_record();
        self.receive_records.push_back(record);
    }
}

/// One side of a metavoxel connection: a `DatagramSequencer` plus the
/// records of what each unacknowledged packet carried
pub struct Endpoint<B: EndpointBehavior> {
    sequencer: DatagramSequencer<MetavoxelMessage>,
    state: EndpointState<B>,
}

impl<B: EndpointBehavior> Endpoint<B> {
    pub fn new(protocol: Rc<Protocol>, behavior: B) -> Self {
        // both lists start from an empty baseline
        Self {
            sequencer: DatagramSequencer::new(protocol),
            state: EndpointState {
                behavior,
                send_records: VecDeque::from([PacketRecord::default()]),
                receive_records: VecDeque::from([PacketRecord::default()]),
            },
        }
    }

    pub fn behavior(&self) -> &B {
        &self.state.behavior
    }

    pub fn behavior_mut(&mut self) -> &mut B {
        &mut self.state.behavior
    }

    pub fn sequencer(&self) -> &DatagramSequencer<MetavoxelMessage> {
        &self.sequencer
    }

    pub fn sequencer_mut(&mut self) -> &mut DatagramSequencer<MetavoxelMessage> {
        &mut self.sequencer
    }

    pub fn last_acknowledged_send_record(&self) -> Option<&PacketRecord> {
        self.state.send_records.front()
    }

    pub fn last_acknowledged_receive_record(&self) -> Option<&PacketRecord> {
        self.state.receive_records.front()
    }

    pub fn send_record_count(&self) -> usize {
        self.state.send_records.len()
    }

    pub fn receive_record_count(&self) -> usize {
        self.state.receive_records.len()
    }

    /// Writes as many packets as the sequencer asks for, each carrying the
    /// behavior's update message
    pub fn update(&mut self) -> Result<(), EndpointError> {
        self.sequencer.clear_unreferenced_shared_objects()?;

        let packets = self.sequencer.note_packet_group(1);
        for _ in 0..packets {
            let mut writer = self.sequencer.start_packet()?;
            let baseline = PacketRecord::default();
            let last_acknowledged = self.state.send_records.front().unwrap_or(&baseline);
            if let Err(error) = self.state.behavior.write_update_message(
                self.sequencer.output_stream(),
                &mut writer,
                last_acknowledged,
            ) {
                self.sequencer.cancel_packet(writer);
                return Err(error.into());
            }
            self.sequencer.end_packet(writer);

            let record = self.state.behavior.create_send_record();
            self.state.send_records.push_back(record);
        }
        Ok(())
    }

    /// Feeds a datagram from the transport into the sequencer
    pub fn received_datagram(&mut self, datagram: &[u8]) -> Result<(), EndpointError> {
        self.sequencer
            .received_datagram(datagram, &mut self.state)?;
        Ok(())
    }

    pub fn pop_outgoing_datagram(&mut self) -> Option<Box<[u8]>> {
        self.sequencer.pop_outgoing_datagram()
    }

    pub fn send_high_priority_message(&mut self, message: MetavoxelMessage) {
        self.sequencer.send_high_priority_message(message);
    }

    pub fn send_reliable_message(
        &mut self,
        channel: u32,
        message: &MetavoxelMessage,
    ) -> Result<(), EndpointError> {
        self.sequencer
            .reliable_output_channel(channel)
            .send_message(message)?;
        Ok(())
    }
}
