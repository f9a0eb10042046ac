use metavoxel_serde::{BitReader, BitWrite};

use crate::bitstream::{Bitstream, BitstreamError};

/// A message carried by a `DatagramSequencer`, either as a high-priority
/// message or on a reliable channel
pub trait Message: Sized {
    fn write(&self, bitstream: &mut Bitstream, writer: &mut dyn BitWrite) -> Result<(), BitstreamError>;
    fn read(bitstream: &mut Bitstream, reader: &mut BitReader) -> Result<Self, BitstreamError>;

    /// Builds the message telling the remote side to drop its mapping for a
    /// shared object id
    fn clear_shared_object(id: u32) -> Self;

    /// The shared object id this message clears, if it is a clear message
    fn cleared_shared_object(&self) -> Option<u32>;
}

/// Receives everything a `DatagramSequencer` reads out of a packet
pub trait SequencerHandler<M: Message> {
    /// Reads the application payload that follows the high-priority messages
    fn read_packet(&mut self, bitstream: &mut Bitstream, reader: &mut BitReader) -> Result<(), BitstreamError>;

    fn high_priority_message(&mut self, message: M);

    fn reliable_message(&mut self, channel: u32, message: M);

    /// The send record at `index` was acknowledged, and all before it dropped
    fn send_acknowledged(&mut self, _index: usize) {}

    /// The receive record at `index` was acknowledged, and all before it dropped
    fn receive_acknowledged(&mut self, _index: usize) {}

    /// A packet was read completely and a receive record appended
    fn receive_recorded(&mut self) {}
}
