use metavoxel_serde::{BitReader, BitWrite, Serde, UnsignedInteger};

use super::MetavoxelEdit;
use crate::{
    bitstream::{Bitstream, BitstreamError},
    metavoxel::MetavoxelLOD,
    sequencer::Message,
};

/// Everything metavoxel peers say to each other
#[derive(Debug, Clone)]
pub enum MetavoxelMessage {
    /// The client's current level of detail, sent with every client packet
    ClientState { lod: MetavoxelLOD },
    /// Precedes a data delta in a server packet
    Delta,
    /// An edit to apply to the shared data
    Edit(MetavoxelEdit),
    /// Drop the mapping for a shared object id that the sender stopped using
    ClearSharedObject { id: u32 },
}

impl Message for MetavoxelMessage {
    fn write(&self, bitstream: &mut Bitstream, writer: &mut dyn BitWrite) -> Result<(), BitstreamError> {
        match self {
            MetavoxelMessage::ClientState { lod } => {
                UnsignedInteger::<2>::new(0u8).ser(writer);
                lod.ser(writer);
            }
            MetavoxelMessage::Delta => {
                UnsignedInteger::<2>::new(1u8).ser(writer);
            }
            MetavoxelMessage::Edit(edit) => {
                UnsignedInteger::<2>::new(2u8).ser(writer);
                edit.write(bitstream, writer)?;
            }
            MetavoxelMessage::ClearSharedObject { id } => {
                UnsignedInteger::<2>::new(3u8).ser(writer);
                id.ser(writer);
            }
        }
        Ok(())
    }

    fn read(bitstream: &mut Bitstream, reader: &mut BitReader) -> Result<Self, BitstreamError> {
        let message = match UnsignedInteger::<2>::de(reader)?.get() {
            0 => MetavoxelMessage::ClientState {
                lod: MetavoxelLOD::de(reader)?,
            },
            1 => MetavoxelMessage::Delta,
            2 => MetavoxelMessage::Edit(MetavoxelEdit::read(bitstream, reader)?),
            _ => MetavoxelMessage::ClearSharedObject {
                id: u32::de(reader)?,
            },
        };
        Ok(message)
    }

    fn clear_shared_object(id: u32) -> Self {
        MetavoxelMessage::ClearSharedObject { id }
    }

    fn cleared_shared_object(&self) -> Option<u32> {
        match self {
            MetavoxelMessage::ClearSharedObject { id } => Some(*id),
            _ => None,
        }
    }
}
