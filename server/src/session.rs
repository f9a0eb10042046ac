use log::warn;

use metavoxel_shared::{
    BitReader, BitWrite, Bitstream, BitstreamError, EndpointBehavior, Message, MetavoxelData,
    MetavoxelEdit, MetavoxelLOD, MetavoxelMessage, PacketRecord,
};

/// Server side of one client connection. Writes the shared data as a delta
/// against whatever the client last acknowledged.
#[derive(Default)]
pub(crate) struct SessionBehavior {
    lod: MetavoxelLOD,
    data: MetavoxelData,
    edits: Vec<MetavoxelEdit>,
}

impl SessionBehavior {
    pub fn lod(&self) -> &MetavoxelLOD {
        &self.lod
    }

    /// Sessions send nothing until the client has told us where it is
    pub fn is_ready(&self) -> bool {
        self.lod.is_valid()
    }

    pub fn set_data(&mut self, data: MetavoxelData) {
        self.data = data;
    }

    pub fn take_edits(&mut self) -> Vec<MetavoxelEdit> {
        std::mem::take(&mut self.edits)
    }
}

impl EndpointBehavior for SessionBehavior {
    fn write_update_message(
        &mut self,
        bitstream: &mut Bitstream,
        writer: &mut dyn BitWrite,
        last_acknowledged: &PacketRecord,
    ) -> Result<(), BitstreamError> {
        MetavoxelMessage::Delta.write(bitstream, writer)?;
        self.lod.ser(writer);
        self.data.write_delta_with_lod(
            last_acknowledged.data(),
            last_acknowledged.lod(),
            &self.lod,
            bitstream,
            writer,
        )
    }

    fn read_update_message(
        &mut self,
        bitstream: &mut Bitstream,
        reader: &mut BitReader,
        _last_acknowledged: &PacketRecord,
    ) -> Result<(), BitstreamError> {
        match MetavoxelMessage::read(bitstream, reader)? {
            MetavoxelMessage::ClientState { lod } => self.lod = lod,
            message => self.handle_message(message),
        }
        Ok(())
    }

    fn handle_message(&mut self, message: MetavoxelMessage) {
        match message {
            MetavoxelMessage::Edit(edit) => self.edits.push(edit),
            message => warn!("Session received unexpected message: {:?}", message),
        }
    }

    fn create_send_record(&self) -> PacketRecord {
        PacketRecord::new(self.lod, self.data.clone())
    }
}
