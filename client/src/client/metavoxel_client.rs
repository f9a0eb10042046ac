use std::rc::Rc;

use log::warn;

use metavoxel_shared::{
    BitReader, BitWrite, Bitstream, BitstreamError, Endpoint, EndpointBehavior, EndpointError,
    Message, MetavoxelData, MetavoxelEdit, MetavoxelLOD, MetavoxelMessage, PacketRecord, Protocol,
    ReliableChannelStats, Vec3,
};

use super::ClientConfig;

struct ClientBehavior {
    lod: MetavoxelLOD,
    // what the server last encoded the data under
    received_lod: MetavoxelLOD,
    data: MetavoxelData,
}

impl EndpointBehavior for ClientBehavior {
    fn write_update_message(
        &mut self,
        bitstream: &mut Bitstream,
        writer: &mut dyn BitWrite,
        _last_acknowledged: &PacketRecord,
    ) -> Result<(), BitstreamError> {
        MetavoxelMessage::ClientState { lod: self.lod }.write(bitstream, writer)
    }

    fn read_update_message(
        &mut self,
        bitstream: &mut Bitstream,
        reader: &mut BitReader,
        last_acknowledged: &PacketRecord,
    ) -> Result<(), BitstreamError> {
        match MetavoxelMessage::read(bitstream, reader)? {
            // the server encoded this against the last packet we told it we had
            MetavoxelMessage::Delta => {
                let lod = MetavoxelLOD::de(reader)?;
                self.data = MetavoxelData::read_delta_with_lod(
                    last_acknowledged.data(),
                    last_acknowledged.lod(),
                    &lod,
                    bitstream,
                    reader,
                )?;
                self.received_lod = lod;
            }
            message => self.handle_message(message),
        }
        Ok(())
    }

    fn handle_message(&mut self, message: MetavoxelMessage) {
        warn!("Client received unexpected message: {:?}", message);
    }

    fn create_receive_record(&self) -> PacketRecord {
        PacketRecord::new(self.received_lod, self.data.clone())
    }
}

/// Client side of a metavoxel connection
pub struct MetavoxelClient {
    config: ClientConfig,
    endpoint: Endpoint<ClientBehavior>,
}

impl MetavoxelClient {
    /// Create a new MetavoxelClient, viewing from the origin
    pub fn new<P: Into<Protocol>>(config: ClientConfig, protocol: P) -> Self {
        let mut protocol: Protocol = protocol.into();
        if !protocol.is_locked() {
            protocol.lock();
        }

        let behavior = ClientBehavior {
            lod: MetavoxelLOD::new(Vec3::ZERO, config.lod_threshold),
            received_lod: MetavoxelLOD::default(),
            data: MetavoxelData::new(),
        };
        Self {
            config,
            endpoint: Endpoint::new(Rc::new(protocol), behavior),
        }
    }

    pub fn protocol(&self) -> &Rc<Protocol> {
        self.endpoint.sequencer().protocol()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Data as last received from the server, plus any edits made locally since
    pub fn data(&self) -> &MetavoxelData {
        &self.endpoint.behavior().data
    }

    pub fn lod(&self) -> &MetavoxelLOD {
        &self.endpoint.behavior().lod
    }

    /// The LOD the server encoded the last received data under. Nodes it
    /// doesn't subdivide are held as leaves with their aggregate value.
    pub fn received_lod(&self) -> &MetavoxelLOD {
        &self.endpoint.behavior().received_lod
    }

    /// Moves the viewer; the server hears about it with the next update
    pub fn set_position(&mut self, position: Vec3) {
        self.endpoint.behavior_mut().lod = MetavoxelLOD::new(position, self.config.lod_threshold);
    }

    /// Applies an edit locally and sends it to the server, either as a
    /// high-priority message repeated until acknowledged or on the reliable
    /// channel
    pub fn apply_edit(&mut self, edit: MetavoxelEdit, reliable: bool) -> Result<(), EndpointError> {
        edit.apply(&mut self.endpoint.behavior_mut().data);
        let message = MetavoxelMessage::Edit(edit);
        if reliable {
            self.endpoint.send_reliable_message(0, &message)
        } else {
            self.endpoint.send_high_priority_message(message);
            Ok(())
        }
    }

    /// Writes the next packet group
    pub fn update(&mut self) -> Result<(), EndpointError> {
        self.endpoint.update()
    }

    pub fn receive(&mut self, datagram: &[u8]) -> Result<(), EndpointError> {
        self.endpoint.received_datagram(datagram)
    }

    pub fn pop_outgoing_datagram(&mut self) -> Option<Box<[u8]>> {
        self.endpoint.pop_outgoing_datagram()
    }

    pub fn reliable_channel_stats(&self) -> ReliableChannelStats {
        self.endpoint.sequencer().reliable_channel_stats()
    }
}

#[cfg(test)]
mod tests {
    use metavoxel_shared::{
        AttributeData, MetavoxelEdit, OwnedAttributeValue, Protocol, Vec3, MASK_ATTRIBUTE,
    };

    use super::MetavoxelClient;
    use crate::ClientConfig;

    fn client() -> MetavoxelClient {
        let _ = env_logger::builder().is_test(true).try_init();
        MetavoxelClient::new(ClientConfig::default(), Protocol::builder().build())
    }

    fn global_mask(client: &MetavoxelClient, value: f32) -> MetavoxelEdit {
        let mask = client.protocol().attributes.get_attribute(MASK_ATTRIBUTE).unwrap();
        MetavoxelEdit::GlobalSet {
            value: OwnedAttributeValue::new(mask, AttributeData::Float(value)),
        }
    }

    #[test]
    fn position_sets_lod() {
        let mut client = client();
        assert_eq!(client.lod().threshold, 0.01);
        assert!(client.protocol().is_locked());

        client.set_position(Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(client.lod().position, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(client.lod().threshold, client.config().lod_threshold);
    }

    #[test]
    fn edits_apply_locally() {
        let mut client = client();
        let mask = client.protocol().attributes.get_attribute(MASK_ATTRIBUTE).unwrap();

        client.apply_edit(global_mask(&client, 0.75), false).unwrap();

        assert_eq!(
            client.data().sample(&mask, Vec3::ZERO),
            AttributeData::Float(0.75)
        );
    }

    #[test]
    fn reliable_edits_wait_on_channel_zero() {
        let mut client = client();

        client.apply_edit(global_mask(&client, 1.0), true).unwrap();

        let stats = client.reliable_channel_stats();
        assert_eq!(stats.send_progress, 0);
        assert!(stats.send_total > 0);
    }

    #[test]
    fn update_always_sends_state() {
        let mut client = client();

        client.update().unwrap();
        assert!(client.pop_outgoing_datagram().is_some());
        assert!(client.pop_outgoing_datagram().is_none());
    }
}
