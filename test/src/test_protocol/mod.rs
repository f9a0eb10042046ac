use metavoxel_shared::{
    ObjectClass, PropertyKind, Protocol, ProtocolPlugin, SequencerConfig,
};

/// Registers the object class the tests store in shared-object attributes
pub struct Marker;

impl Marker {
    pub const CLASS: &'static str = "Marker";
}

impl ProtocolPlugin for Marker {
    fn build(&self, protocol: &mut Protocol) {
        protocol.add_class(
            ObjectClass::new(Self::CLASS)
                .with_property("label", PropertyKind::String)
                .with_property("weight", PropertyKind::Float),
        );
    }
}

/// Protocol with the standard attributes, the Marker class and default
/// packet sizes
pub fn protocol() -> Protocol {
    Protocol::builder().add_plugin(Marker).build()
}

/// Same as `protocol()`, with the given packet and datagram limits
pub fn protocol_with_sequencer(max_packet_size: usize, max_datagram_size: usize) -> Protocol {
    Protocol::builder()
        .add_plugin(Marker)
        .sequencer_config(SequencerConfig {
            max_packet_size,
            max_datagram_size,
            ..Default::default()
        })
        .build()
}
