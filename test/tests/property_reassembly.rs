/// Fragment reassembly must not depend on arrival order or duplication
use std::rc::Rc;

use proptest::prelude::*;

use metavoxel_shared::{
    BitReader, BitWrite, Bitstream, BitstreamError, DatagramSequencer, MetavoxelMessage,
    SequencerConfig, SequencerHandler, Serde,
};
use metavoxel_test::protocol;

const PAYLOAD_SIZE: usize = 100;

#[derive(Default)]
struct Collector {
    packets: Vec<Vec<u8>>,
}

impl SequencerHandler<MetavoxelMessage> for Collector {
    fn read_packet(&mut self, _bitstream: &mut Bitstream, reader: &mut BitReader) -> Result<(), BitstreamError> {
        let length = u32::de(reader)? as usize;
        self.packets.push(reader.read_bytes(length)?);
        Ok(())
    }

    fn high_priority_message(&mut self, _message: MetavoxelMessage) {}

    fn reliable_message(&mut self, _channel: u32, _message: MetavoxelMessage) {}
}

fn sequencer() -> DatagramSequencer<MetavoxelMessage> {
    let mut protocol = protocol();
    protocol.sequencer = SequencerConfig {
        max_datagram_size: 12 + 16,
        ..Default::default()
    };
    DatagramSequencer::new(Rc::new(protocol))
}

fn payload() -> Vec<u8> {
    (0..PAYLOAD_SIZE).map(|index| (index * 7) as u8).collect()
}

/// Fragments of a single packet carrying `payload()`
fn fragments() -> Vec<Box<[u8]>> {
    let mut sender = sequencer();
    let mut writer = sender.start_packet().unwrap();
    let payload = payload();
    (payload.len() as u32).ser(&mut writer);
    writer.write_bytes(&payload);
    sender.end_packet(writer);

    let mut fragments = Vec::new();
    while let Some(datagram) = sender.pop_outgoing_datagram() {
        fragments.push(datagram);
    }
    fragments
}

fn fragment_count() -> usize {
    fragments().len()
}

proptest! {
    #[test]
    fn any_order_with_duplicates_reassembles_once(
        order in Just((0..fragment_count()).collect::<Vec<_>>()).prop_shuffle(),
        duplicates in proptest::collection::vec(0..fragment_count(), 0..6),
    ) {
        let fragments = fragments();
        let mut receiver = sequencer();
        let mut collector = Collector::default();

        let mut arrivals = order.clone();
        for (position, duplicate) in duplicates.iter().enumerate() {
            let at = (position * 3) % (arrivals.len() + 1);
            arrivals.insert(at, *duplicate);
        }
        for index in &arrivals {
            receiver.received_datagram(&fragments[*index], &mut collector).unwrap();
        }

        prop_assert_eq!(collector.packets.len(), 1);
        prop_assert_eq!(&collector.packets[0], &payload());
    }

    #[test]
    fn strict_subset_never_completes(
        order in Just((0..fragment_count()).collect::<Vec<_>>()).prop_shuffle(),
        missing in 0..fragment_count(),
    ) {
        let fragments = fragments();
        let mut receiver = sequencer();
        let mut collector = Collector::default();

        for index in order.iter().filter(|index| **index != missing) {
            receiver.received_datagram(&fragments[*index], &mut collector).unwrap();
        }

        prop_assert!(collector.packets.is_empty());
        prop_assert_eq!(receiver.incoming_packet_number(), 1);
    }
}

#[test]
fn payload_spans_several_fragments() {
    assert!(fragment_count() > 4);
}
