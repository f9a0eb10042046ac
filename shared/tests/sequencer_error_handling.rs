use std::rc::Rc;

use metavoxel_shared::{
    BitReader, BitWrite, BitWriter, Bitstream, BitstreamError, Endpoint, EndpointBehavior,
    EndpointError, MetavoxelLOD, MetavoxelMessage, PacketRecord, Protocol, SequencerConfig,
    SequencerError, Serde, SpanError, Vec3,
};

// Behavior that sends nothing but an empty payload
struct Silent;

impl EndpointBehavior for Silent {
    fn write_update_message(
        &mut self,
        _bitstream: &mut Bitstream,
        _writer: &mut dyn BitWrite,
        _last_acknowledged: &PacketRecord,
    ) -> Result<(), BitstreamError> {
        Ok(())
    }

    fn read_update_message(
        &mut self,
        _bitstream: &mut Bitstream,
        _reader: &mut BitReader,
        _last_acknowledged: &PacketRecord,
    ) -> Result<(), BitstreamError> {
        Ok(())
    }
}

fn endpoint(config: SequencerConfig) -> Endpoint<Silent> {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut protocol = Protocol::builder();
    protocol.sequencer_config(config);
    Endpoint::new(Rc::new(protocol.build()), Silent)
}

// Behavior that sends a counter as its payload and keeps the high priority
// messages it receives. With `truncate` set it leaves the payload out.
#[derive(Default)]
struct Recording {
    truncate: bool,
    high_priority: Vec<f32>,
}

impl EndpointBehavior for Recording {
    fn write_update_message(
        &mut self,
        _bitstream: &mut Bitstream,
        writer: &mut dyn BitWrite,
        _last_acknowledged: &PacketRecord,
    ) -> Result<(), BitstreamError> {
        if !self.truncate {
            7u32.ser(writer);
        }
        Ok(())
    }

    fn read_update_message(
        &mut self,
        _bitstream: &mut Bitstream,
        reader: &mut BitReader,
        _last_acknowledged: &PacketRecord,
    ) -> Result<(), BitstreamError> {
        u32::de(reader)?;
        Ok(())
    }

    fn handle_high_priority_message(&mut self, message: MetavoxelMessage) {
        if let MetavoxelMessage::ClientState { lod } = message {
            self.high_priority.push(lod.threshold);
        }
    }
}

fn recording_endpoint() -> Endpoint<Recording> {
    let _ = env_logger::builder().is_test(true).try_init();
    Endpoint::new(Rc::new(Protocol::builder().build()), Recording::default())
}

fn marker(threshold: f32) -> MetavoxelMessage {
    MetavoxelMessage::ClientState {
        lod: MetavoxelLOD::new(Vec3::ZERO, threshold),
    }
}

fn exchange<A: EndpointBehavior, B: EndpointBehavior>(
    from: &mut Endpoint<A>,
    to: &mut Endpoint<B>,
) -> Result<(), EndpointError> {
    from.update()?;
    while let Some(datagram) = from.pop_outgoing_datagram() {
        to.received_datagram(&datagram)?;
    }
    Ok(())
}

fn datagram(packet_number: u32, packet_size: u32, offset: u32, payload: &[u8]) -> Vec<u8> {
    let mut writer = BitWriter::new();
    packet_number.ser(&mut writer);
    packet_size.ser(&mut writer);
    offset.ser(&mut writer);
    writer.write_bytes(payload);
    writer.to_bytes()
}

#[test]
fn test_short_datagram() {
    let mut endpoint = endpoint(SequencerConfig::default());

    let result = endpoint.received_datagram(&[0; 11]);

    match result {
        Err(EndpointError::Sequencer(SequencerError::DatagramTooShort { length, header })) => {
            assert_eq!(length, 11);
            assert_eq!(header, 12);
        }
        _ => panic!("Expected DatagramTooShort error"),
    }
}

#[test]
fn test_short_datagram_counts_transport_header() {
    let mut endpoint = endpoint(SequencerConfig {
        datagram_header_size: 4,
        ..Default::default()
    });

    let result = endpoint.received_datagram(&datagram(1, 1, 0, &[]));

    assert!(matches!(
        result,
        Err(EndpointError::Sequencer(SequencerError::DatagramTooShort {
            length: 12,
            header: 16
        }))
    ));
}

#[test]
fn test_oversized_packet_rejected() {
    let mut endpoint = endpoint(SequencerConfig {
        max_incoming_packet_size: 64,
        ..Default::default()
    });

    let result = endpoint.received_datagram(&datagram(1, 65, 0, &[0; 8]));

    assert_eq!(
        result,
        Err(EndpointError::Sequencer(SequencerError::PacketTooLarge {
            size: 65,
            max: 64
        }))
    );
}

#[test]
fn test_fragment_outside_packet() {
    let mut endpoint = endpoint(SequencerConfig::default());

    let result = endpoint.received_datagram(&datagram(1, 16, 12, &[0; 8]));

    assert_eq!(
        result,
        Err(EndpointError::Sequencer(SequencerError::FragmentOutOfBounds {
            offset: 12,
            length: 8,
            size: 16
        }))
    );
}

#[test]
fn test_truncated_packet_is_a_decode_error() {
    let mut endpoint = endpoint(SequencerConfig::default());

    // claims one acknowledgement but ends before it
    let mut payload = Vec::new();
    payload.extend_from_slice(&1u32.to_le_bytes());
    let result = endpoint.received_datagram(&datagram(1, 4, 0, &payload));

    assert!(matches!(
        result,
        Err(EndpointError::Sequencer(SequencerError::Bitstream(
            BitstreamError::Serde(_)
        )))
    ));
}

#[test]
fn test_endpoint_recovers_after_bad_datagram() {
    let mut sender = endpoint(SequencerConfig::default());
    let mut receiver = endpoint(SequencerConfig::default());

    assert!(receiver.received_datagram(&[1, 2, 3]).is_err());

    sender.update().unwrap();
    while let Some(datagram) = sender.pop_outgoing_datagram() {
        receiver.received_datagram(&datagram).unwrap();
    }
    assert_eq!(receiver.sequencer().incoming_packet_number(), 1);
}

#[test]
fn test_high_priority_messages_survive_unreadable_packet() {
    let mut alice = recording_endpoint();
    let mut bob = recording_endpoint();

    alice.send_high_priority_message(marker(1.0));
    alice.behavior_mut().truncate = true;
    assert!(matches!(
        exchange(&mut alice, &mut bob),
        Err(EndpointError::Sequencer(SequencerError::Bitstream(
            BitstreamError::Serde(_)
        )))
    ));
    // nothing from the unreadable packet is delivered
    assert!(bob.behavior().high_priority.is_empty());
    assert_eq!(bob.receive_record_count(), 1);

    alice.behavior_mut().truncate = false;
    for _ in 0..3 {
        exchange(&mut alice, &mut bob).unwrap();
        exchange(&mut bob, &mut alice).unwrap();
    }
    assert_eq!(bob.behavior().high_priority, vec![1.0]);

    alice.send_high_priority_message(marker(2.0));
    for _ in 0..5 {
        exchange(&mut alice, &mut bob).unwrap();
        exchange(&mut bob, &mut alice).unwrap();
    }
    assert_eq!(bob.behavior().high_priority, vec![1.0, 2.0]);
}

#[test]
fn test_error_display() {
    let error = SequencerError::PacketTooLarge { size: 5000, max: 4096 };

    let error_str = format!("{}", error);
    assert!(error_str.contains("5000"));
    assert!(error_str.contains("4096"));
    assert!(error_str.contains("max_incoming_packet_size"));
}

#[test]
fn test_span_error_converts_to_sequencer_error() {
    let span_error = SpanError::BeyondWritten {
        offset: 10,
        length: 20,
        written: 15,
    };

    let sequencer_error: SequencerError = span_error.clone().into();

    assert_eq!(sequencer_error, SequencerError::Span(span_error));
    let error_str = format!("{}", sequencer_error);
    assert!(error_str.contains("15 bytes written"));
}
