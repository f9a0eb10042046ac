use std::default::Default;

/// Contains Config properties which will be used by a DatagramSequencer
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SequencerConfig {
    /// Largest packet the sequencer assembles, in bytes. Reliable data fills
    /// whatever room the other parts of the packet leave.
    pub max_packet_size: usize,
    /// Largest datagram handed to the transport, headers included
    pub max_datagram_size: usize,
    /// Bytes reserved at the start of every datagram for the transport's own
    /// prefix. The sequencer leaves them zeroed and skips them on receipt.
    pub datagram_header_size: usize,
    /// Largest packet a remote sender may declare. Larger declarations are
    /// rejected before anything is allocated.
    pub max_incoming_packet_size: usize,
    /// Upper bound on the packets emitted for a single update
    pub max_packets_per_group: usize,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            max_packet_size: 3000,
            max_datagram_size: 1450,
            datagram_header_size: 0,
            max_incoming_packet_size: 1024 * 1024,
            max_packets_per_group: 4,
        }
    }
}
