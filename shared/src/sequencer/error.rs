use thiserror::Error;

use metavoxel_serde::SerdeErr;

use crate::bitstream::BitstreamError;

/// Errors that can occur while assembling or reading packets
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SequencerError {
    /// A message or the packet payload could not be encoded or decoded
    #[error(transparent)]
    Bitstream(#[from] BitstreamError),

    /// Reliable channel bookkeeping was handed an impossible range
    #[error(transparent)]
    Span(#[from] SpanError),

    /// The datagram cannot even hold the fragment header
    #[error("Datagram of {length} bytes is shorter than the {header} byte fragment header")]
    DatagramTooShort { length: usize, header: usize },

    /// The remote side declared a packet larger than we accept
    #[error("Packet of {size} bytes exceeds the limit of {max} bytes. Raise SequencerConfig::max_incoming_packet_size if this is expected")]
    PacketTooLarge { size: usize, max: usize },

    /// A fragment does not fit inside the packet it belongs to
    #[error("Fragment at offset {offset} with {length} bytes lies outside the {size} byte packet")]
    FragmentOutOfBounds {
        offset: usize,
        length: usize,
        size: usize,
    },
}

impl From<SerdeErr> for SequencerError {
    fn from(error: SerdeErr) -> Self {
        Self::Bitstream(error.into())
    }
}

/// Errors raised by reliable channel range bookkeeping
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpanError {
    /// A span was acknowledged that reaches past anything the channel wrote
    #[error("Span at offset {offset} with {length} bytes reaches past the {written} bytes written to the channel")]
    BeyondWritten {
        offset: u32,
        length: u32,
        written: u32,
    },

    /// A received segment lies too far ahead of the data assembled so far
    #[error("Segment at offset {offset} with {length} bytes lies more than {window} bytes ahead of channel offset {channel_offset}")]
    OutOfWindow {
        offset: u32,
        length: u32,
        channel_offset: u32,
        window: usize,
    },
}
