mod config;
mod datagram_sequencer;
mod error;
mod message;
mod reliable_channel;
mod span_list;

pub use config::SequencerConfig;
pub use datagram_sequencer::{DatagramSequencer, ReliableChannelStats, FRAGMENT_HEADER_SIZE};
pub use error::{SequencerError, SpanError};
pub use message::{Message, SequencerHandler};
pub use reliable_channel::{ChannelSpan, ReliableChannel, SEGMENT_HEADER_SIZE};
pub use span_list::{Span, SpanList};
