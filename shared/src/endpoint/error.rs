use thiserror::Error;

use crate::{bitstream::BitstreamError, sequencer::SequencerError};

/// Errors that can occur while an Endpoint sends or receives packets
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EndpointError {
    #[error(transparent)]
    Sequencer(#[from] SequencerError),

    #[error(transparent)]
    Bitstream(#[from] BitstreamError),
}
