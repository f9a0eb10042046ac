use thiserror::Error;

/// The stream ended early or held a value that cannot be decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Bit stream could not be decoded: it ended early or contained an invalid value")]
pub struct SerdeErr;
