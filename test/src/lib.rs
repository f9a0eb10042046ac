pub mod helpers;
pub mod local_link;
pub mod test_protocol;

pub use helpers::*;
pub use local_link::LocalLink;
pub use test_protocol::{protocol, protocol_with_sequencer, Marker};
