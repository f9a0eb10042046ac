mod endpoint;
mod error;
mod packet_record;

pub use endpoint::{Endpoint, EndpointBehavior};
pub use error::EndpointError;
pub use packet_record::PacketRecord;
