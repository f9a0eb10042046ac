use std::net::SocketAddr;

use thiserror::Error;

use metavoxel_shared::EndpointError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetavoxelServerError {
    /// A session failed to read a datagram or write an update
    #[error("Session for {address} failed: {error}")]
    Session {
        address: SocketAddr,
        #[source]
        error: EndpointError,
    },
}
