use std::{error::Error, net::SocketAddr};

use metavoxel_client::{ClientConfig, MetavoxelClient};
use metavoxel_server::{MetavoxelServer, ServerConfig};
use metavoxel_shared::Protocol;

use crate::LocalLink;

/// One server and one client joined by a pair of local links
pub struct TestSession {
    pub server: MetavoxelServer,
    pub client: MetavoxelClient,
    pub uplink: LocalLink,
    pub downlink: LocalLink,
    client_address: SocketAddr,
}

impl TestSession {
    /// Both sides get their own copy of `protocol`, as separate processes would
    pub fn new(protocol: impl Fn() -> Protocol) -> Self {
        Self::with_links(protocol, LocalLink::new(1), LocalLink::new(2))
    }

    pub fn with_links(protocol: impl Fn() -> Protocol, uplink: LocalLink, downlink: LocalLink) -> Self {
        Self::with_client_config(protocol, ClientConfig::default(), uplink, downlink)
    }

    pub fn with_client_config(
        protocol: impl Fn() -> Protocol,
        config: ClientConfig,
        uplink: LocalLink,
        downlink: LocalLink,
    ) -> Self {
        Self {
            server: MetavoxelServer::new(ServerConfig::default(), protocol()),
            client: MetavoxelClient::new(config, protocol()),
            uplink,
            downlink,
            client_address: SocketAddr::from(([127, 0, 0, 1], 12345)),
        }
    }

    pub fn client_address(&self) -> SocketAddr {
        self.client_address
    }

    /// Client update, then server update, each delivered across its link
    pub fn exchange(&mut self) -> Result<(), Box<dyn Error>> {
        self.client.update()?;
        while let Some(datagram) = self.client.pop_outgoing_datagram() {
            self.uplink.send(datagram);
        }
        for datagram in self.uplink.deliver() {
            self.server.receive(self.client_address, &datagram)?;
        }

        self.server.send_all_updates()?;
        while let Some((_, datagram)) = self.server.pop_outgoing() {
            self.downlink.send(datagram);
        }
        for datagram in self.downlink.deliver() {
            self.client.receive(&datagram)?;
        }
        Ok(())
    }

    pub fn exchange_n_times(&mut self, n: usize) -> Result<(), Box<dyn Error>> {
        for _ in 0..n {
            self.exchange()?;
        }
        Ok(())
    }

    /// Whether the client holds the server's data down to its LOD
    pub fn in_sync(&self) -> bool {
        self.client
            .data()
            .deep_equals_with_lod(self.server.data(), self.client.received_lod())
    }
}
