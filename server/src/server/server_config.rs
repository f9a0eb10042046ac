use std::default::Default;

/// Contains Config properties which will be used by the Server
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    /// Session updates are written on every nth call to
    /// `MetavoxelServer::send_all_updates()`. Values below 1 act as 1.
    pub send_interval_packets: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            send_interval_packets: 1,
        }
    }
}
