mod metavoxel_server;
mod server_config;

pub use metavoxel_server::MetavoxelServer;
pub use server_config::ServerConfig;
