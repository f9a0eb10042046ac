mod client_config;
mod metavoxel_client;

pub use client_config::ClientConfig;
pub use metavoxel_client::MetavoxelClient;
