//! # Metavoxel Client
//! A client that reports its level of detail to a metavoxel server, applies
//! the data deltas it receives, and sends edits back. Like the server it
//! leaves the socket to the caller.

#![deny(
    trivial_casts,
    trivial_numeric_casts,
    unstable_features,
    unused_import_braces
)]

pub mod shared {
    pub use metavoxel_shared::{
        BitReader, BitWrite, BitWriter, EndpointError, MetavoxelData, MetavoxelEdit,
        MetavoxelLOD, Protocol, ReliableChannelStats, SequencerConfig, Serde, SerdeErr, Vec3,
    };
}

mod client;

pub use client::{ClientConfig, MetavoxelClient};
