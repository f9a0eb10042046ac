//! # Metavoxel Server
//! A server that keeps the authoritative metavoxel data, applies edits
//! received from clients, and streams data deltas to each connected session.
//! The server never touches a socket: datagrams are handed in with
//! `receive()` and drained with `pop_outgoing()`.

#![deny(
    trivial_casts,
    trivial_numeric_casts,
    unstable_features,
    unused_import_braces
)]

pub mod shared {
    pub use metavoxel_shared::{
        BitReader, BitWrite, BitWriter, MetavoxelData, MetavoxelEdit, MetavoxelLOD, Protocol,
        SequencerConfig, Serde, SerdeErr, Vec3,
    };
}

mod error;
mod server;
mod session;

pub use error::MetavoxelServerError;
pub use server::{MetavoxelServer, ServerConfig};
