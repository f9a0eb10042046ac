use crate::metavoxel::{MetavoxelData, MetavoxelLOD};

/// What a packet carried: the LOD it was written for and the data as of
/// that packet. Later deltas are encoded against the last acknowledged one.
#[derive(Debug, Clone, Default)]
pub struct PacketRecord {
    lod: MetavoxelLOD,
    data: MetavoxelData,
}

impl PacketRecord {
    pub fn new(lod: MetavoxelLOD, data: MetavoxelData) -> Self {
        Self { lod, data }
    }

    pub fn lod(&self) -> &MetavoxelLOD {
        &self.lod
    }

    pub fn data(&self) -> &MetavoxelData {
        &self.data
    }
}
