use glam::Vec3;

use metavoxel_serde::{BitReader, BitWrite, Serde, SerdeErr};

use crate::util::{read_vec3, write_vec3};

/// Decides how deeply the octree is traversed around a viewer position.
/// Lower thresholds subdivide smaller or more distant nodes.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MetavoxelLOD {
    pub position: Vec3,
    pub threshold: f32,
}

impl MetavoxelLOD {
    pub fn new(position: Vec3, threshold: f32) -> Self {
        Self {
            position,
            threshold,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.threshold > 0.0
    }

    /// Whether the cube at `minimum` with edge `size` should be subdivided
    pub fn should_subdivide(&self, minimum: Vec3, size: f32, multiplier: f32) -> bool {
        let center = minimum + Vec3::splat(size * 0.5);
        size >= self.position.distance(center) * self.threshold * multiplier
    }

    /// Whether the cube, or anything beneath it, is subdivided under this LOD
    /// but might not have been under `reference`
    pub fn became_subdivided(
        &self,
        minimum: Vec3,
        size: f32,
        reference: &MetavoxelLOD,
        multiplier: f32,
    ) -> bool {
        if self.position == reference.position && self.threshold >= reference.threshold {
            return false;
        }
        self.should_subdivide(minimum, size, multiplier)
    }

    /// Whether the cube's subdivision might differ between this LOD and
    /// `reference` in either direction
    pub fn became_subdivided_or_collapsed(
        &self,
        minimum: Vec3,
        size: f32,
        reference: &MetavoxelLOD,
        multiplier: f32,
    ) -> bool {
        if self.position == reference.position && self.threshold == reference.threshold {
            return false;
        }
        self.should_subdivide(minimum, size, multiplier)
            || reference.should_subdivide(minimum, size, multiplier)
    }

    pub fn ser(&self, writer: &mut dyn BitWrite) {
        write_vec3(writer, &self.position);
        self.threshold.ser(writer);
    }

    pub fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        let position = read_vec3(reader)?;
        let threshold = f32::de(reader)?;
        Ok(Self {
            position,
            threshold,
        })
    }
}
