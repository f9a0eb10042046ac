use glam::Vec3;

use metavoxel_serde::{BitReader, BitWrite, Serde, SerdeErr};

pub fn write_vec3(writer: &mut dyn BitWrite, value: &Vec3) {
    value.x.ser(writer);
    value.y.ser(writer);
    value.z.ser(writer);
}

pub fn read_vec3(reader: &mut BitReader) -> Result<Vec3, SerdeErr> {
    let x = f32::de(reader)?;
    let y = f32::de(reader)?;
    let z = f32::de(reader)?;
    Ok(Vec3::new(x, y, z))
}

/// An axis-aligned box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub minimum: Vec3,
    pub maximum: Vec3,
}

impl BoundingBox {
    pub fn new(minimum: Vec3, maximum: Vec3) -> Self {
        Self { minimum, maximum }
    }

    pub fn from_cube(minimum: Vec3, size: f32) -> Self {
        Self::new(minimum, minimum + Vec3::splat(size))
    }

    pub fn is_empty(&self) -> bool {
        self.minimum.cmpge(self.maximum).any()
    }

    pub fn contains_point(&self, point: Vec3) -> bool {
        point.cmpge(self.minimum).all() && point.cmple(self.maximum).all()
    }

    pub fn contains(&self, other: &BoundingBox) -> bool {
        other.minimum.cmpge(self.minimum).all() && other.maximum.cmple(self.maximum).all()
    }

    pub fn intersects(&self, other: &BoundingBox) -> bool {
        other.maximum.cmpge(self.minimum).all() && other.minimum.cmple(self.maximum).all()
    }

    pub fn intersection(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox::new(self.minimum.max(other.minimum), self.maximum.min(other.maximum))
    }

    pub fn dimensions(&self) -> Vec3 {
        self.maximum - self.minimum
    }

    pub fn volume(&self) -> f32 {
        let dimensions = self.dimensions().max(Vec3::ZERO);
        dimensions.x * dimensions.y * dimensions.z
    }

    pub fn longest_side(&self) -> f32 {
        self.dimensions().max_element()
    }

    pub fn center(&self) -> Vec3 {
        (self.minimum + self.maximum) * 0.5
    }

    pub fn ser(&self, writer: &mut dyn BitWrite) {
        write_vec3(writer, &self.minimum);
        write_vec3(writer, &self.maximum);
    }

    pub fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        let minimum = read_vec3(reader)?;
        let maximum = read_vec3(reader)?;
        Ok(Self::new(minimum, maximum))
    }
}
