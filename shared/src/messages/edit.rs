use glam::Vec3;

use metavoxel_serde::{BitReader, BitWrite, Serde, UnsignedInteger};

use crate::{
    attribute::{AttributeData, AttributePointer, OwnedAttributeValue},
    bitstream::{Bitstream, BitstreamError, SharedObjectPointer},
    metavoxel::{MetavoxelData, MetavoxelInfo, MetavoxelVisitor, VisitOrder},
    util::{read_vec3, write_vec3, BoundingBox},
};

// Box edits never subdivide below this fraction of the region's longest side
const MINIMUM_GRANULARITY_FRACTION: f32 = 1.0 / 64.0;

/// A change to metavoxel data, sent from a client to the server and applied
/// on both sides
#[derive(Debug, Clone)]
pub enum MetavoxelEdit {
    /// Sets the value over a box, down to a minimum node size
    BoxSet {
        region: BoundingBox,
        granularity: f32,
        value: OwnedAttributeValue,
    },
    /// Sets the value everywhere
    GlobalSet { value: OwnedAttributeValue },
    /// Copies or blends another data's trees in at a position
    SetData {
        minimum: Vec3,
        data: MetavoxelData,
        blend: bool,
    },
    /// Removes an attribute's tree
    ClearAttribute { attribute: AttributePointer },
    /// Adds an object to the set attribute over its bounds
    InsertSpanner {
        attribute: AttributePointer,
        bounds: BoundingBox,
        granularity: f32,
        object: SharedObjectPointer,
    },
    /// Removes an object from every set of the attribute
    RemoveSpanner {
        attribute: AttributePointer,
        object: SharedObjectPointer,
    },
    /// Empties a set attribute
    ClearSpanners { attribute: AttributePointer },
}

impl MetavoxelEdit {
    pub fn apply(&self, data: &mut MetavoxelData) {
        match self {
            MetavoxelEdit::BoxSet {
                region,
                granularity,
                value,
            } => {
                if !data.expand_to_fit(region) {
                    return;
                }
                let granularity =
                    granularity.max(region.longest_side() * MINIMUM_GRANULARITY_FRACTION);
                let mut visitor = BoxSetVisitor::new(*region, granularity, value);
                data.guide(&mut visitor);
            }
            MetavoxelEdit::GlobalSet { value } => {
                let mut visitor = GlobalSetVisitor {
                    outputs: vec![value.attribute().clone()],
                    value: value.value().clone(),
                };
                data.guide(&mut visitor);
            }
            MetavoxelEdit::SetData {
                minimum,
                data: source,
                blend,
            } => {
                data.set(*minimum, source, *blend);
            }
            MetavoxelEdit::ClearAttribute { attribute } => {
                data.clear(attribute);
            }
            MetavoxelEdit::InsertSpanner {
                attribute,
                bounds,
                granularity,
                object,
            } => {
                data.insert(attribute, bounds, *granularity, object.clone());
            }
            MetavoxelEdit::RemoveSpanner { attribute, object } => {
                data.remove_everywhere(attribute, object);
            }
            MetavoxelEdit::ClearSpanners { attribute } => {
                if attribute.default_value().as_shared_object_set().is_some() {
                    data.clear(attribute);
                }
            }
        }
    }

    pub fn write(&self, bitstream: &mut Bitstream, writer: &mut dyn BitWrite) -> Result<(), BitstreamError> {
        match self {
            MetavoxelEdit::BoxSet {
                region,
                granularity,
                value,
            } => {
                UnsignedInteger::<3>::new(0u8).ser(writer);
                region.ser(writer);
                granularity.ser(writer);
                value.write(bitstream, writer)
            }
            MetavoxelEdit::GlobalSet { value } => {
                UnsignedInteger::<3>::new(1u8).ser(writer);
                value.write(bitstream, writer)
            }
            MetavoxelEdit::SetData {
                minimum,
                data,
                blend,
            } => {
                UnsignedInteger::<3>::new(2u8).ser(writer);
                write_vec3(writer, minimum);
                blend.ser(writer);
                data.write(bitstream, writer)
            }
            MetavoxelEdit::ClearAttribute { attribute } => {
                UnsignedInteger::<3>::new(3u8).ser(writer);
                bitstream.write_attribute(writer, attribute);
                Ok(())
            }
            MetavoxelEdit::InsertSpanner {
                attribute,
                bounds,
                granularity,
                object,
            } => {
                UnsignedInteger::<3>::new(4u8).ser(writer);
                bitstream.write_attribute(writer, attribute);
                bounds.ser(writer);
                granularity.ser(writer);
                bitstream.write_shared_object(writer, Some(object))
            }
            MetavoxelEdit::RemoveSpanner { attribute, object } => {
                UnsignedInteger::<3>::new(5u8).ser(writer);
                bitstream.write_attribute(writer, attribute);
                bitstream.write_shared_object(writer, Some(object))
            }
            MetavoxelEdit::ClearSpanners { attribute } => {
                UnsignedInteger::<3>::new(6u8).ser(writer);
                bitstream.write_attribute(writer, attribute);
                Ok(())
            }
        }
    }

    pub fn read(bitstream: &mut Bitstream, reader: &mut BitReader) -> Result<Self, BitstreamError> {
        let edit = match UnsignedInteger::<3>::de(reader)?.get() {
            0 => {
                let region = BoundingBox::de(reader)?;
                let granularity = read_granularity(reader)?;
                let value = OwnedAttributeValue::read(bitstream, reader)?;
                MetavoxelEdit::BoxSet {
                    region,
                    granularity,
                    value,
                }
            }
            1 => MetavoxelEdit::GlobalSet {
                value: OwnedAttributeValue::read(bitstream, reader)?,
            },
            2 => {
                let minimum = read_vec3(reader)?;
                let blend = bool::de(reader)?;
                let data = MetavoxelData::read(bitstream, reader)?;
                MetavoxelEdit::SetData {
                    minimum,
                    data,
                    blend,
                }
            }
            3 => MetavoxelEdit::ClearAttribute {
                attribute: bitstream.read_attribute(reader)?,
            },
            4 => {
                let attribute = bitstream.read_attribute(reader)?;
                let bounds = BoundingBox::de(reader)?;
                let granularity = read_granularity(reader)?;
                let object = read_object(bitstream, reader)?;
                MetavoxelEdit::InsertSpanner {
                    attribute,
                    bounds,
                    granularity,
                    object,
                }
            }
            5 => {
                let attribute = bitstream.read_attribute(reader)?;
                let object = read_object(bitstream, reader)?;
                MetavoxelEdit::RemoveSpanner { attribute, object }
            }
            6 => MetavoxelEdit::ClearSpanners {
                attribute: bitstream.read_attribute(reader)?,
            },
            _ => {
                return Err(BitstreamError::InvalidEdit {
                    reason: "unknown edit type",
                })
            }
        };
        Ok(edit)
    }
}

fn read_granularity(reader: &mut BitReader) -> Result<f32, BitstreamError> {
    let granularity = f32::de(reader)?;
    if !(granularity.is_finite() && granularity > 0.0) {
        return Err(BitstreamError::InvalidEdit {
            reason: "granularity must be positive and finite",
        });
    }
    Ok(granularity)
}

fn read_object(
    bitstream: &mut Bitstream,
    reader: &mut BitReader,
) -> Result<SharedObjectPointer, BitstreamError> {
    bitstream
        .read_shared_object(reader)?
        .ok_or(BitstreamError::InvalidEdit {
            reason: "spanner edit without an object",
        })
}

struct BoxSetVisitor {
    outputs: Vec<AttributePointer>,
    region: BoundingBox,
    granularity: f32,
    value: AttributeData,
}

impl BoxSetVisitor {
    fn new(region: BoundingBox, granularity: f32, value: &OwnedAttributeValue) -> Self {
        Self {
            outputs: vec![value.attribute().clone()],
            region,
            granularity,
            value: value.value().clone(),
        }
    }
}

impl MetavoxelVisitor for BoxSetVisitor {
    fn inputs(&self) -> &[AttributePointer] {
        &[]
    }

    fn outputs(&self) -> &[AttributePointer] {
        &self.outputs
    }

    fn visit(&mut self, info: &mut MetavoxelInfo) -> VisitOrder {
        let intersection = info.bounds().intersection(&self.region);
        if intersection.is_empty() {
            return VisitOrder::StopRecursion;
        }
        let coverage = intersection.volume() / info.bounds().volume();
        if coverage >= 1.0 {
            info.output_values[0] = Some(self.value.clone());
            return VisitOrder::StopRecursion;
        }
        if info.size <= self.granularity {
            // best guess at the finest level
            if coverage >= 0.5 {
                info.output_values[0] = Some(self.value.clone());
            }
            return VisitOrder::StopRecursion;
        }
        VisitOrder::DefaultOrder
    }
}

struct GlobalSetVisitor {
    outputs: Vec<AttributePointer>,
    value: AttributeData,
}

impl MetavoxelVisitor for GlobalSetVisitor {
    fn inputs(&self) -> &[AttributePointer] {
        &[]
    }

    fn outputs(&self) -> &[AttributePointer] {
        &self.outputs
    }

    fn visit(&mut self, info: &mut MetavoxelInfo) -> VisitOrder {
        info.output_values[0] = Some(self.value.clone());
        VisitOrder::StopRecursion
    }
}
