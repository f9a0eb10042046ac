use std::{fmt::Debug, rc::Rc};

use metavoxel_serde::{BitReader, BitWrite};

use crate::bitstream::{Bitstream, BitstreamError, SharedObjectPointer, SharedObjectSet};

/// Number of children a node merges into its own value
pub const MERGE_COUNT: usize = 8;

pub type AttributePointer = Rc<dyn Attribute>;

/// A value stored in the octree for some attribute
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeData {
    Float(f32),
    Rgb(u32),
    SharedObject(Option<SharedObjectPointer>),
    SharedObjectSet(SharedObjectSet),
}

impl AttributeData {
    pub fn as_float(&self) -> Option<f32> {
        match self {
            AttributeData::Float(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_rgb(&self) -> Option<u32> {
        match self {
            AttributeData::Rgb(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_shared_object(&self) -> Option<&SharedObjectPointer> {
        match self {
            AttributeData::SharedObject(value) => value.as_ref(),
            _ => None,
        }
    }

    pub fn as_shared_object_set(&self) -> Option<&SharedObjectSet> {
        match self {
            AttributeData::SharedObjectSet(value) => Some(value),
            _ => None,
        }
    }
}

/// The operations the octree performs on the values of one attribute.
/// Attributes are identified by name.
pub trait Attribute: Debug {
    fn name(&self) -> &str;

    fn default_value(&self) -> AttributeData;

    /// Scales the LOD threshold when deciding whether to subdivide nodes of this attribute
    fn lod_threshold_multiplier(&self) -> f32 {
        1.0
    }

    fn equal(&self, first: &AttributeData, second: &AttributeData) -> bool {
        first == second
    }

    /// Compares contents of referenced objects rather than identities
    fn deep_equal(&self, first: &AttributeData, second: &AttributeData) -> bool {
        self.equal(first, second)
    }

    fn is_default(&self, value: &AttributeData) -> bool {
        self.equal(value, &self.default_value())
    }

    fn mix(&self, first: &AttributeData, second: &AttributeData, alpha: f32) -> AttributeData {
        if alpha < 0.5 {
            first.clone()
        } else {
            second.clone()
        }
    }

    /// Combines `source` on top of `dest`
    fn blend(&self, source: &AttributeData, _dest: &AttributeData) -> AttributeData {
        source.clone()
    }

    /// Computes the parent value from the values of its children, returning
    /// true if the children are all equal and could be collapsed into the parent
    fn merge(
        &self,
        parent: &mut AttributeData,
        children: &[AttributeData; MERGE_COUNT],
        post_read: bool,
    ) -> bool;

    /// The value a child takes when its parent is subdivided
    fn inherit(&self, parent: &AttributeData) -> AttributeData {
        parent.clone()
    }

    fn write(
        &self,
        bitstream: &mut Bitstream,
        writer: &mut dyn BitWrite,
        value: &AttributeData,
        is_leaf: bool,
    ) -> Result<(), BitstreamError>;

    fn read(
        &self,
        bitstream: &mut Bitstream,
        reader: &mut BitReader,
        is_leaf: bool,
    ) -> Result<AttributeData, BitstreamError>;

    fn write_delta(
        &self,
        bitstream: &mut Bitstream,
        writer: &mut dyn BitWrite,
        value: &AttributeData,
        _reference: &AttributeData,
        is_leaf: bool,
    ) -> Result<(), BitstreamError> {
        self.write(bitstream, writer, value, is_leaf)
    }

    fn read_delta(
        &self,
        bitstream: &mut Bitstream,
        reader: &mut BitReader,
        _reference: &AttributeData,
        is_leaf: bool,
    ) -> Result<AttributeData, BitstreamError> {
        self.read(bitstream, reader, is_leaf)
    }

    fn mismatch(&self) -> BitstreamError {
        BitstreamError::AttributeValueMismatch {
            attribute: self.name().to_string(),
        }
    }
}
