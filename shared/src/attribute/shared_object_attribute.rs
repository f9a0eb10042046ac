use metavoxel_serde::{BitReader, BitWrite};

use super::{Attribute, AttributeData, MERGE_COUNT};
use crate::bitstream::{shared_objects_equal, Bitstream, BitstreamError, SharedObjectSet};

/// A reference to a shared object stored at the leaves. A parent holds the
/// object only when every child refers to it.
#[derive(Debug)]
pub struct SharedObjectAttribute {
    name: String,
}

impl SharedObjectAttribute {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

impl Attribute for SharedObjectAttribute {
    fn name(&self) -> &str {
        &self.name
    }

    fn default_value(&self) -> AttributeData {
        AttributeData::SharedObject(None)
    }

    fn deep_equal(&self, first: &AttributeData, second: &AttributeData) -> bool {
        shared_objects_equal(first.as_shared_object(), second.as_shared_object())
    }

    fn merge(
        &self,
        parent: &mut AttributeData,
        children: &[AttributeData; MERGE_COUNT],
        _post_read: bool,
    ) -> bool {
        let first = &children[0];
        if children.iter().any(|child| child != first) {
            *parent = self.default_value();
            return false;
        }
        *parent = first.clone();
        true
    }

    fn write(
        &self,
        bitstream: &mut Bitstream,
        writer: &mut dyn BitWrite,
        value: &AttributeData,
        is_leaf: bool,
    ) -> Result<(), BitstreamError> {
        let AttributeData::SharedObject(object) = value else {
            return Err(self.mismatch());
        };
        if is_leaf {
            bitstream.write_shared_object(writer, object.as_ref())?;
        }
        Ok(())
    }

    fn read(
        &self,
        bitstream: &mut Bitstream,
        reader: &mut BitReader,
        is_leaf: bool,
    ) -> Result<AttributeData, BitstreamError> {
        if is_leaf {
            Ok(AttributeData::SharedObject(bitstream.read_shared_object(reader)?))
        } else {
            Ok(self.default_value())
        }
    }
}

/// A set of shared objects stored at every level of the tree. Children do not
/// inherit their parent's set.
#[derive(Debug)]
pub struct SharedObjectSetAttribute {
    name: String,
    lod_threshold_multiplier: f32,
}

impl SharedObjectSetAttribute {
    pub fn new(name: &str) -> Self {
        Self::with_lod_threshold_multiplier(name, 1.0)
    }

    pub fn with_lod_threshold_multiplier(name: &str, multiplier: f32) -> Self {
        Self {
            name: name.to_string(),
            lod_threshold_multiplier: multiplier,
        }
    }
}

impl Attribute for SharedObjectSetAttribute {
    fn name(&self) -> &str {
        &self.name
    }

    fn default_value(&self) -> AttributeData {
        AttributeData::SharedObjectSet(SharedObjectSet::new())
    }

    fn lod_threshold_multiplier(&self) -> f32 {
        self.lod_threshold_multiplier
    }

    fn deep_equal(&self, first: &AttributeData, second: &AttributeData) -> bool {
        match (first.as_shared_object_set(), second.as_shared_object_set()) {
            (Some(first), Some(second)) => first.deep_equals(second),
            _ => first == second,
        }
    }

    /// Leaves the parent's own set in place
    fn merge(
        &self,
        _parent: &mut AttributeData,
        children: &[AttributeData; MERGE_COUNT],
        _post_read: bool,
    ) -> bool {
        children.iter().all(|child| {
            child
                .as_shared_object_set()
                .map_or(true, SharedObjectSet::is_empty)
        })
    }

    fn inherit(&self, _parent: &AttributeData) -> AttributeData {
        self.default_value()
    }

    fn write(
        &self,
        bitstream: &mut Bitstream,
        writer: &mut dyn BitWrite,
        value: &AttributeData,
        _is_leaf: bool,
    ) -> Result<(), BitstreamError> {
        let Some(set) = value.as_shared_object_set() else {
            return Err(self.mismatch());
        };
        bitstream.write_shared_object_set(writer, set)
    }

    fn read(
        &self,
        bitstream: &mut Bitstream,
        reader: &mut BitReader,
        _is_leaf: bool,
    ) -> Result<AttributeData, BitstreamError> {
        Ok(AttributeData::SharedObjectSet(
            bitstream.read_shared_object_set(reader)?,
        ))
    }
}
